//! Shell encoding conversion.
//!
//! Terminals configured for GBK-family encodings (common on Chinese
//! Windows hosts) emit bytes the UI cannot render directly; output is
//! normalized to UTF-8 on the way out and input is encoded back on the
//! way in. Conversion trouble degrades to passing the original bytes
//! through, never to an error.

use encoding_rs::{Encoding, GB18030, GBK};

use crate::error::TerminalError;

/// Resolved encoding for one session.
#[derive(Debug, Clone, Copy)]
pub struct EncodingProfile {
    name: &'static str,
    encoding: Option<&'static Encoding>,
}

impl EncodingProfile {
    /// Map a configured encoding name to a profile.
    ///
    /// Accepts utf-8/utf8 (identity), gbk, gb18030/gb-18030 and gb2312
    /// (GBK superset per the WHATWG label space); anything else fails.
    pub fn resolve(name: &str) -> Result<Self, TerminalError> {
        let normalized = name.trim().to_lowercase();
        match normalized.as_str() {
            "" | "utf-8" | "utf8" => Ok(Self {
                name: "utf-8",
                encoding: None,
            }),
            "gbk" => Ok(Self {
                name: "gbk",
                encoding: Some(GBK),
            }),
            "gb18030" | "gb-18030" => Ok(Self {
                name: "gb18030",
                encoding: Some(GB18030),
            }),
            "gb2312" => Ok(Self {
                name: "gb2312",
                encoding: Some(GBK),
            }),
            _ => Err(TerminalError::InvalidEncoding(normalized)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Decode PTY output into UTF-8. Always returns a fresh buffer.
    pub fn normalize_output(&self, data: &[u8]) -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }
        let Some(encoding) = self.encoding else {
            return data.to_vec();
        };
        let (decoded, _, had_errors) = encoding.decode(data);
        if had_errors {
            return data.to_vec();
        }
        decoded.into_owned().into_bytes()
    }

    /// Encode UTF-8 input into the shell encoding. Always a fresh buffer.
    pub fn prepare_input(&self, data: &[u8]) -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }
        let Some(encoding) = self.encoding else {
            return data.to_vec();
        };
        let Ok(text) = std::str::from_utf8(data) else {
            return data.to_vec();
        };
        let (encoded, _, had_errors) = encoding.encode(text);
        if had_errors {
            return data.to_vec();
        }
        encoded.into_owned()
    }
}
