//! ANSI stripping for terminal output.
//!
//! Assistant CLIs redraw spinners and status bars with escape sequences;
//! pattern matching only works on the plain text underneath.

use once_cell::sync::Lazy;
use regex::Regex;

/// CSI sequences, OSC sequences, simple two-char escapes and charset selects.
static ANSI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]|\x1b\][^\x07]*\x07|\x1b[>=\[\]]|\x1b[()][AB012]")
        .expect("ansi pattern")
});

/// Control characters except newline, tab and carriage return.
static CONTROL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B-\x0C\x0E-\x1F\x7F]").expect("control pattern"));

/// Remove ANSI escape sequences and control characters from text.
///
/// Carriage-return overwrites collapse to the last segment of each line,
/// simulating what the terminal would actually display. Idempotent.
pub fn strip(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let cleaned = ANSI_PATTERN.replace_all(text, "");
    let cleaned = collapse_carriage_returns(&cleaned);
    CONTROL_PATTERN.replace_all(&cleaned, "").into_owned()
}

/// Within each `\n`-separated line, keep only the last `\r`-separated segment.
fn collapse_carriage_returns(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| line.rsplit('\r').next().unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip ANSI sequences and trim whitespace from a single line.
pub fn clean_line(line: &str) -> String {
    strip(line).trim().to_string()
}

/// Case-insensitive substring check on the stripped text.
pub fn contains_clean(text: &str, substr: &str) -> bool {
    strip(text).to_lowercase().contains(&substr.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_csi_sequences() {
        assert_eq!(strip("\x1b[31mred text\x1b[0m"), "red text");
        assert_eq!(strip("\x1b[2K\x1b[1Gprompt"), "prompt");
    }

    #[test]
    fn test_strip_osc_sequences() {
        assert_eq!(strip("\x1b]0;window title\x07hello"), "hello");
    }

    #[test]
    fn test_strip_simple_escapes() {
        assert_eq!(strip("\x1b=text\x1b>"), "text");
        assert_eq!(strip("\x1b(Bplain"), "plain");
    }

    #[test]
    fn test_strip_control_chars() {
        assert_eq!(strip("a\x00b\x08c\x7fd"), "abcd");
        // Tabs and newlines survive
        assert_eq!(strip("a\tb\nc"), "a\tb\nc");
    }

    #[test]
    fn test_carriage_return_overwrite() {
        assert_eq!(strip("progress 10%\rprogress 50%\rdone"), "done");
        assert_eq!(strip("line one\nstep 1\rstep 2\nline three"), "line one\nstep 2\nline three");
    }

    #[test]
    fn test_strip_is_idempotent() {
        let samples = [
            "\x1b[31m✻ Brewing…\x1b[0m (esc to interrupt)\r\x1b[2K✻ done",
            "plain text",
            "\x1b]0;t\x07\x1b[1mA\rB\nC",
            "",
        ];
        for sample in samples {
            let once = strip(sample);
            assert_eq!(strip(&once), once, "not idempotent for {sample:?}");
        }
    }

    #[test]
    fn test_clean_line() {
        assert_eq!(clean_line("  \x1b[33m∴ Thinking…\x1b[0m  "), "∴ Thinking…");
    }

    #[test]
    fn test_contains_clean() {
        assert!(contains_clean(
            "\x1b[2m(ESC to Interrupt · 5s)\x1b[0m",
            "esc to interrupt"
        ));
        assert!(!contains_clean("regular output", "esc to interrupt"));
    }
}
