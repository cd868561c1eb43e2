use super::types::AssistantKind;

/// A rule for recognizing an assistant CLI from its command line.
#[derive(Debug, Clone)]
pub struct DetectionRule {
    pub kind: AssistantKind,
    /// Case-insensitive substrings matched against the command line.
    pub patterns: Vec<String>,
    pub description: String,
}

impl DetectionRule {
    pub fn new(kind: AssistantKind, patterns: &[&str], description: &str) -> Self {
        Self {
            kind,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            description: description.to_string(),
        }
    }

    /// Check whether the command line matches this rule.
    pub fn matches(&self, command: &str) -> bool {
        if command.is_empty() {
            return false;
        }
        let normalized = command.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| normalized.contains(&pattern.to_lowercase()))
    }
}

/// Built-in detection rules, checked in order; first match wins.
pub fn default_rules() -> Vec<DetectionRule> {
    vec![
        DetectionRule::new(
            AssistantKind::ClaudeCode,
            &[
                "@anthropic-ai/claude-code",
                "claude-code/cli.js",
                "claude-code/bin/",
            ],
            "Detects Anthropic Claude Code CLI",
        ),
        DetectionRule::new(
            AssistantKind::Codex,
            &["@openai/codex", "codex/bin/codex.js", "codex.js"],
            "Detects OpenAI Codex CLI",
        ),
        DetectionRule::new(
            AssistantKind::QwenCode,
            &["@qwen-code/qwen-code", "qwen-code/cli.js", "qwen-code/bin/"],
            "Detects Qwen Code CLI",
        ),
        DetectionRule::new(
            AssistantKind::Gemini,
            &[
                "@google/gemini-cli",
                "gemini-cli/dist/index.js",
                "gemini-cli/bin/",
            ],
            "Detects Google Gemini CLI",
        ),
        DetectionRule::new(
            AssistantKind::Cursor,
            &["cursor", "cursor.exe", "cursor-server"],
            "Detects Cursor editor",
        ),
        DetectionRule::new(
            AssistantKind::Copilot,
            &["github-copilot", "copilot-agent", "copilot.vim"],
            "Detects GitHub Copilot",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_is_case_insensitive() {
        let rule = DetectionRule::new(AssistantKind::ClaudeCode, &["claude-code/cli.js"], "");
        assert!(rule.matches("node /usr/lib/CLAUDE-CODE/cli.js --resume"));
        assert!(!rule.matches("vim main.rs"));
        assert!(!rule.matches(""));
    }

    #[test]
    fn test_default_rules_cover_known_assistants() {
        let rules = default_rules();
        assert_eq!(rules.len(), 6);
        assert_eq!(rules[0].kind, AssistantKind::ClaudeCode);
        assert!(rules.iter().all(|r| !r.patterns.is_empty()));
    }
}
