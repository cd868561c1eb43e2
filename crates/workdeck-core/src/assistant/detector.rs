use std::sync::RwLock;

use once_cell::sync::Lazy;

use super::rules::{default_rules, DetectionRule};
use super::types::{AssistantInfo, AssistantKind};

/// Classifies foreground command lines into AI assistant kinds.
///
/// Rules form an ordered list; callers may append custom rules at init
/// time, before any sessions observe the detector.
pub struct Detector {
    rules: RwLock<Vec<DetectionRule>>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<DetectionRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    /// Analyze a command line; `None` when no assistant is recognized.
    pub fn detect(&self, command: &str) -> Option<AssistantInfo> {
        if command.is_empty() {
            return None;
        }

        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        for rule in rules.iter() {
            if rule.matches(command) {
                return Some(AssistantInfo {
                    kind: rule.kind,
                    name: rule.kind.as_str().to_string(),
                    display_name: rule.kind.display_name().to_string(),
                    detected: true,
                    command: command.to_string(),
                    state: Default::default(),
                    state_updated_at: None,
                    stats: None,
                });
            }
        }
        None
    }

    /// Check several command lines and collect every detection.
    pub fn detect_multiple(&self, commands: &[&str]) -> Vec<AssistantInfo> {
        commands.iter().filter_map(|cmd| self.detect(cmd)).collect()
    }

    pub fn is_assistant(&self, command: &str) -> bool {
        self.detect(command).is_some()
    }

    pub fn assistant_kind(&self, command: &str) -> AssistantKind {
        self.detect(command).map(|info| info.kind).unwrap_or_default()
    }

    /// Append a custom rule. Init-time only; sessions read a consistent copy.
    pub fn add_rule(&self, rule: DetectionRule) {
        self.rules
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(rule);
    }

    /// Copy of the current rule list.
    pub fn rules(&self) -> Vec<DetectionRule> {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

static DEFAULT_DETECTOR: Lazy<Detector> = Lazy::new(Detector::new);

/// Analyze a command line with the default detector.
pub fn detect(command: &str) -> Option<AssistantInfo> {
    DEFAULT_DETECTOR.detect(command)
}

/// Whether the command line runs a known assistant.
pub fn is_assistant(command: &str) -> bool {
    DEFAULT_DETECTOR.is_assistant(command)
}

/// Assistant kind for the command line, `Unknown` when not recognized.
pub fn assistant_kind(command: &str) -> AssistantKind {
    DEFAULT_DETECTOR.assistant_kind(command)
}
