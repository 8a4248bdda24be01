//! Pattern-based safety screening for shell commands.
//!
//! This is an allow-by-default filter: a command is `Safe` unless it contains
//! one of the destructive patterns below (case-insensitive substring match).
//! A pattern that begins with a word character only matches at the start of
//! a word, so `dd ` flags `dd if=...` but not `git add .`.
//! It is a tripwire for obvious accidents, not a sandbox. Obfuscated or
//! indirect commands (variables, aliases, scripts) pass straight through.

use serde::{Deserialize, Serialize};

/// Classifier decision for one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Safe,
    NeedsConfirmation,
}

/// Verdict plus a human-readable reason naming the matched pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub verdict: Verdict,
    pub reason: String,
}

impl SafetyVerdict {
    pub fn is_safe(&self) -> bool {
        self.verdict == Verdict::Safe
    }
}

/// A destructive substring and the category it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DangerPattern {
    needle: String,
    label: String,
}

impl DangerPattern {
    pub fn new(needle: &str, label: &str) -> Self {
        Self {
            needle: needle.to_lowercase(),
            label: label.to_string(),
        }
    }

    pub fn needle(&self) -> &str {
        &self.needle
    }

    /// `lowered` must already be lowercase.
    fn matches(&self, lowered: &str) -> bool {
        if !self.needle.starts_with(is_word_char) {
            return lowered.contains(&self.needle);
        }
        lowered.match_indices(&self.needle).any(|(index, _)| {
            !lowered[..index]
                .chars()
                .next_back()
                .is_some_and(is_word_char)
        })
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("rm -rf", "recursive force-delete"),
    ("rm -fr", "recursive force-delete"),
    ("sudo", "superuser escalation"),
    ("mv /", "root-relative move"),
    ("dd ", "raw device write"),
    ("> /dev/sd", "raw device write"),
    ("mkfs", "disk format"),
    (":(){:|:&};:", "fork bomb"),
    (":(){ :|:& };:", "fork bomb"),
];

/// Screens commands against an ordered pattern list; first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSafetyClassifier {
    patterns: Vec<DangerPattern>,
}

impl Default for CommandSafetyClassifier {
    fn default() -> Self {
        Self {
            patterns: BUILTIN_PATTERNS
                .iter()
                .map(|(needle, label)| DangerPattern::new(needle, label))
                .collect(),
        }
    }
}

impl CommandSafetyClassifier {
    /// Built-in patterns followed by `extra` (labelled as configured).
    pub fn with_extra_patterns<S: AsRef<str>>(extra: &[S]) -> Self {
        let mut classifier = Self::default();
        classifier.patterns.extend(
            extra
                .iter()
                .map(AsRef::as_ref)
                .filter(|needle| !needle.trim().is_empty())
                .map(|needle| DangerPattern::new(needle, "configured pattern")),
        );
        classifier
    }

    pub fn patterns(&self) -> &[DangerPattern] {
        &self.patterns
    }

    pub fn classify(&self, command: &str) -> SafetyVerdict {
        let lowered = command.trim().to_lowercase();
        for pattern in &self.patterns {
            if pattern.matches(&lowered) {
                return SafetyVerdict {
                    verdict: Verdict::NeedsConfirmation,
                    reason: format!(
                        "dangerous command detected ({}: '{}')",
                        pattern.label, pattern.needle
                    ),
                };
            }
        }
        SafetyVerdict {
            verdict: Verdict::Safe,
            reason: "no destructive pattern matched".to_string(),
        }
    }
}
