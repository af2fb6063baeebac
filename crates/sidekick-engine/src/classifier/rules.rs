//! Declarative detection rules.
//!
//! Rules are data, not code: each entry pairs a compiled pattern with the
//! type and base confidence it assigns. The table keeps rules grouped by
//! [`Band`] and, within a band, in declaration order; the classifier takes
//! the first rule that matches.

use regex::Regex;
use sidekick_common::{Band, PromptType};
use std::sync::LazyLock;

#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub band: Band,
    pub prompt_type: PromptType,
    pub confidence: f64,
    pub regex: Regex,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        band: Band,
        prompt_type: PromptType,
        confidence: f64,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            id: id.into(),
            band,
            prompt_type,
            confidence: confidence.clamp(0.0, 1.0),
            regex: Regex::new(pattern)?,
        })
    }
}

type RuleSpec = (&'static str, Band, PromptType, f64, &'static str);

const BUILTIN_RULES: &[RuleSpec] = &[
    // Crashes and fatal errors
    (
        "critical.panic",
        Band::Critical,
        PromptType::Unclassified,
        0.95,
        r"(?im)\bpanicked at\b|^panic: ",
    ),
    (
        "critical.segfault",
        Band::Critical,
        PromptType::Unclassified,
        0.95,
        r"(?i)segmentation fault|\bcore dumped\b",
    ),
    (
        "critical.fatal",
        Band::Critical,
        PromptType::Unclassified,
        0.93,
        r"(?im)^\s*fatal(?: error)?:",
    ),
    (
        "critical.traceback",
        Band::Critical,
        PromptType::Unclassified,
        0.92,
        r"Traceback \(most recent call last\):",
    ),
    (
        "critical.oom",
        Band::Critical,
        PromptType::Unclassified,
        0.90,
        r"(?i)\bout of memory\b|\boom-killer\b|\bkilled process \d+",
    ),
    // Interactive prompts
    (
        "password.colon",
        Band::Interactive,
        PromptType::Password,
        0.95,
        r"(?i)password(?:\s+for\s+[^:\n]+)?\s*:",
    ),
    (
        "password.passphrase",
        Band::Interactive,
        PromptType::Password,
        0.95,
        r"(?i)passphrase(?:\s+for\s+[^:\n]+)?\s*:",
    ),
    (
        "password.enter",
        Band::Interactive,
        PromptType::Password,
        0.92,
        r"(?i)enter\s+(?:your\s+)?password",
    ),
    (
        "confirmation.yes_no",
        Band::Interactive,
        PromptType::Confirmation,
        0.90,
        r"(?i)\(yes/no\)|\[y/n\]|\(y/n\)",
    ),
    (
        "confirmation.question",
        Band::Interactive,
        PromptType::Confirmation,
        0.85,
        r"(?i)continue\?|proceed\?|confirm\?",
    ),
    (
        "path.enter",
        Band::Interactive,
        PromptType::Path,
        0.88,
        r"(?i)enter\s+(?:file\s+)?path\s*:|(?:file|directory)\s+path\s*:",
    ),
    (
        "path.name",
        Band::Interactive,
        PromptType::Path,
        0.82,
        r"(?i)(?:file|directory)\s+name\s*:",
    ),
    (
        "choice.numbered",
        Band::Interactive,
        PromptType::Choice,
        0.82,
        r"(?m)^\s*\[\d+\].*(?:\n\s*\[\d+\].*)+",
    ),
    (
        "command.enter",
        Band::Interactive,
        PromptType::Command,
        0.85,
        r"(?i)enter\s+command\s*:|command\s*:",
    ),
    (
        "text.enter",
        Band::Interactive,
        PromptType::Text,
        0.75,
        r"(?i)enter\s+\w+\s*:|input\s*:",
    ),
    // Generic shell prompts at the very end of output
    (
        "shell.user_host",
        Band::Shell,
        PromptType::ShellPrompt,
        0.70,
        r"(?m)^[\w.-]+@[\w.-]+[^\n]*[$#%>]\s*\z",
    ),
    (
        "shell.bare",
        Band::Shell,
        PromptType::ShellPrompt,
        0.60,
        r"(?m)^[^\n]{0,80}[$#>]\s*\z",
    ),
];

static BUILTIN: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    BUILTIN_RULES
        .iter()
        .map(|(id, band, ty, confidence, pattern)| {
            Rule::new(*id, *band, *ty, *confidence, pattern).unwrap()
        })
        .collect()
});

/// Ordered rule table.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleTable {
    pub fn builtin() -> Self {
        Self {
            rules: BUILTIN.clone(),
        }
    }

    /// Build a table from arbitrary rules. Rules are regrouped by band;
    /// the sort is stable, so declaration order within a band is kept.
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|rule| rule.band);
        Self { rules }
    }

    /// Add a rule after every existing rule of the same band.
    pub fn push(&mut self, rule: Rule) {
        let at = self
            .rules
            .iter()
            .position(|existing| existing.band > rule.band)
            .unwrap_or(self.rules.len());
        self.rules.insert(at, rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    /// True if any interactive rule matches the line.
    pub fn is_prompt_line(&self, line: &str) -> bool {
        self.rules
            .iter()
            .filter(|rule| rule.band == Band::Interactive)
            .any(|rule| rule.regex.is_match(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_rules_are_grouped_by_band() {
        let table = RuleTable::builtin();
        let bands: Vec<Band> = table.rules().iter().map(|r| r.band).collect();
        let mut sorted = bands.clone();
        sorted.sort();
        assert_eq!(bands, sorted);
        assert!(table.get("password.colon").is_some());
    }

    #[test]
    fn test_push_keeps_band_grouping() {
        let mut table = RuleTable::builtin();
        let rule = Rule::new(
            "critical.custom",
            Band::Critical,
            PromptType::Unclassified,
            0.9,
            "KERNEL BUG",
        )
        .unwrap();
        table.push(rule);

        let ids: Vec<&str> = table.rules().iter().map(|r| r.id.as_str()).collect();
        let custom = ids.iter().position(|id| *id == "critical.custom").unwrap();
        let first_interactive = ids.iter().position(|id| *id == "password.colon").unwrap();
        assert_eq!(custom + 1, first_interactive);
    }

    #[test]
    fn test_new_sorts_by_band_stably() {
        let shell = Rule::new("s", Band::Shell, PromptType::ShellPrompt, 0.6, r"\$").unwrap();
        let first = Rule::new("a", Band::Interactive, PromptType::Text, 0.8, "a").unwrap();
        let second = Rule::new("b", Band::Interactive, PromptType::Text, 0.8, "b").unwrap();
        let table = RuleTable::new(vec![shell, first, second]);
        let ids: Vec<&str> = table.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "s"]);
    }
}
