//! Ranked input suggestions for a detected prompt.
//!
//! Learned responses come first, then context-derived and static per-type
//! defaults, then anything an external hook contributes. A candidate text
//! appears at most once, at its highest-priority position.

use crate::classifier::danger;
use crate::config::schema::SuggestionConfig;
use crate::ledger::ResponseLedger;
use regex::Regex;
use sidekick_common::protocol::SuggestResponse;
use sidekick_common::{Candidate, CandidateSource, Event, LearnedPattern, PromptType, REDACTION_MARKER};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use tracing::debug;

pub const DANGER_WARNING: &str = "Dangerous operation detected: this prompt involves potentially \
destructive actions. Review carefully before proceeding.";
pub const PASSWORD_WARNING: &str =
    "Security: manual password entry required. Passwords are never suggested.";
pub const UNCLASSIFIED_WARNING: &str = "Unknown prompt type: manual input required.";
pub const NO_SUGGESTION_WARNING: &str = "No suggestion available: manual input required.";

const WORKING_DIRECTORY: &str = "working_directory";

static CHOICE_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]|(?:^|\s)(\d+)[).]\s").unwrap());

const COMMANDS: &[(&str, &str)] = &[
    ("help", "Display help information"),
    ("exit", "Exit the current session"),
    ("status", "Check status"),
    ("ls", "List directory contents"),
];

/// What a suggestion is being asked for.
#[derive(Debug, Clone, Copy)]
pub struct SuggestionRequest<'a> {
    pub prompt_text: &'a str,
    pub prompt_type: PromptType,
    pub is_dangerous: bool,
    pub context: &'a HashMap<String, String>,
}

/// Extension point for an external inference source. Its candidates are
/// ranked after every built-in candidate.
pub trait SuggestionHook: Send + Sync {
    fn suggest(&self, request: &SuggestionRequest<'_>) -> Vec<Candidate>;
}

pub struct SuggestionEngine {
    ledger: Arc<ResponseLedger>,
    config: SuggestionConfig,
    hook: Option<Box<dyn SuggestionHook>>,
}

impl SuggestionEngine {
    pub fn new(ledger: Arc<ResponseLedger>, config: SuggestionConfig) -> Self {
        Self {
            ledger,
            config,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Box<dyn SuggestionHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Suggest inputs for a classified event.
    pub fn suggest(&self, event: &Event, context: &HashMap<String, String>) -> SuggestResponse {
        self.suggest_for(&SuggestionRequest {
            prompt_text: &event.prompt_text,
            prompt_type: event.prompt_type,
            is_dangerous: event.is_dangerous,
            context,
        })
    }

    /// Suggest inputs for raw prompt text. Danger is derived from the text.
    pub fn suggest_text(
        &self,
        prompt_text: &str,
        prompt_type: PromptType,
        context: &HashMap<String, String>,
    ) -> SuggestResponse {
        self.suggest_for(&SuggestionRequest {
            prompt_text,
            prompt_type,
            is_dangerous: danger::is_dangerous(prompt_text),
            context,
        })
    }

    pub fn suggest_for(&self, request: &SuggestionRequest<'_>) -> SuggestResponse {
        let mut warnings = Vec::new();
        if request.is_dangerous {
            warnings.push(DANGER_WARNING.to_string());
        }
        match request.prompt_type {
            PromptType::Password => warnings.push(PASSWORD_WARNING.to_string()),
            PromptType::Unclassified => warnings.push(UNCLASSIFIED_WARNING.to_string()),
            _ => {}
        }

        let mut ranked = Ranked::default();
        if let Some(pattern) = self.ledger.lookup_prompt(request.prompt_text) {
            ranked.extend(pattern_candidates(&pattern));
        }
        ranked.extend(self.default_candidates(request));
        if let Some(hook) = &self.hook {
            ranked.extend(hook.suggest(request).into_iter().map(|mut c| {
                c.source = CandidateSource::External;
                c.actionable = true;
                c
            }));
        }

        let candidates = ranked.into_inner();
        if candidates.is_empty() && request.prompt_type != PromptType::Unclassified {
            warnings.push(NO_SUGGESTION_WARNING.to_string());
        }
        debug!(
            prompt_type = %request.prompt_type,
            candidates = candidates.len(),
            warnings = warnings.len(),
            "generated suggestions"
        );
        SuggestResponse {
            candidates,
            warnings,
        }
    }

    fn default_candidates(&self, request: &SuggestionRequest<'_>) -> Vec<Candidate> {
        let cfg = &self.config;
        match request.prompt_type {
            PromptType::Confirmation => confirmation_candidates(request, cfg.confirmation_confidence),
            PromptType::Path => {
                let mut out = Vec::new();
                if let Some(wd) = request.context.get(WORKING_DIRECTORY) {
                    out.push(Candidate::new(
                        wd.clone(),
                        0.80,
                        CandidateSource::Context,
                        "Current working directory from session context",
                    ));
                }
                for (i, prefix) in cfg.path_prefixes.iter().enumerate() {
                    let confidence = if i == 0 {
                        cfg.path_confidence
                    } else {
                        cfg.path_confidence - 0.05
                    };
                    out.push(Candidate::new(
                        prefix.clone(),
                        confidence,
                        CandidateSource::Default,
                        format!("Common path prefix {prefix}"),
                    ));
                }
                out
            }
            PromptType::Choice => choice_options(request.prompt_text)
                .into_iter()
                .map(|n| {
                    let rationale = format!("Select option {n}");
                    Candidate::new(n, cfg.choice_confidence, CandidateSource::Default, rationale)
                })
                .collect(),
            PromptType::Command => COMMANDS
                .iter()
                .map(|(cmd, why)| {
                    Candidate::new(*cmd, cfg.command_confidence, CandidateSource::Default, *why)
                })
                .collect(),
            PromptType::Password | PromptType::Text | PromptType::ShellPrompt => {
                vec![Candidate::new(
                    "",
                    0.0,
                    CandidateSource::Placeholder,
                    "No safe default, human input required",
                )]
            }
            PromptType::Unclassified => Vec::new(),
        }
    }
}

fn confirmation_candidates(request: &SuggestionRequest<'_>, confidence: f64) -> Vec<Candidate> {
    if request.is_dangerous {
        return vec![
            Candidate::new(
                "no",
                0.85,
                CandidateSource::Default,
                "Recommended: dangerous operation detected, declining is the safer choice",
            ),
            Candidate::new(
                "yes",
                0.60,
                CandidateSource::Default,
                "Proceed with caution: this executes a potentially destructive operation",
            ),
        ];
    }

    let where_ = request
        .context
        .get(WORKING_DIRECTORY)
        .map(|wd| format!(" (working directory: {wd})"))
        .unwrap_or_default();
    vec![
        Candidate::new(
            "yes",
            confidence,
            CandidateSource::Default,
            format!("Confirm the operation{where_}"),
        ),
        Candidate::new(
            "no",
            confidence,
            CandidateSource::Default,
            format!("Cancel the operation{where_}"),
        ),
    ]
}

/// One candidate per learned response, most used first.
fn pattern_candidates(pattern: &LearnedPattern) -> Vec<Candidate> {
    let mut responses: Vec<_> = pattern
        .responses
        .iter()
        .filter(|(text, _)| text.as_str() != REDACTION_MARKER)
        .collect();
    responses.sort_by(|(a_text, a), (b_text, b)| {
        b.count
            .cmp(&a.count)
            .then(
                b.success_rate()
                    .partial_cmp(&a.success_rate())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a_text.cmp(b_text))
    });

    responses
        .into_iter()
        .map(|(text, stats)| {
            Candidate::new(
                text.clone(),
                stats.success_rate(),
                CandidateSource::Pattern,
                format!(
                    "used {}/{} times successfully",
                    stats.success_count, stats.count
                ),
            )
        })
        .collect()
}

/// Option numbers enumerated in a prompt: `[1]` or `1)` / `1.` forms.
fn choice_options(prompt_text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    CHOICE_OPTION
        .captures_iter(prompt_text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

#[derive(Default)]
struct Ranked {
    seen: HashSet<String>,
    candidates: Vec<Candidate>,
}

impl Ranked {
    fn extend(&mut self, candidates: impl IntoIterator<Item = Candidate>) {
        for candidate in candidates {
            if self.seen.insert(candidate.text.clone()) {
                self.candidates.push(candidate);
            }
        }
    }

    fn into_inner(self) -> Vec<Candidate> {
        self.candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choice_options() {
        assert_eq!(
            choice_options("Select [1] apt [2] snap [3] flatpak:"),
            vec!["1", "2", "3"]
        );
        assert_eq!(
            choice_options("Pick one: 1) red 2) blue 1) again"),
            vec!["1", "2"]
        );
        assert!(choice_options("Choose an option:").is_empty());
    }

    #[test]
    fn test_ranked_deduplicates_keeping_first() {
        let mut ranked = Ranked::default();
        ranked.extend(vec![Candidate::new("no", 1.0, CandidateSource::Pattern, "p")]);
        ranked.extend(vec![
            Candidate::new("yes", 0.75, CandidateSource::Default, "d"),
            Candidate::new("no", 0.75, CandidateSource::Default, "d"),
        ]);
        let out = ranked.into_inner();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].source, CandidateSource::Pattern);
        assert_eq!(out[1].text, "yes");
    }
}
