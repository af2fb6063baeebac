use sidekick_common::{Band, PromptType};
use sidekick_engine::classifier::rules::{Rule, RuleTable};
use sidekick_engine::classifier::{ClassifierOptions, EventClassifier};

fn classifier() -> EventClassifier {
    EventClassifier::default()
}

#[test]
fn test_password_prompt_without_newline() {
    let found = classifier().classify("Password: ", 0.7).unwrap();
    assert_eq!(found.prompt_type, PromptType::Password);
    assert_eq!(found.band, Band::Interactive);
    assert!(found.confidence >= 0.9);
    assert!(!found.is_dangerous);
    assert_eq!(found.prompt_text, "Password:");
}

#[test]
fn test_destructive_confirmation_is_dangerous() {
    let found = classifier()
        .classify("Delete 3 tables? (yes/no): ", 0.7)
        .unwrap();
    assert_eq!(found.prompt_type, PromptType::Confirmation);
    assert_eq!(found.rule_id, "confirmation.yes_no");
    assert!(found.is_dangerous);
}

#[test]
fn test_threshold_is_inclusive() {
    let c = classifier();
    // password.colon has base confidence 0.95
    assert!(c.classify("Password: ", 0.95).is_some());
    assert!(c.classify("Password: ", 0.96).is_none());
}

#[test]
fn test_no_detection_is_none() {
    let c = classifier();
    assert!(c.classify("", 0.5).is_none());
    assert!(c.classify("compiling 12 crates\nfinished in 3.2s\n", 0.7).is_none());
}

#[test]
fn test_classification_is_deterministic() {
    let c = classifier();
    let window = "$ make install\ncopying files\nOverwrite /etc/app.conf? [y/N] ";
    let first = c.classify(window, 0.5);
    for _ in 0..10 {
        assert_eq!(c.classify(window, 0.5), first);
    }
}

#[test]
fn test_critical_band_wins_over_prompts() {
    let window = "$ cargo run\nthread 'main' panicked at src/main.rs:3:5\nboom\n\n$ ";
    let found = classifier().classify(window, 0.5).unwrap();
    assert_eq!(found.band, Band::Critical);
    assert_eq!(found.prompt_type, PromptType::Unclassified);
    assert!(found.is_dangerous);
    assert_eq!(
        found.context,
        vec![
            "$ cargo run",
            "thread 'main' panicked at src/main.rs:3:5",
            "boom"
        ]
    );
}

#[test]
fn test_prompt_context_starts_after_command() {
    let window = "old output\n$ ./install.sh\nCopying files\nDone copying\nContinue? (y/n) ";
    let found = classifier().classify(window, 0.7).unwrap();
    assert_eq!(found.prompt_type, PromptType::Confirmation);
    assert_eq!(found.context.len(), 3);
    assert_eq!(found.context[0], "Copying files");
    assert_eq!(found.context[2].trim(), "Continue? (y/n)");
}

#[test]
fn test_shell_prompt_gets_status_context() {
    let window = "[10:00:00] started\n[10:00:30] working\n[10:01:10] done\nuser@host:~$ ";
    let found = classifier().classify(window, 0.5).unwrap();
    assert_eq!(found.prompt_type, PromptType::ShellPrompt);
    assert_eq!(found.rule_id, "shell.user_host");
    // 10:00:00 is more than 60s before 10:01:10
    assert_eq!(
        found.context,
        vec!["[10:00:30] working", "[10:01:10] done", "user@host:~$ "]
    );
}

#[test]
fn test_only_tail_lines_are_scanned() {
    let options = ClassifierOptions {
        scan_lines: 3,
        ..ClassifierOptions::default()
    };
    let c = EventClassifier::new(options);
    let window = "Password: \nline 1\nline 2\nline 3\nline 4";
    assert!(c.classify(window, 0.5).is_none());
    assert!(c.classify("line 1\nPassword: \nline 2", 0.5).is_some());
}

#[test]
fn test_danger_flag_independent_of_type() {
    let window = "about to run rm -rf /var/lib/app\nEnter command: ";
    let found = classifier().classify(window, 0.7).unwrap();
    assert_eq!(found.prompt_type, PromptType::Command);
    assert!(found.is_dangerous);
}

#[test]
fn test_declaration_order_breaks_ties() {
    let first = Rule::new("custom.first", Band::Interactive, PromptType::Text, 0.8, "(?i)token").unwrap();
    let second = Rule::new("custom.second", Band::Interactive, PromptType::Path, 0.9, "(?i)token").unwrap();
    let c = EventClassifier::with_rules(
        RuleTable::new(vec![first, second]),
        ClassifierOptions::default(),
    );
    let found = c.classify("API token: ", 0.5).unwrap();
    assert_eq!(found.rule_id, "custom.first");
}

#[test]
fn test_event_offset_is_absolute() {
    let event = classifier()
        .classify_event("line one\nContinue? (y/n) ", 100, 0.7)
        .unwrap();
    assert_eq!(event.matched_text, "(y/n)");
    assert_eq!(event.offset, 100 + 9 + 10);
    assert_eq!(event.prompt_text, "Continue? (y/n)");
}
