//! Destructive-operation and password-prompt detection.
//!
//! The danger pass is independent of the rule table: any window can be
//! flagged whatever type it was classified as.

use regex::Regex;
use std::sync::LazyLock;

const DANGEROUS_PATTERNS: &[&str] = &[
    r"(?i)\brm\s+-rf\s+/",
    r"(?i)\brm\s+-(?:[a-z]*r[a-z]*f|[a-z]*f[a-z]*r)[a-z]*\s",
    r"(?i)\bmkfs\b",
    r"(?i)\bdd\s+if=",
    r":[(][)]\s*\{.*?[:][|&].*?\};:",
    r"(?i)\bformat\s+[a-z]:",
    r"(?i)\bdel\s+/[fqs]",
    r"(?i)\bdelete\b.*?\btable",
    r"(?i)\bdelete\b.*?\b(?:all|files|data|everything)",
    r"(?i)\bdrop\s+(?:table|database|schema)",
    r"(?i)\btruncate\b.*?\btable",
    r"(?i)\bremove\b.*?\b(?:all|files|data)",
    r"(?i)\bdestroy\b",
    r"(?i)\bwipe\b",
    r"(?i)\berase\b.*?\b(?:all|files|data)",
    r"(?i)\bgit\s+push\b.*?(?:--force\b|--force-with-lease\b|\s-f\b)",
    r"(?i)\bgit\s+reset\s+--hard\b",
    r"(?i)\bgit\s+clean\s+-[a-z]*f",
];

const PASSWORD_PATTERNS: &[&str] = &[
    r"(?i)password(?:\s+for\s+[^:\n]+)?\s*:",
    r"(?i)passphrase(?:\s+for\s+[^:\n]+)?\s*:",
    r"(?i)\bpass\s*:",
    r"(?i)enter\s+(?:your\s+)?password",
    r"(?i)authentication\s+required",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

static DANGEROUS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(DANGEROUS_PATTERNS));
static PASSWORD: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(PASSWORD_PATTERNS));

/// True if the text mentions a destructive operation.
pub fn is_dangerous(text: &str) -> bool {
    DANGEROUS.iter().any(|re| re.is_match(text))
}

/// True if the text looks like it is asking for a secret.
pub fn is_password_prompt(text: &str) -> bool {
    PASSWORD.iter().any(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_commands() {
        assert!(is_dangerous("rm -rf /var/lib"));
        assert!(is_dangerous("sudo rm -fr build/"));
        assert!(is_dangerous("Delete 3 tables? (yes/no): "));
        assert!(is_dangerous("DROP TABLE users;"));
        assert!(is_dangerous("git push origin main --force"));
        assert!(is_dangerous("mkfs.ext4 /dev/sdb1"));
        assert!(is_dangerous(":(){ :|:& };:"));
    }

    #[test]
    fn test_benign_text() {
        assert!(!is_dangerous("Password: "));
        assert!(!is_dangerous("Continue? (y/n)"));
        assert!(!is_dangerous("git push origin main"));
        assert!(!is_dangerous("Formatting output as JSON"));
    }

    #[test]
    fn test_password_prompts() {
        assert!(is_password_prompt("[sudo] password for alice:"));
        assert!(is_password_prompt("Enter passphrase for key '/home/a/.ssh/id_ed25519':"));
        assert!(is_password_prompt("Authentication required"));
        assert!(!is_password_prompt("Continue? (y/n)"));
    }
}
