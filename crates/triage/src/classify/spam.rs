//! Rule-based spam scoring
//!
//! A cheap heuristic applied next to the classifier verdict. A score above
//! [`SPAM_SCORE_THRESHOLD`] marks the email as spam even when the classifier
//! did not.

/// Scores strictly above this force `is_spam`
pub const SPAM_SCORE_THRESHOLD: f64 = 0.7;

const SUBJECT_KEYWORDS: &[&str] = &[
    "urgent",
    "act now",
    "limited time",
    "free",
    "winner",
    "congratulations",
    "click here",
    "buy now",
    "discount",
    "offer expires",
    "no obligation",
    "risk free",
    "satisfaction guaranteed",
    "money back",
    "as seen on",
    "weight loss",
    "make money",
    "work from home",
    "get paid",
];

const BODY_PHRASES: &[&str] = &[
    "click here",
    "act now",
    "limited time",
    "expires soon",
    "unsubscribe",
    "remove me",
    "opt out",
    "viagra",
    "cialis",
    "lose weight",
    "make money fast",
    "work from home",
    "congratulations you have won",
    "claim your prize",
];

const NO_REPLY_MARKERS: &[&str] = &["noreply", "no-reply", "donotreply"];

/// Heuristic spam score in [0, 1]
pub fn spam_score(subject: &str, sender: &str, snippet: &str) -> f64 {
    let mut score = 0.0;

    let subject_lower = subject.to_lowercase();
    score += 0.2 * SUBJECT_KEYWORDS
        .iter()
        .filter(|k| subject_lower.contains(*k))
        .count() as f64;

    if is_shouting(subject) {
        score += 0.3;
    }

    if subject.matches('!').count() > 2 || subject.matches('?').count() > 2 {
        score += 0.2;
    }

    let sender_lower = sender.to_lowercase();
    if NO_REPLY_MARKERS.iter().any(|m| sender_lower.contains(m)) {
        score += 0.1;
    }

    // Random-looking sender addresses
    let sender_chars = sender.chars().count();
    let digits = sender.chars().filter(|c| c.is_ascii_digit()).count();
    if sender_chars > 0 && digits as f64 > sender_chars as f64 * 0.3 {
        score += 0.3;
    }

    if !snippet.is_empty() {
        let snippet_lower = snippet.to_lowercase();
        score += 0.15 * BODY_PHRASES
            .iter()
            .filter(|p| snippet_lower.contains(*p))
            .count() as f64;
    }

    score.min(1.0)
}

/// All-caps subject longer than ten characters
fn is_shouting(subject: &str) -> bool {
    subject.chars().count() > 10
        && subject.chars().any(char::is_alphabetic)
        && !subject.chars().any(char::is_lowercase)
}

/// Reason recorded when only the rule score marks an email as spam
pub fn rule_reason(score: f64) -> String {
    format!("Rule-based detection (score: {:.2})", score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_email_scores_zero() {
        let score = spam_score("Lunch on Friday", "alice@example.com", "Are you free?");
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_obvious_spam_is_capped() {
        let score = spam_score(
            "URGENT WINNER!!! CLAIM YOUR FREE PRIZE",
            "no-reply@x93847261.example",
            "Congratulations you have won, click here to claim your prize",
        );
        assert_eq!(score, 1.0);
        assert!(score > SPAM_SCORE_THRESHOLD);
    }

    #[test]
    fn test_single_signals() {
        assert!((spam_score("Big discount", "shop@example.com", "") - 0.2).abs() < 1e-9);
        assert!((spam_score("hi", "noreply@example.com", "") - 0.1).abs() < 1e-9);
        assert!((spam_score("hi", "a@b.c", "unsubscribe here") - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_short_caps_subject_is_not_shouting() {
        assert!(!is_shouting("HELLO"));
        assert!(is_shouting("READ THIS NOW PLEASE"));
        assert!(!is_shouting("1234567890123"));
    }

    #[test]
    fn test_rule_reason_format() {
        assert_eq!(rule_reason(0.756), "Rule-based detection (score: 0.76)");
    }
}
