//! Well-known Gmail system label IDs

pub const INBOX: &str = "INBOX";
pub const SENT: &str = "SENT";
pub const DRAFT: &str = "DRAFT";
pub const TRASH: &str = "TRASH";
pub const SPAM: &str = "SPAM";
pub const STARRED: &str = "STARRED";
pub const IMPORTANT: &str = "IMPORTANT";
pub const UNREAD: &str = "UNREAD";

/// Whether a label ID is one of Gmail's system labels
///
/// User labels have opaque IDs such as `Label_123`.
pub fn is_system(label_id: &str) -> bool {
    matches!(
        label_id,
        INBOX | SENT | DRAFT | TRASH | SPAM | STARRED | IMPORTANT | UNREAD
    ) || label_id.starts_with("CATEGORY_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_system() {
        assert!(is_system("INBOX"));
        assert!(is_system("CATEGORY_PROMOTIONS"));
        assert!(!is_system("Label_42"));
    }
}
