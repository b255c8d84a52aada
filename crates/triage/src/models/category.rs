//! Classification categories

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category assigned to an email by the classifier
///
/// Open to extension: anything the classifier returns that is not one of the
/// well-known categories is kept verbatim as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Work,
    Personal,
    Shopping,
    Newsletter,
    Social,
    Promotional,
    Spam,
    Important,
    Other(String),
}

impl Category {
    /// Categories offered to the classifier in prompts
    pub const KNOWN: [Category; 8] = [
        Category::Work,
        Category::Personal,
        Category::Shopping,
        Category::Newsletter,
        Category::Social,
        Category::Promotional,
        Category::Spam,
        Category::Important,
    ];

    /// Parse a category name case-insensitively
    ///
    /// Returns `None` for blank input, which callers treat as malformed.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return None;
        }
        let category = match trimmed.to_ascii_lowercase().as_str() {
            "work" => Category::Work,
            "personal" => Category::Personal,
            "shopping" => Category::Shopping,
            "newsletter" | "newsletters" => Category::Newsletter,
            "social" => Category::Social,
            "promotional" | "promotion" | "promotions" => Category::Promotional,
            "spam" => Category::Spam,
            "important" => Category::Important,
            _ => Category::Other(trimmed.to_string()),
        };
        Some(category)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::Work => "Work",
            Category::Personal => "Personal",
            Category::Shopping => "Shopping",
            Category::Newsletter => "Newsletter",
            Category::Social => "Social",
            Category::Promotional => "Promotional",
            Category::Spam => "Spam",
            Category::Important => "Important",
            Category::Other(name) => name,
        }
    }

    /// Low-value categories eligible for content retention cleanup
    pub fn is_low_value(&self) -> bool {
        matches!(
            self,
            Category::Promotional | Category::Newsletter | Category::Spam
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category::parse(&s).unwrap_or(Category::Other(s))
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}
