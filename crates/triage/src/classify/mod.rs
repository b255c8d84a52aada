//! Email classification
//!
//! - [`Classifier`]: the seam to a stateless classification API
//! - [`runner`]: selects rows, batches them and writes verdicts back
//! - [`llm`]: OpenAI-compatible chat completions client
//! - [`spam`]: rule-based spam scoring that backs up the classifier

pub mod llm;
pub mod runner;
pub mod spam;

use serde::{Deserialize, Serialize};

use crate::error::TriageError;
use crate::models::EmailId;

pub use llm::{LlmClassifier, LlmConfig, TokenUsage};
pub use runner::{ClassificationResult, ClassifyOptions, ClassifyStatus, classify_account};
pub use spam::{SPAM_SCORE_THRESHOLD, spam_score};

/// One email as sent to the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyItem {
    pub id: EmailId,
    pub subject: String,
    pub snippet: String,
    pub sender: String,
}

/// Email id as echoed back by the classifier
///
/// Models sometimes quote numbers; both forms are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    pub fn as_email_id(&self) -> Option<EmailId> {
        match self {
            RawId::Number(n) => Some(EmailId(*n)),
            RawId::Text(s) => s.trim().parse().ok().map(EmailId),
        }
    }
}

/// Unvalidated per-item verdict
///
/// The runner checks every field before anything is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVerdict {
    pub id: RawId,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "confidenceScore", alias = "confidence")]
    pub confidence_score: Option<f64>,
    #[serde(default, alias = "isSpam")]
    pub is_spam: Option<bool>,
    #[serde(default, alias = "spamReason")]
    pub spam_reason: Option<String>,
}

/// Stateless text-in, label-out classification API
pub trait Classifier: Send + Sync {
    /// Classify one batch
    ///
    /// An `Err` means the whole batch failed. Entries may be missing or
    /// malformed; the runner validates them individually.
    fn classify_batch(&self, items: &[ClassifyItem]) -> Result<Vec<RawVerdict>, TriageError>;
}
