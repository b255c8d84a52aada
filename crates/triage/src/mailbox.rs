//! Mailbox provider abstraction
//!
//! The sync engine and bulk executor only talk to the provider through
//! [`MailboxProvider`]. [`crate::gmail::GmailClient`] is the production
//! implementation.

use crate::error::TriageError;
use crate::models::{AccountContext, MessageSnapshot, ProviderMessageId};

/// Listing query sent to the provider
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Provider search expression (Gmail `q`), e.g. `after:1700000000`
    pub q: Option<String>,
    /// Restrict to messages carrying all of these label IDs
    pub label_ids: Vec<String>,
    /// Include SPAM and TRASH in the listing
    pub include_spam_trash: bool,
    /// Page size hint
    pub page_size: usize,
}

/// One page of message IDs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePage {
    pub ids: Vec<ProviderMessageId>,
    pub next_page_token: Option<String>,
}

/// Result of fetching one message
pub type FetchResult = (ProviderMessageId, Result<MessageSnapshot, TriageError>);

/// Remote mailbox operations, scoped per call to one account
pub trait MailboxProvider: Send + Sync {
    /// List message IDs matching `query`, one page at a time
    fn list_message_ids(
        &self,
        ctx: &AccountContext,
        query: &ListQuery,
        page_token: Option<&str>,
    ) -> Result<MessagePage, TriageError>;

    /// Fetch and normalize messages
    ///
    /// Returns one entry per requested ID, in request order. Failures are
    /// reported per message.
    fn fetch_messages(&self, ctx: &AccountContext, ids: &[ProviderMessageId]) -> Vec<FetchResult>;

    /// Add and remove labels on one message
    fn modify_labels(
        &self,
        ctx: &AccountContext,
        id: &ProviderMessageId,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), TriageError>;

    /// Move one message to the provider trash
    fn trash(&self, ctx: &AccountContext, id: &ProviderMessageId) -> Result<(), TriageError>;

    /// Take one message back out of the provider trash
    fn untrash(&self, ctx: &AccountContext, id: &ProviderMessageId) -> Result<(), TriageError>;
}
