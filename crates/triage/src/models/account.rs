//! Account identity and the per-call credential context

use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier (the mailbox address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a provider call needs to act on behalf of one account
///
/// Passed explicitly into every sync, classification and bulk call. The
/// access token is opaque here; issuing and refreshing it happens elsewhere.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccountContext {
    pub account_id: AccountId,
    pub access_token: String,
}

impl AccountContext {
    pub fn new(account_id: impl Into<AccountId>, access_token: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            access_token: access_token.into(),
        }
    }

    /// Value for the HTTP `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

// Keeps tokens out of logs
impl fmt::Debug for AccountContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountContext")
            .field("account_id", &self.account_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_header() {
        let ctx = AccountContext::new("me@example.com", "tok123");
        assert_eq!(ctx.bearer(), "Bearer tok123");
    }

    #[test]
    fn test_debug_redacts_token() {
        let ctx = AccountContext::new("me@example.com", "tok123");
        let debug = format!("{:?}", ctx);
        assert!(debug.contains("me@example.com"));
        assert!(!debug.contains("tok123"));
    }
}
