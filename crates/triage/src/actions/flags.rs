//! User verdicts on whole senders

use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{AccountId, EmailAddress};
use crate::storage::{EmailPatch, EmailStore, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderFlag {
    /// Trusted sender: clears spam on every stored email
    Whitelist,
    Blacklist,
    Spam,
}

impl SenderFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderFlag::Whitelist => "whitelist",
            SenderFlag::Blacklist => "blacklist",
            SenderFlag::Spam => "spam",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whitelist" => Some(SenderFlag::Whitelist),
            "blacklist" => Some(SenderFlag::Blacklist),
            "spam" => Some(SenderFlag::Spam),
            _ => None,
        }
    }

    fn patch(&self) -> EmailPatch {
        match self {
            SenderFlag::Whitelist => EmailPatch {
                is_spam: Some(false),
                spam_reason: Some(None),
                ..EmailPatch::default()
            },
            SenderFlag::Blacklist | SenderFlag::Spam => EmailPatch {
                is_spam: Some(true),
                spam_reason: Some(Some(format!("User flagged sender as {}", self))),
                ..EmailPatch::default()
            },
        }
    }
}

impl fmt::Display for SenderFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Apply a sender flag to every stored email from that address
///
/// Matching compares normalized addresses, so `"Shop <DEALS@shop.example>"`
/// and `deals@shop.example` are the same sender. Returns the rows updated.
pub fn flag_sender(
    store: &dyn EmailStore,
    account_id: &AccountId,
    sender: &str,
    flag: SenderFlag,
) -> Result<usize> {
    let address = EmailAddress::parse(sender).normalized();
    let selector = Selector::all().include_deleted().sender(address.clone());
    let patch = flag.patch();

    let mut updated = 0;
    for email in store.select(account_id, &selector)? {
        if email.sender_address().normalized() != address {
            continue;
        }
        if store.update_email(email.id, &patch)? {
            updated += 1;
        }
    }

    info!(
        "[FLAGS] Flagged {} as {} ({} emails updated)",
        address, flag, updated
    );
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageSnapshot;
    use crate::storage::InMemoryEmailStore;
    use chrono::Utc;

    fn seed(store: &InMemoryEmailStore, account: &AccountId) {
        let snapshots: Vec<MessageSnapshot> = [
            ("m1", "Deals <DEALS@shop.example>"),
            ("m2", "deals@shop.example"),
            ("m3", "alerts-deals@shop.example"),
        ]
        .into_iter()
        .map(|(id, from)| MessageSnapshot::builder(id).sender(from).build())
        .collect();
        store
            .upsert_batch(account, &snapshots, None, Utc::now())
            .unwrap();
    }

    #[test]
    fn test_blacklist_then_whitelist() {
        let store = InMemoryEmailStore::new();
        let account = AccountId::from("me@example.com");
        seed(&store, &account);

        let flagged = flag_sender(&store, &account, "deals@shop.example", SenderFlag::Blacklist)
            .unwrap();
        assert_eq!(flagged, 2);

        let spam = store.select(&account, &Selector::all().spam(true)).unwrap();
        assert_eq!(spam.len(), 2);
        assert_eq!(
            spam[0].spam_reason.as_deref(),
            Some("User flagged sender as blacklist")
        );

        flag_sender(&store, &account, "Deals <deals@shop.example>", SenderFlag::Whitelist).unwrap();
        let spam = store.select(&account, &Selector::all().spam(true)).unwrap();
        assert!(spam.is_empty());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(SenderFlag::parse(" Spam "), Some(SenderFlag::Spam));
        assert_eq!(SenderFlag::parse("block"), None);
    }
}
