//! Gmail API HTTP client
//!
//! Thin transport over Gmail REST v1. Uses synchronous HTTP (ureq) so the
//! pipeline stays executor-agnostic. Retries live in the callers; every
//! method here is a single attempt mapped to [`TriageError`].

use anyhow::{Context, Result};
use log::debug;
use rayon::prelude::*;
use std::time::Duration;
use ureq::Agent;

use super::api::{GmailMessage, ListMessagesResponse, ModifyMessageRequest};
use super::normalize::normalize_message;
use crate::error::TriageError;
use crate::mailbox::{FetchResult, ListQuery, MailboxProvider, MessagePage};
use crate::models::{AccountContext, MessageSnapshot, ProviderMessageId};

/// Gmail caps `maxResults` on messages.list
const MAX_PAGE_SIZE: usize = 500;

/// Gmail API client
pub struct GmailClient {
    agent: Agent,
    base_url: String,
    fetch_pool: rayon::ThreadPool,
}

impl GmailClient {
    /// Gmail API base URL
    pub const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Create a client with a per-request timeout and a bounded fetch pool
    pub fn new(timeout: Duration, fetch_concurrency: usize) -> Result<Self> {
        Self::with_base_url(Self::BASE_URL, timeout, fetch_concurrency)
    }

    /// Create a client against a different endpoint (proxies, test servers)
    pub fn with_base_url(
        base_url: impl Into<String>,
        timeout: Duration,
        fetch_concurrency: usize,
    ) -> Result<Self> {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .into();

        let fetch_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(fetch_concurrency.max(1))
            .thread_name(|i| format!("gmail-fetch-{}", i))
            .build()
            .context("Failed to build Gmail fetch pool")?;

        Ok(Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetch_pool,
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/users/me/messages", self.base_url)
    }

    /// Get full message details by ID
    pub fn get_message(
        &self,
        ctx: &AccountContext,
        id: &ProviderMessageId,
    ) -> Result<GmailMessage, TriageError> {
        let url = format!(
            "{}/{}?format=full",
            self.messages_url(),
            urlencoding::encode(id.as_str())
        );

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &ctx.bearer())
            .call()?;

        check_status(&mut response)?;

        Ok(response.body_mut().read_json::<GmailMessage>()?)
    }

    /// Fetch and normalize one message
    fn fetch_snapshot(
        &self,
        ctx: &AccountContext,
        id: &ProviderMessageId,
    ) -> Result<MessageSnapshot, TriageError> {
        let message = self.get_message(ctx, id)?;
        normalize_message(message)
    }

    fn post_empty(&self, ctx: &AccountContext, url: &str) -> Result<(), TriageError> {
        let mut response = self
            .agent
            .post(url)
            .header("Authorization", &ctx.bearer())
            .send_empty()?;
        check_status(&mut response)
    }
}

/// Build the query string for messages.list
fn list_query_string(query: &ListQuery, page_token: Option<&str>) -> String {
    let page_size = if query.page_size == 0 {
        MAX_PAGE_SIZE
    } else {
        query.page_size.min(MAX_PAGE_SIZE)
    };

    let mut params = vec![format!("maxResults={}", page_size)];
    if let Some(q) = query.q.as_deref().filter(|q| !q.is_empty()) {
        params.push(format!("q={}", urlencoding::encode(q)));
    }
    for label in &query.label_ids {
        params.push(format!("labelIds={}", urlencoding::encode(label)));
    }
    if query.include_spam_trash {
        params.push("includeSpamTrash=true".to_string());
    }
    if let Some(token) = page_token {
        params.push(format!("pageToken={}", urlencoding::encode(token)));
    }
    params.join("&")
}

fn check_status(response: &mut ureq::http::Response<ureq::Body>) -> Result<(), TriageError> {
    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(());
    }
    let body = response.body_mut().read_to_string().unwrap_or_default();
    Err(TriageError::from_http_status(status, &body))
}

impl MailboxProvider for GmailClient {
    fn list_message_ids(
        &self,
        ctx: &AccountContext,
        query: &ListQuery,
        page_token: Option<&str>,
    ) -> Result<MessagePage, TriageError> {
        let url = format!(
            "{}?{}",
            self.messages_url(),
            list_query_string(query, page_token)
        );

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &ctx.bearer())
            .call()?;

        check_status(&mut response)?;

        let list: ListMessagesResponse = response.body_mut().read_json()?;
        let ids: Vec<ProviderMessageId> = list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| ProviderMessageId::new(m.id))
            .collect();

        debug!(
            "[GMAIL] Listed {} ids for {} (estimate {:?}, more: {})",
            ids.len(),
            ctx.account_id,
            list.result_size_estimate,
            list.next_page_token.is_some()
        );

        Ok(MessagePage {
            ids,
            next_page_token: list.next_page_token,
        })
    }

    fn fetch_messages(&self, ctx: &AccountContext, ids: &[ProviderMessageId]) -> Vec<FetchResult> {
        self.fetch_pool.install(|| {
            ids.par_iter()
                .map(|id| (id.clone(), self.fetch_snapshot(ctx, id)))
                .collect()
        })
    }

    fn modify_labels(
        &self,
        ctx: &AccountContext,
        id: &ProviderMessageId,
        add: &[&str],
        remove: &[&str],
    ) -> Result<(), TriageError> {
        let url = format!(
            "{}/{}/modify",
            self.messages_url(),
            urlencoding::encode(id.as_str())
        );
        let body = ModifyMessageRequest {
            add_label_ids: add,
            remove_label_ids: remove,
        };

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &ctx.bearer())
            .send_json(&body)?;
        check_status(&mut response)
    }

    fn trash(&self, ctx: &AccountContext, id: &ProviderMessageId) -> Result<(), TriageError> {
        let url = format!(
            "{}/{}/trash",
            self.messages_url(),
            urlencoding::encode(id.as_str())
        );
        self.post_empty(ctx, &url)
    }

    fn untrash(&self, ctx: &AccountContext, id: &ProviderMessageId) -> Result<(), TriageError> {
        let url = format!(
            "{}/{}/untrash",
            self.messages_url(),
            urlencoding::encode(id.as_str())
        );
        self.post_empty(ctx, &url)
    }
}
