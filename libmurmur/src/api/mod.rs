//! Server API boundary
//!
//! The agent talks to its server through the [`ApiClient`] trait so the
//! derivation engine and executor can be tested against a mock. The real
//! implementation lives in [`mastodon`].

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Account, Relationship, Status, Visibility};

pub mod mastodon;

// Mock client is available for all builds to support integration tests
pub mod mock;

/// Payload for creating a status.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStatus {
    pub status: String,
    pub visibility: Visibility,
    pub spoiler_text: Option<String>,
    pub in_reply_to_id: Option<String>,
}

/// Identity of a created status. Empty in dry-run mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostedStatus {
    pub id: String,
    pub url: Option<String>,
}

/// Unified interface to the server's REST API.
///
/// Read methods may fail with [`ApiError::NotFound`](crate::error::ApiError)
/// for unknown resources; callers in the derivation path recover from that.
/// Write methods propagate their failures.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Resolve the account behind the configured credentials.
    async fn verify_credentials(&self) -> Result<Account>;

    /// Fetch a status by id.
    async fn get_status(&self, id: &str) -> Result<Status>;

    /// Fetch an account by id.
    async fn get_account(&self, id: &str) -> Result<Account>;

    /// Resolve a handle like `user` or `user@domain` to an account.
    async fn lookup_account(&self, acct: &str) -> Result<Account>;

    /// Relationship of the given account toward the authenticated one.
    async fn get_relationship(&self, account_id: &str) -> Result<Relationship>;

    /// Create a status.
    async fn post_status(&self, status: &NewStatus) -> Result<PostedStatus>;

    /// Bookmark a status so the server keeps it.
    async fn bookmark_status(&self, id: &str) -> Result<()>;
}
