//! Mock API client for testing
//!
//! A configurable in-memory [`ApiClient`] that serves fixture accounts,
//! statuses and relationships, and records every write call in order so
//! tests can assert on the exact sequence the executor produced.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{ApiClient, NewStatus, PostedStatus};
use crate::error::{ApiError, Result};
use crate::types::{Account, Relationship, Status};

/// One recorded write call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Post(NewStatus),
    Bookmark(String),
}

pub struct MockApi {
    bot: Account,
    accounts_by_id: HashMap<String, Account>,
    accounts_by_acct: HashMap<String, Account>,
    statuses: HashMap<String, Status>,
    relationships: HashMap<String, Relationship>,
    fail_posts: bool,
    calls: Mutex<Vec<ApiCall>>,
    post_counter: Mutex<usize>,
}

impl MockApi {
    pub fn new(bot: Account) -> Self {
        let mut accounts_by_id = HashMap::new();
        let mut accounts_by_acct = HashMap::new();
        accounts_by_id.insert(bot.id.clone(), bot.clone());
        accounts_by_acct.insert(bot.acct.clone(), bot.clone());
        Self {
            bot,
            accounts_by_id,
            accounts_by_acct,
            statuses: HashMap::new(),
            relationships: HashMap::new(),
            fail_posts: false,
            calls: Mutex::new(Vec::new()),
            post_counter: Mutex::new(0),
        }
    }

    /// Register an account resolvable by id and by handle.
    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts_by_id
            .insert(account.id.clone(), account.clone());
        self.accounts_by_acct
            .insert(account.acct.clone(), account);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.statuses.insert(status.id.clone(), status);
        self
    }

    /// Set whether the account with this id follows the bot.
    pub fn with_relationship(mut self, account_id: &str, followed_by: bool) -> Self {
        self.relationships
            .insert(account_id.to_string(), Relationship { followed_by });
        self
    }

    /// Make every write call fail.
    pub fn failing_posts(mut self) -> Self {
        self.fail_posts = true;
        self
    }

    /// Every write call made so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Only the statuses posted so far, in order.
    pub fn posted(&self) -> Vec<NewStatus> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Post(status) => Some(status),
                ApiCall::Bookmark(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl ApiClient for MockApi {
    async fn verify_credentials(&self) -> Result<Account> {
        Ok(self.bot.clone())
    }

    async fn get_status(&self, id: &str) -> Result<Status> {
        self.statuses
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("status {}", id)).into())
    }

    async fn get_account(&self, id: &str) -> Result<Account> {
        self.accounts_by_id
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("account {}", id)).into())
    }

    async fn lookup_account(&self, acct: &str) -> Result<Account> {
        self.accounts_by_acct
            .get(acct)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("account {}", acct)).into())
    }

    async fn get_relationship(&self, account_id: &str) -> Result<Relationship> {
        self.relationships
            .get(account_id)
            .copied()
            .ok_or_else(|| ApiError::NotFound(format!("relationship for {}", account_id)).into())
    }

    async fn post_status(&self, status: &NewStatus) -> Result<PostedStatus> {
        if self.fail_posts {
            return Err(ApiError::Posting("mock post failure".to_string()).into());
        }
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::Post(status.clone()));
        let mut counter = self.post_counter.lock().unwrap();
        *counter += 1;
        Ok(PostedStatus {
            id: format!("posted-{}", *counter),
            url: Some(format!("https://mock.test/posted-{}", *counter)),
        })
    }

    async fn bookmark_status(&self, id: &str) -> Result<()> {
        if self.fail_posts {
            return Err(ApiError::Posting("mock bookmark failure".to_string()).into());
        }
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::Bookmark(id.to_string()));
        Ok(())
    }
}
