//! Agent wiring
//!
//! Owns the configuration, the API client, the rate limiter and the bot
//! identity, and processes one streaming event at a time: derive the
//! action, log it, execute it. Execution failures are logged and the
//! agent moves on to the next event.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::api::ApiClient;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;
use crate::executor::Executor;
use crate::rate_limiter::RateLimiter;
use crate::stream::EventHandler;
use crate::types::{Account, Action, Event};

pub struct Agent {
    config: Config,
    api: Arc<dyn ApiClient>,
    limiter: RateLimiter,
    bot: Account,
}

impl Agent {
    pub fn new(config: Config, api: Arc<dyn ApiClient>, bot: Account) -> Result<Self> {
        let limiter = RateLimiter::from_config(&config.rate_limits)?;
        Ok(Self {
            config,
            api,
            limiter,
            bot,
        })
    }

    /// The account the agent is running as.
    pub fn bot(&self) -> &Account {
        &self.bot
    }

    /// Derive the action for one event without executing it.
    pub async fn derive(&self, event: &Event) -> Action {
        Engine::new(&self.config, self.api.as_ref(), &self.limiter, &self.bot)
            .derive(event)
            .await
    }

    /// Process one event end to end.
    pub async fn process(&self, event: Event) {
        let action = self.derive(&event).await;
        info!(action = action.name(), "action derived");

        let executor = Executor::new(&self.config, self.api.as_ref());
        if let Err(e) = executor.execute(&action).await {
            error!(action = action.name(), error = %e, "action execution failed");
        }
    }
}

#[async_trait]
impl EventHandler for Agent {
    async fn handle(&self, event: Event) {
        self.process(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::types::{Mention, Status, Visibility};

    fn account(id: &str, acct: &str) -> Account {
        Account {
            id: id.to_string(),
            acct: acct.to_string(),
            url: Some(format!("https://mastodon.test/@{}", acct)),
        }
    }

    fn config() -> Config {
        Config {
            access_token: "token".to_string(),
            server_url: "https://mastodon.test".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_forward_end_to_end() {
        let bot = account("1", "murmur");
        let api = Arc::new(
            MockApi::new(bot.clone())
                .with_account(account("2", "toto"))
                .with_relationship("2", true),
        );
        let agent = Agent::new(config(), api.clone(), bot).unwrap();

        let status = Status {
            id: "100".to_string(),
            visibility: Visibility::Direct,
            content: "<p>a question for ?toto</p><p>How old are you?</p>".to_string(),
            spoiler_text: None,
            mentions: vec![Mention {
                id: "1".to_string(),
                acct: "murmur".to_string(),
            }],
            tags: Vec::new(),
            in_reply_to_id: None,
            in_reply_to_account_id: None,
            account: account("9", "alice"),
            url: None,
        };

        agent.process(Event::Mention { status }).await;

        let posted = api.posted();
        assert_eq!(posted.len(), 2);
        assert!(posted[0].status.starts_with("@toto How old are you?"));
        assert!(posted[1].status.starts_with("@alice Received!"));
    }

    #[tokio::test]
    async fn test_execution_failure_does_not_panic() {
        let bot = account("1", "murmur");
        let api = Arc::new(MockApi::new(bot.clone()).failing_posts());
        let agent = Agent::new(config(), api, bot).unwrap();

        agent
            .process(Event::Follow {
                account: account("9", "alice"),
            })
            .await;
    }
}
