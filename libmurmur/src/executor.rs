//! Action execution
//!
//! Carries out a derived [`Action`] through the API client. No business
//! decisions are made here; the action already contains everything needed.
//! Every status the agent writes is a direct message.

use tracing::info;

use crate::api::{ApiClient, NewStatus, PostedStatus};
use crate::config::Config;
use crate::error::Result;
use crate::types::{Action, Visibility};

pub struct Executor<'a> {
    config: &'a Config,
    api: &'a dyn ApiClient,
}

impl<'a> Executor<'a> {
    pub fn new(config: &'a Config, api: &'a dyn ApiClient) -> Self {
        Self { config, api }
    }

    /// Execute one action. Write failures abort the remaining steps of
    /// the action and propagate to the caller.
    pub async fn execute(&self, action: &Action) -> Result<()> {
        match action {
            Action::Skip => Ok(()),
            Action::Reply {
                message,
                recipient,
                in_reply_to_id,
            } => {
                self.post(&recipient.acct, message, None, in_reply_to_id.clone())
                    .await?;
                Ok(())
            }
            Action::Forward {
                sender,
                recipient,
                message,
                spoiler_text,
                in_reply_to_id,
            } => {
                // relay first, then confirm to the sender
                self.post(
                    &recipient.acct,
                    &self.config.render_forward(message),
                    Some(spoiler_text.clone()),
                    in_reply_to_id.clone(),
                )
                .await?;
                self.post(
                    &sender.acct,
                    &self.config.render_success_forward(&recipient.acct),
                    None,
                    in_reply_to_id.clone(),
                )
                .await?;
                info!(recipient = %recipient.acct, "message forwarded");
                Ok(())
            }
            Action::Follow {
                sender,
                bot_account,
            } => {
                self.post(
                    &sender.acct,
                    &self.config.render_follow(&sender.acct, &bot_account.acct),
                    None,
                    None,
                )
                .await?;
                info!(follower = %sender.acct, "follower welcomed");
                Ok(())
            }
            Action::Report {
                sender,
                anonymous_sender,
                reported_message,
                report,
            } => {
                // bookmark the reported message so it doesn't get deleted
                self.api.bookmark_status(&reported_message.id).await?;

                // notify the mods, and keep the alert around too
                let mod_message = self.config.render_report_mod(
                    &sender.acct,
                    reported_message.url.as_deref().unwrap_or_default(),
                    &anonymous_sender.acct,
                    anonymous_sender.url.as_deref().unwrap_or_default(),
                );
                let mods = self
                    .config
                    .report
                    .moderators
                    .iter()
                    .map(|m| format!("@{}", m))
                    .collect::<Vec<_>>()
                    .join(" ");
                let alert = self
                    .api
                    .post_status(&NewStatus {
                        status: format!("{} {}", mods, mod_message),
                        visibility: Visibility::Direct,
                        spoiler_text: None,
                        in_reply_to_id: Some(report.id.clone()),
                    })
                    .await?;
                self.api.bookmark_status(&alert.id).await?;

                // confirm to the report author
                let confirmation = self
                    .post(
                        &sender.acct,
                        &self.config.render_report_confirmation(),
                        None,
                        Some(report.id.clone()),
                    )
                    .await?;
                self.api.bookmark_status(&confirmation.id).await?;
                info!(reporter = %sender.acct, "report escalated");
                Ok(())
            }
        }
    }

    /// Post a direct status addressed to `recipient`.
    async fn post(
        &self,
        recipient: &str,
        message: &str,
        spoiler_text: Option<String>,
        in_reply_to_id: Option<String>,
    ) -> Result<PostedStatus> {
        self.api
            .post_status(&NewStatus {
                status: format!("@{} {}", recipient, message),
                visibility: Visibility::Direct,
                spoiler_text,
                in_reply_to_id,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{ApiCall, MockApi};
    use crate::types::{Account, Status};

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

    fn status(id: &str, author: &Account) -> Status {
        Status {
            id: id.to_string(),
            visibility: Visibility::Direct,
            content: String::new(),
            spoiler_text: None,
            mentions: Vec::new(),
            tags: Vec::new(),
            in_reply_to_id: None,
            in_reply_to_account_id: None,
            account: author.clone(),
            url: Some(format!("https://mastodon.test/@{}/{}", author.acct, id)),
        }
    }

    #[tokio::test]
    async fn test_skip_does_nothing() {
        let api = MockApi::new(account("1", "murmur"));
        let config = config();
        Executor::new(&config, &api)
            .execute(&Action::Skip)
            .await
            .unwrap();
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reply_posts_direct_to_recipient() {
        let api = MockApi::new(account("1", "murmur"));
        let config = config();
        let action = Action::Reply {
            message: "Your message is invalid.".to_string(),
            recipient: account("9", "alice"),
            in_reply_to_id: Some("100".to_string()),
        };

        Executor::new(&config, &api).execute(&action).await.unwrap();

        let posted = api.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].status, "@alice Your message is invalid.");
        assert_eq!(posted[0].visibility, Visibility::Direct);
        assert_eq!(posted[0].in_reply_to_id, Some("100".to_string()));
    }

    #[tokio::test]
    async fn test_forward_relays_then_confirms() {
        let api = MockApi::new(account("1", "murmur"));
        let config = config();
        let action = Action::Forward {
            sender: account("9", "alice"),
            recipient: account("2", "toto"),
            message: "How old are you?".to_string(),
            spoiler_text: "You received a Murmur message".to_string(),
            in_reply_to_id: Some("100".to_string()),
        };

        Executor::new(&config, &api).execute(&action).await.unwrap();

        let posted = api.posted();
        assert_eq!(posted.len(), 2);

        // the relay carries the wrapped body and the content warning
        assert!(posted[0].status.starts_with("@toto How old are you?"));
        assert!(posted[0].status.contains("#\\report"));
        assert_eq!(
            posted[0].spoiler_text,
            Some("You received a Murmur message".to_string())
        );
        assert_eq!(posted[0].in_reply_to_id, Some("100".to_string()));

        // the confirmation goes back to the sender, no spoiler
        assert!(posted[1].status.starts_with("@alice Received!"));
        assert!(posted[1].status.contains("'toto'"));
        assert_eq!(posted[1].spoiler_text, None);
    }

    #[tokio::test]
    async fn test_follow_welcomes_new_follower() {
        let api = MockApi::new(account("1", "murmur"));
        let config = config();
        let action = Action::Follow {
            sender: account("9", "alice"),
            bot_account: account("1", "murmur"),
        };

        Executor::new(&config, &api).execute(&action).await.unwrap();

        let posted = api.posted();
        assert_eq!(posted.len(), 1);
        assert!(posted[0].status.starts_with("@alice Welcome to Murmur!"));
        assert!(posted[0].status.contains("for ?alice:"));
        assert_eq!(posted[0].in_reply_to_id, None);
    }

    #[tokio::test]
    async fn test_report_issues_five_calls_in_order() {
        let api = MockApi::new(account("1", "murmur"));
        let mut config = config();
        config.report.moderators = vec!["mod1".to_string(), "mod2".to_string()];

        let anonymous = account("7", "anon");
        let mut reported = status("50", &account("1", "murmur"));
        reported.in_reply_to_account_id = Some("7".to_string());
        let report = status("200", &account("9", "alice"));

        let action = Action::Report {
            sender: account("9", "alice"),
            anonymous_sender: anonymous,
            reported_message: reported,
            report,
        };

        Executor::new(&config, &api).execute(&action).await.unwrap();

        let calls = api.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[0], ApiCall::Bookmark("50".to_string()));
        match &calls[1] {
            ApiCall::Post(alert) => {
                assert!(alert.status.starts_with("@mod1 @mod2 alice reported"));
                assert!(alert.status.contains("anon"));
                assert_eq!(alert.in_reply_to_id, Some("200".to_string()));
            }
            other => panic!("expected post, got {:?}", other),
        }
        assert_eq!(calls[2], ApiCall::Bookmark("posted-1".to_string()));
        match &calls[3] {
            ApiCall::Post(confirmation) => {
                assert!(confirmation.status.starts_with("@alice Your report"));
                assert!(confirmation.status.contains("mod1, mod2"));
            }
            other => panic!("expected post, got {:?}", other),
        }
        assert_eq!(calls[4], ApiCall::Bookmark("posted-2".to_string()));
    }

    #[tokio::test]
    async fn test_report_aborts_on_first_failure() {
        let api = MockApi::new(account("1", "murmur")).failing_posts();
        let config = config();

        let mut reported = status("50", &account("1", "murmur"));
        reported.in_reply_to_account_id = Some("7".to_string());
        let action = Action::Report {
            sender: account("9", "alice"),
            anonymous_sender: account("7", "anon"),
            reported_message: reported,
            report: status("200", &account("9", "alice")),
        };

        let result = Executor::new(&config, &api).execute(&action).await;
        assert!(result.is_err());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_forward_failure_propagates() {
        let api = MockApi::new(account("1", "murmur")).failing_posts();
        let config = config();
        let action = Action::Forward {
            sender: account("9", "alice"),
            recipient: account("2", "toto"),
            message: "hi".to_string(),
            spoiler_text: "cw".to_string(),
            in_reply_to_id: None,
        };

        let result = Executor::new(&config, &api).execute(&action).await;
        assert!(result.is_err());
    }
}
