//! Action derivation
//!
//! Turns one inbound event into exactly one [`Action`]. This is where all
//! business rules live; the executor only carries actions out. Lookup
//! failures never escape: they become a `Skip` or a templated `Reply`.

use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::config::Config;
use crate::content;
use crate::rate_limiter::RateLimiter;
use crate::types::{Account, Action, Event, Status, Visibility};

pub struct Engine<'a> {
    config: &'a Config,
    api: &'a dyn ApiClient,
    limiter: &'a RateLimiter,
    bot: &'a Account,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: &'a Config,
        api: &'a dyn ApiClient,
        limiter: &'a RateLimiter,
        bot: &'a Account,
    ) -> Self {
        Self {
            config,
            api,
            limiter,
            bot,
        }
    }

    /// Derive the single action for an event.
    pub async fn derive(&self, event: &Event) -> Action {
        match event {
            Event::Follow { account } => Action::Follow {
                sender: account.clone(),
                bot_account: self.bot.clone(),
            },
            Event::Mention { status } => self.derive_mention(status).await,
        }
    }

    async fn derive_mention(&self, status: &Status) -> Action {
        if status.visibility != Visibility::Direct {
            debug!(status_id = %status.id, "not a direct message, skipping");
            return Action::Skip;
        }

        if status.account.id == self.bot.id {
            debug!(status_id = %status.id, "own status, skipping");
            return Action::Skip;
        }

        for tag in &status.tags {
            let name = tag.name.to_lowercase();
            if self
                .config
                .report
                .hashtags
                .iter()
                .any(|h| h.to_lowercase() == name)
            {
                return self.derive_report(status).await;
            }
        }

        // the bot must be the only mentioned account
        if status.mentions.len() != 1 || status.mentions[0].id != self.bot.id {
            return Action::Skip;
        }

        let content = content::strip_html(&status.content);
        let sender = &status.account;

        let Some((_, username)) = content::extract_target(&content, self.config.marker()) else {
            return self.reply(
                self.config.render_invalid_account("", &self.bot.acct),
                sender,
                status,
            );
        };

        let recipient = match self.api.lookup_account(&username).await {
            Ok(account) => account,
            Err(e) => {
                debug!(username = %username, error = %e, "recipient lookup failed");
                return self.reply(
                    self.config.render_invalid_account(&username, &self.bot.acct),
                    sender,
                    status,
                );
            }
        };

        let relationship = match self.api.get_relationship(&recipient.id).await {
            Ok(relationship) => relationship,
            Err(e) => {
                warn!(recipient = %recipient.acct, error = %e, "relationship fetch failed");
                return Action::Skip;
            }
        };

        if !relationship.followed_by {
            // charge the limiter so probing accounts for opt-in status
            // is as expensive as forwarding
            self.limiter.allow(&sender.acct, Some(recipient.acct.as_str()));
            return self.reply(
                self.config.render_success_forward(&recipient.acct),
                sender,
                status,
            );
        }

        let Some(body) = content::extract_body(&content) else {
            return self.reply(
                self.config.render_invalid_message(&self.bot.acct),
                sender,
                status,
            );
        };

        if !self.limiter.allow(&sender.acct, Some(recipient.acct.as_str())) {
            warn!(sender = %sender.acct, "rate limit reached, skipping");
            return Action::Skip;
        }

        let mut spoiler_text = self.config.messages.default_content_warning.clone();
        if let Some(warning) = status.content_warning() {
            spoiler_text = format!("{} | {}", spoiler_text, warning);
        }

        Action::Forward {
            sender: sender.clone(),
            recipient,
            message: body,
            spoiler_text,
            in_reply_to_id: Some(status.id.clone()),
        }
    }

    /// A report is a reply to a bot-authored forward, tagged with one of
    /// the report hashtags. Any lookup failure skips the event.
    async fn derive_report(&self, status: &Status) -> Action {
        let Some(reported_id) = &status.in_reply_to_id else {
            return Action::Skip;
        };

        let reported_message = match self.api.get_status(reported_id).await {
            Ok(reported) => reported,
            Err(e) => {
                debug!(status_id = %reported_id, error = %e, "reported status fetch failed");
                return Action::Skip;
            }
        };

        // only messages the bot itself forwarded can be reported
        if reported_message.account.id != self.bot.id {
            return Action::Skip;
        }

        let Some(anonymous_id) = &reported_message.in_reply_to_account_id else {
            return Action::Skip;
        };

        let anonymous_sender = match self.api.get_account(anonymous_id).await {
            Ok(account) => account,
            Err(e) => {
                debug!(account_id = %anonymous_id, error = %e, "anonymous sender fetch failed");
                return Action::Skip;
            }
        };

        Action::Report {
            sender: status.account.clone(),
            anonymous_sender,
            reported_message,
            report: status.clone(),
        }
    }

    fn reply(&self, message: String, recipient: &Account, status: &Status) -> Action {
        Action::Reply {
            message,
            recipient: recipient.clone(),
            in_reply_to_id: Some(status.id.clone()),
        }
    }
}
