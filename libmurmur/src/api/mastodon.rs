//! Mastodon API client
//!
//! Implements [`ApiClient`] on top of the megalodon library, which also
//! covers Pleroma, Firefish, GoToSocial and other servers speaking the
//! Mastodon API.

use async_trait::async_trait;
use megalodon::megalodon::{PostStatusInputOptions, PostStatusOutput};
use megalodon::{entities, Megalodon, SNS};
use tracing::info;

use crate::api::{ApiClient, NewStatus, PostedStatus};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::types::{Account, Mention, Relationship, Status, Tag, Visibility};

pub struct MastodonClient {
    client: Box<dyn Megalodon + Send + Sync>,
    /// When set, write calls are logged instead of sent.
    dry_run: bool,
}

impl MastodonClient {
    pub fn new(server_url: String, access_token: String, dry_run: bool) -> Result<Self> {
        let client = megalodon::generator(SNS::Mastodon, server_url, Some(access_token), None)
            .map_err(|e| {
                ApiError::Authentication(format!("failed to create Mastodon client: {}", e))
            })?;
        Ok(Self { client, dry_run })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.server_url.clone(),
            config.access_token.clone(),
            config.dry_run,
        )
    }
}

#[async_trait]
impl ApiClient for MastodonClient {
    async fn verify_credentials(&self) -> Result<Account> {
        let response = self
            .client
            .verify_account_credentials()
            .await
            .map_err(|e| map_megalodon_error(e, "verify credentials"))?;
        Ok(account_from(response.json))
    }

    async fn get_status(&self, id: &str) -> Result<Status> {
        let response = self
            .client
            .get_status(id.to_string())
            .await
            .map_err(|e| map_megalodon_error(e, "get status"))?;
        Ok(status_from(response.json))
    }

    async fn get_account(&self, id: &str) -> Result<Account> {
        let response = self
            .client
            .get_account(id.to_string())
            .await
            .map_err(|e| map_megalodon_error(e, "get account"))?;
        Ok(account_from(response.json))
    }

    async fn lookup_account(&self, acct: &str) -> Result<Account> {
        let response = self
            .client
            .lookup_account(acct.to_string())
            .await
            .map_err(|e| map_megalodon_error(e, "lookup account"))?;
        Ok(account_from(response.json))
    }

    async fn get_relationship(&self, account_id: &str) -> Result<Relationship> {
        let response = self
            .client
            .get_relationships(vec![account_id.to_string()])
            .await
            .map_err(|e| map_megalodon_error(e, "get relationship"))?;
        let relationship = response
            .json
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("relationship for {}", account_id)))?;
        Ok(Relationship {
            followed_by: relationship.followed_by,
        })
    }

    async fn post_status(&self, status: &NewStatus) -> Result<PostedStatus> {
        if self.dry_run {
            info!(status = %status.status, "dry run, status not posted");
            return Ok(PostedStatus::default());
        }

        let options = PostStatusInputOptions {
            in_reply_to_id: status.in_reply_to_id.clone(),
            spoiler_text: status.spoiler_text.clone(),
            visibility: Some(visibility_to(status.visibility)),
            ..Default::default()
        };
        let response = self
            .client
            .post_status(status.status.clone(), Some(&options))
            .await
            .map_err(|e| map_megalodon_error(e, "post status"))?;

        match response.json {
            PostStatusOutput::Status(status) => Ok(PostedStatus {
                id: status.id,
                url: status.url,
            }),
            PostStatusOutput::ScheduledStatus(scheduled) => Ok(PostedStatus {
                id: scheduled.id,
                url: None,
            }),
        }
    }

    async fn bookmark_status(&self, id: &str) -> Result<()> {
        if self.dry_run {
            info!(status_id = %id, "dry run, status not bookmarked");
            return Ok(());
        }

        self.client
            .bookmark_status(id.to_string())
            .await
            .map_err(|e| map_megalodon_error(e, "bookmark status"))?;
        Ok(())
    }
}

fn account_from(account: entities::Account) -> Account {
    Account {
        id: account.id,
        acct: account.acct,
        url: Some(account.url),
    }
}

fn status_from(status: entities::Status) -> Status {
    Status {
        id: status.id,
        visibility: visibility_from(status.visibility),
        content: status.content,
        spoiler_text: Some(status.spoiler_text),
        mentions: status
            .mentions
            .into_iter()
            .map(|m| Mention {
                id: m.id,
                acct: m.acct,
            })
            .collect(),
        tags: status.tags.into_iter().map(|t| Tag { name: t.name }).collect(),
        in_reply_to_id: status.in_reply_to_id,
        in_reply_to_account_id: status.in_reply_to_account_id,
        account: account_from(status.account),
        url: status.url,
    }
}

fn visibility_from(visibility: entities::StatusVisibility) -> Visibility {
    match visibility {
        entities::StatusVisibility::Public => Visibility::Public,
        entities::StatusVisibility::Unlisted => Visibility::Unlisted,
        entities::StatusVisibility::Private => Visibility::Private,
        entities::StatusVisibility::Direct => Visibility::Direct,
        _ => Visibility::Unknown,
    }
}

fn visibility_to(visibility: Visibility) -> entities::StatusVisibility {
    match visibility {
        Visibility::Public => entities::StatusVisibility::Public,
        Visibility::Unlisted => entities::StatusVisibility::Unlisted,
        Visibility::Private => entities::StatusVisibility::Private,
        // everything the agent writes is direct; Unknown never reaches here
        Visibility::Direct | Visibility::Unknown => entities::StatusVisibility::Direct,
    }
}

/// Map megalodon errors to [`ApiError`] based on the HTTP status carried
/// in the error message.
fn map_megalodon_error(error: megalodon::error::Error, context: &str) -> ApiError {
    let error_str = error.to_string();

    match extract_http_status(&error_str) {
        Some(401) | Some(403) => ApiError::Authentication(format!("{}: {}", context, error_str)),
        Some(404) => ApiError::NotFound(format!("{}: {}", context, error_str)),
        Some(400..=499) => ApiError::Posting(format!("{}: {}", context, error_str)),
        _ => {
            let lower = error_str.to_lowercase();
            if lower.contains("unauthorized") || lower.contains("forbidden") {
                ApiError::Authentication(format!("{}: {}", context, error_str))
            } else if lower.contains("not found") {
                ApiError::NotFound(format!("{}: {}", context, error_str))
            } else {
                ApiError::Network(format!("{}: {}", context, error_str))
            }
        }
    }
}

/// Extract an HTTP status code from an error message, looking for patterns
/// like "HTTP 404" or "status 422".
fn extract_http_status(error_str: &str) -> Option<u16> {
    let prefixes = ["HTTP ", "status ", "code: ", "status_code: "];

    for prefix in &prefixes {
        if let Some(pos) = error_str.find(prefix) {
            let after_prefix = &error_str[pos + prefix.len()..];
            if let Some(code_str) = after_prefix.get(0..3) {
                if let Ok(code) = code_str.parse::<u16>() {
                    if (100..=599).contains(&code) {
                        return Some(code);
                    }
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_http_status() {
        assert_eq!(extract_http_status("HTTP 404 Not Found"), Some(404));
        assert_eq!(extract_http_status("error: status 422 returned"), Some(422));
        assert_eq!(extract_http_status("connection refused"), None);
        // out-of-range numbers are not status codes
        assert_eq!(extract_http_status("HTTP 999"), None);
    }
}
