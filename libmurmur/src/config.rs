//! Configuration management for Murmur
//!
//! Options come from an optional TOML file, then from `MURMUR_*`
//! environment variables which override the file. Every option has a
//! usable default except the access token and the server URL.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::rate_limiter;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub access_token: String,
    /// Server base URL, without a trailing slash.
    pub server_url: String,
    pub streaming_path: String,
    /// When set, POST-class API calls are logged and suppressed.
    pub dry_run: bool,
    /// Marker prefixing the recipient handle inside a message. Only the
    /// first character is used.
    pub mention_placeholder: String,
    /// Handle shown in the usage examples sent back to senders.
    pub example_username: String,
    pub rate_limits: RateLimitConfig,
    pub report: ReportConfig,
    pub messages: MessagesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// `;`-separated limits applied per sender, e.g. `50/day`.
    pub user_rate: String,
    /// `;`-separated limits applied per (sender, recipient) pair.
    pub pair_rate: String,
    /// Handles never rate limited, case-insensitive.
    pub exempted_users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Hashtags that turn a reply to a forwarded message into a report.
    pub hashtags: Vec<String>,
    /// Moderator handles alerted on each report, without the leading `@`.
    pub moderators: Vec<String>,
}

/// User-facing message templates.
///
/// Templates use `{placeholder}` interpolation. `{forward_instructions}`
/// and `{example_message}` expand to other templates before the scalar
/// placeholders are filled in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub example_message: String,
    pub follow: String,
    pub forward: String,
    pub default_content_warning: String,
    pub forward_instructions: String,
    pub invalid_account: String,
    pub invalid_message: String,
    pub success_forward: String,
    pub report_mod: String,
    pub report_confirmation: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            server_url: String::new(),
            streaming_path: "/api/v1/streaming".to_string(),
            dry_run: false,
            mention_placeholder: "?".to_string(),
            example_username: "user@mastodon.test".to_string(),
            rate_limits: RateLimitConfig::default(),
            report: ReportConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            user_rate: "50/day".to_string(),
            pair_rate: "10/hour".to_string(),
            exempted_users: Vec::new(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            hashtags: vec!["report".to_string()],
            moderators: Vec::new(),
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            example_message: "@{bot_account} this is a question for ?{recipient}:\n\
                \n\
                How old are you?"
                .to_string(),
            follow: "Welcome to Murmur!\n\
                \n\
                Now that you follow me, I can forward you anonymous questions and messages. \
                Whenever someone writes me a direct message like the one below, you will be notified.\n\
                \n\
                ---\n\
                {example_message}\n\
                ---\n\
                \n\
                Give it a try yourself if you want to see how it works!\n\
                \n\
                If you want to stop receiving anonymous messages, unfollow this account. \
                Check out my bio/pinned posts for more info."
                .to_string(),
            forward: "{message}\n\
                \n\
                ---\n\
                \n\
                If you want to report this message, reply to it with one of the following \
                hashtags: {report_hashtags}.\n\
                \n\
                If you don't want to receive anonymous messages in the future, please \
                unfollow this account."
                .to_string(),
            default_content_warning: "You received a Murmur message".to_string(),
            forward_instructions: "To send an anonymous message to someone, please use \
                the following format:\n\
                \n\
                ---\n\
                {example_message}\n\
                ---\n\
                \n\
                The important parts are:\n\
                \n\
                1. The question mark at the beginning of the recipient username (instead of an @)\n\
                2. A line break before your question"
                .to_string(),
            invalid_account: "The account '{account}' does not exist. {forward_instructions}"
                .to_string(),
            invalid_message: "Your message is invalid. {forward_instructions}".to_string(),
            success_forward: "Received! I will forward your message to '{recipient}' \
                immediately if they enabled anonymous messages."
                .to_string(),
            report_mod: "{sender} reported the following message: {reported_message_url}\n\
                \n\
                It was sent anonymously by {anonymous_sender} ({anonymous_sender_url})."
                .to_string(),
            report_confirmation: "Your report has been forwarded to the moderators \
                ({mods}). They will review it as soon as possible."
                .to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, apply environment
    /// overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        let mut config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Override every option that has a matching `MURMUR_*` variable set.
    pub fn apply_env(&mut self) {
        let mut set = |name: &str, target: &mut String| {
            if let Ok(value) = std::env::var(name) {
                *target = value;
            }
        };
        set("MURMUR_ACCESS_TOKEN", &mut self.access_token);
        set("MURMUR_SERVER_URL", &mut self.server_url);
        set("MURMUR_STREAMING_PATH", &mut self.streaming_path);
        set("MURMUR_MENTION_PLACEHOLDER", &mut self.mention_placeholder);
        set("MURMUR_EXAMPLE_USERNAME", &mut self.example_username);
        set("MURMUR_USER_RATE", &mut self.rate_limits.user_rate);
        set("MURMUR_PAIR_RATE", &mut self.rate_limits.pair_rate);
        set("MURMUR_EXAMPLE_MESSAGE", &mut self.messages.example_message);
        set("MURMUR_FOLLOW_MESSAGE", &mut self.messages.follow);
        set("MURMUR_FORWARD_MESSAGE", &mut self.messages.forward);
        set(
            "MURMUR_DEFAULT_CONTENT_WARNING",
            &mut self.messages.default_content_warning,
        );
        set(
            "MURMUR_FORWARD_INSTRUCTIONS",
            &mut self.messages.forward_instructions,
        );
        set(
            "MURMUR_ERROR_INVALID_ACCOUNT",
            &mut self.messages.invalid_account,
        );
        set(
            "MURMUR_ERROR_INVALID_MESSAGE",
            &mut self.messages.invalid_message,
        );
        set("MURMUR_SUCCESS_FORWARD", &mut self.messages.success_forward);
        set("MURMUR_REPORT_MOD_MESSAGE", &mut self.messages.report_mod);
        set(
            "MURMUR_REPORT_CONFIRMATION",
            &mut self.messages.report_confirmation,
        );

        if let Ok(value) = std::env::var("MURMUR_EXEMPTED_USERS") {
            self.rate_limits.exempted_users = split_list(&value);
        }
        if let Ok(value) = std::env::var("MURMUR_MODERATORS") {
            self.report.moderators = split_list(&value);
        }
        if let Ok(value) = std::env::var("MURMUR_REPORT_HASHTAGS") {
            self.report.hashtags = split_list(&value);
        }
        if let Ok(value) = std::env::var("MURMUR_DRY_RUN") {
            self.dry_run = !value.is_empty();
        }
    }

    /// Check required settings and normalize the server URL.
    pub fn validate(&mut self) -> Result<()> {
        if self.access_token.is_empty() {
            return Err(ConfigError::MissingField("access_token".to_string()).into());
        }
        if self.server_url.is_empty() {
            return Err(ConfigError::MissingField("server_url".to_string()).into());
        }
        while self.server_url.ends_with('/') {
            self.server_url.pop();
        }
        rate_limiter::parse_many(&self.rate_limits.user_rate)?;
        rate_limiter::parse_many(&self.rate_limits.pair_rate)?;
        Ok(())
    }

    /// Recipient marker character, the first char of `mention_placeholder`.
    pub fn marker(&self) -> char {
        self.mention_placeholder.chars().next().unwrap_or('?')
    }

    /// Report hashtags as shown to recipients, backslash-escaped so the
    /// forwarded post does not create the tags itself.
    pub fn escaped_report_hashtags(&self) -> String {
        self.report
            .hashtags
            .iter()
            .map(|t| format!("#\\{}", t))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn render_invalid_account(&self, account: &str, bot_account: &str) -> String {
        fill(
            &self.expand(&self.messages.invalid_account),
            &[
                ("account", account),
                ("bot_account", bot_account),
                ("recipient", &self.example_username),
            ],
        )
    }

    pub fn render_invalid_message(&self, bot_account: &str) -> String {
        fill(
            &self.expand(&self.messages.invalid_message),
            &[
                ("bot_account", bot_account),
                ("recipient", &self.example_username),
            ],
        )
    }

    pub fn render_success_forward(&self, recipient: &str) -> String {
        fill(&self.messages.success_forward, &[("recipient", recipient)])
    }

    pub fn render_follow(&self, recipient: &str, bot_account: &str) -> String {
        fill(
            &self.expand(&self.messages.follow),
            &[("recipient", recipient), ("bot_account", bot_account)],
        )
    }

    pub fn render_forward(&self, message: &str) -> String {
        fill(
            &self.messages.forward,
            &[
                ("message", message),
                ("report_hashtags", &self.escaped_report_hashtags()),
            ],
        )
    }

    pub fn render_report_mod(
        &self,
        sender: &str,
        reported_message_url: &str,
        anonymous_sender: &str,
        anonymous_sender_url: &str,
    ) -> String {
        fill(
            &self.messages.report_mod,
            &[
                ("sender", sender),
                ("reported_message_url", reported_message_url),
                ("anonymous_sender", anonymous_sender),
                ("anonymous_sender_url", anonymous_sender_url),
            ],
        )
    }

    pub fn render_report_confirmation(&self) -> String {
        fill(
            &self.messages.report_confirmation,
            &[("mods", &self.report.moderators.join(", "))],
        )
    }

    /// Expand nested template placeholders before scalar interpolation.
    fn expand(&self, template: &str) -> String {
        let expanded = template.replace(
            "{forward_instructions}",
            &self.messages.forward_instructions,
        );
        expanded.replace("{example_message}", &self.messages.example_message)
    }
}

fn fill(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in pairs {
        out = out.replace(&format!("{{{}}}", key), value);
    }
    out
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("MURMUR_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("murmur").join("config.toml"))
}
