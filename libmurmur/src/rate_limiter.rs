//! Sliding-window rate limiting for forward requests.
//!
//! Two limit families are evaluated on every request: per-sender limits
//! and per-(sender, recipient)-pair limits. Every configured limit is hit
//! on every call, even after one already failed, so probing traffic cannot
//! dodge accounting by watching which check rejects first.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use chrono::Utc;

use crate::config::RateLimitConfig;
use crate::error::ConfigError;

/// One parsed limit expression, e.g. `50/day`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    pub count: usize,
    pub period_secs: i64,
}

impl FromStr for Limit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (count, unit) = s
            .split_once('/')
            .ok_or_else(|| ConfigError::InvalidValue(format!("rate limit '{}'", s)))?;
        let count: usize = count
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("rate limit count in '{}'", s)))?;
        let period_secs = match unit.trim().to_lowercase().as_str() {
            "second" | "seconds" => 1,
            "minute" | "minutes" => 60,
            "hour" | "hours" => 3600,
            "day" | "days" => 86400,
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "rate limit period '{}' (expected second, minute, hour or day)",
                    other
                )))
            }
        };
        Ok(Limit { count, period_secs })
    }
}

/// Parse a `;`-separated list of limit expressions.
pub fn parse_many(expr: &str) -> Result<Vec<Limit>, ConfigError> {
    expr.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Limit::from_str)
        .collect()
}

/// In-memory moving-window rate limiter.
///
/// The window table is the only shared mutable state in the agent; it is
/// guarded by a mutex so `allow` stays race-free if ever called from more
/// than one task.
pub struct RateLimiter {
    user_limits: Vec<Limit>,
    pair_limits: Vec<Limit>,
    exempted: HashSet<String>,
    hits: Mutex<HashMap<String, VecDeque<i64>>>,
    max_period: i64,
}

impl RateLimiter {
    pub fn new(
        user_limits: Vec<Limit>,
        pair_limits: Vec<Limit>,
        exempted: impl IntoIterator<Item = String>,
    ) -> Self {
        let max_period = user_limits
            .iter()
            .chain(pair_limits.iter())
            .map(|l| l.period_secs)
            .max()
            .unwrap_or(0);
        Self {
            user_limits,
            pair_limits,
            exempted: exempted.into_iter().map(|u| u.to_lowercase()).collect(),
            hits: Mutex::new(HashMap::new()),
            max_period,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            parse_many(&config.user_rate)?,
            parse_many(&config.pair_rate)?,
            config.exempted_users.iter().cloned(),
        ))
    }

    /// Check and charge all configured limits for this sender/recipient.
    pub fn allow(&self, sender: &str, recipient: Option<&str>) -> bool {
        self.allow_at(sender, recipient, Utc::now().timestamp())
    }

    /// Same as [`allow`](Self::allow) with an explicit clock, so tests can
    /// move time.
    pub fn allow_at(&self, sender: &str, recipient: Option<&str>, now: i64) -> bool {
        let sender_key = sender.to_lowercase();
        if self.exempted.contains(&sender_key) {
            return true;
        }
        let pair_key = pair_key(&sender_key, recipient);

        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        let mut allowed = true;
        for limit in &self.user_limits {
            // `&=` so every limit records its hit even after a failure
            allowed &= hit(&mut hits, *limit, &sender_key, now);
        }
        for limit in &self.pair_limits {
            allowed &= hit(&mut hits, *limit, &pair_key, now);
        }
        let horizon = now - self.max_period;
        hits.retain(|_, window| window.back().is_some_and(|t| *t > horizon));
        allowed
    }

    /// Hits currently recorded in the first pair window for this couple.
    pub fn pair_hits(&self, sender: &str, recipient: Option<&str>, now: i64) -> usize {
        let Some(limit) = self.pair_limits.first() else {
            return 0;
        };
        let key = storage_key(*limit, &pair_key(&sender.to_lowercase(), recipient));
        let hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.get(&key)
            .map(|window| {
                window
                    .iter()
                    .filter(|t| **t > now - limit.period_secs)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Record a hit against one limit's window. Denied hits are not recorded,
/// so a blocked sender does not keep extending their own window.
fn hit(hits: &mut HashMap<String, VecDeque<i64>>, limit: Limit, key: &str, now: i64) -> bool {
    let window = hits.entry(storage_key(limit, key)).or_default();
    while window
        .front()
        .is_some_and(|t| *t <= now - limit.period_secs)
    {
        window.pop_front();
    }
    if window.len() < limit.count {
        window.push_back(now);
        true
    } else {
        false
    }
}

fn pair_key(sender_lower: &str, recipient: Option<&str>) -> String {
    format!("{}|{}", sender_lower, recipient.unwrap_or("*").to_lowercase())
}

fn storage_key(limit: Limit, key: &str) -> String {
    format!("{}/{}:{}", limit.count, limit.period_secs, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(user: &str, pair: &str, exempted: &[&str]) -> RateLimiter {
        RateLimiter::new(
            parse_many(user).unwrap(),
            parse_many(pair).unwrap(),
            exempted.iter().map(|s| s.to_string()),
        )
    }

    #[test]
    fn test_parse_limit_expressions() {
        assert_eq!(
            "50/day".parse::<Limit>().unwrap(),
            Limit {
                count: 50,
                period_secs: 86400
            }
        );
        assert_eq!(
            "10/hour".parse::<Limit>().unwrap(),
            Limit {
                count: 10,
                period_secs: 3600
            }
        );
        assert_eq!(
            parse_many("50/day;10/hour").unwrap(),
            vec![
                Limit {
                    count: 50,
                    period_secs: 86400
                },
                Limit {
                    count: 10,
                    period_secs: 3600
                }
            ]
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("fifty/day".parse::<Limit>().is_err());
        assert!("50/fortnight".parse::<Limit>().is_err());
        assert!("50".parse::<Limit>().is_err());
    }

    #[test]
    fn test_allows_first_request() {
        let limiter = limiter("50/day", "10/hour", &[]);
        assert!(limiter.allow_at("alice", Some("bob"), 1_000_000));
    }

    #[test]
    fn test_blocks_over_pair_limit() {
        let limiter = limiter("50/day", "3/hour", &[]);
        let now = 1_000_000;
        for _ in 0..3 {
            assert!(limiter.allow_at("alice", Some("bob"), now));
        }
        assert!(!limiter.allow_at("alice", Some("bob"), now));
        // another recipient has its own window
        assert!(limiter.allow_at("alice", Some("carol"), now));
    }

    #[test]
    fn test_window_slides() {
        let limiter = limiter("50/day", "2/hour", &[]);
        let now = 1_000_000;
        assert!(limiter.allow_at("alice", Some("bob"), now));
        assert!(limiter.allow_at("alice", Some("bob"), now + 100));
        assert!(!limiter.allow_at("alice", Some("bob"), now + 200));
        // after the first hit expires there is room again
        assert!(limiter.allow_at("alice", Some("bob"), now + 3601));
    }

    #[test]
    fn test_exempted_users_always_pass() {
        let limiter = limiter("1/day", "1/hour", &["Trusted"]);
        let now = 1_000_000;
        for i in 0..20 {
            assert!(limiter.allow_at("trusted", Some("bob"), now + i));
            assert!(limiter.allow_at("TRUSTED", Some("bob"), now + i));
        }
        // exempted requests are not even recorded
        assert_eq!(limiter.pair_hits("trusted", Some("bob"), now + 30), 0);
    }

    #[test]
    fn test_sender_matching_is_case_insensitive() {
        let limiter = limiter("50/day", "1/hour", &[]);
        let now = 1_000_000;
        assert!(limiter.allow_at("Alice", Some("Bob"), now));
        assert!(!limiter.allow_at("alice", Some("bob"), now));
    }

    #[test]
    fn test_missing_recipient_uses_wildcard_bucket() {
        let limiter = limiter("50/day", "1/hour", &[]);
        let now = 1_000_000;
        assert!(limiter.allow_at("alice", None, now));
        assert!(!limiter.allow_at("alice", None, now));
        assert_eq!(limiter.pair_hits("alice", None, now), 1);
    }

    #[test]
    fn test_all_limits_recorded_even_after_failure() {
        // user limit exhausts first; the pair window must still be charged
        let limiter = limiter("1/day", "5/hour", &[]);
        let now = 1_000_000;
        assert!(limiter.allow_at("alice", Some("bob"), now));
        assert!(!limiter.allow_at("alice", Some("bob"), now + 1));
        assert_eq!(limiter.pair_hits("alice", Some("bob"), now + 2), 2);
    }

    #[test]
    fn test_denied_hits_do_not_extend_window() {
        let limiter = limiter("50/day", "1/hour", &[]);
        let now = 1_000_000;
        assert!(limiter.allow_at("alice", Some("bob"), now));
        for i in 1..10 {
            assert!(!limiter.allow_at("alice", Some("bob"), now + i));
        }
        // only the accepted hit counts against the window
        assert_eq!(limiter.pair_hits("alice", Some("bob"), now + 10), 1);
    }

    #[test]
    fn test_stale_keys_are_expired() {
        let limiter = limiter("50/day", "10/hour", &[]);
        let now = 1_000_000;
        assert!(limiter.allow_at("alice", Some("bob"), now));
        // a hit far in the future sweeps the old entries away
        assert!(limiter.allow_at("carol", Some("dan"), now + 200_000));
        assert_eq!(limiter.pair_hits("alice", Some("bob"), now + 200_000), 0);
    }

    #[test]
    fn test_from_config_uses_defaults() {
        let config = RateLimitConfig::default();
        let limiter = RateLimiter::from_config(&config).unwrap();
        assert!(limiter.allow_at("alice", Some("bob"), 0));
    }

    #[test]
    fn test_from_config_rejects_bad_expression() {
        let config = RateLimitConfig {
            user_rate: "many/day".to_string(),
            ..Default::default()
        };
        assert!(RateLimiter::from_config(&config).is_err());
    }
}
