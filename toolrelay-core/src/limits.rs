//! Per-user message-rate and tool-cooldown limits.
//!
//! Two independent checks share one record per user:
//! - message rate: fixed window, counting every observed message
//! - tool cooldown: minimum spacing between allowed tool calls
//!
//! State lives only in memory and is dropped with the limiter.

use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

use parking_lot::Mutex;
use toolrelay_config::LimitsConfig;

use crate::errors::ErrorCode;

/// Limiter denials. The display text is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    #[error(
        "You're sending messages too quickly (max {max} per {window_secs}s). Please wait a moment."
    )]
    RateLimited { max: u32, window_secs: u64 },
    #[error("Please wait {retry_after_secs}s before using another tool.")]
    Throttled {
        retry_after: Duration,
        retry_after_secs: u64,
    },
}

impl LimitError {
    fn throttled(retry_after: Duration) -> Self {
        Self::Throttled {
            retry_after,
            retry_after_secs: ceil_secs(retry_after),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RateLimited { .. } => ErrorCode::RateLimited,
            Self::Throttled { .. } => ErrorCode::Throttled,
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis().div_ceil(1_000)).unwrap_or(u64::MAX)
}

/// Limits applied by [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub tool_cooldown: Duration,
    pub message_window: Duration,
    pub max_messages_per_window: u32,
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for LimitPolicy {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            tool_cooldown: config.tool_cooldown(),
            message_window: config.message_window(),
            max_messages_per_window: config.max_messages_per_window,
        }
    }
}

/// Per-user limiter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserLimitState {
    /// Time of the last *allowed* tool call.
    pub last_tool_call_at: Option<Instant>,
    pub window_start: Instant,
    pub message_count_in_window: u32,
}

/// In-memory per-user limiter.
///
/// Every check reads and mutates its user's record under one lock, so two
/// checks for the same user never interleave.
#[derive(Debug)]
pub struct RateLimiter {
    policy: LimitPolicy,
    users: Mutex<FxHashMap<String, UserLimitState>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(LimitPolicy::default())
    }
}

impl RateLimiter {
    pub fn new(policy: LimitPolicy) -> Self {
        Self {
            policy,
            users: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn policy(&self) -> LimitPolicy {
        self.policy
    }

    /// Count a message from `user` against the current window.
    pub fn check_message_rate(&self, user: &str) -> Result<(), LimitError> {
        self.check_message_rate_at(user, Instant::now())
    }

    /// [`Self::check_message_rate`] against an explicit clock reading.
    pub fn check_message_rate_at(&self, user: &str, now: Instant) -> Result<(), LimitError> {
        let mut users = self.users.lock();
        let state = match users.entry(user.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(UserLimitState {
                    last_tool_call_at: None,
                    window_start: now,
                    message_count_in_window: 1,
                });
                return Ok(());
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if now.saturating_duration_since(state.window_start) > self.policy.message_window {
            state.window_start = now;
            state.message_count_in_window = 1;
            return Ok(());
        }

        state.message_count_in_window = state.message_count_in_window.saturating_add(1);
        if state.message_count_in_window > self.policy.max_messages_per_window {
            info!(
                user,
                count = state.message_count_in_window,
                max = self.policy.max_messages_per_window,
                "message rate exceeded"
            );
            return Err(LimitError::RateLimited {
                max: self.policy.max_messages_per_window,
                window_secs: self.policy.message_window.as_secs(),
            });
        }

        Ok(())
    }

    /// Gate a tool call from `user` on the cooldown.
    ///
    /// A user's first tool call is always allowed. A denied call leaves the
    /// last-call timestamp untouched.
    pub fn check_tool_cooldown(&self, user: &str) -> Result<(), LimitError> {
        self.check_tool_cooldown_at(user, Instant::now())
    }

    /// [`Self::check_tool_cooldown`] against an explicit clock reading.
    pub fn check_tool_cooldown_at(&self, user: &str, now: Instant) -> Result<(), LimitError> {
        let mut users = self.users.lock();
        let state = match users.entry(user.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(UserLimitState {
                    last_tool_call_at: Some(now),
                    window_start: now,
                    message_count_in_window: 0,
                });
                return Ok(());
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        if let Some(last) = state.last_tool_call_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.policy.tool_cooldown {
                let error = LimitError::throttled(self.policy.tool_cooldown - elapsed);
                info!(user, %error, "tool call throttled");
                return Err(error);
            }
        }

        state.last_tool_call_at = Some(now);
        Ok(())
    }

    /// Copy of `user`'s record, if one exists.
    pub fn snapshot(&self, user: &str) -> Option<UserLimitState> {
        self.users.lock().get(user).copied()
    }

    pub fn tracked_users(&self) -> usize {
        self.users.lock().len()
    }
}
