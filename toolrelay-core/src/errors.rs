//! Stable codes for every failure the relay can turn into a chat reply.
//!
//! Codes follow the pattern RELAY_E{code}
//! - RELAY_E001-E010: limiter and catalogue errors
//! - RELAY_E011-E020: gateway errors
//! - RELAY_E021-E030: payload decoding errors

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// RELAY_E001: too many messages in the current window
    RateLimited = 1,
    /// RELAY_E002: tool call inside the cooldown
    Throttled = 2,
    /// RELAY_E003: decision named a tool the catalogue does not have
    ToolNotAvailable = 3,
    /// RELAY_E011: no live broker connection
    ConnectionUnavailable = 11,
    /// RELAY_E012: invocation deadline elapsed
    Timeout = 12,
    /// RELAY_E013: submission or transport failure
    RemoteError = 13,
    /// RELAY_E021: decision payload could not be decoded
    MalformedDecision = 21,
    /// RELAY_E022: tool or destination payload could not be decoded
    MalformedCacheData = 22,
    /// RELAY_E023: the decision model could not be reached
    ModelUnavailable = 23,
}

impl ErrorCode {
    /// Get error code string (e.g., "RELAY_E001")
    pub fn code(&self) -> String {
        format!("RELAY_E{:03}", *self as u32)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RateLimited => "RateLimited",
            Self::Throttled => "Throttled",
            Self::ToolNotAvailable => "ToolNotAvailable",
            Self::ConnectionUnavailable => "ConnectionUnavailable",
            Self::Timeout => "Timeout",
            Self::RemoteError => "RemoteError",
            Self::MalformedDecision => "MalformedDecision",
            Self::MalformedCacheData => "MalformedCacheData",
            Self::ModelUnavailable => "ModelUnavailable",
        }
    }

    /// Short hint appended to failure replies.
    pub fn user_guidance(&self) -> &'static str {
        match self {
            Self::RateLimited => "Slow down a little; the limit resets shortly.",
            Self::Throttled => "Wait a moment before asking for another tool call.",
            Self::ToolNotAvailable => "Ask what tools are available or rephrase the request.",
            Self::ConnectionUnavailable => {
                "The tool service is offline. Try again once it reconnects."
            }
            Self::Timeout => "The tool took too long to answer. Try again later.",
            Self::RemoteError => "The tool service reported an error. Check its logs.",
            Self::MalformedDecision => "I could not understand my own plan. Try rephrasing.",
            Self::MalformedCacheData => "The tool service returned data in an unexpected shape.",
            Self::ModelUnavailable => "The language model could not be reached. Try again later.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_format() {
        assert_eq!(ErrorCode::RateLimited.code(), "RELAY_E001");
        assert_eq!(ErrorCode::ToolNotAvailable.code(), "RELAY_E003");
        assert_eq!(ErrorCode::Timeout.code(), "RELAY_E012");
        assert_eq!(ErrorCode::MalformedCacheData.code(), "RELAY_E022");
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::Throttled.to_string(), "RELAY_E002");
        assert_eq!(ErrorCode::ConnectionUnavailable.name(), "ConnectionUnavailable");
    }
}
