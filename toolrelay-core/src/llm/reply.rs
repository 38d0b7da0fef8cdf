use serde_json::Value;

use crate::decision::{Decision, DecisionError};

/// First balanced `{...}` block in `text`, skipping braces inside JSON
/// strings. Models often wrap the object in prose or a code fence.
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let tail = text.get(start..)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in tail.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return tail.get(..=offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode a model reply into a [`Decision`].
pub fn parse_decision(reply: &str) -> Result<Decision, DecisionError> {
    let object = first_json_object(reply).ok_or_else(|| {
        DecisionError::Malformed(format!("no JSON object in reply: {}", reply.trim()))
    })?;
    let value: Value = serde_json::from_str(object)
        .map_err(|e| DecisionError::Malformed(format!("invalid decision JSON: {e}")))?;
    Decision::from_value(value)
}
