use serde_json::Value;

/// Text carried by a tool result, if it has any.
///
/// Accepts a bare string, an MCP-style `{"content": [{"type": "text", "text": ...}]}`
/// (text parts joined by newlines), or an object with a `text` field.
pub fn payload_text(payload: &Value) -> Option<String> {
    match payload {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => {
            if let Some(parts) = map.get("content").and_then(Value::as_array) {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(Value::as_str))
                    .collect();
                if !texts.is_empty() {
                    return Some(texts.join("\n"));
                }
            }
            map.get("text").and_then(Value::as_str).map(str::to_string)
        }
        _ => None,
    }
}

/// Render a tool result as a chat reply.
///
/// Text that parses as a JSON object or array is pretty-printed in a fenced
/// block; other text is returned as-is. Structured payloads without text are
/// pretty-printed directly.
pub fn format_tool_result(payload: &Value) -> String {
    if payload.is_null() {
        return "(no result)".to_string();
    }

    match payload_text(payload) {
        Some(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => fenced_json(&parsed),
            _ => text,
        },
        None => fenced_json(payload),
    }
}

fn fenced_json(value: &Value) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    format!("```json\n{pretty}\n```")
}
