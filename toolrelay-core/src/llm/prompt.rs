use crate::decision::DecisionPrompt;

/// System prompt listing the cached tools and destinations and the reply
/// format the decision must follow.
pub fn decision_system_prompt(prompt: &DecisionPrompt) -> String {
    let mut out = String::from(
        "You route chat requests. Reply with exactly one JSON object and nothing else.\n\
         To call a tool: {\"tool\": \"<name>\", \"input\": {<arguments>}}\n\
         To answer directly: {\"answer\": \"<text>\"}\n\
         Only use tools and destination ids listed below.\n",
    );

    out.push_str("\nTools:\n");
    if prompt.tools.is_empty() {
        out.push_str("(none available)\n");
    }
    for tool in prompt.tools.values() {
        out.push_str(&format!("- {}", tool.name));
        if let Some(description) = tool.description.as_deref().filter(|d| !d.is_empty()) {
            out.push_str(&format!(": {description}"));
        }
        if !tool.input_properties.is_empty() {
            out.push_str(&format!(" (input: {})", tool.input_properties.join(", ")));
        }
        out.push('\n');
    }

    out.push_str("\nDestinations:\n");
    if prompt.destinations.is_empty() {
        out.push_str("(none known)\n");
    }
    for destination in prompt.destinations.values() {
        match &destination.name {
            Some(name) => out.push_str(&format!("- {} ({name})\n", destination.id)),
            None => out.push_str(&format!("- {}\n", destination.id)),
        }
    }

    if let Some(current) = &prompt.destination {
        out.push_str(&format!("\nThe message was posted in destination {current}.\n"));
    }
    out
}

pub fn summary_system_prompt() -> &'static str {
    "Summarize the tool output below so it answers the user's request. \
     Be concise and keep concrete names, numbers and ids."
}

pub fn summary_user_prompt(request: &str, raw: &str) -> String {
    format!("Request:\n{request}\n\nTool output:\n{raw}")
}
