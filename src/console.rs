use anyhow::{Context, Result};
use std::io::Write as _;
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::debug;

use toolrelay_core::{ChatBridge, MessageContext};

const QUIT_COMMANDS: &[&str] = &["/quit", "/exit"];

/// Identity every console message is sent with.
#[derive(Debug, Clone)]
pub struct Speaker {
    pub user: String,
    pub destination: Option<String>,
}

impl Speaker {
    pub fn message(&self, text: impl Into<String>) -> MessageContext {
        let context = MessageContext::new(self.user.clone(), text);
        match &self.destination {
            Some(destination) => context.in_destination(destination.clone()),
            None => context,
        }
    }
}

/// Read one message per line until EOF, `/quit`, or Ctrl-C.
pub async fn run_chat(bridge: &ChatBridge, speaker: &Speaker) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read from stdin")?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if QUIT_COMMANDS.contains(&text) {
            break;
        }

        let reply = bridge.handle_message(&speaker.message(text)).await;
        println!("{reply}\n");
    }

    debug!("console session ended");
    Ok(())
}

pub async fn run_ask(bridge: &ChatBridge, speaker: &Speaker, text: &str) {
    let reply = bridge.handle_message(&speaker.message(text)).await;
    println!("{reply}");
}

fn prompt() -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "> ").context("failed to write prompt")?;
    stdout.flush().context("failed to flush stdout")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_attaches_destination_when_set() {
        let speaker = Speaker {
            user: "U1".to_string(),
            destination: Some("C1".to_string()),
        };
        let message = speaker.message("hello");
        assert_eq!(message.user, "U1");
        assert_eq!(message.text, "hello");
        assert_eq!(message.destination.as_deref(), Some("C1"));

        let anywhere = Speaker {
            destination: None,
            ..speaker
        };
        assert_eq!(anywhere.message("hi").destination, None);
    }
}
