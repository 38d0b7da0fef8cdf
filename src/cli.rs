use clap::{Parser, Subcommand};

/// Relay chat messages to a tool broker, deciding per message whether to
/// answer directly or call a tool.
#[derive(Debug, Parser)]
#[command(name = "toolrelay", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file, or a `key=value` override such as
    /// `limits.tool_cooldown_ms=500`. Repeatable.
    #[arg(short = 'c', long = "config", value_name = "PATH|KEY=VALUE", global = true)]
    pub config: Vec<String>,

    /// User id the console session speaks as.
    #[arg(short, long, global = true, default_value = "console")]
    pub user: String,

    /// Destination id attached to every message, e.g. a channel id.
    #[arg(short, long, global = true)]
    pub destination: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Read messages from stdin, one per line (default)
    Chat,
    /// Handle a single message and print the reply
    Ask {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Print the tool catalogue after the initial refresh
    Tools,
    /// Print the destination list after the initial refresh
    Destinations,
}
