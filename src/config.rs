/// Configuration management for the chat relay server.
/// Handles command-line argument parsing and config structure.
use clap::Parser;
use std::path::PathBuf;

use crate::typing::DEFAULT_TYPING_TIMEOUT;

#[derive(Parser, Debug)]
#[command(name = "Chat Relay Server")]
#[command(about = "Real-time chat relay server", long_about = None)]
pub struct Config {
    /// Server port (default: 4000)
    #[arg(long, default_value = "4000")]
    pub port: u16,

    /// SQLite database file path (default: chatrelay.db)
    #[arg(long, default_value = "chatrelay.db")]
    pub database: PathBuf,

    /// PID file path (optional) - write server PID to this file on startup
    #[arg(long)]
    pub pidfile: Option<PathBuf>,

    /// Typing indicator inactivity timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TYPING_TIMEOUT.as_millis() as u64)]
    pub typing_timeout_ms: u64,
}

impl Config {
    /// Parse command-line arguments into Config
    pub fn from_args() -> Self {
        Config::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config {
            port: 4000,
            database: PathBuf::from("chatrelay.db"),
            pidfile: None,
            typing_timeout_ms: 1000,
        };
        assert_eq!(config.port, 4000);
        assert_eq!(config.database.to_str().unwrap(), "chatrelay.db");
        assert_eq!(config.typing_timeout_ms, 1000);
    }

    #[test]
    fn test_custom_port() {
        let config = Config {
            port: 8080,
            database: PathBuf::from("chatrelay.db"),
            pidfile: None,
            typing_timeout_ms: 1000,
        };
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_parse_typing_timeout() {
        let config =
            Config::try_parse_from(["chat-relay-server", "--typing-timeout-ms", "250"])
                .expect("parse failed");
        assert_eq!(config.typing_timeout_ms, 250);
        assert_eq!(config.port, 4000);
    }
}
