use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::protocol::Protocol;
use crate::id::Id;
use crate::net::Host;
use crate::store::{Store, StoreError};

pub const HELP: &str = "Available commands:
  help              - Show this message.
  exit              - Shutdown application.
  get <key>         - Perform key lookup.
  join <host>       - Connect to another host in the same network.
  set <key> <value> - Store key/value pair.
  -------
  Enclose any command parameter with quotes (\") if needing to use spaces.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Exit,
    Get { key: String },
    Join { host: String },
    Set { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Unknown command: {0}")]
    Unknown(String),
}

impl Command {
    /// Parses one console line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let args = split(line);
        let Some((name, rest)) = args.split_first() else {
            return Ok(None);
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "help" => match rest {
                [] => Command::Help,
                _ => return Err(CommandError::Usage("help")),
            },
            "exit" => match rest {
                [] => Command::Exit,
                _ => return Err(CommandError::Usage("exit")),
            },
            "get" => match rest {
                [key] => Command::Get { key: key.clone() },
                _ => return Err(CommandError::Usage("get <key>")),
            },
            "join" => match rest {
                [host] => Command::Join { host: host.clone() },
                _ => return Err(CommandError::Usage("join \"<host>\"")),
            },
            "set" => match rest {
                [key, value] => Command::Set {
                    key: key.clone(),
                    value: value.clone(),
                },
                _ => return Err(CommandError::Usage("set <key> <value>")),
            },
            _ => return Err(CommandError::Unknown(name.clone())),
        };
        Ok(Some(command))
    }
}

/// Splits on whitespace. An argument opened with `"` runs to the next `"`,
/// or to the end of the line if none follows.
fn split(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        let (arg, tail) = match rest.strip_prefix('"') {
            Some(quoted) => match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            },
            None => match rest.find(char::is_whitespace) {
                Some(end) => (&rest[..end], &rest[end..]),
                None => (rest, ""),
            },
        };
        args.push(arg.to_string());
        rest = tail.trim_start();
    }
    args
}

/// Executes console commands against a running protocol handler.
pub struct Console<S> {
    protocol: Arc<Protocol<S>>,
}

impl<S: Store> Console<S> {
    pub fn new(protocol: Arc<Protocol<S>>) -> Self {
        Self { protocol }
    }

    /// Parses and executes one line. Returns `false` once the user asked to
    /// exit.
    pub fn handle_line(&self, line: &str) -> bool {
        match Command::parse(line) {
            Ok(Some(command)) => self.execute(command),
            Ok(None) => true,
            Err(e) => {
                warn!("{}", e);
                true
            }
        }
    }

    pub fn execute(&self, command: Command) -> bool {
        match command {
            Command::Help => info!("{}", HELP),
            Command::Exit => return false,
            Command::Get { key } => match self.protocol.store().get(&Id::hash(&key)) {
                Ok(value) => info!("{} = {}", key, String::from_utf8_lossy(&value)),
                Err(StoreError::NotFound) => info!("{} not found", key),
                Err(e) => warn!("Failed to get {}: {}", key, e),
            },
            Command::Set { key, value } => {
                match self.protocol.store().set(&Id::hash(&key), value.as_bytes()) {
                    Ok(()) => info!("Stored {}", key),
                    Err(e) => warn!("Failed to set {}: {}", key, e),
                }
            }
            Command::Join { host } => match host.parse::<Host>() {
                Ok(peer) => {
                    if let Err(e) = self.protocol.join(&peer) {
                        warn!("Failed to join {}: {}", peer, e);
                    }
                }
                Err(e) => {
                    warn!("Invalid peer address; {}.", e);
                    info!("Example: IPv4/TCP 127.0.0.1:19002");
                }
            },
        }
        true
    }
}
