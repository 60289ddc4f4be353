//! Command entry point types.
//!
//! The runtime never parses player input. An external interpreter produces a
//! [`ParsedCommand`]; the world consumes the plain [`CommandRequest`] it
//! converts into and reports back a [`CommandOutcome`].

use realm_ecs::event::GameEvent;
use serde::{Deserialize, Serialize};

/// A command name plus positional arguments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Append one positional argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Output of an interpreter: the request plus how sure it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// In `[0, 1]`.
    pub confidence: f32,
    /// Free-form explanation of how the input was read.
    #[serde(default)]
    pub interpretation: String,
}

impl From<ParsedCommand> for CommandRequest {
    fn from(parsed: ParsedCommand) -> Self {
        Self {
            command: parsed.command,
            args: parsed.args,
        }
    }
}

/// Result of [`GameWorld::execute_command`](crate::world::GameWorld::execute_command).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
    /// Every event emitted while the command ran, nested emits included.
    pub events: Vec<GameEvent>,
}
