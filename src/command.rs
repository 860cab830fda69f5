//! Command processor
//!
//! Parses `\verb args...` lines into `Command`s and runs them against the
//! registry. Runs on the dispatcher while it holds the registry lock.
//! Replies go to the issuer only; `\to` delivers to its target only.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::CommandError;
use crate::message::{CommandLine, ServerMessage};
use crate::registry::Registry;
use crate::session::Session;
use crate::types::SessionId;

/// Minimum length of a display name, in characters
pub const MIN_NAME_LEN: usize = 2;

/// Reply to `\help`
pub const HELP_TEXT: &str = "  [\\help]\t\tGet available command;\n\
                             \x20 [\\who]\t\tFind all online users;\n\
                             \x20 [\\rename new_name]\tRename;\n\
                             \x20 [\\to user info]\tPrivate chat user;\n\
                             \n";

/// A validated command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Who,
    Rename(String),
    To { target: String, text: String },
}

impl TryFrom<&CommandLine> for Command {
    type Error = CommandError;

    fn try_from(line: &CommandLine) -> Result<Self, Self::Error> {
        match line.verb.as_str() {
            "\\help" => {
                if !line.args.is_empty() {
                    return Err(CommandError::HelpUsage);
                }
                Ok(Command::Help)
            }
            "\\who" => {
                if !line.args.is_empty() {
                    return Err(CommandError::WhoUsage);
                }
                Ok(Command::Who)
            }
            "\\rename" => match line.args.as_slice() {
                [] => Err(CommandError::RenameUsage),
                [name] if name.chars().count() >= MIN_NAME_LEN => Ok(Command::Rename(name.clone())),
                _ => Err(CommandError::InvalidName),
            },
            "\\to" => {
                if line.args.len() < 2 {
                    return Err(CommandError::ToUsage);
                }
                Ok(Command::To {
                    target: line.args[0].clone(),
                    text: line.rest_after(1).to_string(),
                })
            }
            _ => Err(CommandError::Unknown),
        }
    }
}

/// A message bound for one session
#[derive(Debug)]
pub struct Delivery {
    pub to: Arc<Session>,
    pub message: ServerMessage,
}

/// Run a validated command for `issuer`
///
/// `Ok(None)` means success with nothing to send.
pub fn execute(
    issuer: SessionId,
    command: &Command,
    registry: &mut Registry,
) -> Result<Option<Delivery>, CommandError> {
    let issuer_name = registry
        .name_of(issuer)
        .map(str::to_string)
        .ok_or_else(|| CommandError::Offline(issuer.to_string()))?;

    match command {
        Command::Help => Ok(reply(registry, issuer, HELP_TEXT.to_string())),
        Command::Who => {
            let mut list = String::new();
            for name in registry.names() {
                list.push_str(&format!("[{}]\n", name));
            }
            list.push('\n');
            Ok(reply(registry, issuer, list))
        }
        Command::Rename(new_name) => {
            let old_name = registry.rename(issuer, new_name)?;
            info!("{} renamed to {}", old_name, new_name);
            Ok(None)
        }
        Command::To { target, text } => {
            if *target == issuer_name {
                return Err(CommandError::SelfTarget);
            }
            let Some(session) = registry.get(target) else {
                return Err(CommandError::Offline(target.clone()));
            };
            debug!("{} -> {}: private message", issuer_name, target);
            Ok(Some(Delivery {
                to: Arc::clone(session),
                message: ServerMessage::Private {
                    from: issuer_name,
                    text: text.clone(),
                },
            }))
        }
    }
}

/// Parse and run a command line, turning any rejection into a reply
pub fn do_command(issuer: SessionId, line: &CommandLine, registry: &mut Registry) -> Option<Delivery> {
    let result = Command::try_from(line).and_then(|command| execute(issuer, &command, registry));
    match result {
        Ok(delivery) => delivery,
        Err(err) => {
            debug!("Command {:?} from {} rejected: {:?}", line.raw, issuer, err);
            reply(registry, issuer, err.to_string())
        }
    }
}

fn reply(registry: &Registry, issuer: SessionId, text: String) -> Option<Delivery> {
    registry.session(issuer).map(|session| Delivery {
        to: Arc::clone(session),
        message: ServerMessage::Reply(text),
    })
}
