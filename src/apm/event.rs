use std::fmt::{Display, Error, Formatter};
use std::time::Duration;

use bson::{Bson, Document};

use crate::connstring::Host;
use crate::error::Error as MongoError;

// Field order follows the document; serde_json is built with `preserve_order`.
fn relaxed_json(document: &Document) -> serde_json::Value {
    Bson::Document(document.clone()).into_relaxed_extjson()
}

pub struct CommandStarted {
    pub command: Document,
    pub database_name: String,
    pub command_name: String,
    pub request_id: i32,
    pub connection_id: u32,
    pub host: Host,
}

impl Display for CommandStarted {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
        let json = relaxed_json(&self.command);
        write!(fmt, "COMMAND.{} {} STARTED: {}", self.command_name, self.host, json)
    }
}

pub enum CommandResult<'a> {
    Success {
        duration: Duration,
        /// `None` for unacknowledged commands.
        reply: Option<&'a Document>,
        command_name: String,
        request_id: i32,
        host: Host,
    },
    Failure {
        duration: Duration,
        command_name: String,
        failure: &'a MongoError,
        request_id: i32,
        host: Host,
    },
}

impl<'a> CommandResult<'a> {
    pub fn command_name(&self) -> &str {
        match *self {
            CommandResult::Success { ref command_name, .. }
            | CommandResult::Failure { ref command_name, .. } => command_name,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(*self, CommandResult::Success { .. })
    }
}

impl<'a> Display for CommandResult<'a> {
    fn fmt(&self, fmt: &mut Formatter) -> Result<(), Error> {
        match *self {
            CommandResult::Success { duration, reply, ref command_name, ref host, .. } => {
                match reply {
                    Some(reply) => write!(
                        fmt,
                        "COMMAND.{} {} COMPLETED: {} ({:?})",
                        command_name,
                        host,
                        relaxed_json(reply),
                        duration
                    ),
                    None => write!(fmt, "COMMAND.{} {} SENT ({:?})", command_name, host, duration),
                }
            }
            CommandResult::Failure { duration, ref command_name, failure, ref host, .. } => write!(
                fmt,
                "COMMAND.{} {} FAILURE: {} ({:?})",
                command_name, host, failure, duration
            ),
        }
    }
}
