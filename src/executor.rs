//! Runs commands against servers under a shared timeout.
use std::sync::Arc;
use std::time::{Duration, Instant};

use bson::{Bson, Document};
use tracing::debug;

use crate::apm::{CommandResult, CommandStarted, Listener};
use crate::command_type::{Aspect, CommandType};
use crate::connection::reply_ok;
use crate::error::{Error, ErrorCode, Result};
use crate::timeout::TimeoutContext;
use crate::topology::{Server, Topology};
use crate::wire_protocol::Message;

/// A command ready to be sent, minus the fields the executor attaches (`$db` and `maxTimeMS`).
#[derive(Clone, Debug)]
pub struct Command {
    pub name: CommandType,
    pub target_db: String,
    pub body: Document,
    pub aspects: Aspect,
    /// Unacknowledged commands are sent with `moreToCome` and produce no reply.
    pub acknowledged: bool,
}

impl Command {
    pub fn new<T: Into<String>>(name: CommandType, target_db: T, body: Document) -> Command {
        Command {
            name,
            target_db: target_db.into(),
            body,
            aspects: Aspect::for_command(name),
            acknowledged: true,
        }
    }

    pub fn with_aspects(mut self, aspects: Aspect) -> Command {
        self.aspects = aspects;
        self
    }

    pub fn unacknowledged(mut self) -> Command {
        self.acknowledged = false;
        self
    }

    // The document that goes on the wire for one attempt.
    fn build(&self, ctx: &TimeoutContext) -> Document {
        let mut body = self.body.clone();

        if !self.aspects.contains(Aspect::OMIT_MAX_TIME) {
            if let Some(max_time_ms) = ctx.max_time_ms(None) {
                body.insert("maxTimeMS", Bson::Int64(max_time_ms));
            }
        }

        body.insert("$db", self.target_db.clone());
        body
    }
}

/// A reply together with the server that produced it.
#[derive(Debug)]
pub struct Response {
    pub server: Server,
    /// `None` for unacknowledged commands.
    pub reply: Option<Document>,
}

impl Response {
    /// The reply document, failing if the command was unacknowledged.
    pub fn into_document(self) -> Result<Document> {
        self.reply
            .ok_or_else(|| Error::ResponseError("No reply for an acknowledged command.".to_owned()))
    }
}

/// Executes commands, each attempt over one connection checked out for its duration.
#[derive(Clone)]
pub struct Executor {
    topology: Topology,
    listener: Arc<Listener>,
    socket_timeout: Option<Duration>,
}

impl Executor {
    pub fn new(
        topology: Topology,
        listener: Arc<Listener>,
        socket_timeout: Option<Duration>,
    ) -> Executor {
        Executor {
            topology,
            listener,
            socket_timeout,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Selects a server and runs the command on it. A retryable failure of a `RETRYABLE`
    /// command is retried exactly once, on a newly selected server, if budget remains.
    pub async fn execute(&self, command: &Command, ctx: &TimeoutContext) -> Result<Response> {
        ctx.check("server selection")?;
        let server = self.topology.select_server(&[], ctx)?;

        let first = match self.execute_on(&server, command, ctx).await {
            Ok(reply) => return Ok(Response { server, reply }),
            Err(e) => e,
        };

        if !command.aspects.contains(Aspect::RETRYABLE)
            || !first.is_retryable()
            || ctx.is_expired()
        {
            return Err(first);
        }

        debug!(
            command = command.name.to_str(),
            host = %server.host,
            error = %first,
            "retrying command"
        );
        let server = self.topology.select_server(&[server.host.clone()], ctx)?;
        let reply = self.execute_on(&server, command, ctx).await?;
        Ok(Response { server, reply })
    }

    /// Runs the command on `server` without retrying.
    pub async fn execute_on(
        &self,
        server: &Server,
        command: &Command,
        ctx: &TimeoutContext,
    ) -> Result<Option<Document>> {
        let result = self.attempt(server, command, ctx).await;

        if let Err(ref e) = result {
            if e.is_network_error() {
                server.handle_network_error();
            }
        }
        result
    }

    async fn attempt(
        &self,
        server: &Server,
        command: &Command,
        ctx: &TimeoutContext,
    ) -> Result<Option<Document>> {
        ctx.check("connection checkout")?;
        let mut conn = server.acquire_stream(ctx).await?;
        ctx.check("command execution")?;

        let body = command.build(ctx);
        let message = Message::new_request(body, command.acknowledged);
        let request_id = message.request_id;
        let command_name = command.name.to_str().to_owned();

        self.emit_started(CommandStarted {
            command: message.document.clone(),
            database_name: command.target_db.clone(),
            command_name: command_name.clone(),
            request_id,
            connection_id: conn.id,
            host: server.host.clone(),
        });

        let start = Instant::now();
        let bound = ctx.bounded(self.socket_timeout);
        let result = match conn.send_message(message, bound, ctx).await {
            Ok(Some(reply)) if reply_ok(&reply.document) => Ok(Some(reply.document)),
            Ok(Some(reply)) => Err(server_error(&reply.document, ctx)),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };
        let duration = start.elapsed();

        match result {
            Ok(ref reply) => {
                debug!(
                    command = %command_name,
                    request_id,
                    host = %server.host,
                    ?duration,
                    "command succeeded"
                );
                self.emit_completed(&CommandResult::Success {
                    duration,
                    reply: reply.as_ref(),
                    command_name,
                    request_id,
                    host: server.host.clone(),
                });
            }
            Err(ref e) => {
                debug!(
                    command = %command_name,
                    request_id,
                    host = %server.host,
                    ?duration,
                    error = %e,
                    "command failed"
                );
                self.emit_completed(&CommandResult::Failure {
                    duration,
                    command_name,
                    failure: e,
                    request_id,
                    host: server.host.clone(),
                });
            }
        }

        result
    }

    fn emit_started(&self, started: CommandStarted) {
        if let Err(e) = self.listener.run_start_hooks(&started) {
            debug!(error = %e, "failed to run command start hooks");
        }
    }

    fn emit_completed(&self, result: &CommandResult) {
        if let Err(e) = self.listener.run_completion_hooks(result) {
            debug!(error = %e, "failed to run command completion hooks");
        }
    }
}

// A server-side time limit hit under a client-side timeout is reported as an operation timeout.
fn server_error(reply: &Document, ctx: &TimeoutContext) -> Error {
    let error = Error::from_reply(reply);
    if ctx.is_enabled() && error.code() == Some(ErrorCode::MaxTimeMSExpired as i32) {
        return Error::OperationTimeout(format!("server exceeded maxTimeMS: {}", error));
    }
    error
}
