//! A single connection to a server.
use std::future::Future;
use std::time::{Duration, Instant};

use bson::{doc, Document};
use serde_derive::Deserialize;
use tokio::io::BufStream;
use tracing::{debug, warn};

use crate::connstring::Host;
use crate::error::{Error, Result};
use crate::stream::{Stream, StreamConnector};
use crate::timeout::TimeoutContext;
use crate::wire_protocol::{Message, OpMsgFlags};

pub const DRIVER_NAME: &str = "mongo-rust-driver-prototype";

pub const DEFAULT_MAX_BSON_OBJECT_SIZE: i64 = 16 * 1024 * 1024;
pub const DEFAULT_MAX_MESSAGE_SIZE_BYTES: i64 = 48_000_000;
pub const DEFAULT_MAX_WRITE_BATCH_SIZE: i64 = 100_000;

/// Server limits advertised in the handshake reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamDescription {
    pub max_bson_object_size: i64,
    pub max_message_size_bytes: i64,
    pub max_write_batch_size: i64,
    pub max_wire_version: i32,
}

impl Default for StreamDescription {
    fn default() -> Self {
        StreamDescription {
            max_bson_object_size: DEFAULT_MAX_BSON_OBJECT_SIZE,
            max_message_size_bytes: DEFAULT_MAX_MESSAGE_SIZE_BYTES,
            max_write_batch_size: DEFAULT_MAX_WRITE_BATCH_SIZE,
            max_wire_version: 0,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HelloReply {
    max_bson_object_size: Option<i64>,
    max_message_size_bytes: Option<i64>,
    max_write_batch_size: Option<i64>,
    max_wire_version: Option<i32>,
}

impl From<HelloReply> for StreamDescription {
    fn from(reply: HelloReply) -> Self {
        let defaults = StreamDescription::default();
        StreamDescription {
            max_bson_object_size: reply
                .max_bson_object_size
                .unwrap_or(defaults.max_bson_object_size),
            max_message_size_bytes: reply
                .max_message_size_bytes
                .unwrap_or(defaults.max_message_size_bytes),
            max_write_batch_size: reply
                .max_write_batch_size
                .unwrap_or(defaults.max_write_batch_size),
            max_wire_version: reply.max_wire_version.unwrap_or(defaults.max_wire_version),
        }
    }
}

/// One channel to one server. A connection is owned by exactly one party at a time: the pool's
/// idle list or the caller that checked it out.
pub struct Connection {
    pub id: u32,
    pub host: Host,
    /// The pool generation this connection was created under.
    pub generation: u32,
    stream: BufStream<Stream>,
    description: StreamDescription,
    faulted: bool,
    last_used: Instant,
}

impl Connection {
    /// Opens a stream and performs the handshake, all within `bound`.
    pub(crate) async fn connect(
        id: u32,
        host: &Host,
        generation: u32,
        connector: &StreamConnector,
        bound: Option<Duration>,
        ctx: &TimeoutContext,
    ) -> Result<Connection> {
        let establish = async {
            let stream = connector
                .connect(host)
                .await
                .map_err(|e| Error::NetworkError(format!("failed to connect to {}: {}", host, e)))?;

            let mut conn = Connection {
                id,
                host: host.clone(),
                generation,
                stream: BufStream::new(stream),
                description: StreamDescription::default(),
                faulted: false,
                last_used: Instant::now(),
            };
            conn.handshake().await?;
            Ok::<_, Error>(conn)
        };

        let conn = with_bound(bound, ctx, "connection establishment", establish).await?;
        debug!(connection_id = id, host = %host, generation, "connection established");
        Ok(conn)
    }

    // Sends the client metadata along with `hello`.
    //
    // See https://github.com/mongodb/specifications/blob/master/source/mongodb-handshake/handshake.rst
    async fn handshake(&mut self) -> Result<()> {
        let hello = doc! {
            "hello": 1i32,
            "$db": "admin",
            "client": {
                "driver": {
                    "name": DRIVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "os": {
                    "type": std::env::consts::OS,
                    "architecture": std::env::consts::ARCH,
                },
            },
        };

        let reply = self.round_trip(Message::new_request(hello, true)).await?;
        let reply = match reply {
            Some(reply) => reply.document,
            None => return Err(Error::ResponseError("No reply to the handshake.".to_owned())),
        };

        if !reply_ok(&reply) {
            return Err(Error::from_reply(&reply));
        }

        let hello: HelloReply = bson::from_document(reply)?;
        self.description = hello.into();
        Ok(())
    }

    pub fn description(&self) -> &StreamDescription {
        &self.description
    }

    /// Marks the connection as unusable; it will be discarded instead of returned to the pool.
    pub fn mark_faulted(&mut self) {
        self.faulted = true;
    }

    pub fn is_faulted(&self) -> bool {
        self.faulted
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub(crate) fn is_idle_expired(&self, max_idle_time: Option<Duration>) -> bool {
        max_idle_time.map_or(false, |max| self.last_used.elapsed() >= max)
    }

    /// Sends a message and waits for its reply, unless the message is flagged `moreToCome`.
    /// The whole exchange is bounded by `bound`; on any failure the connection is faulted.
    pub async fn send_message(
        &mut self,
        message: Message,
        bound: Option<Duration>,
        ctx: &TimeoutContext,
    ) -> Result<Option<Message>> {
        let result = with_bound(bound, ctx, "command execution", self.round_trip(message)).await;

        if let Err(ref e) = result {
            warn!(connection_id = self.id, host = %self.host, error = %e, "discarding connection");
            self.faulted = true;
        }
        result
    }

    async fn round_trip(&mut self, message: Message) -> Result<Option<Message>> {
        message.write_to(&mut self.stream).await.map_err(network_error)?;

        if message.flags.contains(OpMsgFlags::MORE_TO_COME) {
            return Ok(None);
        }

        let reply = Message::read_from(&mut self.stream).await.map_err(network_error)?;
        if reply.response_to != message.request_id {
            return Err(Error::ResponseError(format!(
                "Reply is for request {}, expected {}.",
                reply.response_to, message.request_id
            )));
        }
        Ok(Some(reply))
    }
}

pub(crate) fn reply_ok(reply: &Document) -> bool {
    match reply.get("ok") {
        Some(ok) => match *ok {
            bson::Bson::Double(v) => v == 1.0,
            bson::Bson::Int32(v) => v == 1,
            bson::Bson::Int64(v) => v == 1,
            bson::Bson::Boolean(v) => v,
            _ => false,
        },
        None => false,
    }
}

fn network_error(err: Error) -> Error {
    match err {
        Error::IoError(e) => Error::NetworkError(e.to_string()),
        other => other,
    }
}

// Runs `fut` under `bound`. When the bound elapses the outcome is an operation timeout if the
// shared deadline is what ran out, and a network timeout otherwise.
async fn with_bound<T, F>(
    bound: Option<Duration>,
    ctx: &TimeoutContext,
    what: &str,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match bound {
        Some(bound) => match tokio::time::timeout(bound, fut).await {
            Ok(result) => result,
            Err(_) if ctx.is_expired() => Err(Error::timeout(what)),
            Err(_) => Err(Error::NetworkError(format!("{} timed out after {:?}", what, bound))),
        },
        None => fut.await,
    }
}
