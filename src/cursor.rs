use std::collections::VecDeque;

use bson::{doc, Bson, Document};
use serde_derive::Deserialize;
use tracing::debug;

use crate::command_type::CommandType;
use crate::common::Namespace;
use crate::error::{Error, Result};
use crate::executor::{Command, Executor};
use crate::timeout::TimeoutContext;
use crate::topology::Server;

/// Lifecycle of a server cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorState {
    Open,
    /// The server reported cursor id 0; nothing remains server-side.
    Exhausted,
    /// A getMore failed. The server-side cursor may still exist.
    Errored,
    Killed,
    /// killCursors could not even be attempted.
    ErroredUnkillable,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorReply {
    cursor: CursorBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorBody {
    id: i64,
    ns: String,
    #[serde(default)]
    first_batch: Vec<Document>,
    #[serde(default)]
    next_batch: Vec<Document>,
}

/// Lazily returns documents from a server cursor, fetching further batches with `getMore` on the
/// server that created it.
///
/// # Fields
///
/// `namespace` - The namespace the cursor iterates.
/// `id` - Uniquely identifies the cursor on its server. Zero once exhausted.
/// `batch_size` - How many documents to request per getMore, if bounded.
/// `buffer` - Documents received from the server that have not yet been returned.
pub struct Cursor {
    executor: Executor,
    server: Server,
    namespace: Namespace,
    id: i64,
    batch_size: Option<i32>,
    buffer: VecDeque<Document>,
    state: CursorState,
}

impl Cursor {
    /// Builds a cursor from a reply carrying `cursor: { id, ns, firstBatch }`.
    pub fn from_reply(executor: Executor, server: Server, reply: Document) -> Result<Cursor> {
        let reply: CursorReply = bson::from_document(reply)?;
        let namespace: Namespace = reply.cursor.ns.parse()?;

        let state = if reply.cursor.id == 0 {
            CursorState::Exhausted
        } else {
            CursorState::Open
        };

        Ok(Cursor {
            executor,
            server,
            namespace,
            id: reply.cursor.id,
            batch_size: None,
            buffer: reply.cursor.first_batch.into(),
            state,
        })
    }

    pub fn with_batch_size(mut self, batch_size: i32) -> Cursor {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Returns the next document, fetching a new batch under `ctx` when the buffer is empty.
    pub async fn next(&mut self, ctx: &TimeoutContext) -> Result<Option<Document>> {
        loop {
            if let Some(doc) = self.buffer.pop_front() {
                return Ok(Some(doc));
            }

            match self.state {
                CursorState::Open => self.get_more(ctx).await?,
                CursorState::Exhausted | CursorState::Killed => return Ok(None),
                CursorState::Errored | CursorState::ErroredUnkillable => {
                    return Err(Error::ArgumentError(
                        "Cannot iterate a cursor after a failed getMore.".to_owned(),
                    ))
                }
            }
        }
    }

    /// Returns every buffered document, fetching one batch first if none are buffered.
    pub async fn next_batch(&mut self, ctx: &TimeoutContext) -> Result<Vec<Document>> {
        if self.buffer.is_empty() && self.state == CursorState::Open {
            self.get_more(ctx).await?;
        }
        Ok(self.buffer.drain(..).collect())
    }

    /// Whether another document is available, fetching batches as needed.
    pub async fn has_next(&mut self, ctx: &TimeoutContext) -> Result<bool> {
        while self.buffer.is_empty() && self.state == CursorState::Open {
            self.get_more(ctx).await?;
        }
        Ok(!self.buffer.is_empty())
    }

    /// Drains the cursor.
    pub async fn collect_remaining(&mut self, ctx: &TimeoutContext) -> Result<Vec<Document>> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next(ctx).await? {
            docs.push(doc);
        }
        Ok(docs)
    }

    async fn get_more(&mut self, ctx: &TimeoutContext) -> Result<()> {
        match self.fetch(ctx).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = CursorState::Errored;
                Err(e)
            }
        }
    }

    async fn fetch(&mut self, ctx: &TimeoutContext) -> Result<()> {
        ctx.check("getMore")?;

        let mut body = doc! {
            "getMore": Bson::Int64(self.id),
            "collection": self.namespace.coll.clone(),
        };
        if let Some(batch_size) = self.batch_size {
            body.insert("batchSize", batch_size);
        }

        let command = Command::new(CommandType::GetMore, self.namespace.db.clone(), body);
        let reply = match self.executor.execute_on(&self.server, &command, ctx).await? {
            Some(reply) => reply,
            None => return Err(Error::ResponseError("No reply to getMore.".to_owned())),
        };

        let reply: CursorReply = bson::from_document(reply)?;
        self.id = reply.cursor.id;
        self.buffer.extend(reply.cursor.next_batch);
        if self.id == 0 {
            self.state = CursorState::Exhausted;
        }
        Ok(())
    }

    /// Kills the server cursor unless it is already exhausted or killed. Runs under a refreshed
    /// deadline so cleanup is attempted even after `ctx` expired. Failures are logged, never
    /// returned.
    pub async fn close(&mut self, ctx: &TimeoutContext) {
        match self.state {
            CursorState::Exhausted | CursorState::Killed | CursorState::ErroredUnkillable => return,
            CursorState::Open | CursorState::Errored => (),
        }
        self.buffer.clear();

        let cleanup = ctx.refresh_for_cleanup();
        let command = Command::new(
            CommandType::KillCursors,
            self.namespace.db.clone(),
            doc! {
                "killCursors": self.namespace.coll.clone(),
                "cursors": [Bson::Int64(self.id)],
            },
        );

        self.state = match self.executor.execute_on(&self.server, &command, &cleanup).await {
            Ok(_) => CursorState::Killed,
            Err(e) => {
                debug!(
                    cursor_id = self.id,
                    ns = %self.namespace,
                    error = %e,
                    "failed to kill cursor"
                );
                match e {
                    Error::ServerSelectionError(_)
                    | Error::PoolClosed
                    | Error::PoolWaitTimeout(_) => CursorState::ErroredUnkillable,
                    _ => CursorState::Killed,
                }
            }
        };
    }
}
