//! Client-level bulk writes.
//!
//! A bulk write validates every model, splits them into `bulkWrite` commands bounded by the
//! server's limits, and runs those commands one after another under a single timeout. When
//! per-operation results are needed they are read from each batch's results cursor under the
//! same timeout.
mod batch;
pub mod error;
pub mod models;
pub mod results;

use std::time::Duration;

use bson::{doc, Bson, Document};
use tracing::debug;

use self::batch::{Batch, BatchLimits};
use self::error::BulkWriteException;
use self::models::OperationKind;
use self::results::{InsertOneResult, SingleOperationReply, SummaryReply};
use crate::command_type::{Aspect, CommandType};
use crate::common::WriteConcern;
use crate::cursor::Cursor;
use crate::error::Error::{self, ArgumentError};
use crate::error::Result;
use crate::executor::{Command, Executor};
use crate::timeout::TimeoutContext;

pub use self::error::{WriteConcernError, WriteError};
pub use self::models::{DeleteModelOptions, UpdateModelOptions, UpdateModifications, WriteModel};
pub use self::results::{BulkWriteResult, DeleteResult, UpdateResult};

/// Options for a client-level bulk write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkWriteOptions {
    /// Stop at the first failure. Defaults to true.
    pub ordered: Option<bool>,
    pub write_concern: Option<WriteConcern>,
    /// Report the outcome of every operation, not just the totals.
    pub verbose_results: Option<bool>,
    /// Overrides the client's timeout for this call. Zero disables the timeout.
    pub timeout: Option<Duration>,
    /// Strip `undefined` values from documents before sending them.
    pub ignore_undefined: Option<bool>,
    pub comment: Option<Bson>,
    pub let_vars: Option<Document>,
    pub bypass_document_validation: Option<bool>,
}

impl BulkWriteOptions {
    pub fn new() -> BulkWriteOptions {
        Default::default()
    }

    fn ordered(&self) -> bool {
        self.ordered.unwrap_or(true)
    }

    fn verbose(&self) -> bool {
        self.verbose_results.unwrap_or(false)
    }
}

/// Drives one bulk write to completion.
pub(crate) struct BulkWriteBatcher<'a> {
    executor: &'a Executor,
    models: Vec<WriteModel>,
    options: BulkWriteOptions,
    write_concern: WriteConcern,
}

// How one batch went.
enum BatchOutcome {
    Continue,
    // An ordered write stopped at a failure.
    Stop,
}

impl<'a> BulkWriteBatcher<'a> {
    pub fn new(
        executor: &'a Executor,
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
        default_write_concern: &WriteConcern,
    ) -> BulkWriteBatcher<'a> {
        let write_concern = options
            .write_concern
            .clone()
            .unwrap_or_else(|| default_write_concern.clone());

        BulkWriteBatcher {
            executor,
            models,
            options,
            write_concern,
        }
    }

    /// Checks the options and every model. Nothing is sent if this fails.
    fn validate(&mut self) -> Result<()> {
        if self.models.is_empty() {
            return Err(ArgumentError("A bulk write requires at least one write model.".to_owned()));
        }
        if self.options.verbose() && !self.write_concern.is_acknowledged() {
            return Err(ArgumentError(
                "Verbose results cannot be requested with an unacknowledged write concern."
                    .to_owned(),
            ));
        }

        let ignore_undefined = self.options.ignore_undefined.unwrap_or(false);
        for model in self.models.iter_mut() {
            model.prepare(ignore_undefined)?;
        }
        Ok(())
    }

    pub async fn execute(mut self, ctx: &TimeoutContext) -> Result<BulkWriteResult> {
        self.validate()?;
        ctx.check("bulkWrite")?;

        let server = self.executor.topology().select_server(&[], ctx)?;
        let description = server.description(ctx).await?;
        let batches = batch::split(&self.models, BatchLimits::from(&description))?;

        let acknowledged = self.write_concern.is_acknowledged();
        let mut result = BulkWriteResult::new(acknowledged);
        let mut exception = BulkWriteException::new();

        debug!(
            models = self.models.len(),
            batches = batches.len(),
            ordered = self.options.ordered(),
            "executing bulk write"
        );

        for batch in &batches {
            ctx.check("bulkWrite")?;

            let outcome = self.execute_batch(batch, ctx, &mut result, &mut exception).await?;
            if let BatchOutcome::Stop = outcome {
                break;
            }
        }

        if exception.is_empty() {
            return Ok(result);
        }

        // A lone failure before anything was written is reported as is.
        if exception.write_errors.is_empty()
            && exception.write_concern_errors.is_empty()
            && result.is_empty()
        {
            if let Some(error) = exception.error.take() {
                return Err(*error);
            }
        }

        exception.partial_result = Some(result);
        Err(Error::BulkWriteError(exception))
    }

    async fn execute_batch(
        &self,
        batch: &Batch,
        ctx: &TimeoutContext,
        result: &mut BulkWriteResult,
        exception: &mut BulkWriteException,
    ) -> Result<BatchOutcome> {
        let command = self.build_command(batch);

        let response = match self.executor.execute(&command, ctx).await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(e),
            Err(e) => {
                exception.set_error(e);
                return Ok(self.after_failure());
            }
        };

        let reply = match response.reply {
            Some(reply) => reply,
            None => return Ok(BatchOutcome::Continue),
        };

        let summary: SummaryReply = bson::from_document(reply.clone())?;
        result.merge_summary(&summary);
        if let Some(error) = summary.write_concern_error.clone() {
            exception.add_write_concern_error(error);
        }

        if reply.contains_key("cursor") {
            let mut cursor = Cursor::from_reply(self.executor.clone(), response.server, reply)?;

            if self.options.verbose() || summary.n_errors > 0 {
                if let Err(e) = self.drain(&mut cursor, batch, ctx, result, exception).await {
                    cursor.close(ctx).await;
                    if e.is_timeout() {
                        return Err(e);
                    }
                    exception.set_error(e);
                    return Ok(self.after_failure());
                }
            } else {
                cursor.close(ctx).await;
            }
        }

        if summary.n_errors > 0 {
            return Ok(self.after_failure());
        }
        Ok(BatchOutcome::Continue)
    }

    fn after_failure(&self) -> BatchOutcome {
        if self.options.ordered() {
            BatchOutcome::Stop
        } else {
            BatchOutcome::Continue
        }
    }

    // Reads every per-operation result of one batch.
    async fn drain(
        &self,
        cursor: &mut Cursor,
        batch: &Batch,
        ctx: &TimeoutContext,
        result: &mut BulkWriteResult,
        exception: &mut BulkWriteException,
    ) -> Result<()> {
        let verbose = self.options.verbose();

        while let Some(document) = cursor.next(ctx).await? {
            let reply: SingleOperationReply = bson::from_document(document)?;
            let index = batch.model_index(reply.idx);

            let model = match self.models.get(index) {
                Some(model) => model,
                None => {
                    return Err(Error::ResponseError(format!(
                        "Result for operation {} is out of range of the bulk write.",
                        index
                    )))
                }
            };

            if let Some(error) = reply.write_error() {
                exception.add_write_error(index, error);
                continue;
            }
            if !verbose {
                continue;
            }

            match model.kind() {
                OperationKind::Insert => {
                    if let Some(id) = batch.inserted_ids.get(&index) {
                        let inserted = InsertOneResult { inserted_id: id.clone() };
                        result.insert_results.insert(index, inserted);
                    }
                }
                OperationKind::Update => {
                    result.update_results.insert(index, reply.update_result());
                }
                OperationKind::Delete => {
                    result.delete_results.insert(index, reply.delete_result());
                }
            }
        }
        Ok(())
    }

    fn build_command(&self, batch: &Batch) -> Command {
        let mut body = doc! {
            "bulkWrite": 1i32,
            "ops": batch.ops.clone(),
            "nsInfo": batch.ns_info.clone(),
            "ordered": self.options.ordered(),
            "errorsOnly": !self.options.verbose(),
        };

        if let Some(bypass) = self.options.bypass_document_validation {
            body.insert("bypassDocumentValidation", bypass);
        }
        if let Some(ref comment) = self.options.comment {
            body.insert("comment", comment.clone());
        }
        if let Some(ref let_vars) = self.options.let_vars {
            body.insert("let", let_vars.clone());
        }
        if !self.write_concern.is_empty() {
            body.insert("writeConcern", self.write_concern.to_bson());
        }

        let mut command = Command::new(CommandType::BulkWrite, "admin", body);

        // Without a transaction number the server cannot tell a resent batch from a new one.
        // Multi-document writes and unacknowledged writes are therefore sent once.
        let multi = self.models[batch.models.clone()].iter().any(WriteModel::is_multi);
        let acknowledged = self.write_concern.is_acknowledged();
        if multi || !acknowledged {
            let aspects = command.aspects - Aspect::RETRYABLE;
            command = command.with_aspects(aspects);
        }

        if acknowledged {
            command
        } else {
            command.unacknowledged()
        }
    }
}
