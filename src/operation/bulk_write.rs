use async_trait::async_trait;

use super::Operation;
use crate::bulk_write::{BulkWriteBatcher, BulkWriteOptions, BulkWriteResult, WriteModel};
use crate::command_type::{Aspect, CommandType};
use crate::common::WriteConcern;
use crate::error::Result;
use crate::executor::Executor;
use crate::timeout::TimeoutContext;

/// A client-level bulk write across any number of namespaces.
pub struct BulkWriteOperation {
    models: Vec<WriteModel>,
    options: BulkWriteOptions,
    default_write_concern: WriteConcern,
}

impl BulkWriteOperation {
    pub fn new(
        models: Vec<WriteModel>,
        options: BulkWriteOptions,
        default_write_concern: WriteConcern,
    ) -> BulkWriteOperation {
        BulkWriteOperation {
            models,
            options,
            default_write_concern,
        }
    }
}

#[async_trait]
impl Operation for BulkWriteOperation {
    type O = BulkWriteResult;
    const NAME: &'static str = "bulkWrite";

    fn aspects(&self) -> Aspect {
        Aspect::for_command(CommandType::BulkWrite)
    }

    async fn execute(self, executor: &Executor, ctx: &TimeoutContext) -> Result<BulkWriteResult> {
        BulkWriteBatcher::new(executor, self.models, self.options, &self.default_write_concern)
            .execute(ctx)
            .await
    }
}
