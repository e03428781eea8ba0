//! Operations runnable through `Client::execute_operation`.
mod bulk_write;
mod drop_search_index;
mod rename;

use async_trait::async_trait;

use crate::command_type::Aspect;
use crate::error::Result;
use crate::executor::Executor;
use crate::timeout::TimeoutContext;

pub use self::bulk_write::BulkWriteOperation;
pub use self::drop_search_index::DropSearchIndexOperation;
pub use self::rename::{RenameOperation, RenameOptions};

/// A top-level operation: builds its commands and runs them through the executor, all under
/// one timeout context.
#[async_trait]
pub trait Operation: Send {
    /// What the operation produces.
    type O: Send;

    /// The command name, as used in logs.
    const NAME: &'static str;

    fn aspects(&self) -> Aspect;

    async fn execute(self, executor: &Executor, ctx: &TimeoutContext) -> Result<Self::O>;
}
