use async_trait::async_trait;
use bson::doc;
use tracing::debug;

use super::Operation;
use crate::command_type::{Aspect, CommandType};
use crate::common::Namespace;
use crate::error::{ErrorCode, Result};
use crate::executor::{Command, Executor};
use crate::timeout::TimeoutContext;

/// Drops an Atlas Search index. Dropping from a collection that does not exist succeeds.
pub struct DropSearchIndexOperation {
    namespace: Namespace,
    name: Option<String>,
}

impl DropSearchIndexOperation {
    pub fn new(namespace: Namespace, name: Option<&str>) -> DropSearchIndexOperation {
        DropSearchIndexOperation {
            namespace,
            name: name.map(String::from),
        }
    }

    fn build(&self) -> Command {
        let mut body = doc! { "dropSearchIndex": self.namespace.coll.clone() };
        if let Some(ref name) = self.name {
            body.insert("name", name.clone());
        }
        Command::new(CommandType::DropSearchIndex, self.namespace.db.clone(), body)
            .with_aspects(self.aspects())
    }
}

#[async_trait]
impl Operation for DropSearchIndexOperation {
    type O = ();
    const NAME: &'static str = "dropSearchIndex";

    fn aspects(&self) -> Aspect {
        Aspect::WRITE_OPERATION
    }

    async fn execute(self, executor: &Executor, ctx: &TimeoutContext) -> Result<()> {
        match executor.execute(&self.build(), ctx).await {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some(ErrorCode::NamespaceNotFound as i32) => {
                debug!(ns = %self.namespace, "namespace not found; nothing to drop");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
