use std::time::Duration;

use async_trait::async_trait;
use bson::doc;

use super::Operation;
use crate::coll::Collection;
use crate::command_type::{Aspect, CommandType};
use crate::common::WriteConcern;
use crate::error::Result;
use crate::executor::{Command, Executor};
use crate::timeout::TimeoutContext;

/// Options for renaming a collection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenameOptions {
    /// Drop the target collection if it already exists. Defaults to false.
    pub drop_target: Option<bool>,
    pub write_concern: Option<WriteConcern>,
    pub timeout: Option<Duration>,
}

/// Renames a collection within its database.
pub struct RenameOperation {
    collection: Collection,
    new_name: String,
    options: RenameOptions,
}

impl RenameOperation {
    pub fn new(collection: Collection, new_name: &str, options: RenameOptions) -> RenameOperation {
        RenameOperation {
            collection,
            new_name: new_name.to_owned(),
            options,
        }
    }

    fn build(&self) -> Command {
        let from = self.collection.namespace();
        let to = from.with_coll(&self.new_name);

        let mut body = doc! {
            "renameCollection": from.to_string(),
            "to": to.to_string(),
            "dropTarget": self.options.drop_target.unwrap_or(false),
        };
        if let Some(ref write_concern) = self.options.write_concern {
            if !write_concern.is_empty() {
                body.insert("writeConcern", write_concern.to_bson());
            }
        }

        Command::new(CommandType::RenameCollection, "admin", body).with_aspects(self.aspects())
    }
}

#[async_trait]
impl Operation for RenameOperation {
    type O = Collection;
    const NAME: &'static str = "renameCollection";

    fn aspects(&self) -> Aspect {
        Aspect::WRITE_OPERATION
    }

    async fn execute(self, executor: &Executor, ctx: &TimeoutContext) -> Result<Collection> {
        executor.execute(&self.build(), ctx).await?;

        let write_concern = self.collection.write_concern().clone();
        Ok(Collection::new(
            self.collection.database().clone(),
            &self.new_name,
            Some(write_concern),
        ))
    }
}
