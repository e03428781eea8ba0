//! Interface for collection-level operations.
use std::fmt;
use std::time::Duration;

use crate::common::{Namespace, WriteConcern};
use crate::db::Database;
use crate::error::Result;
use crate::operation::{DropSearchIndexOperation, RenameOperation, RenameOptions};

/// Interfaces with a MongoDB collection.
#[derive(Clone)]
pub struct Collection {
    db: Database,
    namespace: Namespace,
    write_concern: WriteConcern,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Collection")
            .field("namespace", &self.namespace)
            .field("write_concern", &self.write_concern)
            .finish()
    }
}

impl Collection {
    /// Creates a collection representation with an optional write concern, inheriting the
    /// database's otherwise.
    pub fn new(db: Database, name: &str, write_concern: Option<WriteConcern>) -> Collection {
        let write_concern = write_concern.unwrap_or_else(|| db.write_concern().clone());

        Collection {
            namespace: Namespace::new(db.name(), name),
            db,
            write_concern,
        }
    }

    /// Returns the collection name.
    pub fn name(&self) -> &str {
        &self.namespace.coll
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn write_concern(&self) -> &WriteConcern {
        &self.write_concern
    }

    /// Renames the collection within its database and returns a handle to the renamed
    /// collection.
    pub async fn rename(
        &self,
        new_name: &str,
        options: impl Into<Option<RenameOptions>>,
    ) -> Result<Collection> {
        let mut options = options.into().unwrap_or_default();
        if options.write_concern.is_none() && !self.write_concern.is_empty() {
            options.write_concern = Some(self.write_concern.clone());
        }
        let timeout = options.timeout;

        let op = RenameOperation::new(self.clone(), new_name, options);
        self.db.client().execute_operation(op, timeout).await
    }

    /// Drops the named Atlas Search index. Succeeds if the collection does not exist.
    pub async fn drop_search_index(&self, name: &str) -> Result<()> {
        self.drop_search_index_with_timeout(name, None).await
    }

    pub async fn drop_search_index_with_timeout(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let op = DropSearchIndexOperation::new(self.namespace.clone(), Some(name));
        self.db.client().execute_operation(op, timeout).await
    }
}
