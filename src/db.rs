use std::fmt;
use std::sync::Arc;

use crate::coll::Collection;
use crate::common::WriteConcern;
use crate::Client;

/// Interfaces with a MongoDB database.
pub struct DatabaseInner {
    pub name: String,
    pub client: Client,
    pub write_concern: WriteConcern,
}

/// A handle to a database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Database").field("name", &self.inner.name).finish()
    }
}

impl Database {
    /// Creates a database representation with an optional write concern, inheriting the
    /// client's otherwise.
    pub fn open(client: Client, name: &str, write_concern: Option<WriteConcern>) -> Database {
        let write_concern = write_concern.unwrap_or_else(|| client.options().write_concern.clone());

        Database {
            inner: Arc::new(DatabaseInner {
                name: name.to_owned(),
                client,
                write_concern,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    pub fn write_concern(&self) -> &WriteConcern {
        &self.inner.write_concern
    }

    /// Creates a collection representation with inherited write controls.
    pub fn collection(&self, coll_name: &str) -> Collection {
        Collection::new(self.clone(), coll_name, None)
    }

    /// Creates a collection representation with a custom write concern.
    pub fn collection_with_write_concern(
        &self,
        coll_name: &str,
        write_concern: WriteConcern,
    ) -> Collection {
        Collection::new(self.clone(), coll_name, Some(write_concern))
    }
}
