//! Namespaces and write controls shared by operations.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bson::{Bson, Document};

use crate::error::{Error, Result};

/// A fully qualified collection name: `db.collection`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    pub db: String,
    pub coll: String,
}

impl Namespace {
    pub fn new<D: Into<String>, C: Into<String>>(db: D, coll: C) -> Namespace {
        Namespace {
            db: db.into(),
            coll: coll.into(),
        }
    }

    /// The namespace of another collection in the same database.
    pub fn with_coll<C: Into<String>>(&self, coll: C) -> Namespace {
        Namespace::new(self.db.clone(), coll)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}.{}", self.db, self.coll)
    }
}

impl FromStr for Namespace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('.') {
            Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok(Namespace::new(db, coll)),
            _ => Err(Error::ArgumentError(format!("Invalid namespace: {:?}.", s))),
        }
    }
}

/// Describes the acknowledgement requested from the server for write operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteConcern {
    /// Write replication. `Some(0)` requests an unacknowledged write.
    pub w: Option<i32>,
    /// Used in conjunction with `w`. Replication timeout.
    pub w_timeout: Option<Duration>,
    /// If true, will block until write operations have been committed to the journal.
    pub journal: Option<bool>,
}

impl WriteConcern {
    pub fn new() -> WriteConcern {
        Default::default()
    }

    /// A write concern that does not wait for any acknowledgement.
    pub fn unacknowledged() -> WriteConcern {
        WriteConcern {
            w: Some(0),
            ..Default::default()
        }
    }

    pub fn with_w(w: i32) -> WriteConcern {
        WriteConcern {
            w: Some(w),
            ..Default::default()
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.w != Some(0) || self.journal == Some(true)
    }

    /// Whether the server default should be used, i.e. nothing needs to be sent.
    pub fn is_empty(&self) -> bool {
        self.w.is_none() && self.w_timeout.is_none() && self.journal.is_none()
    }

    pub fn to_bson(&self) -> Document {
        let mut bson = Document::new();
        if let Some(w) = self.w {
            bson.insert("w", Bson::Int32(w));
        }
        if let Some(w_timeout) = self.w_timeout {
            bson.insert("wtimeout", Bson::Int64(w_timeout.as_millis() as i64));
        }
        if let Some(journal) = self.journal {
            bson.insert("j", Bson::Boolean(journal));
        }
        bson
    }
}
