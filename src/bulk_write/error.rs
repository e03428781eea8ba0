//! Write errors for client-level bulk writes.
use std::collections::BTreeMap;
use std::fmt;

use bson::Document;
use serde_derive::Deserialize;

use super::results::BulkWriteResult;
use crate::error::Error;

/// The error struct for a write-concern related error.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteConcernError {
    pub code: i32,
    pub code_name: Option<String>,
    #[serde(rename = "errmsg", default)]
    pub message: String,
    #[serde(rename = "errInfo")]
    pub details: Option<Document>,
}

/// The error struct for a single failed operation.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteError {
    pub code: i32,
    pub code_name: Option<String>,
    pub message: String,
    pub details: Option<Document>,
}

/// The error struct for a bulk write that did not fully succeed. Carries whatever completed
/// before the failure.
#[derive(Debug, Default)]
pub struct BulkWriteException {
    /// The failure that aborted a batch as a whole, if any.
    pub error: Option<Box<Error>>,
    /// Individual operation failures keyed by the model's index in the caller's input.
    pub write_errors: BTreeMap<usize, WriteError>,
    pub write_concern_errors: Vec<WriteConcernError>,
    /// Results of the operations that were processed.
    pub partial_result: Option<BulkWriteResult>,
}

impl fmt::Display for WriteConcernError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "WriteConcernError (code {}): {}", self.code, self.message)
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "WriteError (code {}): {}", self.code, self.message)
    }
}

impl fmt::Display for BulkWriteException {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.write_str("BulkWriteException")?;

        if let Some(ref error) = self.error {
            write!(fmt, ": {}", error)?;
        }

        if !self.write_errors.is_empty() {
            write!(fmt, "; {} write error(s)", self.write_errors.len())?;
            for (index, error) in &self.write_errors {
                write!(fmt, "; at index {}: {}", index, error)?;
            }
        }

        for error in &self.write_concern_errors {
            write!(fmt, "; {}", error)?;
        }

        Ok(())
    }
}

impl BulkWriteException {
    pub fn new() -> BulkWriteException {
        Default::default()
    }

    /// Whether anything went wrong at all.
    pub fn is_empty(&self) -> bool {
        self.error.is_none() && self.write_errors.is_empty() && self.write_concern_errors.is_empty()
    }

    pub(crate) fn add_write_error(&mut self, index: usize, error: WriteError) {
        self.write_errors.insert(index, error);
    }

    pub(crate) fn add_write_concern_error(&mut self, error: WriteConcernError) {
        self.write_concern_errors.push(error);
    }

    /// Records a batch-level failure. The first one is kept.
    pub(crate) fn set_error(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(Box::new(error));
        }
    }
}
