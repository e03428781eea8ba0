use std::collections::BTreeMap;

use bson::{Bson, Document};
use serde_derive::Deserialize;

use super::error::{WriteConcernError, WriteError};

/// Results for a client-level bulk write. The per-operation maps are only populated when
/// verbose results were requested, and are keyed by the model's index in the caller's input.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkWriteResult {
    pub acknowledged: bool,
    pub inserted_count: i64,
    pub matched_count: i64,
    pub modified_count: i64,
    pub upserted_count: i64,
    pub deleted_count: i64,
    pub insert_results: BTreeMap<usize, InsertOneResult>,
    pub update_results: BTreeMap<usize, UpdateResult>,
    pub delete_results: BTreeMap<usize, DeleteResult>,
}

/// Result for an insert operation.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertOneResult {
    pub inserted_id: Bson,
}

/// Result for an update or replace operation.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateResult {
    pub matched_count: i64,
    pub modified_count: i64,
    pub upserted_id: Option<Bson>,
}

/// Result for a delete operation.
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteResult {
    pub deleted_count: i64,
}

/// The summary section of a `bulkWrite` reply.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SummaryReply {
    #[serde(default)]
    pub n_errors: i64,
    #[serde(default)]
    pub n_inserted: i64,
    #[serde(default)]
    pub n_upserted: i64,
    #[serde(default)]
    pub n_matched: i64,
    #[serde(default)]
    pub n_modified: i64,
    #[serde(default)]
    pub n_deleted: i64,
    pub write_concern_error: Option<WriteConcernError>,
}

#[derive(Debug, Deserialize)]
struct UpsertedId {
    #[serde(rename = "_id")]
    id: Bson,
}

/// One document from a `bulkWrite` results cursor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SingleOperationReply {
    ok: f64,
    pub idx: usize,
    #[serde(default)]
    n: i64,
    n_modified: Option<i64>,
    upserted: Option<UpsertedId>,
    code: Option<i32>,
    code_name: Option<String>,
    errmsg: Option<String>,
    err_info: Option<Document>,
}

impl SingleOperationReply {
    /// The write error this reply reports, if it is a failure.
    pub fn write_error(&self) -> Option<WriteError> {
        if self.ok == 1.0 {
            return None;
        }
        Some(WriteError {
            code: self.code.unwrap_or_default(),
            code_name: self.code_name.clone(),
            message: self.errmsg.clone().unwrap_or_default(),
            details: self.err_info.clone(),
        })
    }

    pub fn update_result(&self) -> UpdateResult {
        let upserted_id = self.upserted.as_ref().map(|u| u.id.clone());
        UpdateResult {
            // An upsert matches nothing.
            matched_count: if upserted_id.is_some() { 0 } else { self.n },
            modified_count: self.n_modified.unwrap_or_default(),
            upserted_id,
        }
    }

    pub fn delete_result(&self) -> DeleteResult {
        DeleteResult { deleted_count: self.n }
    }
}

impl BulkWriteResult {
    pub fn new(acknowledged: bool) -> BulkWriteResult {
        BulkWriteResult {
            acknowledged,
            ..Default::default()
        }
    }

    /// Adds the counters of one batch's reply.
    pub(crate) fn merge_summary(&mut self, summary: &SummaryReply) {
        self.inserted_count += summary.n_inserted;
        self.upserted_count += summary.n_upserted;
        self.matched_count += summary.n_matched;
        self.modified_count += summary.n_modified;
        self.deleted_count += summary.n_deleted;
    }

    pub fn has_verbose_results(&self) -> bool {
        !self.insert_results.is_empty()
            || !self.update_results.is_empty()
            || !self.delete_results.is_empty()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.inserted_count == 0
            && self.upserted_count == 0
            && self.matched_count == 0
            && self.modified_count == 0
            && self.deleted_count == 0
            && !self.has_verbose_results()
    }
}
