//! Splits write models into `bulkWrite` commands that respect the server's limits.
use std::collections::HashMap;
use std::ops::Range;

use bson::{doc, Bson, Document};

use super::models::{OperationKind, WriteModel};
use crate::common::Namespace;
use crate::connection::StreamDescription;
use crate::error::Error::ValidationError;
use crate::error::Result;

// Room left in each message for the command's own fields and the OP_MSG framing.
const COMMAND_OVERHEAD_SIZE: usize = 16_000;

/// Server limits a batch must fit in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BatchLimits {
    pub max_write_batch_size: usize,
    pub max_message_size_bytes: usize,
    pub max_bson_object_size: usize,
}

impl From<&StreamDescription> for BatchLimits {
    fn from(description: &StreamDescription) -> Self {
        BatchLimits {
            max_write_batch_size: description.max_write_batch_size.max(1) as usize,
            max_message_size_bytes: description.max_message_size_bytes.max(0) as usize,
            max_bson_object_size: description.max_bson_object_size.max(0) as usize,
        }
    }
}

/// One `bulkWrite` command's worth of operations.
#[derive(Debug)]
pub(crate) struct Batch {
    /// Indexes of the models in this batch, in the caller's input.
    pub models: Range<usize>,
    pub ops: Vec<Document>,
    pub ns_info: Vec<Document>,
    /// `_id`s of the inserts in this batch, by model index.
    pub inserted_ids: HashMap<usize, Bson>,
    namespaces: HashMap<Namespace, i32>,
    size: usize,
}

impl Batch {
    fn new(start: usize) -> Batch {
        Batch {
            models: start..start,
            ops: Vec::new(),
            ns_info: Vec::new(),
            inserted_ids: HashMap::new(),
            namespaces: HashMap::new(),
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The model index for an `idx` reported in this batch's results.
    pub fn model_index(&self, idx: usize) -> usize {
        self.models.start + idx
    }

    // The bytes `namespace` would add to the nsInfo table.
    fn namespace_size(&self, namespace: &Namespace) -> Result<usize> {
        if self.namespaces.contains_key(namespace) {
            Ok(0)
        } else {
            encoded_size(&ns_entry(namespace))
        }
    }

    fn namespace_index(&mut self, namespace: &Namespace) -> i32 {
        if let Some(&index) = self.namespaces.get(namespace) {
            return index;
        }
        let index = self.ns_info.len() as i32;
        self.namespaces.insert(namespace.clone(), index);
        self.ns_info.push(ns_entry(namespace));
        index
    }
}

/// Partitions `models` into ordered batches bounded by count and by encoded size.
pub(crate) fn split(models: &[WriteModel], limits: BatchLimits) -> Result<Vec<Batch>> {
    let max_size = limits.max_message_size_bytes.saturating_sub(COMMAND_OVERHEAD_SIZE).max(1);
    let mut batches = Vec::new();
    let mut batch = Batch::new(0);

    for (index, model) in models.iter().enumerate() {
        let namespace = model.namespace();
        // The namespace index is patched in below; its encoded width is fixed.
        let (mut op, inserted_id) = model.to_operation(0);
        let op_size = encoded_size(&op)?;

        if op_size > limits.max_bson_object_size {
            return Err(ValidationError(format!(
                "Operation at index {} is {} bytes, exceeding the maximum document size of {} \
                 bytes.",
                index, op_size, limits.max_bson_object_size
            )));
        }

        let full = batch.len() >= limits.max_write_batch_size
            || batch.size + op_size + batch.namespace_size(namespace)? > max_size;
        if full && !batch.is_empty() {
            batches.push(batch);
            batch = Batch::new(index);
        }

        batch.size += op_size + batch.namespace_size(namespace)?;
        let ns_index = batch.namespace_index(namespace);
        op.insert(kind_key(model.kind()), ns_index);

        if let Some(id) = inserted_id {
            batch.inserted_ids.insert(index, id);
        }
        batch.ops.push(op);
        batch.models.end = index + 1;
    }

    if !batch.is_empty() {
        batches.push(batch);
    }
    Ok(batches)
}

fn kind_key(kind: OperationKind) -> &'static str {
    match kind {
        OperationKind::Insert => "insert",
        OperationKind::Update => "update",
        OperationKind::Delete => "delete",
    }
}

fn ns_entry(namespace: &Namespace) -> Document {
    doc! { "ns": namespace.to_string() }
}

fn encoded_size(document: &Document) -> Result<usize> {
    let mut bytes = Vec::new();
    document.to_writer(&mut bytes)?;
    Ok(bytes.len())
}
