//! Write models accepted by a client-level bulk write.
use bson::{oid::ObjectId, Bson, Document};

use crate::common::Namespace;
use crate::error::Error::ValidationError;
use crate::error::Result;

const UNDEFINED_OPERATORS: &str = "Update operations require that all atomic operators have \
                                   defined values, but none were provided";

/// The new contents of an update: a document of atomic operators or an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateModifications {
    Document(Document),
    Pipeline(Vec<Document>),
}

impl From<Document> for UpdateModifications {
    fn from(document: Document) -> Self {
        UpdateModifications::Document(document)
    }
}

impl From<Vec<Document>> for UpdateModifications {
    fn from(pipeline: Vec<Document>) -> Self {
        UpdateModifications::Pipeline(pipeline)
    }
}

impl UpdateModifications {
    fn to_bson(&self) -> Bson {
        match *self {
            UpdateModifications::Document(ref document) => Bson::Document(document.clone()),
            UpdateModifications::Pipeline(ref pipeline) => {
                Bson::Array(pipeline.iter().cloned().map(Bson::Document).collect())
            }
        }
    }

    fn prepare(&mut self, ignore_undefined: bool) -> Result<()> {
        match *self {
            UpdateModifications::Document(ref mut document) => {
                if document.is_empty() {
                    return Err(ValidationError("Update document must not be empty.".to_owned()));
                }
                if ignore_undefined {
                    strip_undefined(document);
                    if document.is_empty() {
                        return Err(ValidationError(UNDEFINED_OPERATORS.to_owned()));
                    }
                }
                if let Some(key) = document.keys().find(|k| !k.starts_with('$')) {
                    return Err(ValidationError(format!(
                        "Update document requires atomic operators, found {:?}.",
                        key
                    )));
                }
                Ok(())
            }
            UpdateModifications::Pipeline(ref mut pipeline) => {
                if pipeline.is_empty() {
                    return Err(ValidationError("Update pipeline must not be empty.".to_owned()));
                }
                if ignore_undefined {
                    pipeline.iter_mut().for_each(strip_undefined);
                }
                Ok(())
            }
        }
    }
}

/// Options shared by update and replace models. Options a given model kind does not support
/// are accepted but never sent: `sort` only applies to single-document updates and replacements,
/// `array_filters` only to updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateModelOptions {
    pub upsert: Option<bool>,
    pub array_filters: Option<Vec<Document>>,
    pub collation: Option<Document>,
    pub hint: Option<Bson>,
    pub sort: Option<Document>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteModelOptions {
    pub collation: Option<Document>,
    pub hint: Option<Bson>,
}

/// A single write in a client-level bulk write. Each model names its own namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    InsertOne {
        namespace: Namespace,
        document: Document,
    },
    UpdateOne {
        namespace: Namespace,
        filter: Document,
        update: UpdateModifications,
        options: UpdateModelOptions,
    },
    UpdateMany {
        namespace: Namespace,
        filter: Document,
        update: UpdateModifications,
        options: UpdateModelOptions,
    },
    ReplaceOne {
        namespace: Namespace,
        filter: Document,
        replacement: Document,
        options: UpdateModelOptions,
    },
    DeleteOne {
        namespace: Namespace,
        filter: Document,
        options: DeleteModelOptions,
    },
    DeleteMany {
        namespace: Namespace,
        filter: Document,
        options: DeleteModelOptions,
    },
}

/// Which result map an operation's outcome belongs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl WriteModel {
    pub fn insert_one(namespace: Namespace, document: Document) -> WriteModel {
        WriteModel::InsertOne { namespace, document }
    }

    pub fn update_one<U: Into<UpdateModifications>>(
        namespace: Namespace,
        filter: Document,
        update: U,
    ) -> WriteModel {
        WriteModel::UpdateOne {
            namespace,
            filter,
            update: update.into(),
            options: UpdateModelOptions::default(),
        }
    }

    pub fn update_many<U: Into<UpdateModifications>>(
        namespace: Namespace,
        filter: Document,
        update: U,
    ) -> WriteModel {
        WriteModel::UpdateMany {
            namespace,
            filter,
            update: update.into(),
            options: UpdateModelOptions::default(),
        }
    }

    pub fn delete_one(namespace: Namespace, filter: Document) -> WriteModel {
        WriteModel::DeleteOne {
            namespace,
            filter,
            options: DeleteModelOptions::default(),
        }
    }

    pub fn namespace(&self) -> &Namespace {
        match *self {
            WriteModel::InsertOne { ref namespace, .. }
            | WriteModel::UpdateOne { ref namespace, .. }
            | WriteModel::UpdateMany { ref namespace, .. }
            | WriteModel::ReplaceOne { ref namespace, .. }
            | WriteModel::DeleteOne { ref namespace, .. }
            | WriteModel::DeleteMany { ref namespace, .. } => namespace,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match *self {
            WriteModel::InsertOne { .. } => OperationKind::Insert,
            WriteModel::UpdateOne { .. }
            | WriteModel::UpdateMany { .. }
            | WriteModel::ReplaceOne { .. } => OperationKind::Update,
            WriteModel::DeleteOne { .. } | WriteModel::DeleteMany { .. } => OperationKind::Delete,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(*self, WriteModel::UpdateMany { .. } | WriteModel::DeleteMany { .. })
    }

    /// Strips `undefined` values if requested and checks the model can be sent.
    pub(crate) fn prepare(&mut self, ignore_undefined: bool) -> Result<()> {
        match *self {
            WriteModel::InsertOne { ref mut document, .. } => {
                if ignore_undefined {
                    strip_undefined(document);
                }
                Ok(())
            }
            WriteModel::UpdateOne { ref mut filter, ref mut update, .. }
            | WriteModel::UpdateMany { ref mut filter, ref mut update, .. } => {
                if ignore_undefined {
                    strip_undefined(filter);
                }
                update.prepare(ignore_undefined)
            }
            WriteModel::ReplaceOne { ref mut filter, ref mut replacement, .. } => {
                if ignore_undefined {
                    strip_undefined(filter);
                    strip_undefined(replacement);
                }
                match replacement.keys().find(|k| k.starts_with('$')) {
                    Some(key) => Err(ValidationError(format!(
                        "Replacement document must not contain atomic operators, found {:?}.",
                        key
                    ))),
                    None => Ok(()),
                }
            }
            WriteModel::DeleteOne { ref mut filter, .. }
            | WriteModel::DeleteMany { ref mut filter, .. } => {
                if ignore_undefined {
                    strip_undefined(filter);
                }
                Ok(())
            }
        }
    }

    /// Builds this model's entry in the `ops` array. Inserts without an `_id` get a generated
    /// one, which is returned.
    pub(crate) fn to_operation(&self, ns_index: i32) -> (Document, Option<Bson>) {
        let mut op = Document::new();

        match *self {
            WriteModel::InsertOne { ref document, .. } => {
                let mut document = document.clone();
                let id = match document.get("_id") {
                    Some(id) => id.clone(),
                    None => {
                        let id = Bson::ObjectId(ObjectId::new());
                        let mut with_id = Document::new();
                        with_id.insert("_id", id.clone());
                        with_id.extend(document);
                        document = with_id;
                        id
                    }
                };
                op.insert("insert", ns_index);
                op.insert("document", document);
                return (op, Some(id));
            }
            WriteModel::UpdateOne { ref filter, ref update, ref options, .. }
            | WriteModel::UpdateMany { ref filter, ref update, ref options, .. } => {
                op.insert("update", ns_index);
                op.insert("filter", filter.clone());
                op.insert("updateMods", update.to_bson());
                op.insert("multi", self.is_multi());
                if let Some(ref array_filters) = options.array_filters {
                    op.insert("arrayFilters", array_filters.clone());
                }
                append_update_options(&mut op, options, !self.is_multi());
            }
            WriteModel::ReplaceOne { ref filter, ref replacement, ref options, .. } => {
                op.insert("update", ns_index);
                op.insert("filter", filter.clone());
                op.insert("updateMods", replacement.clone());
                op.insert("multi", false);
                append_update_options(&mut op, options, true);
            }
            WriteModel::DeleteOne { ref filter, ref options, .. }
            | WriteModel::DeleteMany { ref filter, ref options, .. } => {
                op.insert("delete", ns_index);
                op.insert("filter", filter.clone());
                op.insert("multi", self.is_multi());
                if let Some(ref collation) = options.collation {
                    op.insert("collation", collation.clone());
                }
                if let Some(ref hint) = options.hint {
                    op.insert("hint", hint.clone());
                }
            }
        }

        (op, None)
    }
}

fn append_update_options(op: &mut Document, options: &UpdateModelOptions, with_sort: bool) {
    if let Some(upsert) = options.upsert {
        op.insert("upsert", upsert);
    }
    if let Some(ref collation) = options.collation {
        op.insert("collation", collation.clone());
    }
    if let Some(ref hint) = options.hint {
        op.insert("hint", hint.clone());
    }
    if with_sort {
        if let Some(ref sort) = options.sort {
            op.insert("sort", sort.clone());
        }
    }
}

/// Removes every field whose value is `undefined`, at any depth.
pub(crate) fn strip_undefined(document: &mut Document) {
    let undefined: Vec<String> = document
        .iter()
        .filter(|(_, v)| matches!(v, Bson::Undefined))
        .map(|(k, _)| k.clone())
        .collect();
    for key in undefined {
        document.remove(&key);
    }

    for (_, value) in document.iter_mut() {
        strip_nested(value);
    }
}

fn strip_nested(value: &mut Bson) {
    match *value {
        Bson::Document(ref mut nested) => strip_undefined(nested),
        Bson::Array(ref mut items) => items.iter_mut().for_each(strip_nested),
        _ => (),
    }
}
