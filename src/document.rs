use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tantivy::TantivyDocument;

use crate::analysis::normalize_keyword;
use crate::error::RecordValidationError;
use crate::schema::{FieldKind, FieldName, IndexSchema, SchemaFields};

/// Longest term the storage engine indexes. Longer terms are dropped silently
/// by tantivy, so exact-match values over this are rejected up front.
pub const MAX_TERM_BYTES: usize = u16::MAX as usize - 5;

/// Logged in place of a document id when the id itself is missing
pub const UNKNOWN_ID: &str = "<unknown>";

/// A unit of content ready to be indexed. Immutable once built; a new version
/// of a document is a new record with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    id: String,
    title: String,
    content: String,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl DocumentRecord {
    /// Create a record stamped with the current time
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            source_url: None,
            author: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_source_url(self, url: impl Into<String>) -> Self {
        Self {
            source_url: Some(url.into()),
            ..self
        }
    }

    pub fn with_author(self, author: impl Into<String>) -> Self {
        Self {
            author: Some(author.into()),
            ..self
        }
    }

    pub fn with_timestamp(self, timestamp: DateTime<Utc>) -> Self {
        Self { timestamp, ..self }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Id for log lines, with a placeholder when the id is blank
    pub fn display_id(&self) -> &str {
        if self.id.trim().is_empty() {
            UNKNOWN_ID
        } else {
            &self.id
        }
    }

    /// Convert into the schema's field-keyed representation.
    ///
    /// Missing optional metadata becomes an empty string, the timestamp is
    /// passed through unchanged.
    pub fn to_indexable(&self, schema: &IndexSchema) -> Result<IndexableDocument, RecordValidationError> {
        for (field, value) in [
            (FieldName::DocId, &self.id),
            (FieldName::Title, &self.title),
            (FieldName::Content, &self.content),
        ] {
            if value.trim().is_empty() {
                return Err(RecordValidationError::MissingField(field));
            }
        }

        let text = |value: &str| FieldValue::Text(value.to_string());
        let values = FieldName::ALL.map(|name| match name {
            FieldName::DocId => text(self.id.as_str()),
            FieldName::Title => text(self.title.as_str()),
            FieldName::Content => text(self.content.as_str()),
            FieldName::Timestamp => FieldValue::Date(self.timestamp),
            FieldName::Author => text(self.author.as_deref().unwrap_or("")),
            FieldName::Url => text(self.source_url.as_deref().unwrap_or("")),
        });

        let document = IndexableDocument { values };
        for policy in schema.policies() {
            let Some(value) = document.get(policy.name).as_text() else {
                continue;
            };
            // Keyword terms are lowercased before indexing, which can grow them
            let len = match policy.kind {
                FieldKind::Id => value.len(),
                FieldKind::Keyword => normalize_keyword(value).len(),
                FieldKind::Text | FieldKind::DateTime => continue,
            };
            if len > MAX_TERM_BYTES {
                return Err(RecordValidationError::TermTooLong {
                    field: policy.name,
                    len,
                    max: MAX_TERM_BYTES,
                });
            }
        }

        Ok(document)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Date(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            FieldValue::Date(_) => None,
        }
    }
}

/// A document keyed by [`FieldName`], with a value for every field
#[derive(Debug, Clone, PartialEq)]
pub struct IndexableDocument {
    values: [FieldValue; 6],
}

impl IndexableDocument {
    pub fn get(&self, name: FieldName) -> &FieldValue {
        &self.values[name as usize]
    }

    pub fn doc_id(&self) -> &str {
        self.get(FieldName::DocId).as_text().unwrap_or_default()
    }

    pub(crate) fn into_tantivy(self, fields: &SchemaFields) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        for (name, value) in FieldName::ALL.into_iter().zip(self.values) {
            let field = fields.get(name);
            match value {
                FieldValue::Text(text) => doc.add_text(field, text),
                FieldValue::Date(timestamp) => doc.add_date(
                    field,
                    tantivy::DateTime::from_timestamp_micros(timestamp.timestamp_micros()),
                ),
            }
        }
        doc
    }
}
