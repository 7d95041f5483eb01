use std::fmt;

use serde::{Deserialize, Serialize};
use tantivy::schema::{
    DateOptions, Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions,
};

use crate::analysis::{Analyzer, AnalyzerConfig, KEYWORD_TOKENIZER};
use crate::error::SchemaError;

/// The closed set of fields every index carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    DocId,
    Title,
    Content,
    Timestamp,
    Author,
    Url,
}

impl FieldName {
    pub const ALL: [FieldName; 6] = [
        FieldName::DocId,
        FieldName::Title,
        FieldName::Content,
        FieldName::Timestamp,
        FieldName::Author,
        FieldName::Url,
    ];

    /// Name of the field in the persisted index
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::DocId => "doc_id",
            FieldName::Title => "title",
            FieldName::Content => "content",
            FieldName::Timestamp => "timestamp",
            FieldName::Author => "author",
            FieldName::Url => "url",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a field's value is represented in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Single untokenized term
    Id,
    /// Analyzed full text
    Text,
    DateTime,
    /// Single lowercased term
    Keyword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExactFilter {
    None,
    /// Exact match on the unique document key
    Unique,
    CaseInsensitive,
}

/// Storage and analysis policy of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolicy {
    pub name: FieldName,
    pub kind: FieldKind,
    /// Retrievable as-is
    pub stored: bool,
    /// Tokenized and searchable
    pub analyzed: bool,
    pub filter: ExactFilter,
    pub sortable: bool,
    /// Keyword terms keep their frequencies so matches can be ranked
    #[serde(default)]
    pub scorable: bool,
    /// Relevance weight, only for analyzed fields
    pub boost: Option<f32>,
}

impl FieldPolicy {
    pub fn is_filterable(&self) -> bool {
        self.filter != ExactFilter::None
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.analyzed && self.kind != FieldKind::Text {
            return Err(SchemaError::AnalyzedNonText(self.name));
        }
        if let Some(boost) = self.boost {
            if !self.analyzed {
                return Err(SchemaError::BoostWithoutAnalysis(self.name));
            }
            if !(boost > 0.0) {
                return Err(SchemaError::InvalidBoost(self.name));
            }
        }
        if self.sortable && self.kind != FieldKind::DateTime {
            return Err(SchemaError::SortableNonDate(self.name));
        }
        if self.filter == ExactFilter::Unique && self.kind != FieldKind::Id {
            return Err(SchemaError::UniqueNonId(self.name));
        }
        if self.scorable && self.kind != FieldKind::Keyword {
            return Err(SchemaError::ScorableNonKeyword(self.name));
        }
        Ok(())
    }
}

/// What happens when a document is added with an id that is already indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Keep every version side by side
    #[default]
    Append,
    /// Delete earlier entries with the same id in the same commit
    Replace,
    /// Skip the new document as a per-record failure
    Reject,
}

/// Field-policy table plus the configuration decisions that go with it.
///
/// Shared by the store (index creation) and the batch writer (document
/// conversion), so both always agree on the field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    policies: [FieldPolicy; 6],
    analyzer: AnalyzerConfig,
    duplicates: DuplicatePolicy,
}

/// Typed handles to the fields of a built tantivy schema
#[derive(Debug, Clone)]
pub struct SchemaFields {
    fields: [Field; 6],
}

impl SchemaFields {
    /// Look up every field by name in an existing tantivy schema
    pub fn resolve(schema: &Schema) -> tantivy::Result<Self> {
        let mut fields = Vec::with_capacity(FieldName::ALL.len());
        for name in FieldName::ALL {
            fields.push(schema.get_field(name.as_str())?);
        }
        let fields: [Field; 6] = fields
            .try_into()
            .map_err(|_| tantivy::TantivyError::SchemaError("Incomplete field set".to_string()))?;
        Ok(Self { fields })
    }

    pub fn get(&self, name: FieldName) -> Field {
        self.fields[name.slot()]
    }
}

fn policy(
    name: FieldName,
    kind: FieldKind,
    stored: bool,
    filter: ExactFilter,
    boost: Option<f32>,
) -> FieldPolicy {
    FieldPolicy {
        name,
        kind,
        stored,
        analyzed: kind == FieldKind::Text,
        filter,
        sortable: kind == FieldKind::DateTime,
        scorable: false,
        boost,
    }
}

fn default_policies() -> [FieldPolicy; 6] {
    [
        policy(FieldName::DocId, FieldKind::Id, true, ExactFilter::Unique, None),
        policy(FieldName::Title, FieldKind::Text, false, ExactFilter::None, Some(2.0)),
        policy(FieldName::Content, FieldKind::Text, true, ExactFilter::None, Some(1.0)),
        policy(FieldName::Timestamp, FieldKind::DateTime, true, ExactFilter::None, None),
        FieldPolicy {
            scorable: true,
            ..policy(FieldName::Author, FieldKind::Keyword, true, ExactFilter::CaseInsensitive, None)
        },
        policy(FieldName::Url, FieldKind::Keyword, true, ExactFilter::CaseInsensitive, None),
    ]
}

/// The document index schema with the default analyzer and append-only ids
pub fn create_schema() -> IndexSchema {
    create_schema_with(AnalyzerConfig::default(), DuplicatePolicy::default())
}

pub fn create_schema_with(analyzer: AnalyzerConfig, duplicates: DuplicatePolicy) -> IndexSchema {
    IndexSchema {
        policies: default_policies(),
        analyzer,
        duplicates,
    }
}

impl IndexSchema {
    /// Build a schema from an arbitrary policy list. Every field must appear
    /// exactly once and each policy must be consistent with its kind.
    pub fn from_policies(
        policies: Vec<FieldPolicy>,
        analyzer: AnalyzerConfig,
        duplicates: DuplicatePolicy,
    ) -> Result<Self, SchemaError> {
        let mut slots: [Option<FieldPolicy>; 6] = Default::default();
        for policy in policies {
            policy.validate()?;
            let slot = &mut slots[policy.name.slot()];
            if slot.is_some() {
                return Err(SchemaError::DuplicateField(policy.name));
            }
            *slot = Some(policy);
        }

        let mut table = default_policies();
        for name in FieldName::ALL {
            table[name.slot()] = slots[name.slot()]
                .take()
                .ok_or(SchemaError::MissingField(name))?;
        }

        Ok(Self {
            policies: table,
            analyzer,
            duplicates,
        })
    }

    pub fn policy(&self, name: FieldName) -> &FieldPolicy {
        &self.policies[name.slot()]
    }

    pub fn policies(&self) -> impl Iterator<Item = &FieldPolicy> {
        self.policies.iter()
    }

    pub fn analyzer_config(&self) -> &AnalyzerConfig {
        &self.analyzer
    }

    pub fn analyzer(&self) -> Analyzer {
        Analyzer::new(self.analyzer.clone())
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicates
    }

    /// Relevance weights of the analyzed fields, for query-side consumers
    pub fn boosts(&self) -> Vec<(FieldName, f32)> {
        self.policies
            .iter()
            .filter_map(|p| p.boost.map(|boost| (p.name, boost)))
            .collect()
    }

    /// Lower the policy table into a tantivy schema
    pub fn build(&self) -> (Schema, SchemaFields) {
        let mut schema_builder = Schema::builder();
        let text_tokenizer = self.analyzer().tokenizer_name();

        let fields = self.policies.clone().map(|policy| {
            let name = policy.name.as_str();
            match policy.kind {
                FieldKind::DateTime => {
                    let mut options = DateOptions::default().set_indexed();
                    if policy.stored {
                        options = options.set_stored();
                    }
                    if policy.sortable {
                        options = options.set_fast();
                    }
                    schema_builder.add_date_field(name, options)
                }
                kind => {
                    let (tokenizer, record) = match kind {
                        FieldKind::Text => (
                            text_tokenizer.as_str(),
                            IndexRecordOption::WithFreqsAndPositions,
                        ),
                        FieldKind::Keyword if policy.scorable => {
                            (KEYWORD_TOKENIZER, IndexRecordOption::WithFreqs)
                        }
                        FieldKind::Keyword => (KEYWORD_TOKENIZER, IndexRecordOption::Basic),
                        _ => ("raw", IndexRecordOption::Basic),
                    };
                    let mut options = TextOptions::default().set_indexing_options(
                        TextFieldIndexing::default()
                            .set_tokenizer(tokenizer)
                            .set_index_option(record),
                    );
                    if policy.stored {
                        options = options.set_stored();
                    }
                    schema_builder.add_text_field(name, options)
                }
            }
        });

        (schema_builder.build(), SchemaFields { fields })
    }
}
