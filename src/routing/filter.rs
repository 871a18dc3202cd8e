//! Message filter predicates.
//!
//! A filter is a pure predicate over message attributes. Regex patterns are
//! compiled and validated when the filter is created or updated; evaluation
//! never fails and never mutates anything. Match counters and last-match
//! timestamps are follow-up writes owned by the caller.

use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::message::MessageContext;

/// Filter type: which message attribute the filter inspects by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Destination,
    Source,
    ShortCode,
    Content,
    Tag,
    User,
    Group,
}

impl FilterType {
    /// The message attribute this filter type inspects
    pub fn attribute(&self) -> &'static str {
        match self {
            FilterType::Destination => "destination",
            FilterType::Source => "source",
            FilterType::ShortCode => "short_code",
            FilterType::Content => "content",
            FilterType::Tag => "tag",
            FilterType::User => "user",
            FilterType::Group => "group",
        }
    }
}

/// A filter definition as stored in the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    /// Unique filter id
    pub fid: String,
    /// Owning tenant
    pub tenant: String,
    pub filter_type: FilterType,
    /// Attribute name to inspect; defaults to the type's attribute
    pub parameter: String,
    /// Literal substring or regex pattern
    pub value: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default = "default_true")]
    pub is_case_sensitive: bool,
    #[serde(default)]
    pub negate: bool,
    /// Matches observed so far (caller-reported)
    #[serde(default)]
    pub matches_count: u64,
    /// Last caller-reported match
    #[serde(default)]
    pub last_match: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Error raised when a filter definition cannot be compiled
#[derive(Debug, thiserror::Error)]
pub enum FilterConfigError {
    #[error("invalid regex pattern for filter {fid}: {source}")]
    InvalidRegex {
        fid: String,
        #[source]
        source: regex::Error,
    },

    #[error("filter {fid} has an empty parameter")]
    EmptyParameter { fid: String },
}

/// A validated, evaluation-ready filter.
///
/// Compilation happens at write time; [`CompiledFilter::matches`] is pure
/// and safe to call concurrently.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    definition: Filter,
    regex: Option<Arc<regex::Regex>>,
    /// Lowercased value for case-insensitive substring matching
    folded_value: Option<String>,
}

impl CompiledFilter {
    /// Validate and compile a filter definition.
    pub fn compile(definition: Filter) -> Result<Self, FilterConfigError> {
        if definition.parameter.is_empty() {
            return Err(FilterConfigError::EmptyParameter {
                fid: definition.fid.clone(),
            });
        }

        let regex = if definition.is_regex {
            let compiled = RegexBuilder::new(&definition.value)
                .case_insensitive(!definition.is_case_sensitive)
                .build()
                .map_err(|source| FilterConfigError::InvalidRegex {
                    fid: definition.fid.clone(),
                    source,
                })?;
            Some(Arc::new(compiled))
        } else {
            None
        };

        let folded_value = if !definition.is_regex && !definition.is_case_sensitive {
            Some(definition.value.to_lowercase())
        } else {
            None
        };

        Ok(Self {
            definition,
            regex,
            folded_value,
        })
    }

    /// The underlying definition
    pub fn definition(&self) -> &Filter {
        &self.definition
    }

    pub fn fid(&self) -> &str {
        &self.definition.fid
    }

    /// Evaluate against a message. Missing attributes read as empty string.
    pub fn matches(&self, message: &MessageContext) -> bool {
        let attribute = message.get(&self.definition.parameter);

        let matched = match &self.regex {
            Some(regex) => regex.is_match(attribute),
            None => {
                if let Some(folded) = &self.folded_value {
                    attribute.to_lowercase().contains(folded)
                } else {
                    attribute.contains(&self.definition.value)
                }
            }
        };

        if self.definition.negate {
            !matched
        } else {
            matched
        }
    }
}
