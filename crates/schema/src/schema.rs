use std::collections::HashMap;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::field::FieldDefinition;
use crate::pagination::PaginationRule;

/// Which fetch path a schema is dispatched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Http,
    Browser,
}

/// A single step of a browser-mode pre-extraction navigation script.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationStep {
    pub action: NavigationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub wait_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationAction {
    Goto,
    Click,
    Scroll,
    Wait,
    Input,
    Hover,
    Select,
    Screenshot,
}

/// A declarative description of how to locate and normalize records on a
/// class of pages.
///
/// A schema is immutable within a `version`; callers that need to change
/// selectors or fields construct a new `ParsingSchema` with an incremented
/// `version` rather than mutating one in place, matching the versioning
/// invariant in the owning schema service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingSchema {
    pub schema_id: Uuid,
    pub version: u32,
    pub source_id: String,
    pub start_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_container: Option<String>,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub navigation_steps: Vec<NavigationStep>,
    #[serde(default = "PaginationRule::none")]
    pub pagination: PaginationRule,
    #[serde(default)]
    pub min_fields_required: usize,
    #[serde(default)]
    pub dedup_keys: Vec<String>,
    pub mode: FetchMode,
    #[serde(default)]
    pub requires_js: bool,
    #[serde(default)]
    pub request_headers: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl ParsingSchema {
    pub fn new(
        schema_id: Uuid,
        version: u32,
        source_id: impl Into<String>,
        start_url: impl Into<String>,
        fields: Vec<FieldDefinition>,
        mode: FetchMode,
    ) -> Self {
        Self {
            schema_id,
            version,
            source_id: source_id.into(),
            start_url: start_url.into(),
            url_pattern: None,
            item_container: None,
            fields,
            navigation_steps: Vec::new(),
            pagination: PaginationRule::none(),
            min_fields_required: 0,
            dedup_keys: Vec::new(),
            mode,
            requires_js: false,
            request_headers: HashMap::new(),
            is_active: true,
        }
    }

    pub fn with_item_container(mut self, selector: impl Into<String>) -> Self {
        self.item_container = Some(selector.into());
        self
    }

    pub fn with_pagination(mut self, pagination: PaginationRule) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn with_min_fields_required(mut self, min_fields_required: usize) -> Self {
        self.min_fields_required = min_fields_required;
        self
    }

    pub fn with_dedup_keys<I, S>(mut self, dedup_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dedup_keys = dedup_keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_navigation_steps(mut self, steps: Vec<NavigationStep>) -> Self {
        self.navigation_steps = steps;
        self
    }

    pub fn with_request_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validates the structural invariants that must hold for any schema
    /// regardless of where it came from: unique field names, every
    /// `dedup_keys` entry naming a real field, a non-empty field list, valid
    /// selector/validation regexes, and a self-consistent pagination rule.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::NoFields);
        }

        let mut seen = IndexSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::DuplicateField(field.name.clone()));
            }
            if let Some(pattern) = &field.validation_regex {
                regex::Regex::new(pattern).map_err(|source| Error::InvalidSelector {
                    field: field.name.clone(),
                    source,
                })?;
            }
        }

        for key in &self.dedup_keys {
            if !seen.contains(key.as_str()) {
                return Err(Error::UnknownDedupKey(key.clone()));
            }
        }

        self.pagination.validate()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{ExtractionMethod, FieldType};

    fn sample_field(name: &str) -> FieldDefinition {
        FieldDefinition::new(name, FieldType::String, ExtractionMethod::Css, ".name")
    }

    fn sample_schema(fields: Vec<FieldDefinition>) -> ParsingSchema {
        ParsingSchema::new(
            Uuid::nil(),
            1,
            "demo-source",
            "https://example.com",
            fields,
            FetchMode::Http,
        )
    }

    #[test]
    fn rejects_duplicate_field_names() {
        let schema = sample_schema(vec![sample_field("title"), sample_field("title")]);
        assert!(matches!(schema.validate(), Err(Error::DuplicateField(_))));
    }

    #[test]
    fn rejects_empty_field_list() {
        let schema = sample_schema(vec![]);
        assert!(matches!(schema.validate(), Err(Error::NoFields)));
    }

    #[test]
    fn rejects_unknown_dedup_key() {
        let schema = sample_schema(vec![sample_field("title")])
            .with_dedup_keys(["missing_field"]);
        assert!(matches!(schema.validate(), Err(Error::UnknownDedupKey(_))));
    }

    #[test]
    fn accepts_well_formed_schema() {
        let schema = sample_schema(vec![sample_field("title")]).with_dedup_keys(["title"]);
        assert!(schema.validate().is_ok());
    }
}
