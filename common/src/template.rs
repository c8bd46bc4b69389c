// Query template document model
//
// A template is a YAML document holding one or more named SQL statement
// skeletons ("subjects") that share filter, sort and paging context.

use crate::errors::TemplateError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Subject key with scalar-count semantics
pub const TOTAL_SUBJECT: &str = "total";

/// Parsed template document
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Template {
    pub composition: Composition,
    /// Pipeline extension points enabled by this template, in addition to
    /// the ones every request enables
    #[serde(default)]
    pub pipelines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Composition {
    /// Subject key → raw SQL skeleton; ordered so iteration is deterministic
    pub subject: BTreeMap<String, String>,
    /// Caller attribute name → SQL column expression
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Template {
    /// Parse a template document
    #[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
    pub fn parse(bytes: &[u8]) -> Result<Self, TemplateError> {
        let template: Template = serde_yaml::from_slice(bytes)?;

        if template.composition.subject.is_empty() {
            return Err(TemplateError::NoSubjects);
        }
        for (key, sql) in &template.composition.subject {
            if key.trim().is_empty() {
                return Err(TemplateError::InvalidDocument(
                    "subject keys cannot be blank".to_string(),
                ));
            }
            if sql.trim().is_empty() {
                return Err(TemplateError::EmptySubject(key.clone()));
            }
        }

        tracing::debug!(
            subjects = template.composition.subject.len(),
            fields = template.composition.fields.len(),
            "Parsed template"
        );
        Ok(template)
    }

    /// Subject keys in iteration order
    pub fn subject_keys(&self) -> impl Iterator<Item = &str> {
        self.composition.subject.keys().map(String::as_str)
    }

    pub fn subject(&self, key: &str) -> Option<&str> {
        self.composition.subject.get(key).map(String::as_str)
    }

    /// Column expression a caller attribute maps to, if the template maps it
    pub fn field(&self, attr: &str) -> Option<&str> {
        self.composition.fields.get(attr).map(String::as_str)
    }
}
