//! Template model resolution from source records

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SourceRecord;
use crate::{error::ResolveError, types::TemplateModel};

/// Where a template variable takes its value from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldSource {
    /// Dotted path into the record's fields, e.g. `company.name` or `tags.0`.
    /// `email` and `id` fall back to the record's own address and identifier.
    Field(String),
    /// Key of the session-wide resolve context (campaign name, event date, ...)
    Context(String),
    Literal(Value),
}

/// Binds one template variable to a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub variable: String,
    pub source: FieldSource,
    /// Used when the source yields nothing
    #[serde(default)]
    pub fallback: Option<Value>,
    /// Fail resolution instead of emitting `null`
    #[serde(default)]
    pub required: bool,
}

impl FieldMapping {
    #[must_use]
    pub fn field(variable: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            source: FieldSource::Field(path.into()),
            fallback: None,
            required: false,
        }
    }

    #[must_use]
    pub fn context(variable: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            source: FieldSource::Context(key.into()),
            fallback: None,
            required: false,
        }
    }

    #[must_use]
    pub fn literal(variable: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            variable: variable.into(),
            source: FieldSource::Literal(value.into()),
            fallback: None,
            required: false,
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: impl Into<Value>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Values shared by every recipient of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolveContext(serde_json::Map<String, Value>);

impl ResolveContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Turns a source record into the key/value model a template is rendered with
pub trait TemplateResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if a required variable has no value or a mapping is
    /// malformed.
    fn resolve(
        &self,
        mappings: &[FieldMapping],
        record: &SourceRecord,
        context: &ResolveContext,
    ) -> Result<TemplateModel, ResolveError>;
}

/// Resolves mappings by walking dotted paths into the record's fields
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldPathResolver;

impl FieldPathResolver {
    fn lookup(record: &SourceRecord, path: &str) -> Result<Option<Value>, ResolveError> {
        if path.is_empty() || path.split('.').any(str::is_empty) {
            return Err(ResolveError::InvalidPath(path.to_string()));
        }

        let mut segments = path.split('.');
        let mut current = segments
            .next()
            .and_then(|first| record.fields.get(first));

        for segment in segments {
            current = current.and_then(|value| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            });
        }

        let found = current.filter(|value| !value.is_null()).cloned();

        Ok(found.or_else(|| match path {
            "email" => record.email.clone().map(Value::String),
            "id" => Some(Value::String(record.id.to_string())),
            _ => None,
        }))
    }
}

impl TemplateResolver for FieldPathResolver {
    fn resolve(
        &self,
        mappings: &[FieldMapping],
        record: &SourceRecord,
        context: &ResolveContext,
    ) -> Result<TemplateModel, ResolveError> {
        let mut model = TemplateModel::new();

        for mapping in mappings {
            let value = match &mapping.source {
                FieldSource::Field(path) => Self::lookup(record, path)?,
                FieldSource::Context(key) => context.get(key).filter(|v| !v.is_null()).cloned(),
                FieldSource::Literal(value) => Some(value.clone()),
            };

            let value = match value.or_else(|| mapping.fallback.clone()) {
                Some(value) => value,
                None if mapping.required => {
                    return Err(ResolveError::MissingField {
                        variable: mapping.variable.clone(),
                    });
                }
                None => Value::Null,
            };

            model.insert(mapping.variable.clone(), value);
        }

        Ok(model)
    }
}
