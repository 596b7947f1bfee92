//! Purpose type registry.
//!
//! Every consent purpose carries a type tag. The tag selects a handler that
//! knows which attributes that kind of purpose must carry and how to normalize
//! them before they are stored. The set of handlers is closed and fixed at
//! startup; the registry is built once and shared read-only afterwards.

use crate::errors::{ConsentError, FieldError};
use std::collections::{BTreeMap, HashMap};

pub const TYPE_STRING: &str = "string";
pub const TYPE_JSON_SCHEMA: &str = "json-schema";
pub const TYPE_ATTRIBUTE: &str = "attribute";

pub const ATTR_VALIDATION_SCHEMA: &str = "validationSchema";
pub const ATTR_RESOURCE_PATH: &str = "resourcePath";
pub const ATTR_JSON_PATH: &str = "jsonPath";

/// Type-specific attribute bag of a purpose.
pub type PurposeAttributes = BTreeMap<String, String>;

/// The handlers known to the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurposeTypeHandler {
    /// Free-form purpose, any attributes accepted.
    String,
    /// Carries a `validationSchema` that must be well-formed JSON.
    JsonSchema,
    /// Points at a value inside a resource via `resourcePath` and `jsonPath`.
    Attribute,
}

impl PurposeTypeHandler {
    pub fn type_tag(&self) -> &'static str {
        match self {
            PurposeTypeHandler::String => TYPE_STRING,
            PurposeTypeHandler::JsonSchema => TYPE_JSON_SCHEMA,
            PurposeTypeHandler::Attribute => TYPE_ATTRIBUTE,
        }
    }

    pub fn validate(&self, attributes: &PurposeAttributes) -> Vec<FieldError> {
        let mut errors = Vec::new();
        match self {
            PurposeTypeHandler::String => {}
            PurposeTypeHandler::JsonSchema => match attributes.get(ATTR_VALIDATION_SCHEMA) {
                None => errors.push(FieldError::new(
                    ATTR_VALIDATION_SCHEMA,
                    "is required for json-schema purposes",
                )),
                Some(schema) if schema.trim().is_empty() => errors.push(FieldError::new(
                    ATTR_VALIDATION_SCHEMA,
                    "must not be empty",
                )),
                Some(schema) => {
                    if let Err(e) = serde_json::from_str::<serde_json::Value>(schema) {
                        errors.push(FieldError::new(
                            ATTR_VALIDATION_SCHEMA,
                            format!("is not valid JSON: {e}"),
                        ));
                    }
                }
            },
            PurposeTypeHandler::Attribute => {
                for key in [ATTR_RESOURCE_PATH, ATTR_JSON_PATH] {
                    match attributes.get(key) {
                        Some(v) if !v.trim().is_empty() => {}
                        Some(_) => errors.push(FieldError::new(key, "must not be empty")),
                        None => errors.push(FieldError::new(
                            key,
                            "is required for attribute purposes",
                        )),
                    }
                }
            }
        }
        errors
    }

    pub fn normalize(&self, attributes: PurposeAttributes) -> PurposeAttributes {
        match self {
            PurposeTypeHandler::String => attributes,
            // Store the schema in compact form so equal schemas compare equal
            PurposeTypeHandler::JsonSchema => attributes
                .into_iter()
                .map(|(k, v)| {
                    if k == ATTR_VALIDATION_SCHEMA {
                        let compact = serde_json::from_str::<serde_json::Value>(&v)
                            .ok()
                            .and_then(|json| serde_json::to_string(&json).ok())
                            .unwrap_or(v);
                        (k, compact)
                    } else {
                        (k, v)
                    }
                })
                .collect(),
            PurposeTypeHandler::Attribute => attributes
                .into_iter()
                .map(|(k, v)| {
                    if k == ATTR_RESOURCE_PATH || k == ATTR_JSON_PATH {
                        (k, v.trim().to_string())
                    } else {
                        (k, v)
                    }
                })
                .collect(),
        }
    }
}

/// Immutable lookup table from type tag to handler.
#[derive(Debug, Clone, Default)]
pub struct PurposeTypeRegistry {
    handlers: HashMap<String, PurposeTypeHandler>,
}

impl PurposeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `string`, `json-schema` and `attribute` handlers.
    pub fn with_builtin_types() -> Self {
        let handlers = [
            PurposeTypeHandler::String,
            PurposeTypeHandler::JsonSchema,
            PurposeTypeHandler::Attribute,
        ]
        .into_iter()
        .map(|handler| (handler.type_tag().to_string(), handler))
        .collect();
        Self { handlers }
    }

    pub fn register(
        &mut self,
        type_tag: &str,
        handler: PurposeTypeHandler,
    ) -> Result<(), ConsentError> {
        if self.handlers.contains_key(type_tag) {
            return Err(ConsentError::Conflict(format!(
                "purpose type `{type_tag}` is already registered"
            )));
        }
        self.handlers.insert(type_tag.to_string(), handler);
        Ok(())
    }

    pub fn get(&self, type_tag: &str) -> Result<PurposeTypeHandler, ConsentError> {
        self.handlers.get(type_tag).copied().ok_or_else(|| {
            ConsentError::invalid_fields(
                "unknown purpose type",
                vec![FieldError::new(
                    "type",
                    format!("purpose type `{type_tag}` is not registered"),
                )],
            )
        })
    }

    /// Validates the attribute bag for `type_tag` and returns it normalized.
    pub fn check(
        &self,
        type_tag: &str,
        attributes: PurposeAttributes,
    ) -> Result<PurposeAttributes, ConsentError> {
        let handler = self.get(type_tag)?;
        let errors = handler.validate(&attributes);
        if !errors.is_empty() {
            return Err(ConsentError::invalid_fields(
                format!("invalid attributes for purpose type `{type_tag}`"),
                errors,
            ));
        }
        Ok(handler.normalize(attributes))
    }

    pub fn type_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.handlers.keys().cloned().collect();
        tags.sort();
        tags
    }
}
