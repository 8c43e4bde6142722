//! Capability registry
//!
//! Capabilities are named external functions a plan may invoke. They are
//! organised in groups; perception narrows a turn to a subset of groups and
//! the planner only sees descriptors from that subset.

pub mod math;
pub mod web;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use cortex_config::Config;

use crate::Fault;

/// Capability-side errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("capability '{0}' not found")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Provider(String),
}

impl CapabilityError {
    /// Lift into the loop's fault taxonomy
    pub fn into_fault(self, capability: &str) -> Fault {
        match self {
            CapabilityError::NotFound(id) => Fault::CapabilityNotFound(id),
            CapabilityError::InvalidArgs(reason) => Fault::CapabilityInvalidArgs {
                capability: capability.to_string(),
                reason,
            },
            CapabilityError::Provider(reason) => Fault::CapabilityProviderError {
                capability: capability.to_string(),
                reason,
            },
        }
    }
}

/// One piece of capability output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ContentItem {
    Text(String),
    Json(Value),
}

/// Ordered content items returned by a capability
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CapabilityOutput {
    pub items: Vec<ContentItem>,
}

impl CapabilityOutput {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            items: vec![ContentItem::Text(text.into())],
        }
    }

    pub fn from_json(value: Value) -> Self {
        Self {
            items: vec![ContentItem::Json(value)],
        }
    }

    /// Items rendered in order: strings verbatim, JSON compactly
    pub fn text(&self) -> String {
        self.items
            .iter()
            .map(|item| match item {
                ContentItem::Text(text) => text.clone(),
                ContentItem::Json(value) => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First JSON item, or the rendered text when it parses as JSON
    pub fn structured(&self) -> Option<Value> {
        self.items
            .iter()
            .find_map(|item| match item {
                ContentItem::Json(value) => Some(value.clone()),
                ContentItem::Text(_) => None,
            })
            .or_else(|| serde_json::from_str(&self.text()).ok())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A named external function
#[async_trait]
pub trait Capability: Send + Sync {
    fn id(&self) -> &str;
    fn group(&self) -> &str;
    /// Human-readable usage contract shown to the planner
    fn usage(&self) -> &str;
    /// JSON-schema-like object describing the accepted arguments
    fn input_schema(&self) -> Value;
    async fn invoke(&self, args: Value) -> Result<CapabilityOutput, CapabilityError>;
}

/// A selectable set of capabilities
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityGroup {
    pub id: String,
    pub description: String,
}

/// Registry-owned description of a capability
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapabilityDescriptor {
    pub id: String,
    pub group: String,
    pub usage: String,
    pub input_schema: Value,
}

struct Entry {
    descriptor: CapabilityDescriptor,
    capability: Arc<dyn Capability>,
}

/// Insertion-ordered catalog of capabilities
#[derive(Default)]
pub struct CapabilityRegistry {
    groups: Vec<CapabilityGroup>,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a group; re-declaring replaces the description
    pub fn register_group(&mut self, id: impl Into<String>, description: impl Into<String>) {
        let id = id.into();
        let description = description.into();
        match self.groups.iter_mut().find(|g| g.id == id) {
            Some(group) => group.description = description,
            None => self.groups.push(CapabilityGroup { id, description }),
        }
    }

    /// Register a capability. An undeclared group is declared on the fly;
    /// an existing id is replaced in place.
    pub fn register<C: Capability + 'static>(&mut self, capability: C) {
        let descriptor = CapabilityDescriptor {
            id: capability.id().to_string(),
            group: capability.group().to_string(),
            usage: capability.usage().to_string(),
            input_schema: capability.input_schema(),
        };

        if !self.groups.iter().any(|g| g.id == descriptor.group) {
            let group = descriptor.group.clone();
            self.register_group(group.clone(), group);
        }

        debug!("Registered capability: {} ({})", descriptor.id, descriptor.group);
        let entry = Entry {
            descriptor,
            capability: Arc::new(capability),
        };
        match self.index.get(&entry.descriptor.id).copied() {
            Some(idx) => self.entries[idx] = entry,
            None => {
                self.index
                    .insert(entry.descriptor.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn describe(&self) -> Vec<&CapabilityDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    pub fn groups(&self) -> &[CapabilityGroup] {
        &self.groups
    }

    pub fn group_ids(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.id.clone()).collect()
    }

    /// Descriptors belonging to any of `groups`, in registration order
    pub fn describe_groups(&self, groups: &[String]) -> Vec<&CapabilityDescriptor> {
        self.entries
            .iter()
            .map(|e| &e.descriptor)
            .filter(|d| groups.iter().any(|g| g == &d.group))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&CapabilityDescriptor> {
        self.index.get(id).map(|&idx| &self.entries[idx].descriptor)
    }

    pub fn has(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a capability and check `args` against its input schema
    pub fn resolve(&self, id: &str, args: &Value) -> Result<Arc<dyn Capability>, CapabilityError> {
        let entry = self
            .index
            .get(id)
            .map(|&idx| &self.entries[idx])
            .ok_or_else(|| CapabilityError::NotFound(id.to_string()))?;
        check_args(&entry.descriptor.input_schema, args).map_err(CapabilityError::InvalidArgs)?;
        Ok(Arc::clone(&entry.capability))
    }

    pub async fn invoke(&self, id: &str, args: Value) -> Result<CapabilityOutput, CapabilityError> {
        let capability = self.resolve(id, &args)?;
        capability.invoke(args).await
    }
}

/// Shallow input-shape check: object args, required keys present and
/// primitive `type` declarations honoured
pub fn check_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(object) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !object.contains_key(key) {
                return Err(format!("missing required argument '{}'", key));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in object {
            let Some(expected) = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(|t| t.as_str())
            else {
                continue;
            };
            if !type_matches(expected, value) {
                return Err(format!("argument '{}' must be of type {}", key, expected));
            }
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Registry with the built-in groups enabled in `config`
pub fn default_registry(config: &Config) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();

    if config.capabilities.group_enabled(math::GROUP) {
        math::register(&mut registry);
    }
    if config.capabilities.group_enabled(web::GROUP) {
        web::register(&mut registry, config);
    }

    registry
}
