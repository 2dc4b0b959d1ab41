// crates/locus-server/src/registry/mod.rs
// Tool registry: descriptors, indexing, and the declarative catalogue

pub mod catalog;
pub mod schema;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{BrokerError, Result};
use schema::{ParamSchema, ParamType, PropertySpec};

/// Closed set of tool categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolCategory {
    Navigation,
    Sequence,
    Data,
    Protein,
    Database,
    AiGen,
    Pathway,
    Action,
    PluginMgmt,
    Coordination,
    External,
}

impl ToolCategory {
    pub const ALL: [ToolCategory; 11] = [
        ToolCategory::Navigation,
        ToolCategory::Sequence,
        ToolCategory::Data,
        ToolCategory::Protein,
        ToolCategory::Database,
        ToolCategory::AiGen,
        ToolCategory::Pathway,
        ToolCategory::Action,
        ToolCategory::PluginMgmt,
        ToolCategory::Coordination,
        ToolCategory::External,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolCategory::Navigation => "navigation",
            ToolCategory::Sequence => "sequence",
            ToolCategory::Data => "data",
            ToolCategory::Protein => "protein",
            ToolCategory::Database => "database",
            ToolCategory::AiGen => "ai_gen",
            ToolCategory::Pathway => "pathway",
            ToolCategory::Action => "action",
            ToolCategory::PluginMgmt => "plugin-mgmt",
            ToolCategory::Coordination => "coordination",
            ToolCategory::External => "external",
        }
    }

    pub fn parse(s: &str) -> Option<ToolCategory> {
        Self::ALL.iter().copied().find(|c| c.as_str() == s)
    }
}

/// Where a tool executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionSide {
    /// In-process handler, possibly fronting an upstream REST API.
    Server,
    /// Forwarded to a connected interactive client over WebSocket.
    Client,
}

/// Immutable description of one tool. Built once at registry load.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub side: ExecutionSide,
    /// Higher priority tools are surfaced first by the dynamic selector.
    pub priority: i32,
    pub keywords: Vec<String>,
    pub schema: ParamSchema,
    /// Dispatch goes through the task manager when set.
    pub long_running: bool,
    /// Results may be served from the content-addressed cache.
    /// Never set for client-side tools or tools with client side effects.
    pub cacheable: bool,
    /// Pure in-process computation: no network, tight 5 s deadline.
    pub local: bool,
}

/// Fluent builder for `ToolDescriptor`, used by the catalogue modules.
pub struct ToolSpec {
    desc: ToolDescriptor,
}

impl ToolSpec {
    pub fn server(name: &str, category: ToolCategory) -> Self {
        Self::new(name, category, ExecutionSide::Server)
    }

    pub fn client(name: &str, category: ToolCategory) -> Self {
        Self::new(name, category, ExecutionSide::Client)
    }

    fn new(name: &str, category: ToolCategory, side: ExecutionSide) -> Self {
        Self {
            desc: ToolDescriptor {
                name: name.to_string(),
                description: String::new(),
                category,
                side,
                priority: 5,
                keywords: Vec::new(),
                schema: ParamSchema::default(),
                long_running: false,
                // Client calls mutate UI state and must never be cached.
                cacheable: side == ExecutionSide::Server,
                local: false,
            },
        }
    }

    pub fn describe(mut self, text: &str) -> Self {
        self.desc.description = text.to_string();
        self
    }

    pub fn keywords(mut self, words: &[&str]) -> Self {
        self.desc.keywords = words.iter().map(|w| w.to_string()).collect();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.desc.priority = priority;
        self
    }

    pub fn long_running(mut self) -> Self {
        self.desc.long_running = true;
        self
    }

    /// Mark as pure local computation (deterministic, no network).
    pub fn local(mut self) -> Self {
        self.desc.local = true;
        self
    }

    /// Opt out of result caching (server-side tools with side effects).
    pub fn no_cache(mut self) -> Self {
        self.desc.cacheable = false;
        self
    }

    pub fn required(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.property(name, kind, description, true, None, None)
    }

    pub fn optional(self, name: &str, kind: ParamType, description: &str) -> Self {
        self.property(name, kind, description, false, None, None)
    }

    pub fn optional_default(
        self,
        name: &str,
        kind: ParamType,
        description: &str,
        default: Value,
    ) -> Self {
        self.property(name, kind, description, false, None, Some(default))
    }

    pub fn enumerated(
        self,
        name: &str,
        description: &str,
        allowed: &[Value],
        default: Option<Value>,
    ) -> Self {
        self.property(
            name,
            ParamType::String,
            description,
            false,
            Some(allowed.to_vec()),
            default,
        )
    }

    fn property(
        mut self,
        name: &str,
        kind: ParamType,
        description: &str,
        required: bool,
        allowed: Option<Vec<Value>>,
        default: Option<Value>,
    ) -> Self {
        self.desc.schema.properties.insert(
            name.to_string(),
            PropertySpec {
                kind,
                description: description.to_string(),
                allowed,
                default,
            },
        );
        if required {
            self.desc.schema.required.push(name.to_string());
        }
        self
    }

    fn build(self) -> ToolDescriptor {
        self.desc
    }
}

/// Optional filter for `ToolRegistry::list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<ToolCategory>,
    /// Case-insensitive substring matched against name and keywords.
    pub query: Option<String>,
}

/// Holds every registered tool, immutable after load.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the full declarative catalogue. Fatal on any invalid descriptor.
    pub fn load_catalog() -> Result<Self> {
        let mut registry = Self::new();
        catalog::register_all(&mut registry)?;
        Ok(registry)
    }

    /// Register one descriptor. Duplicate names and malformed schemas are
    /// startup errors.
    pub fn register(&mut self, spec: ToolSpec) -> Result<()> {
        let desc = spec.build();
        if desc.name.is_empty() {
            return Err(BrokerError::Internal(
                "tool descriptor with empty name".to_string(),
            ));
        }
        if let Err(reason) = desc.schema.check_invariants() {
            return Err(BrokerError::Internal(format!(
                "invalid schema for tool `{}`: {reason}",
                desc.name
            )));
        }
        if self.tools.contains_key(&desc.name) {
            return Err(BrokerError::Internal(format!(
                "duplicate tool name `{}`",
                desc.name
            )));
        }
        self.tools.insert(desc.name.clone(), Arc::new(desc));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolDescriptor>> {
        self.tools.get(name).cloned()
    }

    /// All descriptors matching the filter, sorted by name for stable output.
    pub fn list(&self, filter: Option<&ListFilter>) -> Vec<Arc<ToolDescriptor>> {
        let mut out: Vec<Arc<ToolDescriptor>> = self
            .tools
            .values()
            .filter(|desc| match filter {
                None => true,
                Some(f) => {
                    if let Some(category) = f.category
                        && desc.category != category
                    {
                        return false;
                    }
                    if let Some(query) = &f.query {
                        let query = query.to_lowercase();
                        let in_name = desc.name.to_lowercase().contains(&query);
                        let in_keywords = desc
                            .keywords
                            .iter()
                            .any(|k| k.to_lowercase().contains(&query));
                        return in_name || in_keywords;
                    }
                    true
                }
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Tool count per category.
    pub fn categories(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for desc in self.tools.values() {
            *counts.entry(desc.category.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec::server(name, ToolCategory::Sequence)
            .describe("test tool")
            .keywords(&["test"])
    }

    #[test]
    fn duplicate_names_are_fatal() {
        let mut reg = ToolRegistry::new();
        reg.register(spec("compute_gc")).unwrap();
        let err = reg.register(spec("compute_gc")).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn required_must_be_declared() {
        let mut reg = ToolRegistry::new();
        let mut bad = spec("broken");
        bad.desc.schema.required.push("ghost".to_string());
        let err = reg.register(bad).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn list_filters_by_category_and_query() {
        let mut reg = ToolRegistry::new();
        reg.register(
            ToolSpec::client("navigate_to_position", ToolCategory::Navigation)
                .keywords(&["navigate", "goto"]),
        )
        .unwrap();
        reg.register(spec("compute_gc")).unwrap();

        let by_cat = reg.list(Some(&ListFilter {
            category: Some(ToolCategory::Navigation),
            query: None,
        }));
        assert_eq!(by_cat.len(), 1);
        assert_eq!(by_cat[0].name, "navigate_to_position");

        let by_query = reg.list(Some(&ListFilter {
            category: None,
            query: Some("GOTO".to_string()),
        }));
        assert_eq!(by_query.len(), 1);
    }

    #[test]
    fn full_catalog_loads() {
        let reg = ToolRegistry::load_catalog().unwrap();
        assert!(reg.len() >= 70, "catalogue has {} tools", reg.len());
        // every category is populated
        let counts = reg.categories();
        for cat in ToolCategory::ALL {
            assert!(
                counts.contains_key(cat.as_str()),
                "category {} is empty",
                cat.as_str()
            );
        }
    }

    #[test]
    fn client_tools_are_never_cacheable() {
        let reg = ToolRegistry::load_catalog().unwrap();
        for desc in reg.list(None) {
            if desc.side == ExecutionSide::Client {
                assert!(!desc.cacheable, "{} must not be cacheable", desc.name);
            }
        }
    }
}
