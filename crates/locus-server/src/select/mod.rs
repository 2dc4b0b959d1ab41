// crates/locus-server/src/select/mod.rs
// Dynamic tool selection: rank descriptors by relevance to a user intent

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::registry::{ToolCategory, ToolDescriptor, ToolRegistry};
use crate::utils::fnv1a;

/// Weight per whole-word keyword hit in the intent.
const W_KEYWORD: f64 = 3.0;
/// Weight for a category hinted by the intent-classification rules.
const W_CATEGORY: f64 = 2.0;
/// Weight applied to the descriptor's own priority.
const W_PRIORITY: f64 = 0.1;
/// Weight per context entity matching a schema property role.
const W_CONTEXT: f64 = 1.5;

/// Default number of tools surfaced.
pub const DEFAULT_K: usize = 10;

const CACHE_TTL: Duration = Duration::from_secs(300);

/// Intent tokens that hint a category.
const CATEGORY_HINTS: [(&str, ToolCategory); 18] = [
    ("blast", ToolCategory::External),
    ("translate", ToolCategory::Sequence),
    ("gc", ToolCategory::Sequence),
    ("orf", ToolCategory::Sequence),
    ("codon", ToolCategory::Sequence),
    ("motif", ToolCategory::Sequence),
    ("navigate", ToolCategory::Navigation),
    ("goto", ToolCategory::Navigation),
    ("zoom", ToolCategory::Navigation),
    ("domain", ToolCategory::Protein),
    ("protein", ToolCategory::Protein),
    ("structure", ToolCategory::Protein),
    ("pathway", ToolCategory::Pathway),
    ("plugin", ToolCategory::PluginMgmt),
    ("track", ToolCategory::Data),
    ("annotation", ToolCategory::Data),
    ("generate", ToolCategory::AiGen),
    ("paste", ToolCategory::Action),
];

/// Entity roles a client state snapshot may reference.
const CONTEXT_ROLES: [&str; 6] = [
    "gene",
    "chromosome",
    "region",
    "sequence",
    "position",
    "track",
];

/// Lowercase a token and strip a trailing plural `s`.
fn lemmatize(word: &str) -> String {
    let lower = word.to_lowercase();
    match lower.strip_suffix('s') {
        Some(stem) if stem.len() >= 2 => stem.to_string(),
        _ => lower,
    }
}

/// Whole words of the intent, lemmatized.
fn tokenize(intent: &str) -> HashSet<String> {
    intent
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(lemmatize)
        .collect()
}

/// Roles referenced by the context's current state snapshot.
fn context_roles(context: Option<&Value>) -> HashSet<&'static str> {
    let Some(context) = context else {
        return HashSet::new();
    };
    let state = match context.get("current_state") {
        Some(state) if !state.is_null() => state,
        _ => context,
    };
    CONTEXT_ROLES
        .iter()
        .copied()
        .filter(|role| !state.get(role).map(Value::is_null).unwrap_or(true))
        .collect()
}

fn keyword_hits(desc: &ToolDescriptor, tokens: &HashSet<String>) -> usize {
    desc.keywords
        .iter()
        .filter(|keyword| tokens.contains(&lemmatize(keyword)))
        .count()
}

/// Ranks tool descriptors against a user intent plus optional UI context.
pub struct DynamicSelector {
    registry: Arc<ToolRegistry>,
    cache: moka::future::Cache<String, Arc<Vec<Arc<ToolDescriptor>>>>,
}

impl DynamicSelector {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            cache: moka::future::Cache::builder()
                .time_to_live(CACHE_TTL)
                .max_capacity(1024)
                .build(),
        }
    }

    /// Top-`k` descriptors for the intent. Never empty for a non-empty
    /// catalogue: with zero keyword hits anywhere, the globally
    /// highest-priority tools are returned instead.
    pub async fn select(
        &self,
        intent: &str,
        context: Option<&Value>,
        k: usize,
    ) -> Arc<Vec<Arc<ToolDescriptor>>> {
        let context_hash = context
            .map(|c| fnv1a(&c.to_string()))
            .unwrap_or_default();
        let cache_key = format!("{}\u{0}{context_hash}\u{0}{k}", intent.to_lowercase());
        if let Some(hit) = self.cache.get(&cache_key).await {
            return hit;
        }

        let result = Arc::new(self.rank(intent, context, k));
        self.cache.insert(cache_key, result.clone()).await;
        result
    }

    fn rank(&self, intent: &str, context: Option<&Value>, k: usize) -> Vec<Arc<ToolDescriptor>> {
        let tokens = tokenize(intent);
        let hinted: HashSet<ToolCategory> = CATEGORY_HINTS
            .iter()
            .filter(|(token, _)| tokens.contains(*token))
            .map(|(_, category)| *category)
            .collect();
        let roles = context_roles(context);

        let all = self.registry.list(None);
        let any_keyword_hit = all.iter().any(|d| keyword_hits(d, &tokens) > 0);

        let mut scored: Vec<(f64, Arc<ToolDescriptor>)> = all
            .into_iter()
            .map(|desc| {
                let score = if any_keyword_hit {
                    let mut score = W_KEYWORD * keyword_hits(&desc, &tokens) as f64;
                    if hinted.contains(&desc.category) {
                        score += W_CATEGORY;
                    }
                    score += W_PRIORITY * desc.priority as f64;
                    for role in &roles {
                        if desc.schema.properties.contains_key(*role) {
                            score += W_CONTEXT;
                        }
                    }
                    score
                } else {
                    // No keyword matched anywhere: fall back to priority so
                    // the client never sees an empty list.
                    desc.priority as f64
                };
                (score, desc)
            })
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.priority.cmp(&a.priority))
                .then(a.name.cmp(&b.name))
        });
        scored
            .into_iter()
            .take(k.max(1))
            .map(|(_, desc)| desc)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> DynamicSelector {
        let registry = Arc::new(ToolRegistry::load_catalog().unwrap());
        DynamicSelector::new(registry)
    }

    #[tokio::test]
    async fn gc_intent_surfaces_compute_gc() {
        let selector = selector();
        let picked = selector
            .select("what is the gc content of this sequence", None, 5)
            .await;
        assert!(
            picked.iter().any(|d| d.name == "compute_gc"),
            "got: {:?}",
            picked.iter().map(|d| &d.name).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn blast_intent_prefers_external_category() {
        let selector = selector();
        let picked = selector.select("run a blast homology search", None, 5).await;
        assert_eq!(picked[0].name, "blast_search");
    }

    #[tokio::test]
    async fn plural_keywords_are_lemmatized() {
        let selector = selector();
        let picked = selector.select("find orfs", None, 10).await;
        assert!(picked.iter().any(|d| d.name == "find_orfs"));
    }

    #[tokio::test]
    async fn no_match_returns_highest_priority_tools() {
        let selector = selector();
        let picked = selector.select("xyzzy quux", None, 10).await;
        assert_eq!(picked.len(), 10, "fallback must not be empty");
        // Fallback is priority-ordered; the top entry carries max priority.
        let top = picked[0].priority;
        assert!(picked.iter().all(|d| d.priority <= top));
    }

    #[tokio::test]
    async fn context_boost_prefers_matching_schema() {
        let selector = selector();
        let context = serde_json::json!({
            "current_state": {"chromosome": "chr1", "position": 12345}
        });
        let with_ctx = selector
            .select("move the view", Some(&context), 5)
            .await;
        assert!(
            with_ctx
                .iter()
                .any(|d| d.schema.properties.contains_key("chromosome")),
            "expected a chromosome-taking tool near the top"
        );
    }

    #[tokio::test]
    async fn result_is_cached() {
        let selector = selector();
        let first = selector.select("translate this dna", None, 5).await;
        let second = selector.select("translate this dna", None, 5).await;
        assert!(Arc::ptr_eq(&first, &second), "second call hits the cache");
    }

    #[test]
    fn lemmatizer_strips_plural_only() {
        assert_eq!(lemmatize("domains"), "domain");
        assert_eq!(lemmatize("GC"), "gc");
        assert_eq!(lemmatize("as"), "as", "two-letter words keep their s");
    }
}
