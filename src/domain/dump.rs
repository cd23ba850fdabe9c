//! Graph dump and change feed consumed by the visualization tool.
//!
//! Both documents are keyed by the normalized class name. Normalization is
//! `/` to `.`, which is pure and idempotent.

use crate::domain::builder::DiscoveredGraph;
use crate::domain::error::BindingError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

pub fn normalize_class_name(name: &str) -> String {
    name.replace('/', ".")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpProvider {
    /// `<ownerClass>.<accessName> -> <providedType>`
    pub provider: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpNode {
    #[serde(default)]
    pub parent: Vec<String>,
    #[serde(default)]
    pub providers: Vec<DumpProvider>,
}

/// Edge derived from one provider entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DumpEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphDump {
    pub nodes: BTreeMap<String, DumpNode>,
}

impl GraphDump {
    /// Every program class that declares a provider or owns an injection site.
    pub fn from_discovered(graph: &DiscoveredGraph) -> Self {
        let mut nodes = BTreeMap::new();
        for class in graph.program_classes() {
            let providers = graph.registry.providers_declared_by(class);
            if providers.is_empty() && graph.registry.sites_owned_by(class).is_empty() {
                continue;
            }

            let node = DumpNode {
                parent: graph
                    .hierarchy
                    .parents_of(class)
                    .iter()
                    .map(|p| normalize_class_name(p))
                    .collect(),
                providers: providers
                    .iter()
                    .map(|&id| {
                        let provider = graph.registry.provider(id);
                        DumpProvider {
                            provider: normalize_class_name(&provider.describe()),
                            parameters: provider
                                .parameters
                                .iter()
                                .map(|p| normalize_class_name(p))
                                .collect(),
                        }
                    })
                    .collect(),
            };
            nodes.insert(normalize_class_name(class), node);
        }
        Self { nodes }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// `ownerClass -> providedType` for every provider entry, sorted and deduplicated.
    pub fn edges(&self) -> Vec<DumpEdge> {
        let edges: BTreeSet<DumpEdge> = self
            .nodes
            .values()
            .flat_map(|node| node.providers.iter())
            .filter_map(|p| parse_provider(&p.provider))
            .map(|(owner, provided)| DumpEdge {
                from: normalize_class_name(&owner),
                to: normalize_class_name(&provided),
            })
            .collect();
        edges.into_iter().collect()
    }
}

fn provider_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?P<owner>\S+)\.(?P<access>[^.\s]+)\s*->\s*(?P<provided>\S+)\s*$")
            .expect("provider regex")
    })
}

/// Split a provider string into `(ownerClass, providedType)`.
pub fn parse_provider(provider: &str) -> Option<(String, String)> {
    let caps = provider_pattern().captures(provider)?;
    Some((caps["owner"].to_string(), caps["provided"].to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Changed,
    Removed,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub status: ChangeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Nodes that changed or errored since a previous dump. Unchanged nodes are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeFeed {
    pub nodes: BTreeMap<String, ChangeEntry>,
}

impl ChangeFeed {
    pub fn diff(previous: &GraphDump, current: &GraphDump) -> Self {
        let mut nodes = BTreeMap::new();
        for (name, node) in &current.nodes {
            let status = match previous.nodes.get(name) {
                None => ChangeStatus::Added,
                Some(old) if old != node => ChangeStatus::Changed,
                Some(_) => continue,
            };
            nodes.insert(name.clone(), ChangeEntry { status, message: None });
        }
        for name in previous.nodes.keys() {
            if !current.nodes.contains_key(name) {
                nodes.insert(
                    name.clone(),
                    ChangeEntry {
                        status: ChangeStatus::Removed,
                        message: None,
                    },
                );
            }
        }
        Self { nodes }
    }

    /// Feed of a failed run: only the classes the errors are attributed to.
    pub fn from_errors(errors: &[BindingError]) -> Self {
        let mut feed = Self::default();
        feed.mark_errors(errors);
        feed
    }

    /// Mark every owning class of `errors` as errored, joining messages per class.
    pub fn mark_errors(&mut self, errors: &[BindingError]) {
        for error in errors {
            for owner in error.owners() {
                let message = error.to_string();
                let entry = self
                    .nodes
                    .entry(normalize_class_name(owner))
                    .or_insert(ChangeEntry {
                        status: ChangeStatus::Errored,
                        message: None,
                    });
                entry.status = ChangeStatus::Errored;
                entry.message = Some(match entry.message.take() {
                    Some(prev) => format!("{prev}; {message}"),
                    None => message,
                });
            }
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
