use crate::domain::edge::{DependencyEdge, EdgeKind};
use crate::domain::registry::{ProviderId, SiteId};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use std::collections::{BTreeMap, HashMap};

/// Node of the binding graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingNode {
    Site(SiteId),
    Provider(ProviderId),
}

/// Binding Graph - the resolved dependency graph, frozen after resolution
#[derive(Debug, Default)]
pub struct BindingGraph {
    /// Sites and providers; `BoundTo` and `Requires` edges
    graph: DiGraph<BindingNode, EdgeKind>,

    site_to_node: HashMap<SiteId, NodeIndex>,
    provider_to_node: HashMap<ProviderId, NodeIndex>,
    bindings: BTreeMap<SiteId, ProviderId>,
}

impl BindingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn site_node(&mut self, site: SiteId) -> NodeIndex {
        *self
            .site_to_node
            .entry(site)
            .or_insert_with(|| self.graph.add_node(BindingNode::Site(site)))
    }

    fn provider_node(&mut self, provider: ProviderId) -> NodeIndex {
        *self
            .provider_to_node
            .entry(provider)
            .or_insert_with(|| self.graph.add_node(BindingNode::Provider(provider)))
    }

    /// Record that `site` is served by `provider`.
    pub fn bind(&mut self, site: SiteId, provider: ProviderId) {
        let from = self.site_node(site);
        let to = self.provider_node(provider);
        self.graph.update_edge(from, to, EdgeKind::BoundTo);
        self.bindings.insert(site, provider);
    }

    /// Record that `provider` needs `site` filled before it can run.
    pub fn require(&mut self, provider: ProviderId, site: SiteId) {
        let from = self.provider_node(provider);
        let to = self.site_node(site);
        self.graph.update_edge(from, to, EdgeKind::Requires);
    }

    pub fn provider_for(&self, site: SiteId) -> Option<ProviderId> {
        self.bindings.get(&site).copied()
    }

    /// Every resolved binding, ordered by site
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.bindings
            .iter()
            .map(|(&site, &provider)| DependencyEdge { site, provider })
            .collect()
    }

    /// Providers reachable from a field-delegate site, walking `BoundTo` and
    /// `Requires` edges. Field sites are the only sites nothing requires.
    pub fn providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
        let mut dfs = Dfs::empty(&self.graph);
        for (&site, &idx) in &self.site_to_node {
            let root = self
                .graph
                .neighbors_directed(idx, Direction::Incoming)
                .next()
                .is_none();
            if root {
                tracing::trace!(site = site.0, "reachability root");
                dfs.stack.push(idx);
            }
        }
        let mut ids = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            if let BindingNode::Provider(id) = self.graph[node] {
                ids.push(id);
            }
        }
        ids.sort();
        ids.into_iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
