//! Provider resolution.
//!
//! Selection policy for a site requesting `T`, over providers whose provided
//! type `P` satisfies `inherits(P, T)`:
//!
//! 1. an exact match (`P == T`) wins over any subtype match;
//! 2. otherwise the subtype matches nearest to `T` are kept;
//! 3. more than one survivor is ambiguous, none is unresolved.
//!
//! Resolution walks depth-first from every field-delegate site through the
//! parameter sites of each chosen provider. A provider met again while it is
//! still on the walk path is a cycle.

use crate::domain::error::{BindingError, BindingErrors};
use crate::domain::graph::BindingGraph;
use crate::domain::hierarchy::TypeHierarchy;
use crate::domain::registry::{InjectionSite, ProviderId, Registry};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Mutable state of one resolution walk
#[derive(Default)]
struct Walk {
    graph: BindingGraph,
    state: HashMap<ProviderId, Visit>,
    path: Vec<ProviderId>,
    errors: Vec<BindingError>,
    reported_cycles: HashSet<BTreeSet<ProviderId>>,
}

pub struct Resolver<'a> {
    registry: &'a Registry,
    hierarchy: &'a TypeHierarchy,
    by_type: HashMap<&'a str, Vec<ProviderId>>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry, hierarchy: &'a TypeHierarchy) -> Self {
        let mut by_type: HashMap<&str, Vec<ProviderId>> = HashMap::new();
        for provider in registry.providers() {
            by_type
                .entry(provider.provided.as_str())
                .or_default()
                .push(provider.id);
        }
        Self {
            registry,
            hierarchy,
            by_type,
        }
    }

    /// Choose the provider for one site.
    pub fn select(&self, site: &InjectionSite) -> Result<ProviderId, BindingError> {
        let requested = site.requested.as_str();

        if let Some(exact) = self.by_type.get(requested) {
            return match exact.as_slice() {
                [only] => Ok(*only),
                many => Err(self.ambiguous(site, many)),
            };
        }

        let mut best: Option<usize> = None;
        let mut tied: Vec<ProviderId> = Vec::new();
        for provider in self.registry.providers() {
            let Some(distance) = self.hierarchy.distance(&provider.provided, requested) else {
                continue;
            };
            match best {
                Some(d) if distance > d => {}
                Some(d) if distance == d => tied.push(provider.id),
                _ => {
                    best = Some(distance);
                    tied.clear();
                    tied.push(provider.id);
                }
            }
        }

        match tied.as_slice() {
            [] => Err(BindingError::Unresolved {
                site: site.describe(),
                owner: site.owner.clone(),
                requested: site.requested.clone(),
            }),
            [only] => Ok(*only),
            many => Err(self.ambiguous(site, many)),
        }
    }

    fn ambiguous(&self, site: &InjectionSite, candidates: &[ProviderId]) -> BindingError {
        BindingError::Ambiguous {
            site: site.describe(),
            owner: site.owner.clone(),
            requested: site.requested.clone(),
            candidates: candidates
                .iter()
                .map(|&id| self.registry.provider(id).describe())
                .collect(),
        }
    }

    /// Resolve every field-delegate site and, transitively, the parameters of
    /// every provider chosen along the way.
    pub fn resolve(&self) -> Result<BindingGraph, BindingErrors> {
        let mut walk = Walk::default();

        for site in self.registry.field_sites() {
            match self.select(site) {
                Ok(provider) => {
                    tracing::debug!(
                        site = %site.describe(),
                        provider = %self.registry.provider(provider).describe(),
                        "bound"
                    );
                    walk.graph.bind(site.id, provider);
                    self.visit(provider, &mut walk);
                }
                Err(error) => walk.errors.push(error),
            }
        }

        if walk.errors.is_empty() {
            tracing::info!(bindings = walk.graph.len(), "resolution finished");
            Ok(walk.graph)
        } else {
            for error in &walk.errors {
                tracing::error!(%error, "resolution failed");
            }
            Err(BindingErrors(walk.errors))
        }
    }

    fn visit(&self, id: ProviderId, walk: &mut Walk) {
        match walk.state.get(&id) {
            Some(Visit::Done) => return,
            Some(Visit::InProgress) => {
                self.report_cycle(id, walk);
                return;
            }
            None => {}
        }

        walk.state.insert(id, Visit::InProgress);
        walk.path.push(id);

        let provider = self.registry.provider(id);
        for &param in &provider.parameter_sites {
            walk.graph.require(id, param);
            match self.select(self.registry.site(param)) {
                Ok(child) => {
                    walk.graph.bind(param, child);
                    self.visit(child, walk);
                }
                Err(error) => walk.errors.push(error),
            }
        }

        walk.path.pop();
        walk.state.insert(id, Visit::Done);
    }

    fn report_cycle(&self, id: ProviderId, walk: &mut Walk) {
        let start = walk.path.iter().position(|&p| p == id).unwrap_or(0);
        let members = &walk.path[start..];
        let key: BTreeSet<ProviderId> = members.iter().copied().collect();
        if !walk.reported_cycles.insert(key) {
            return;
        }

        let mut cycle: Vec<String> = members
            .iter()
            .map(|&p| self.registry.provider(p).describe())
            .collect();
        cycle.push(self.registry.provider(id).describe());

        let mut owners: Vec<String> = Vec::new();
        for &p in members {
            let owner = &self.registry.provider(p).owner;
            if !owners.contains(owner) {
                owners.push(owner.clone());
            }
        }
        let singleton = members
            .iter()
            .any(|&p| self.registry.provider(p).is_singleton());

        walk.errors.push(BindingError::Cyclic {
            cycle,
            owners,
            singleton,
        });
    }
}
