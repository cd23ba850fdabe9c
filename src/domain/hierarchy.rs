//! Type Hierarchy - the classpath-wide inheritance judgement
//!
//! Types are registered with their declared superclass and interfaces. The
//! hierarchy is not a graph of nodes the resolver walks; it is a read-only
//! oracle queried by both the resolver (provider matching) and the codec
//! (merging reference types at control-flow joins).
//!
//! The classpath is open-world: a class may name a parent that was never
//! loaded. Such a parent yields [`Relation::UnknownExternal`], which the
//! boolean [`InheritanceJudgement::inherits`] treats as unrelated and
//! [`InheritanceJudgement::common_ancestor`] folds into the root type. This is
//! a deliberate approximation: an unknown parent might in fact connect two
//! types, so a missing library can turn a valid binding into an unresolved one
//! but never produce a wrong binding.

use crate::domain::class_model::{ClassModel, OBJECT};
use crate::domain::error::MalformedClassError;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// Outcome of relating two types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Same,
    /// Left is a strict subtype of right
    Subtype,
    /// Left is a strict supertype of right
    Supertype,
    Unrelated,
    /// No path found, but an unloaded type was met on the way
    UnknownExternal,
}

/// Subtype oracle shared by the resolver and the codec.
pub trait InheritanceJudgement: Send + Sync {
    /// True iff `type_a` is `type_b` or reaches it through superclasses/interfaces.
    fn inherits(&self, type_a: &str, type_b: &str) -> bool;

    /// Merged type at a control-flow join.
    fn common_ancestor(&self, type_a: &str, type_b: &str) -> String;
}

/// Declared parents of one registered type
#[derive(Debug, Clone)]
struct TypeEntry {
    super_name: Option<String>,
    interfaces: Vec<String>,
    /// Loaded from a library entry (classpath only)
    library: bool,
    /// Names of the declared fields, when registered from a class model
    fields: Vec<String>,
}

impl TypeEntry {
    fn parents(&self) -> impl Iterator<Item = &String> {
        self.super_name.iter().chain(self.interfaces.iter())
    }
}

/// Result of an upward search from one type
enum Search {
    Found(usize),
    NotFound { unknown: bool },
}

/// Type Hierarchy - stores the declared parents of every known type
#[derive(Debug, Clone)]
pub struct TypeHierarchy {
    types: HashMap<String, TypeEntry>,
}

impl Default for TypeHierarchy {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeHierarchy {
    /// Create a hierarchy that knows only the root type
    pub fn new() -> Self {
        let mut types = HashMap::new();
        types.insert(
            OBJECT.to_string(),
            TypeEntry {
                super_name: None,
                interfaces: Vec::new(),
                library: true,
                fields: Vec::new(),
            },
        );
        Self { types }
    }

    /// Register a type. The first registration of a name wins.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        super_name: Option<String>,
        interfaces: Vec<String>,
        library: bool,
    ) -> bool {
        self.insert(
            name.into(),
            TypeEntry {
                super_name,
                interfaces,
                library,
                fields: Vec::new(),
            },
        )
    }

    pub fn register_model(&mut self, model: &ClassModel, library: bool) -> bool {
        self.insert(
            model.name.clone(),
            TypeEntry {
                super_name: model.super_name.clone(),
                interfaces: model.interfaces.clone(),
                library,
                fields: model.fields.iter().map(|f| f.name.clone()).collect(),
            },
        )
    }

    fn insert(&mut self, name: String, entry: TypeEntry) -> bool {
        if self.types.contains_key(&name) {
            return false;
        }
        self.types.insert(name, entry);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Class that declares the instance field `field` as seen from `owner`:
    /// `owner` itself or the nearest superclass declaring that name. `None`
    /// when the walk leaves the known classpath first.
    pub fn field_owner<'h>(&'h self, owner: &'h str, field: &str) -> Option<&'h str> {
        let mut current = owner;
        // bounded: validate() rejects cycles, but the judgement may run before it
        for _ in 0..=self.types.len() {
            let entry = self.types.get(current)?;
            if entry.fields.iter().any(|f| f == field) {
                return Some(current);
            }
            current = entry.super_name.as_deref()?;
        }
        None
    }

    /// Declared superclass followed by interfaces
    pub fn parents_of(&self, name: &str) -> Vec<String> {
        self.types
            .get(name)
            .map(|t| t.parents().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Reject cyclic declarations; a cycle would break antisymmetry.
    pub fn validate(&self) -> Result<(), MalformedClassError> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::with_capacity(self.types.len());
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        for &name in &names {
            index.insert(name, graph.add_node(name));
        }
        for &name in &names {
            for parent in self.types[name].parents() {
                if let Some(&to) = index.get(parent.as_str()) {
                    graph.add_edge(index[name], to, ());
                }
            }
        }

        for scc in tarjan_scc(&graph) {
            let self_loop = scc.len() == 1 && graph.find_edge(scc[0], scc[0]).is_some();
            if scc.len() > 1 || self_loop {
                let mut members: Vec<&str> = scc.iter().map(|&i| graph[i]).collect();
                members.sort_unstable();
                // blame an input class when the cycle touches one
                let blamed = members
                    .iter()
                    .find(|&&m| !self.types[m].library)
                    .unwrap_or(&members[0]);
                return Err(MalformedClassError::structural(
                    *blamed,
                    format!("inheritance cycle among {}", members.join(", ")),
                ));
            }
        }
        Ok(())
    }

    /// Relate two types, keeping the open-world distinction.
    pub fn relate(&self, type_a: &str, type_b: &str) -> Relation {
        if type_a == type_b {
            return Relation::Same;
        }
        if is_array(type_a) || is_array(type_b) {
            return self.relate_arrays(type_a, type_b);
        }

        let up = self.search(type_a, type_b);
        if let Search::Found(_) = up {
            return Relation::Subtype;
        }
        let down = self.search(type_b, type_a);
        if let Search::Found(_) = down {
            return Relation::Supertype;
        }
        match (up, down) {
            (Search::NotFound { unknown: true }, _) | (_, Search::NotFound { unknown: true }) => {
                Relation::UnknownExternal
            }
            _ => Relation::Unrelated,
        }
    }

    /// Length of the shortest upward path from `from` to `to`, if `from` inherits `to`.
    pub fn distance(&self, from: &str, to: &str) -> Option<usize> {
        if from == to {
            return Some(0);
        }
        if is_array(from) || is_array(to) {
            return match self.relate_arrays(from, to) {
                Relation::Subtype => Some(1),
                _ => None,
            };
        }
        match self.search(from, to) {
            Search::Found(depth) => Some(depth),
            Search::NotFound { .. } => None,
        }
    }

    /// Breadth-first walk up from `from` looking for `to`.
    fn search(&self, from: &str, to: &str) -> Search {
        let mut queue = VecDeque::from([(from, 0usize)]);
        let mut seen: HashSet<&str> = HashSet::from([from]);
        let mut unknown = false;

        while let Some((current, depth)) = queue.pop_front() {
            let Some(entry) = self.types.get(current) else {
                // Every reference type is an object, even an unloaded one.
                if to == OBJECT {
                    return Search::Found(depth + 1);
                }
                tracing::debug!(from, missing = current, "type absent from classpath");
                unknown = true;
                continue;
            };
            for parent in entry.parents() {
                if parent == to {
                    return Search::Found(depth + 1);
                }
                if seen.insert(parent.as_str()) {
                    queue.push_back((parent.as_str(), depth + 1));
                }
            }
        }
        Search::NotFound { unknown }
    }

    fn relate_arrays(&self, type_a: &str, type_b: &str) -> Relation {
        match (array_element(type_a), array_element(type_b)) {
            (Some(_), None) if type_b == OBJECT => Relation::Subtype,
            (None, Some(_)) if type_a == OBJECT => Relation::Supertype,
            (Some(elem_a), Some(elem_b)) => match (reference_element(elem_a), reference_element(elem_b)) {
                (Some(a), Some(b)) => self.relate(a, b),
                // Primitive arrays are related only when identical, which `relate` handled.
                _ => Relation::Unrelated,
            },
            _ => Relation::Unrelated,
        }
    }
}

impl InheritanceJudgement for TypeHierarchy {
    fn inherits(&self, type_a: &str, type_b: &str) -> bool {
        matches!(
            self.relate(type_a, type_b),
            Relation::Same | Relation::Subtype
        )
    }

    fn common_ancestor(&self, type_a: &str, type_b: &str) -> String {
        if type_a == type_b {
            return type_a.to_string();
        }
        if is_array(type_a) || is_array(type_b) {
            return OBJECT.to_string();
        }
        match self.relate(type_a, type_b) {
            Relation::Same | Relation::Supertype => type_a.to_string(),
            Relation::Subtype => type_b.to_string(),
            Relation::Unrelated | Relation::UnknownExternal => OBJECT.to_string(),
        }
    }
}

fn is_array(name: &str) -> bool {
    name.starts_with('[')
}

fn array_element(name: &str) -> Option<&str> {
    name.strip_prefix('[')
}

/// Element of an array descriptor as a type name: `Lpkg/A;` → `pkg/A`, nested arrays kept.
fn reference_element(elem: &str) -> Option<&str> {
    if elem.starts_with('[') {
        Some(elem)
    } else {
        elem.strip_prefix('L').and_then(|e| e.strip_suffix(';'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::class_model::FieldModel;

    fn hierarchy() -> TypeHierarchy {
        let mut h = TypeHierarchy::new();
        h.register("app/Store", Some(OBJECT.into()), vec![], false);
        h.register("app/Cache", Some(OBJECT.into()), vec!["app/Store".into()], false);
        h.register("app/LruCache", Some("app/Cache".into()), vec![], false);
        h.register("app/Logger", Some(OBJECT.into()), vec![], false);
        h.register("app/Remote", Some("ext/Missing".into()), vec![], false);
        h
    }

    #[test]
    fn test_inherits_is_reflexive_and_transitive() {
        let h = hierarchy();
        assert!(h.inherits("app/Store", "app/Store"));
        assert!(h.inherits("app/LruCache", "app/Cache"));
        assert!(h.inherits("app/LruCache", "app/Store"));
        assert!(h.inherits("app/LruCache", OBJECT));
        assert!(!h.inherits("app/Store", "app/LruCache"));
        assert!(!h.inherits("app/Logger", "app/Store"));
    }

    #[test]
    fn test_unknown_external_is_unrelated_for_judgement() {
        let h = hierarchy();
        assert_eq!(h.relate("app/Remote", "app/Store"), Relation::UnknownExternal);
        assert!(!h.inherits("app/Remote", "app/Store"));
        assert_eq!(h.common_ancestor("app/Remote", "app/Store"), OBJECT);
        // Unloaded types are still objects.
        assert!(h.inherits("app/Remote", OBJECT));
    }

    #[test]
    fn test_common_ancestor_policy() {
        let h = hierarchy();
        assert_eq!(h.common_ancestor("app/LruCache", "app/Cache"), "app/Cache");
        assert_eq!(h.common_ancestor("app/Cache", "app/LruCache"), "app/Cache");
        assert_eq!(h.common_ancestor("app/Logger", "app/Cache"), OBJECT);
        assert_eq!(h.common_ancestor("[Lapp/Cache;", "[Lapp/Cache;"), "[Lapp/Cache;");
        assert_eq!(h.common_ancestor("[Lapp/LruCache;", "[Lapp/Cache;"), OBJECT);
    }

    #[test]
    fn test_distance_prefers_nearest() {
        let h = hierarchy();
        assert_eq!(h.distance("app/LruCache", "app/LruCache"), Some(0));
        assert_eq!(h.distance("app/LruCache", "app/Cache"), Some(1));
        assert_eq!(h.distance("app/LruCache", "app/Store"), Some(2));
        assert_eq!(h.distance("app/Store", "app/Cache"), None);
    }

    #[test]
    fn test_array_covariance() {
        let h = hierarchy();
        assert!(h.inherits("[Lapp/LruCache;", "[Lapp/Store;"));
        assert!(h.inherits("[I", OBJECT));
        assert!(!h.inherits("[I", "[J"));
        assert!(!h.inherits("[Lapp/Store;", "app/Store"));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let mut h = TypeHierarchy::new();
        h.register("app/A", Some("app/B".into()), vec![], false);
        h.register("app/B", Some("app/A".into()), vec![], false);
        let err = h.validate().unwrap_err();
        assert!(err.reason.contains("app/A"));
        assert!(err.reason.contains("app/B"));
        assert!(hierarchy().validate().is_ok());
    }

    #[test]
    fn test_first_registration_wins() {
        let mut h = TypeHierarchy::new();
        assert!(h.register("app/A", Some(OBJECT.into()), vec![], false));
        assert!(!h.register("app/A", Some("app/B".into()), vec![], true));
        assert_eq!(h.parents_of("app/A"), vec![OBJECT.to_string()]);
    }

    #[test]
    fn test_cycle_blames_program_class() {
        let mut h = TypeHierarchy::new();
        h.register("lib/A", Some("lib/B".into()), vec![], true);
        h.register("lib/B", Some("app/C".into()), vec![], true);
        h.register("app/C", Some("lib/A".into()), vec![], false);
        let err = h.validate().unwrap_err();
        assert_eq!(err.entry, "app/C");
    }

    #[test]
    fn test_field_owner_walks_superclasses() {
        let mut base = ClassModel::new("app/Base", Some(OBJECT.into()));
        base.fields.push(FieldModel {
            access: 0,
            name: "store".into(),
            descriptor: "Lapp/Store;".into(),
            annotations: vec![],
        });
        let mut h = TypeHierarchy::new();
        h.register_model(&base, false);
        h.register("app/Mid", Some("app/Base".into()), vec![], false);
        h.register("app/Leaf", Some("app/Mid".into()), vec![], false);
        h.register("app/Orphan", Some("ext/Missing".into()), vec![], false);

        assert_eq!(h.field_owner("app/Leaf", "store"), Some("app/Base"));
        assert_eq!(h.field_owner("app/Base", "store"), Some("app/Base"));
        assert_eq!(h.field_owner("app/Leaf", "other"), None);
        assert_eq!(h.field_owner("app/Orphan", "store"), None);
        assert_eq!(h.field_owner("app/Unknown", "store"), None);
    }
}
