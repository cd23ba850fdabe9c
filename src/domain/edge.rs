use crate::domain::registry::{ProviderId, SiteId};
use serde::Serialize;

/// Edge kind in the binding graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Injection site → the provider chosen for it
    BoundTo,
    /// Provider → one of its parameter sites
    Requires,
}

/// A resolved binding, directed consumer-to-provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DependencyEdge {
    pub site: SiteId,
    pub provider: ProviderId,
}
