use crate::domain::error::Warning;
use serde::Serialize;

/// Summary of one weaving run, printed by the CLI as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeaveReport {
    /// Program class entries emitted
    pub classes: usize,
    pub libraries: usize,
    pub transformed: usize,
    pub untouched: usize,
    pub sites_rewritten: usize,
    pub cache_slots: usize,
    pub provider_classes: usize,
    pub component_classes: usize,
    pub providers: usize,
    pub injection_sites: usize,
    pub bindings: usize,
    /// Non-class entries copied to the output
    pub resources: usize,
    pub warnings: Vec<Warning>,
}

/// One class of `inspect` output.
#[derive(Debug, Clone, Serialize)]
pub struct InspectResponse<'a> {
    pub entry: String,
    pub size: usize,
    pub class: &'a crate::domain::class_model::ClassModel,
}
