//! What the reader keeps for the writer, beyond the class model.

use crate::adapters::jvm::pool::Constant;
use crate::domain::class_model::Instruction;
use std::collections::HashMap;

/// Attribute copied verbatim; `name` indexes the original pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    pub name: u16,
    pub info: Vec<u8>,
}

/// The `Code` attribute as read, with the instruction list it decoded to.
#[derive(Debug, Clone)]
pub struct RawCode {
    pub info: Vec<u8>,
    /// `None` when the body uses bytecode outside the modeled subset
    pub decoded: Option<Vec<Instruction>>,
}

#[derive(Debug, Clone, Default)]
pub struct MethodState {
    pub attributes: Vec<RawAttribute>,
    pub code: Option<RawCode>,
}

/// Members are keyed by name and descriptor.
#[derive(Debug, Clone, Default)]
pub struct JvmState {
    /// Pool entries from index 1
    pub pool: Vec<Constant>,
    pub attributes: Vec<RawAttribute>,
    pub fields: HashMap<(String, String), Vec<RawAttribute>>,
    pub methods: HashMap<(String, String), MethodState>,
}
