//! KCLS class image codec.
//!
//! A JVM-shaped binary class format: a UTF-8 constant pool, annotated fields
//! and methods, and stack-machine bodies with labels and a frame table.
//! Decoding keeps the stored metadata; encoding always recomputes it.

pub mod format;
pub mod reader;
pub mod writer;

use crate::domain::class_model::ClassModel;
use crate::domain::error::{MalformedClassError, WeaveError};
use crate::domain::hierarchy::InheritanceJudgement;
use crate::domain::ports::ClassCodec;

#[derive(Debug, Default, Clone, Copy)]
pub struct KclsCodec;

impl KclsCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ClassCodec for KclsCodec {
    fn decode(&self, entry: &str, bytes: &[u8]) -> Result<ClassModel, MalformedClassError> {
        reader::read_class(entry, bytes)
    }

    fn encode(
        &self,
        model: &ClassModel,
        judgement: &dyn InheritanceJudgement,
    ) -> Result<Vec<u8>, WeaveError> {
        writer::write_class(model, judgement)
    }
}
