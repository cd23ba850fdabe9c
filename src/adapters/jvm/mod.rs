//! JVM class file codec.
//!
//! Laid out like a classfile library: `format` holds the tags and opcodes,
//! `pool` the constant pool, `reader` and `writer` the two directions, and
//! `state` what survives from one to the other.
//!
//! Method bodies inside the instruction model decode to instructions. Any
//! other body (an unmodeled opcode, an exception table, an interface method
//! called with `invokestatic` or `invokespecial`) stays raw bytes, and its
//! `getfield` reads are reported in [`ClassModel::opaque_reads`]. On encode,
//! bodies the model left as decoded and raw bodies are copied verbatim
//! against the original constant pool. Everything else is assembled with a
//! recomputed `StackMapTable`, written as full frames.

pub mod format;
pub mod pool;
pub mod reader;
mod state;
pub mod writer;

use crate::domain::class_model::ClassModel;
use crate::domain::error::{MalformedClassError, WeaveError};
use crate::domain::hierarchy::InheritanceJudgement;
use crate::domain::ports::ClassCodec;

#[derive(Debug, Default, Clone, Copy)]
pub struct JvmCodec;

impl JvmCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ClassCodec for JvmCodec {
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
