use crate::domain::class_model::ClassModel;
use crate::domain::error::{MalformedClassError, WeaveError};
use crate::domain::hierarchy::InheritanceJudgement;
use anyhow::Result;

/// Binary class codec port (implemented by Infrastructure)
///
/// `encode` must recompute the verifier metadata of every body it assembles;
/// a body the model left exactly as decoded may be copied verbatim. The
/// judgement is the only type oracle it may consult.
pub trait ClassCodec: Send + Sync {
    fn decode(&self, entry: &str, bytes: &[u8]) -> std::result::Result<ClassModel, MalformedClassError>;

    fn encode(
        &self,
        model: &ClassModel,
        judgement: &dyn InheritanceJudgement,
    ) -> std::result::Result<Vec<u8>, WeaveError>;
}

/// Output container port
pub trait EntrySink {
    /// Write one entry under its original relative name.
    fn put_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()>;
}
