//! Class model loader.
//!
//! Entries keep their raw bytes for the whole run: untouched classes are
//! emitted from them verbatim. Models are decoded on first use and cached in
//! the entry.

use crate::domain::class_model::ClassModel;
use crate::domain::error::{MalformedClassError, Warning};
use crate::domain::ports::ClassCodec;
use std::collections::HashSet;
use std::fmt;

/// Raw bytes of one entry (owned buffer or a memory map).
pub type EntryBytes = Box<dyn AsRef<[u8]> + Send + Sync>;

pub struct ClassEntry {
    /// Relative entry name, e.g. `app/Main.class`
    pub name: String,
    /// Classpath-only: feeds the hierarchy, never scanned nor emitted
    pub library: bool,
    bytes: EntryBytes,
    model: Option<ClassModel>,
}

impl fmt::Debug for ClassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassEntry")
            .field("name", &self.name)
            .field("library", &self.library)
            .field("len", &self.bytes().len())
            .field("loaded", &self.model.is_some())
            .finish()
    }
}

impl ClassEntry {
    pub fn new(name: impl Into<String>, bytes: EntryBytes, library: bool) -> Self {
        Self {
            name: name.into(),
            library,
            bytes,
            model: None,
        }
    }

    pub fn from_vec(name: impl Into<String>, bytes: Vec<u8>, library: bool) -> Self {
        Self::new(name, Box::new(bytes), library)
    }

    pub fn bytes(&self) -> &[u8] {
        (*self.bytes).as_ref()
    }

    /// Decode on first call; later calls return the cached model.
    pub fn load(&mut self, codec: &dyn ClassCodec) -> Result<&mut ClassModel, MalformedClassError> {
        if self.model.is_none() {
            let model = codec.decode(&self.name, (*self.bytes).as_ref())?;
            tracing::trace!(entry = %self.name, class = %model.name, "decoded");
            self.model = Some(model);
        }
        self.model
            .as_mut()
            .ok_or_else(|| MalformedClassError::structural(&self.name, "model missing after decode"))
    }

    pub fn model(&self) -> Option<&ClassModel> {
        self.model.as_ref()
    }

    pub fn model_mut(&mut self) -> Option<&mut ClassModel> {
        self.model.as_mut()
    }
}

/// Ordered set of class entries, first seen wins per entry name.
#[derive(Debug, Default)]
pub struct ClassPool {
    entries: Vec<ClassEntry>,
    names: HashSet<String>,
    warnings: Vec<Warning>,
}

impl ClassPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. A later entry with an already-seen name is dropped.
    pub fn push(&mut self, entry: ClassEntry) -> bool {
        if !self.names.insert(entry.name.clone()) {
            tracing::warn!(entry = %entry.name, "duplicate class entry, first seen wins");
            self.warnings.push(Warning::DuplicateClass { entry: entry.name });
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[ClassEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ClassEntry] {
        &mut self.entries
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
