use crate::domain::error::Warning;
use crate::domain::loader::{ClassEntry, ClassPool, EntryBytes};
use anyhow::{Context, Result};
use memmap2::Mmap;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const CLASS_SUFFIX: &str = ".class";

/// Non-class file copied through to the output unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub name: String,
    pub source: PathBuf,
}

/// Directory enumerator for program inputs and library classpath roots.
#[derive(Debug, Default)]
pub struct DirectoryReader {
    resources: Vec<Resource>,
    resource_names: HashSet<String>,
    warnings: Vec<Warning>,
}

impl DirectoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every file under `root`, in sorted path order.
    ///
    /// Library roots contribute class entries only.
    pub fn scan(&mut self, root: &Path, library: bool, pool: &mut ClassPool) -> Result<usize> {
        let mut added = 0;
        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let name = entry_name(root, path)?;

            if name.ends_with(CLASS_SUFFIX) {
                let bytes = map_file(path)?;
                if pool.push(ClassEntry::new(name, bytes, library)) {
                    added += 1;
                }
            } else if !library {
                self.add_resource(name, path.to_path_buf());
            }
        }
        tracing::info!(root = %root.display(), library, classes = added, "scanned input");
        Ok(added)
    }

    fn add_resource(&mut self, name: String, source: PathBuf) {
        if !self.resource_names.insert(name.clone()) {
            tracing::warn!(entry = %name, "duplicate resource, first seen wins");
            self.warnings.push(Warning::DuplicateResource { entry: name });
            return;
        }
        self.resources.push(Resource { name, source });
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

/// `/`-separated path of `path` relative to `root`
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is not under {}", path.display(), root.display()))?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}

fn map_file(path: &Path) -> Result<EntryBytes> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    // zero-length files cannot be mapped
    if len == 0 {
        return Ok(Box::new(Vec::<u8>::new()));
    }
    let mmap = unsafe { Mmap::map(&file).with_context(|| format!("Failed to mmap {}", path.display()))? };
    Ok(Box::new(mmap))
}
