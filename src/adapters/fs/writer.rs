use crate::adapters::fs::reader::Resource;
use crate::domain::ports::EntrySink;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Output container: a directory tree keyed by entry name.
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    written: usize,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            written: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn target(&self, name: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for part in name.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                anyhow::bail!("Refusing to write entry with unsafe name: {}", name);
            }
            path.push(part);
        }
        Ok(path)
    }

    pub fn copy_resource(&mut self, resource: &Resource) -> Result<()> {
        let bytes = std::fs::read(&resource.source)
            .with_context(|| format!("Failed to read resource {}", resource.source.display()))?;
        self.put_entry(&resource.name, &bytes)
    }
}

impl EntrySink for DirectorySink {
    fn put_entry(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.target(name)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_entry_creates_directories() {
        let out = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(out.path());
        sink.put_entry("app/deep/Main.class", b"bytes").unwrap();
        assert_eq!(std::fs::read(out.path().join("app/deep/Main.class")).unwrap(), b"bytes");
        assert_eq!(sink.written(), 1);
    }

    #[test]
    fn test_rejects_escaping_names() {
        let out = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(out.path());
        assert!(sink.put_entry("../evil.class", b"x").is_err());
        assert!(sink.put_entry("a//b.class", b"x").is_err());
    }
}
