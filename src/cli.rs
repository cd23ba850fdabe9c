use crate::adapters::fs::reader::DirectoryReader;
use crate::adapters::fs::writer::DirectorySink;
use crate::adapters::jvm::JvmCodec;
use crate::adapters::kcls::KclsCodec;
use crate::app::dto::{InspectResponse, WeaveReport};
use crate::app::engine::WeaveEngine;
use crate::config::{ClassFormat, WeaveConfig};
use crate::domain::dump::{ChangeFeed, GraphDump};
use crate::domain::error::WeaveError;
use crate::domain::loader::ClassPool;
use crate::domain::ports::ClassCodec;
use anyhow::{Context as _, Result};
use std::path::Path;
use std::sync::Arc;

pub fn codec_for(format: ClassFormat) -> Arc<dyn ClassCodec> {
    match format {
        ClassFormat::Jvm => Arc::new(JvmCodec::new()),
        ClassFormat::Kcls => Arc::new(KclsCodec::new()),
    }
}

/// Run the whole pipeline described by `config` and write its outputs.
pub fn run_weave(config: &WeaveConfig) -> Result<WeaveReport> {
    let mut reader = DirectoryReader::new();
    let mut classes = ClassPool::new();
    for input in &config.inputs {
        reader.scan(input, false, &mut classes)?;
    }
    for library in &config.libraries {
        reader.scan(library, true, &mut classes)?;
    }

    let mut engine =
        WeaveEngine::new(codec_for(config.format)).with_markers(config.markers.clone());
    if let Some(threads) = config.threads {
        engine = engine.with_threads(threads)?;
    }

    let woven = match engine.weave(&mut classes) {
        Ok(woven) => woven,
        Err(error) => {
            write_error_feed(config, &error)?;
            return Err(error).context("Weaving failed");
        }
    };

    if let Some(path) = &config.dump {
        write_json(path, &woven.dump.to_json()?)?;
    }
    if let Some(path) = &config.change_feed {
        let previous = match &config.previous_dump {
            Some(previous) => load_dump(previous)?,
            None => GraphDump::default(),
        };
        let feed = ChangeFeed::diff(&previous, &woven.dump);
        write_json(path, &feed.to_json()?)?;
    }

    let mut sink = DirectorySink::new(&config.output);
    engine.write(&woven, &classes, &mut sink)?;
    for resource in reader.resources() {
        sink.copy_resource(resource)?;
    }

    let mut report = woven.report;
    report.resources = reader.resources().len();
    report.warnings.extend(reader.take_warnings());
    for warning in &report.warnings {
        tracing::warn!(%warning, "weave warning");
    }
    tracing::info!(
        output = %sink.root().display(),
        entries = sink.written(),
        "output written"
    );
    Ok(report)
}

/// Errors-only change feed, so the graph view can mark the failing classes.
fn write_error_feed(config: &WeaveConfig, error: &WeaveError) -> Result<()> {
    let Some(path) = &config.change_feed else {
        return Ok(());
    };
    let errors = error.binding_errors();
    if errors.is_empty() {
        return Ok(());
    }
    write_json(path, &ChangeFeed::from_errors(errors).to_json()?)
}

fn write_json(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn load_dump(path: &Path) -> Result<GraphDump> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dump {}", path.display()))?;
    GraphDump::from_json(&json).with_context(|| format!("Failed to parse dump {}", path.display()))
}

/// Decode one class entry of either format and print it as JSON.
pub fn inspect_class(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let entry = path.to_string_lossy().to_string();
    let format = ClassFormat::detect(&bytes)
        .with_context(|| format!("{} is neither a class file nor a KCLS image", path.display()))?;
    let model = codec_for(format).decode(&entry, &bytes)?;
    let response = InspectResponse {
        entry,
        size: bytes.len(),
        class: &model,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Print the change feed between two dumps.
pub fn diff_dumps(previous: &Path, current: &Path) -> Result<()> {
    let feed = ChangeFeed::diff(&load_dump(previous)?, &load_dump(current)?);
    println!("{}", feed.to_json()?);
    Ok(())
}

pub fn print_report(report: &WeaveReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
