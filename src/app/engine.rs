use crate::app::dto::WeaveReport;
use crate::domain::builder::{Discovery, Markers};
use crate::domain::dump::GraphDump;
use crate::domain::error::{MalformedClassError, WeaveError};
use crate::domain::loader::ClassPool;
use crate::domain::ports::{ClassCodec, EntrySink};
use crate::domain::transform::{TransformOutcome, Transformer};
use anyhow::{Context as _, Result};
use rayon::prelude::*;
use std::sync::Arc;

/// One emitted class entry.
#[derive(Debug, Clone)]
pub struct WovenClass {
    pub entry: String,
    /// Position in the class pool
    pub index: usize,
    pub outcome: TransformOutcome,
    /// Re-encoded bytes; `None` means the original bytes are emitted as-is
    pub bytes: Option<Vec<u8>>,
}

/// Result of a successful run, not yet written anywhere.
#[derive(Debug)]
pub struct Woven {
    pub classes: Vec<WovenClass>,
    pub dump: GraphDump,
    pub report: WeaveReport,
}

/// Weaving pipeline: load, discover, resolve, transform, encode.
pub struct WeaveEngine {
    codec: Arc<dyn ClassCodec>,
    markers: Markers,
    pool: Option<rayon::ThreadPool>,
}

impl WeaveEngine {
    pub fn new(codec: Arc<dyn ClassCodec>) -> Self {
        Self {
            codec,
            markers: Markers::default(),
            pool: None,
        }
    }

    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    /// Run transform and encode on a dedicated pool of `threads` workers.
    pub fn with_threads(mut self, threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("Failed to build worker pool")?;
        self.pool = Some(pool);
        Ok(self)
    }

    /// Weave every program entry of `classes`. Nothing is written; any error
    /// aborts the whole run.
    pub fn weave(&self, classes: &mut ClassPool) -> Result<Woven, WeaveError> {
        match &self.pool {
            Some(pool) => pool.install(|| self.weave_all(classes)),
            None => self.weave_all(classes),
        }
    }

    fn weave_all(&self, classes: &mut ClassPool) -> Result<Woven, WeaveError> {
        let codec = self.codec.as_ref();

        let decoded: Vec<Result<(), MalformedClassError>> = classes
            .entries_mut()
            .par_iter_mut()
            .map(|entry| entry.load(codec).map(|_| ()))
            .collect();
        if let Some(error) = decoded.into_iter().find_map(Result::err) {
            tracing::error!(%error, "failed to load class");
            return Err(error.into());
        }

        // Program classes first so a library copy never shadows them.
        let mut discovery = Discovery::new(self.markers.clone());
        let mut emit = vec![false; classes.len()];
        for (i, entry) in classes.entries_mut().iter_mut().enumerate() {
            if entry.library {
                continue;
            }
            if let Some(model) = entry.model_mut() {
                emit[i] = discovery.traverse(model)?;
            }
        }
        for entry in classes.entries().iter().filter(|e| e.library) {
            if let Some(model) = entry.model() {
                discovery.add_library(model);
            }
        }

        let discovered = discovery.traverse_finished()?;
        let dump = GraphDump::from_discovered(&discovered);
        let bindings = discovered.resolve()?;
        for edge in bindings.edges() {
            tracing::trace!(
                site = %discovered.registry.site(edge.site).describe(),
                provider = %discovered.registry.provider(edge.provider).describe(),
                "binding"
            );
        }

        let transformer = Transformer::new(&discovered.registry, &bindings, &discovered.hierarchy);
        let hierarchy = &discovered.hierarchy;
        let results: Vec<Result<Option<WovenClass>, WeaveError>> = classes
            .entries_mut()
            .par_iter_mut()
            .enumerate()
            .map(|(index, entry)| {
                if !emit[index] {
                    return Ok(None);
                }
                let name = entry.name.clone();
                let Some(model) = entry.model_mut() else {
                    return Ok(None);
                };
                let outcome = transformer.transform(model)?;
                let bytes = if outcome.is_rewritten() {
                    tracing::debug!(class = %model.name, ?outcome, "class rewritten");
                    Some(codec.encode(model, hierarchy)?)
                } else {
                    None
                };
                Ok(Some(WovenClass {
                    entry: name,
                    index,
                    outcome,
                    bytes,
                }))
            })
            .collect();

        let mut woven = Vec::with_capacity(results.len());
        for result in results {
            if let Some(class) = result? {
                woven.push(class);
            }
        }

        let mut report = WeaveReport {
            classes: woven.len(),
            libraries: classes.entries().iter().filter(|e| e.library).count(),
            providers: discovered.registry.providers().len(),
            injection_sites: discovered.registry.sites().len(),
            bindings: bindings.len(),
            ..WeaveReport::default()
        };
        for class in &woven {
            match class.outcome {
                TransformOutcome::Untouched => report.untouched += 1,
                TransformOutcome::Rewritten { sites, slots } => {
                    report.transformed += 1;
                    report.sites_rewritten += sites;
                    report.cache_slots += slots;
                }
            }
            if let Some(model) = classes.entries()[class.index].model() {
                report.provider_classes += usize::from(model.roles.provider);
                report.component_classes += usize::from(model.roles.component);
            }
        }
        report.warnings = classes.take_warnings();
        report.warnings.extend(discovered.warnings.iter().cloned());

        tracing::info!(
            classes = report.classes,
            transformed = report.transformed,
            sites = report.sites_rewritten,
            "weave finished"
        );
        Ok(Woven {
            classes: woven,
            dump,
            report,
        })
    }

    /// Hand every woven class to `sink`, in input order.
    pub fn write(&self, woven: &Woven, classes: &ClassPool, sink: &mut dyn EntrySink) -> Result<usize> {
        for class in &woven.classes {
            let bytes = match &class.bytes {
                Some(bytes) => bytes.as_slice(),
                None => classes.entries()[class.index].bytes(),
            };
            sink.put_entry(&class.entry, bytes)
                .with_context(|| format!("Failed to write {}", class.entry))?;
        }
        Ok(woven.classes.len())
    }
}
