//! Bytecode transformer.
//!
//! A pure per-class rewrite over the frozen binding graph. Every read of a
//! field-delegate site (`GetField owner.field` with the receiver on the stack)
//! becomes `Pop` followed by the provider call chain. Singleton providers are
//! memoized lazily in a synthetic static slot on their declaring class; the
//! slot is added when that declaring class itself is transformed.

use crate::domain::class_model::{
    ClassModel, FieldModel, INIT, Instruction, InvokeKind, Label, MemberRef, access,
};
use crate::domain::descriptor::reference_descriptor;
use crate::domain::error::WeaveError;
use crate::domain::graph::BindingGraph;
use crate::domain::hierarchy::TypeHierarchy;
use crate::domain::registry::{AccessPath, ProviderDeclaration, ProviderId, Registry, SiteId};
use std::collections::HashSet;

/// Prefix of every synthetic singleton cache field.
pub const CACHE_SLOT_PREFIX: &str = "knit$singleton$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    /// Nothing to rewrite; the original bytes can be copied through.
    Untouched,
    Rewritten { sites: usize, slots: usize },
}

impl TransformOutcome {
    pub fn is_rewritten(&self) -> bool {
        matches!(self, TransformOutcome::Rewritten { .. })
    }
}

/// Static cache field holding the instance of one singleton provider.
///
/// The name spells out the access member and the full provided type; singleton
/// providers of one class that still share that spelling get an ordinal suffix
/// in declaration order.
pub fn cache_slot(registry: &Registry, id: ProviderId) -> MemberRef {
    let provider = registry.provider(id);
    let base = slot_name(provider);
    let earlier = registry
        .providers_declared_by(&provider.owner)
        .iter()
        .take_while(|&&other| other != id)
        .filter(|&&other| {
            let other = registry.provider(other);
            other.is_singleton() && slot_name(other) == base
        })
        .count();
    let name = match earlier {
        0 => base,
        n => format!("{base}_9{n}"),
    };
    MemberRef::new(
        provider.owner.clone(),
        name,
        reference_descriptor(&provider.provided),
    )
}

fn slot_name(provider: &ProviderDeclaration) -> String {
    let access_name = provider.access.name().trim_matches(|c| c == '<' || c == '>');
    format!(
        "{}{}${}",
        CACHE_SLOT_PREFIX,
        access_name,
        mangle(&provider.provided)
    )
}

/// Injective spelling of a type name as a field name fragment.
///
/// `_` only ever starts an escape, so distinct type names never meet and the
/// `_9` ordinal suffix cannot be produced here.
fn mangle(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len() + 8);
    for c in type_name.chars() {
        match c {
            '_' => out.push_str("_0"),
            '/' => out.push_str("_1"),
            '[' => out.push_str("_2"),
            ';' => out.push_str("_3"),
            c if c.is_ascii_alphanumeric() || c == '$' => out.push(c),
            c => out.push_str(&format!("_x{:x}_", c as u32)),
        }
    }
    out
}

/// Sequential label ids for one method body
struct LabelAllocator {
    class: String,
    next: u32,
}

impl LabelAllocator {
    fn fresh(&mut self) -> Result<Label, WeaveError> {
        let id = u16::try_from(self.next)
            .map_err(|_| WeaveError::encode(&self.class, "label space exhausted"))?;
        self.next += 1;
        Ok(Label(id))
    }
}

pub struct Transformer<'a> {
    registry: &'a Registry,
    bindings: &'a BindingGraph,
    hierarchy: &'a TypeHierarchy,
    reachable: HashSet<ProviderId>,
}

impl<'a> Transformer<'a> {
    pub fn new(
        registry: &'a Registry,
        bindings: &'a BindingGraph,
        hierarchy: &'a TypeHierarchy,
    ) -> Self {
        Self {
            registry,
            bindings,
            hierarchy,
            reachable: bindings.providers().collect(),
        }
    }

    /// Rewrite `class` in place.
    pub fn transform(&self, class: &mut ClassModel) -> Result<TransformOutcome, WeaveError> {
        self.check_opaque_reads(class)?;
        let slots = self.add_cache_slots(class)?;
        let mut sites = 0;

        for method in &mut class.methods {
            let Some(code) = method.code.as_mut() else {
                continue;
            };
            if !code.instructions.iter().any(|insn| self.site_of(insn).is_some()) {
                continue;
            }

            let next = code
                .next_free_label()
                .ok_or_else(|| WeaveError::encode(&class.name, "label space exhausted"))?;
            let mut labels = LabelAllocator {
                class: class.name.clone(),
                next: next.into(),
            };
            let mut rewritten = Vec::with_capacity(code.instructions.len());
            for insn in code.instructions.drain(..) {
                let Some(provider) = self.site_of(&insn) else {
                    rewritten.push(insn);
                    continue;
                };
                let provider = provider?;
                rewritten.push(Instruction::Pop);
                self.emit_chain(provider, &mut rewritten, &mut labels)
                    .map_err(|e| with_class(e, &class.name))?;
                sites += 1;
            }
            code.instructions = rewritten;
            tracing::debug!(class = %class.name, method = %method.name, "method rewritten");
        }

        if sites == 0 && slots == 0 {
            return Ok(TransformOutcome::Untouched);
        }
        Ok(TransformOutcome::Rewritten { sites, slots })
    }

    /// Field-delegate site named by a field reference, resolving the owner
    /// through the superclass chain the way field linkage does.
    fn field_site(&self, field: &MemberRef) -> Option<SiteId> {
        let owner = self
            .hierarchy
            .field_owner(&field.owner, &field.name)
            .unwrap_or(&field.owner);
        self.registry.field_site(owner, &field.name)
    }

    /// Provider bound to the field-delegate site read by `insn`, if it reads one.
    fn site_of(&self, insn: &Instruction) -> Option<Result<ProviderId, WeaveError>> {
        let Instruction::GetField(field) = insn else {
            return None;
        };
        let site = self.field_site(field)?;
        Some(self.bindings.provider_for(site).ok_or_else(|| WeaveError::Unbound {
            site: self.registry.site(site).describe(),
        }))
    }

    /// Bodies the codec could not model must not read an injected field.
    fn check_opaque_reads(&self, class: &ClassModel) -> Result<(), WeaveError> {
        for read in &class.opaque_reads {
            if let Some(site) = self.field_site(&read.field) {
                return Err(WeaveError::encode(
                    &class.name,
                    format!(
                        "{}{} reads injected field {} but uses bytecode outside the rewritable subset",
                        read.method,
                        read.descriptor,
                        self.registry.site(site).describe()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Add one cache field per reachable singleton provider declared by `class`.
    fn add_cache_slots(&self, class: &mut ClassModel) -> Result<usize, WeaveError> {
        let mut added = 0;
        for &id in self.registry.providers_declared_by(&class.name) {
            let provider = self.registry.provider(id);
            if !provider.is_singleton() || !self.reachable.contains(&id) {
                continue;
            }
            let slot = cache_slot(self.registry, id);
            if let Some(existing) = class.field(&slot.name) {
                if existing.descriptor == slot.descriptor && existing.is_static() {
                    continue;
                }
                return Err(WeaveError::encode(
                    &class.name,
                    format!("field {} clashes with a singleton cache field", slot.name),
                ));
            }
            class.fields.push(FieldModel {
                access: access::PUBLIC | access::STATIC | access::SYNTHETIC,
                name: slot.name,
                descriptor: slot.descriptor,
                annotations: Vec::new(),
            });
            added += 1;
        }
        Ok(added)
    }

    /// Emit instructions leaving one instance of the provider's type on the stack.
    fn emit_chain(
        &self,
        id: ProviderId,
        out: &mut Vec<Instruction>,
        labels: &mut LabelAllocator,
    ) -> Result<(), WeaveError> {
        let provider = self.registry.provider(id);
        if !provider.is_singleton() {
            return self.emit_access(provider, out, labels);
        }

        let slot = cache_slot(self.registry, id);
        let cached = labels.fresh()?;
        out.push(Instruction::GetStatic(slot.clone()));
        out.push(Instruction::Dup);
        out.push(Instruction::IfNonNull(cached));
        out.push(Instruction::Pop);
        self.emit_access(provider, out, labels)?;
        out.push(Instruction::Dup);
        out.push(Instruction::PutStatic(slot));
        out.push(Instruction::Label(cached));
        Ok(())
    }

    fn emit_arguments(
        &self,
        provider: &ProviderDeclaration,
        out: &mut Vec<Instruction>,
        labels: &mut LabelAllocator,
    ) -> Result<(), WeaveError> {
        for &param in &provider.parameter_sites {
            let dependency = self.bindings.provider_for(param).ok_or_else(|| {
                WeaveError::Unbound {
                    site: self.registry.site(param).describe(),
                }
            })?;
            self.emit_chain(dependency, out, labels)?;
        }
        Ok(())
    }

    fn emit_access(
        &self,
        provider: &ProviderDeclaration,
        out: &mut Vec<Instruction>,
        labels: &mut LabelAllocator,
    ) -> Result<(), WeaveError> {
        match &provider.access {
            AccessPath::Constructor { descriptor } => {
                out.push(Instruction::New(provider.owner.clone()));
                out.push(Instruction::Dup);
                self.emit_arguments(provider, out, labels)?;
                out.push(Instruction::Invoke {
                    kind: InvokeKind::Special,
                    target: MemberRef::new(provider.owner.clone(), INIT, descriptor.clone()),
                });
            }
            AccessPath::StaticMethod { name, descriptor } => {
                self.emit_arguments(provider, out, labels)?;
                out.push(Instruction::Invoke {
                    kind: InvokeKind::Static,
                    target: MemberRef::new(provider.owner.clone(), name.clone(), descriptor.clone()),
                });
            }
            AccessPath::Property { name, descriptor } => {
                out.push(Instruction::GetStatic(MemberRef::new(
                    provider.owner.clone(),
                    name.clone(),
                    descriptor.clone(),
                )));
            }
        }
        Ok(())
    }
}

fn with_class(error: WeaveError, class: &str) -> WeaveError {
    match error {
        WeaveError::Encode { class: c, reason } if c.is_empty() => WeaveError::encode(class, reason),
        other => other,
    }
}
