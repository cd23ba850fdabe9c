use crate::domain::class_model::{ClassModel, FieldModel, MethodModel, access};
use crate::domain::descriptor::{FieldType, MethodDescriptor};
use crate::domain::error::{BindingErrors, MalformedClassError, Warning};
use crate::domain::graph::BindingGraph;
use crate::domain::hierarchy::{Relation, TypeHierarchy};
use crate::domain::registry::{AccessPath, NewProvider, ProviderId, Registry, Scope};
use crate::domain::resolver::Resolver;
use serde::{Deserialize, Serialize};

/// Annotation type names that mark providers and injection sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    pub provides: String,
    pub singleton: String,
    pub inject: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            provides: "knit/Provides".to_string(),
            singleton: "knit/Singleton".to_string(),
            inject: "knit/DI".to_string(),
        }
    }
}

/// Graph builder, pass 1 - discovery context
///
/// Owns everything discovered during one run. Nothing can be resolved until
/// [`Discovery::traverse_finished`] consumes the context, so no query ever
/// observes a partially-populated registry.
pub struct Discovery {
    markers: Markers,
    registry: Registry,
    hierarchy: TypeHierarchy,
    warnings: Vec<Warning>,
    program_classes: Vec<String>,
    /// Providers whose concrete type must be checked against the provided type
    /// once the whole hierarchy is known.
    provides_as: Vec<(ProviderId, String)>,
}

impl Discovery {
    pub fn new(markers: Markers) -> Self {
        Self {
            markers,
            registry: Registry::new(),
            hierarchy: TypeHierarchy::new(),
            warnings: Vec::new(),
            program_classes: Vec::new(),
            provides_as: Vec::new(),
        }
    }

    /// Classpath-only entry: contributes to the hierarchy, never scanned for markers.
    pub fn add_library(&mut self, model: &ClassModel) {
        self.hierarchy.register_model(model, true);
    }

    /// Record the declarations of one program class.
    ///
    /// Returns `false` when a class of the same name was already traversed;
    /// the later one is dropped with a warning.
    pub fn traverse(&mut self, model: &mut ClassModel) -> Result<bool, MalformedClassError> {
        if !self.hierarchy.register_model(model, false) {
            tracing::warn!(class = %model.name, "duplicate class definition, first seen wins");
            self.warnings.push(Warning::DuplicateClass {
                entry: model.name.clone(),
            });
            return Ok(false);
        }
        self.program_classes.push(model.name.clone());

        let providers_before = self.registry.providers().len();
        let class_singleton = model.has_annotation(&self.markers.singleton);

        self.discover_constructors(model, class_singleton)?;
        for method in model.methods.iter().filter(|m| !m.is_constructor()) {
            if method.has_annotation(&self.markers.provides) {
                self.discover_method(model, method, class_singleton)?;
            }
        }
        for field in &model.fields {
            if field.has_annotation(&self.markers.provides) {
                self.discover_property(model, field, class_singleton)?;
            }
            if field.has_annotation(&self.markers.inject) {
                self.discover_field_site(model, field)?;
            }
        }

        model.roles.provider = self.registry.providers().len() > providers_before;
        model.roles.component = self
            .registry
            .sites_owned_by(&model.name)
            .iter()
            .any(|&id| self.registry.site(id).is_field());

        tracing::debug!(
            class = %model.name,
            provider = model.roles.provider,
            component = model.roles.component,
            "class discovered"
        );
        Ok(true)
    }

    fn discover_constructors(
        &mut self,
        model: &ClassModel,
        class_singleton: bool,
    ) -> Result<(), MalformedClassError> {
        let class_marker = model.annotation(&self.markers.provides);
        let annotated: Vec<&MethodModel> = model
            .constructors()
            .filter(|m| m.has_annotation(&self.markers.provides))
            .collect();

        let chosen: Vec<&MethodModel> = if !annotated.is_empty() {
            annotated
        } else if class_marker.is_some() {
            match model.constructors().next() {
                Some(ctor) => vec![ctor],
                None => {
                    return Err(MalformedClassError::structural(
                        &model.name,
                        "provider class declares no constructor",
                    ));
                }
            }
        } else {
            return Ok(());
        };

        if model.is_interface() || model.access & access::ABSTRACT != 0 {
            self.warnings.push(Warning::IgnoredProvider {
                class: model.name.clone(),
                member: crate::domain::class_model::INIT.to_string(),
                reason: "abstract types cannot be constructed".to_string(),
            });
            return Ok(());
        }

        for ctor in chosen {
            let descriptor = parse_method(model, ctor)?;
            let marker = ctor
                .annotation(&self.markers.provides)
                .or(class_marker);
            let provided = provided_types(marker, &model.name);
            let scope = scope_of(class_singleton || ctor.has_annotation(&self.markers.singleton));
            for provided in provided {
                let id = self.registry.add_provider(NewProvider {
                    owner: model.name.clone(),
                    provided,
                    access: AccessPath::Constructor {
                        descriptor: ctor.descriptor.clone(),
                    },
                    scope,
                    parameters: parameter_types(&descriptor),
                });
                self.provides_as.push((id, model.name.clone()));
            }
        }
        Ok(())
    }

    fn discover_method(
        &mut self,
        model: &ClassModel,
        method: &MethodModel,
        class_singleton: bool,
    ) -> Result<(), MalformedClassError> {
        if !method.is_static() {
            tracing::warn!(class = %model.name, method = %method.name, "instance provider method ignored");
            self.warnings.push(Warning::IgnoredProvider {
                class: model.name.clone(),
                member: method.name.clone(),
                reason: "provider methods must be static".to_string(),
            });
            return Ok(());
        }
        if model.is_interface() {
            tracing::warn!(class = %model.name, method = %method.name, "interface provider method ignored");
            self.warnings.push(Warning::IgnoredProvider {
                class: model.name.clone(),
                member: method.name.clone(),
                reason: "provider methods cannot be declared on interfaces".to_string(),
            });
            return Ok(());
        }
        let descriptor = parse_method(model, method)?;
        let concrete = match &descriptor.ret {
            Some(ret) if ret.is_reference() => ret.type_name(),
            _ => {
                return Err(MalformedClassError::structural(
                    &model.name,
                    format!(
                        "provider method `{}{}` must return a reference type",
                        method.name, method.descriptor
                    ),
                ));
            }
        };

        let scope = scope_of(class_singleton || method.has_annotation(&self.markers.singleton));
        for provided in provided_types(method.annotation(&self.markers.provides), &concrete) {
            let id = self.registry.add_provider(NewProvider {
                owner: model.name.clone(),
                provided,
                access: AccessPath::StaticMethod {
                    name: method.name.clone(),
                    descriptor: method.descriptor.clone(),
                },
                scope,
                parameters: parameter_types(&descriptor),
            });
            self.provides_as.push((id, concrete.clone()));
        }
        Ok(())
    }

    fn discover_property(
        &mut self,
        model: &ClassModel,
        field: &FieldModel,
        class_singleton: bool,
    ) -> Result<(), MalformedClassError> {
        if !field.is_static() {
            self.warnings.push(Warning::IgnoredProvider {
                class: model.name.clone(),
                member: field.name.clone(),
                reason: "provider properties must be static".to_string(),
            });
            return Ok(());
        }
        let ty = parse_field(model, field)?;
        if !ty.is_reference() {
            return Err(MalformedClassError::structural(
                &model.name,
                format!("provider property `{}` must be a reference type", field.name),
            ));
        }
        let concrete = ty.type_name();
        let scope = scope_of(class_singleton || field.has_annotation(&self.markers.singleton));
        if scope == Scope::Singleton && model.is_interface() {
            self.warnings.push(Warning::IgnoredProvider {
                class: model.name.clone(),
                member: field.name.clone(),
                reason: "interfaces cannot hold a singleton cache field".to_string(),
            });
            return Ok(());
        }
        for provided in provided_types(field.annotation(&self.markers.provides), &concrete) {
            let id = self.registry.add_provider(NewProvider {
                owner: model.name.clone(),
                provided,
                access: AccessPath::Property {
                    name: field.name.clone(),
                    descriptor: field.descriptor.clone(),
                },
                scope,
                parameters: Vec::new(),
            });
            self.provides_as.push((id, concrete.clone()));
        }
        Ok(())
    }

    fn discover_field_site(
        &mut self,
        model: &ClassModel,
        field: &FieldModel,
    ) -> Result<(), MalformedClassError> {
        if field.is_static() {
            self.warnings.push(Warning::IgnoredInjection {
                class: model.name.clone(),
                member: field.name.clone(),
                reason: "static fields cannot be injected".to_string(),
            });
            return Ok(());
        }
        let ty = parse_field(model, field)?;
        self.registry
            .add_field_site(&model.name, &field.name, &ty.type_name(), &field.descriptor);
        Ok(())
    }

    /// Discovery barrier: freeze the registry and hierarchy.
    pub fn traverse_finished(self) -> Result<DiscoveredGraph, MalformedClassError> {
        self.hierarchy.validate()?;

        for (id, concrete) in &self.provides_as {
            let provider = self.registry.provider(*id);
            match self.hierarchy.relate(concrete, &provider.provided) {
                Relation::Same | Relation::Subtype => {}
                Relation::UnknownExternal => {
                    tracing::debug!(
                        provider = %provider.describe(),
                        "provided type not verifiable against an incomplete classpath"
                    );
                }
                Relation::Supertype | Relation::Unrelated => {
                    return Err(MalformedClassError::structural(
                        &provider.owner,
                        format!(
                            "`{}` declares it provides `{}` but `{}` does not inherit it",
                            provider.describe(),
                            provider.provided,
                            concrete
                        ),
                    ));
                }
            }
        }

        tracing::info!(
            classes = self.program_classes.len(),
            providers = self.registry.providers().len(),
            sites = self.registry.sites().len(),
            "discovery finished"
        );
        Ok(DiscoveredGraph {
            registry: self.registry,
            hierarchy: self.hierarchy,
            warnings: self.warnings,
            program_classes: self.program_classes,
        })
    }
}

/// Frozen result of discovery. Read-only from here on.
#[derive(Debug)]
pub struct DiscoveredGraph {
    pub registry: Registry,
    pub hierarchy: TypeHierarchy,
    pub warnings: Vec<Warning>,
    program_classes: Vec<String>,
}

impl DiscoveredGraph {
    /// Pass 2: resolve every injection site into the binding graph.
    pub fn resolve(&self) -> Result<BindingGraph, BindingErrors> {
        Resolver::new(&self.registry, &self.hierarchy).resolve()
    }

    /// Program classes in traversal order
    pub fn program_classes(&self) -> &[String] {
        &self.program_classes
    }
}

fn scope_of(singleton: bool) -> Scope {
    if singleton {
        Scope::Singleton
    } else {
        Scope::Factory
    }
}

/// Types listed in the marker's `value`, or the concrete type itself.
fn provided_types(
    marker: Option<&crate::domain::class_model::Annotation>,
    concrete: &str,
) -> Vec<String> {
    let listed = marker.map(|m| m.class_list("value")).unwrap_or_default();
    if listed.is_empty() {
        vec![concrete.to_string()]
    } else {
        listed
    }
}

fn parameter_types(descriptor: &MethodDescriptor) -> Vec<String> {
    descriptor.params.iter().map(FieldType::type_name).collect()
}

fn parse_method(
    model: &ClassModel,
    method: &MethodModel,
) -> Result<MethodDescriptor, MalformedClassError> {
    MethodDescriptor::parse(&method.descriptor).ok_or_else(|| {
        MalformedClassError::structural(
            &model.name,
            format!("invalid descriptor `{}` on `{}`", method.descriptor, method.name),
        )
    })
}

fn parse_field(model: &ClassModel, field: &FieldModel) -> Result<FieldType, MalformedClassError> {
    FieldType::parse(&field.descriptor).ok_or_else(|| {
        MalformedClassError::structural(
            &model.name,
            format!("invalid descriptor `{}` on `{}`", field.descriptor, field.name),
        )
    })
}
