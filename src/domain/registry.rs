//! Discovery registry: provider declarations and injection sites of one run.

use crate::domain::class_model::INIT;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProviderId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SiteId(pub usize);

/// singleton = one cached instance per run; factory = a fresh instance per access
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Singleton,
    Factory,
}

/// How the woven code obtains a provided instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessPath {
    Constructor { descriptor: String },
    StaticMethod { name: String, descriptor: String },
    /// Static field read
    Property { name: String, descriptor: String },
}

impl AccessPath {
    pub fn name(&self) -> &str {
        match self {
            AccessPath::Constructor { .. } => INIT,
            AccessPath::StaticMethod { name, .. } | AccessPath::Property { name, .. } => name,
        }
    }

    pub fn descriptor(&self) -> &str {
        match self {
            AccessPath::Constructor { descriptor }
            | AccessPath::StaticMethod { descriptor, .. }
            | AccessPath::Property { descriptor, .. } => descriptor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderDeclaration {
    pub id: ProviderId,
    /// Declaring class
    pub owner: String,
    pub provided: String,
    pub access: AccessPath,
    pub scope: Scope,
    /// Parameter type names, in declaration order
    pub parameters: Vec<String>,
    /// One injection site per parameter, same order
    pub parameter_sites: Vec<SiteId>,
}

impl ProviderDeclaration {
    /// `owner.access -> provided`
    pub fn describe(&self) -> String {
        format!("{}.{} -> {}", self.owner, self.access.name(), self.provided)
    }

    pub fn is_singleton(&self) -> bool {
        self.scope == Scope::Singleton
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SiteKind {
    /// Instance field whose reads are replaced by the provider chain
    FieldDelegate { descriptor: String },
    /// Parameter of a constructor or provider method
    Parameter { provider: ProviderId, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionSite {
    pub id: SiteId,
    pub owner: String,
    pub member: String,
    pub requested: String,
    pub kind: SiteKind,
}

impl InjectionSite {
    /// `owner.member` for fields, `owner.member#index` for parameters
    pub fn describe(&self) -> String {
        match &self.kind {
            SiteKind::FieldDelegate { .. } => format!("{}.{}", self.owner, self.member),
            SiteKind::Parameter { index, .. } => {
                format!("{}.{}#{}", self.owner, self.member, index)
            }
        }
    }

    pub fn is_field(&self) -> bool {
        matches!(self.kind, SiteKind::FieldDelegate { .. })
    }
}

/// Provider declaration under construction; ids are assigned by the registry.
#[derive(Debug, Clone)]
pub struct NewProvider {
    pub owner: String,
    pub provided: String,
    pub access: AccessPath,
    pub scope: Scope,
    pub parameters: Vec<String>,
}

/// Registry - every declaration discovered in one run, in discovery order
#[derive(Debug, Default)]
pub struct Registry {
    providers: Vec<ProviderDeclaration>,
    sites: Vec<InjectionSite>,
    providers_by_class: HashMap<String, Vec<ProviderId>>,
    sites_by_class: HashMap<String, Vec<SiteId>>,
    field_sites: HashMap<(String, String), SiteId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a provider and one parameter site per parameter.
    pub fn add_provider(&mut self, new: NewProvider) -> ProviderId {
        let id = ProviderId(self.providers.len());
        let member = new.access.name().to_string();
        let parameter_sites = new
            .parameters
            .iter()
            .enumerate()
            .map(|(index, requested)| {
                self.push_site(
                    new.owner.clone(),
                    member.clone(),
                    requested.clone(),
                    SiteKind::Parameter { provider: id, index },
                )
            })
            .collect();

        self.providers_by_class
            .entry(new.owner.clone())
            .or_default()
            .push(id);
        self.providers.push(ProviderDeclaration {
            id,
            owner: new.owner,
            provided: new.provided,
            access: new.access,
            scope: new.scope,
            parameters: new.parameters,
            parameter_sites,
        });
        id
    }

    pub fn add_field_site(
        &mut self,
        owner: &str,
        field: &str,
        requested: &str,
        descriptor: &str,
    ) -> SiteId {
        let id = self.push_site(
            owner.to_string(),
            field.to_string(),
            requested.to_string(),
            SiteKind::FieldDelegate {
                descriptor: descriptor.to_string(),
            },
        );
        self.field_sites
            .insert((owner.to_string(), field.to_string()), id);
        id
    }

    fn push_site(
        &mut self,
        owner: String,
        member: String,
        requested: String,
        kind: SiteKind,
    ) -> SiteId {
        let id = SiteId(self.sites.len());
        self.sites_by_class.entry(owner.clone()).or_default().push(id);
        self.sites.push(InjectionSite {
            id,
            owner,
            member,
            requested,
            kind,
        });
        id
    }

    pub fn provider(&self, id: ProviderId) -> &ProviderDeclaration {
        &self.providers[id.0]
    }

    pub fn site(&self, id: SiteId) -> &InjectionSite {
        &self.sites[id.0]
    }

    pub fn providers(&self) -> &[ProviderDeclaration] {
        &self.providers
    }

    pub fn sites(&self) -> &[InjectionSite] {
        &self.sites
    }

    pub fn field_sites(&self) -> impl Iterator<Item = &InjectionSite> {
        self.sites.iter().filter(|s| s.is_field())
    }

    /// Field-delegate site declared as `owner.field`, if any
    pub fn field_site(&self, owner: &str, field: &str) -> Option<SiteId> {
        self.field_sites
            .get(&(owner.to_string(), field.to_string()))
            .copied()
    }

    pub fn providers_declared_by(&self, class: &str) -> &[ProviderId] {
        self.providers_by_class
            .get(class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn sites_owned_by(&self, class: &str) -> &[SiteId] {
        self.sites_by_class
            .get(class)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_provider_creates_parameter_sites() {
        let mut registry = Registry::new();
        let id = registry.add_provider(NewProvider {
            owner: "app/Git".into(),
            provided: "app/Git".into(),
            access: AccessPath::Constructor {
                descriptor: "(Lapp/Store;Lapp/Clock;)V".into(),
            },
            scope: Scope::Factory,
            parameters: vec!["app/Store".into(), "app/Clock".into()],
        });

        let provider = registry.provider(id);
        assert_eq!(provider.parameter_sites.len(), 2);
        let second = registry.site(provider.parameter_sites[1]);
        assert_eq!(second.requested, "app/Clock");
        assert_eq!(second.describe(), "app/Git.<init>#1");
        assert_eq!(provider.describe(), "app/Git.<init> -> app/Git");
        assert_eq!(registry.sites_owned_by("app/Git").len(), 2);
        assert_eq!(registry.field_sites().count(), 0);
    }

    #[test]
    fn test_field_site_lookup() {
        let mut registry = Registry::new();
        let id = registry.add_field_site("app/Main", "store", "app/Store", "Lapp/Store;");
        assert_eq!(registry.field_site("app/Main", "store"), Some(id));
        assert_eq!(registry.field_site("app/Main", "other"), None);
        assert_eq!(registry.site(id).describe(), "app/Main.store");
        assert!(registry.providers_declared_by("app/Main").is_empty());
    }
}
