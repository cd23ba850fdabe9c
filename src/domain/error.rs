//! Error and warning types for a weaving run.
//!
//! Every variant of [`WeaveError`] is fatal: the run aborts before the first
//! output entry is written. [`Warning`]s are collected into the run report and
//! never block completion.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, WeaveError>;

/// Unreadable or structurally invalid class input.
///
/// A corrupt classpath cannot be reasoned about, so this always aborts the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed class `{entry}` at byte {offset}: {reason}")]
pub struct MalformedClassError {
    pub entry: String,
    pub offset: usize,
    pub reason: String,
}

impl MalformedClassError {
    pub fn new(entry: impl Into<String>, offset: usize, reason: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            offset,
            reason: reason.into(),
        }
    }

    /// Structural problem not tied to a byte position (e.g. found during discovery).
    pub fn structural(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(entry, 0, reason)
    }
}

/// A resolution failure for one injection site or provider chain.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BindingError {
    #[error("unresolved binding: `{site}` requests `{requested}` but no provider supplies it or a subtype")]
    Unresolved {
        site: String,
        owner: String,
        requested: String,
    },

    #[error("ambiguous binding: `{site}` requests `{requested}`; candidates: {}", .candidates.join(", "))]
    Ambiguous {
        site: String,
        owner: String,
        requested: String,
        candidates: Vec<String>,
    },

    #[error("cyclic binding{}: {}", singleton_tag(.singleton), .cycle.join(" -> "))]
    Cyclic {
        cycle: Vec<String>,
        owners: Vec<String>,
        singleton: bool,
    },
}

impl BindingError {
    /// Classes the error is attributed to (used to mark errored graph nodes).
    pub fn owners(&self) -> Vec<&str> {
        match self {
            BindingError::Unresolved { owner, .. } | BindingError::Ambiguous { owner, .. } => {
                vec![owner.as_str()]
            }
            BindingError::Cyclic { owners, .. } => owners.iter().map(String::as_str).collect(),
        }
    }
}

fn singleton_tag(singleton: &bool) -> &'static str {
    if *singleton { " (singleton)" } else { "" }
}

/// All binding errors of a failed resolution, in deterministic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingErrors(pub Vec<BindingError>);

impl BindingErrors {
    pub fn iter(&self) -> impl Iterator<Item = &BindingError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BindingErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} binding error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BindingErrors {}

/// Fatal error of a weaving run.
#[derive(Debug, Error)]
pub enum WeaveError {
    #[error(transparent)]
    Malformed(#[from] MalformedClassError),

    #[error(transparent)]
    Binding(#[from] BindingErrors),

    #[error("failed to encode `{class}`: {reason}")]
    Encode { class: String, reason: String },

    #[error("injection site `{site}` has no binding")]
    Unbound { site: String },

    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WeaveError {
    pub fn encode<S: Into<String>, R: Into<String>>(class: S, reason: R) -> Self {
        Self::Encode {
            class: class.into(),
            reason: reason.into(),
        }
    }

    pub fn io<P: Into<String>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Binding errors carried by this failure, if any.
    pub fn binding_errors(&self) -> &[BindingError] {
        match self {
            WeaveError::Binding(errors) => &errors.0,
            _ => &[],
        }
    }
}

/// Recoverable diagnostics; first-seen wins for every duplicate kind.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    #[error("duplicate class entry `{entry}` dropped, first seen wins")]
    DuplicateClass { entry: String },

    #[error("duplicate resource `{entry}` dropped, first seen wins")]
    DuplicateResource { entry: String },

    #[error("provider `{class}.{member}` ignored: {reason}")]
    IgnoredProvider {
        class: String,
        member: String,
        reason: String,
    },

    #[error("injection site `{class}.{member}` ignored: {reason}")]
    IgnoredInjection {
        class: String,
        member: String,
        reason: String,
    },
}
