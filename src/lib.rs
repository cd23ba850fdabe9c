//! knit-weaver library: compile-time dependency injection for compiled classes.
//!
//! Discovery and resolution live in [`domain`]; the KCLS codec and the
//! filesystem container in [`adapters`]; the pipeline in [`app`].

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
