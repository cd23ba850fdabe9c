pub mod error;
pub mod descriptor;
pub mod class_model;
pub mod hierarchy;
pub mod registry;
pub mod edge;
pub mod graph;
pub mod builder;
pub mod resolver;
pub mod loader;
pub mod transform;
pub mod dump;
pub mod ports;
