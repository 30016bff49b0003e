//! Keel Core
//!
//! Resource model, schemas, differ and interpreter for a declarative
//! infrastructure tool that treats side effects as values

pub mod differ;
pub mod effect;
pub mod graph;
pub mod interpreter;
pub mod manifest;
pub mod plan;
pub mod provider;
pub mod resource;
pub mod schema;
