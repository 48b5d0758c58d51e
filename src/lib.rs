//! Silo: a relational data access layer.
//!
//! This crate re-exports the whole engine from `silo-core`. Applications
//! declare their mappings as static [`TableDef`] descriptor tables, register
//! them in a [`TableRegistry`], build an [`Engine`] and open read or write
//! [`DataContext`]s against a driver's [`Dialect`].
pub use silo_core::*;
