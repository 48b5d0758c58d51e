//! Core of the silo data access engine: value model, SQL fragments, the
//! path-term query compiler, row marshalling, persistence and the
//! per-database concurrency controller. Driver crates supply a [`Dialect`]
//! and a [`Connection`]; everything above that line lives here.
mod as_value;
mod column;
mod compiler;
mod config;
mod connection;
mod context;
mod ddl;
mod dialect;
mod encryption;
mod entity;
mod error;
mod expression;
mod fragment;
mod lock;
mod marshal;
mod metrics;
mod parse;
mod persist;
mod relation;
mod result_set;
mod row;
mod term;
mod util;
mod value;

#[cfg(test)]
mod fixtures;

pub use as_value::*;
pub use column::*;
pub use compiler::*;
pub use config::*;
pub use connection::*;
pub use context::*;
pub use ddl::*;
pub use dialect::*;
pub use encryption::*;
pub use entity::*;
pub use error::*;
pub use expression::*;
pub use fragment::*;
pub use lock::*;
pub use marshal::*;
pub use metrics::*;
pub use parse::*;
pub use persist::*;
pub use relation::*;
pub use result_set::*;
pub use row::*;
pub use term::*;
pub use util::*;
pub use value::*;
