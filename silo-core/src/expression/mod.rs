mod ast;
mod visitor;

pub use ast::*;
pub use visitor::*;
