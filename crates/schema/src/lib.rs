//! Operator identity and function schemas.
//!
//! The dispatcher only needs three things from a schema: the operator's
//! identity ([`OperatorName`]), how many values its boxed calling convention
//! consumes and produces, and whether two definitions of the same identity
//! agree. Everything here exists to answer those questions; full type
//! checking of schema strings is deliberately absent.
//!
//! # Grammar
//!
//! ```text
//! name[.overload](arg_type arg_name[=default], ...) -> ret_type
//! name[.overload](arg_type arg_name, ...) -> (ret_type [ret_name], ...)
//! ```
//!
//! Names may be namespace-qualified (`aten::add.out`). A bare `*` in the
//! argument list marks the start of keyword-only arguments and is not itself
//! an argument.

mod error;
mod name;
mod parse;
mod schema;

pub use error::SchemaParseError;
pub use name::{OperatorName, parse_name};
pub use parse::parse_schema;
pub use schema::{AliasAnalysisKind, Argument, FunctionSchema};

#[cfg(test)]
mod tests;
