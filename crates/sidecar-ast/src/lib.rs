//! SQL subset - parser, AST types and translation to IR

pub mod ast;
pub mod parser;
mod to_ir;
mod vector;

pub use ast::*;
pub use parser::{parse, ParseError};
pub use vector::resolve_distance_call;

use sidecar_ir::QueryRequest;
use sidecar_registry::FunctionRegistry;

/// Parse `source` and translate it to a [`QueryRequest`], binding `args` to
/// `?` placeholders in order of appearance.
pub fn translate(
    source: &str,
    args: &[String],
    functions: &FunctionRegistry,
) -> Result<QueryRequest, ParseError> {
    parse(source)?.to_ir(args, functions)
}
