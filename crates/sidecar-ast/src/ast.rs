//! AST types for the SQL subset
//!
//! Minimal AST representation closely following the Pest grammar. Literal
//! text is kept raw here; interpretation happens in `to_ir`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub projection: Projection,
    pub table: String,
    pub conditions: Vec<Condition>,
    pub order: Option<OrderItem>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    Wildcard,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub op: CmpOp,
    pub operand: Operand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Quoted or bare literal, quotes already stripped
    Literal(String),
    /// `?`, bound positionally from query arguments
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderItem {
    Column {
        column: String,
        desc: bool,
    },
    /// `func(column, [e0, e1, ...])`; elements are raw tokens
    DistanceCall {
        func: String,
        column: String,
        elements: Vec<String>,
        desc: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit {
    /// Token following `LIMIT`, if any
    pub raw: Option<String>,
}

impl Query {
    /// Number of `?` placeholders, in order of appearance
    pub fn placeholder_count(&self) -> usize {
        self.conditions
            .iter()
            .filter(|c| c.operand == Operand::Placeholder)
            .count()
    }
}
