//! Pest-based parser for the SQL subset

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::ast::*;

#[derive(Parser)]
#[grammar = "sql.pest"]
pub struct SqlParser;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Pest error: {0}")]
    Pest(#[from] pest::error::Error<Rule>),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Query has {expected} placeholder(s) but {provided} argument(s) were supplied")]
    ArgumentCount { expected: usize, provided: usize },
}

/// Parse query text into AST
pub fn parse(source: &str) -> Result<Query, ParseError> {
    check_statement_kind(source)?;

    let mut pairs = match SqlParser::parse(Rule::query, source) {
        Ok(pairs) => pairs,
        Err(e) if !contains_word(source, "from") => {
            tracing::debug!(error = %e, "query rejected without FROM clause");
            return Err(ParseError::Syntax("SELECT query missing FROM clause".to_string()));
        }
        Err(e) => return Err(ParseError::Pest(e.renamed_rules(describe_rule))),
    };

    let query_pair = pairs
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty input".to_string()))?;
    let stmt = expect(&mut query_pair.into_inner(), Rule::select_stmt)?;

    parse_select(stmt)
}

/// Fail fast on anything that is not a SELECT, with a clearer message than
/// the grammar error would give.
fn check_statement_kind(source: &str) -> Result<(), ParseError> {
    let first_word: String = source
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();

    if first_word.is_empty() {
        if source.trim().is_empty() {
            return Err(ParseError::Syntax("Empty query".to_string()));
        }
        return Err(ParseError::Syntax("Query must start with SELECT".to_string()));
    }

    if !first_word.eq_ignore_ascii_case("select") {
        return Err(ParseError::Syntax(format!(
            "Only SELECT statements are supported, found {}",
            first_word.to_ascii_uppercase()
        )));
    }

    Ok(())
}

fn contains_word(source: &str, word: &str) -> bool {
    source
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|w| w.eq_ignore_ascii_case(word))
}

fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::ident => "identifier",
        Rule::kw_select => "SELECT",
        Rule::kw_from => "FROM",
        Rule::kw_where => "WHERE",
        Rule::kw_and => "AND",
        Rule::kw_order => "ORDER BY",
        Rule::kw_by => "BY",
        Rule::kw_limit => "LIMIT",
        Rule::direction | Rule::kw_asc | Rule::kw_desc => "ASC or DESC",
        Rule::compare_op => "comparison operator",
        Rule::operand => "value",
        Rule::select_list | Rule::column_list | Rule::wildcard => "column list or *",
        Rule::vector | Rule::element => "vector literal",
        Rule::EOI => "end of query",
        other => return format!("{other:?}"),
    }
    .to_string()
}

/// Next pair of the given rule, skipping keyword tokens
fn expect<'a>(pairs: &mut Pairs<'a, Rule>, rule: Rule) -> Result<Pair<'a, Rule>, ParseError> {
    pairs
        .find(|p| p.as_rule() == rule)
        .ok_or_else(|| ParseError::Syntax(format!("Expected {}", describe_rule(&rule))))
}

fn parse_select(pair: Pair<Rule>) -> Result<Query, ParseError> {
    let mut projection = None;
    let mut table = None;
    let mut conditions = Vec::new();
    let mut order = None;
    let mut limit = None;

    for clause in pair.into_inner() {
        match clause.as_rule() {
            Rule::select_list => projection = Some(parse_select_list(clause)?),
            Rule::from_clause => {
                table = Some(expect(&mut clause.into_inner(), Rule::ident)?.as_str().to_string());
            }
            Rule::where_clause => conditions = parse_where(clause)?,
            Rule::order_clause => order = Some(parse_order(clause)?),
            Rule::limit_clause => limit = Some(parse_limit(clause)),
            _ => {}
        }
    }

    Ok(Query {
        projection: projection.ok_or_else(|| ParseError::Syntax("Missing column list".to_string()))?,
        table: table.ok_or_else(|| ParseError::Syntax("SELECT query missing FROM clause".to_string()))?,
        conditions,
        order,
        limit,
    })
}

fn parse_select_list(pair: Pair<Rule>) -> Result<Projection, ParseError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty column list".to_string()))?;

    match inner.as_rule() {
        Rule::wildcard => Ok(Projection::Wildcard),
        Rule::column_list => Ok(Projection::Columns(
            inner.into_inner().map(|p| p.as_str().to_string()).collect(),
        )),
        _ => Err(ParseError::Syntax("Invalid column list".to_string())),
    }
}

fn parse_where(pair: Pair<Rule>) -> Result<Vec<Condition>, ParseError> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::condition)
        .map(parse_condition)
        .collect()
}

fn parse_condition(pair: Pair<Rule>) -> Result<Condition, ParseError> {
    let mut inner = pair.into_inner();
    let column = expect(&mut inner, Rule::ident)?.as_str().to_string();
    let op = parse_compare_op(expect(&mut inner, Rule::compare_op)?.as_str())?;
    let operand = parse_operand(expect(&mut inner, Rule::operand)?)?;

    Ok(Condition { column, op, operand })
}

fn parse_compare_op(text: &str) -> Result<CmpOp, ParseError> {
    let op = match text.trim().to_ascii_lowercase().as_str() {
        "=" => CmpOp::Eq,
        "!=" | "<>" => CmpOp::Ne,
        ">" => CmpOp::Gt,
        "<" => CmpOp::Lt,
        ">=" => CmpOp::Ge,
        "<=" => CmpOp::Le,
        "like" => CmpOp::Like,
        other => return Err(ParseError::Syntax(format!("Unknown operator: {other}"))),
    };
    Ok(op)
}

fn parse_operand(pair: Pair<Rule>) -> Result<Operand, ParseError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::Syntax("Missing value".to_string()))?;

    match inner.as_rule() {
        Rule::placeholder => Ok(Operand::Placeholder),
        // Quotes are stripped; no escape processing
        Rule::quoted => Ok(Operand::Literal(
            inner
                .into_inner()
                .next()
                .map(|body| body.as_str().to_string())
                .unwrap_or_default(),
        )),
        Rule::bare => Ok(Operand::Literal(inner.as_str().to_string())),
        _ => Err(ParseError::Syntax("Invalid value".to_string())),
    }
}

fn parse_order(pair: Pair<Rule>) -> Result<OrderItem, ParseError> {
    let item = expect(&mut pair.into_inner(), Rule::order_item)?;
    let inner = item
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::Syntax("Empty ORDER BY".to_string()))?;

    match inner.as_rule() {
        Rule::column_order => {
            let mut parts = inner.into_inner();
            let column = expect(&mut parts, Rule::ident)?.as_str().to_string();
            let desc = parts.next().is_some_and(|d| is_desc(&d));
            Ok(OrderItem::Column { column, desc })
        }
        Rule::distance_call => {
            let mut parts = inner.into_inner();
            let func = expect(&mut parts, Rule::ident)?.as_str().to_string();
            let column = expect(&mut parts, Rule::ident)?.as_str().to_string();
            let elements = expect(&mut parts, Rule::vector)?
                .into_inner()
                .map(|e| e.as_str().to_string())
                .collect();
            let desc = parts.next().is_some_and(|d| is_desc(&d));
            Ok(OrderItem::DistanceCall {
                func,
                column,
                elements,
                desc,
            })
        }
        _ => Err(ParseError::Syntax("Invalid ORDER BY".to_string())),
    }
}

fn is_desc(direction: &Pair<Rule>) -> bool {
    direction.as_str().trim().eq_ignore_ascii_case("desc")
}

fn parse_limit(pair: Pair<Rule>) -> Limit {
    let raw = pair
        .into_inner()
        .find(|p| p.as_rule() == Rule::limit_value)
        .map(|p| p.as_str().to_string());
    Limit { raw }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_query() {
        let query = parse("SELECT * FROM media_assets").unwrap();
        assert_eq!(query.table, "media_assets");
        assert_eq!(query.projection, Projection::Wildcard);
        assert!(query.conditions.is_empty());
        assert!(query.order.is_none());
        assert!(query.limit.is_none());
    }

    #[test]
    fn test_parse_full_query() {
        let query = parse(
            "select asset_id, status from media_assets \
             where status = 'ready' and attempt >= 2 and object_key LIKE \"clip\" \
             order by ingest_time desc limit 10;",
        )
        .unwrap();

        assert_eq!(
            query.projection,
            Projection::Columns(vec!["asset_id".to_string(), "status".to_string()])
        );
        assert_eq!(
            query.conditions,
            vec![
                Condition {
                    column: "status".to_string(),
                    op: CmpOp::Eq,
                    operand: Operand::Literal("ready".to_string()),
                },
                Condition {
                    column: "attempt".to_string(),
                    op: CmpOp::Ge,
                    operand: Operand::Literal("2".to_string()),
                },
                Condition {
                    column: "object_key".to_string(),
                    op: CmpOp::Like,
                    operand: Operand::Literal("clip".to_string()),
                },
            ]
        );
        assert_eq!(
            query.order,
            Some(OrderItem::Column {
                column: "ingest_time".to_string(),
                desc: true
            })
        );
        assert_eq!(query.limit, Some(Limit { raw: Some("10".to_string()) }));
    }

    #[test]
    fn test_parse_operators() {
        for (text, op) in [
            ("=", CmpOp::Eq),
            ("!=", CmpOp::Ne),
            ("<>", CmpOp::Ne),
            (">", CmpOp::Gt),
            ("<", CmpOp::Lt),
            (">=", CmpOp::Ge),
            ("<=", CmpOp::Le),
        ] {
            let query = parse(&format!("SELECT * FROM t WHERE a {text} 1")).unwrap();
            assert_eq!(query.conditions[0].op, op, "operator {text}");
        }
    }

    #[test]
    fn test_operators_without_spaces() {
        let query = parse("SELECT * FROM t WHERE a>=1 AND b='x'").unwrap();
        assert_eq!(query.conditions.len(), 2);
        assert_eq!(query.conditions[0].op, CmpOp::Ge);
        assert_eq!(query.conditions[1].operand, Operand::Literal("x".to_string()));
    }

    #[test]
    fn test_quoted_values_keep_spaces_and_escapes() {
        let query = parse(r"SELECT * FROM t WHERE note = 'a b\n' AND x = ''").unwrap();
        assert_eq!(query.conditions[0].operand, Operand::Literal(r"a b\n".to_string()));
        assert_eq!(query.conditions[1].operand, Operand::Literal(String::new()));
    }

    #[test]
    fn test_placeholders() {
        let query = parse("SELECT * FROM media_assets WHERE asset_id = ? AND status = ?").unwrap();
        assert_eq!(query.placeholder_count(), 2);
    }

    #[test]
    fn test_distance_call() {
        let query = parse(
            "SELECT * FROM transcript_segments \
             ORDER BY array_cosine_distance(embedding, [0.1, -0.2, 3e-1]) LIMIT 3",
        )
        .unwrap();

        assert_eq!(
            query.order,
            Some(OrderItem::DistanceCall {
                func: "array_cosine_distance".to_string(),
                column: "embedding".to_string(),
                elements: vec!["0.1".to_string(), "-0.2".to_string(), "3e-1".to_string()],
                desc: false,
            })
        );
    }

    #[test]
    fn test_limit_raw_values() {
        let query = parse("SELECT * FROM t LIMIT abc").unwrap();
        assert_eq!(query.limit, Some(Limit { raw: Some("abc".to_string()) }));

        let query = parse("SELECT * FROM t LIMIT").unwrap();
        assert_eq!(query.limit, Some(Limit { raw: None }));
    }

    #[test]
    fn test_identifier_may_start_with_keyword() {
        let query = parse("SELECT * FROM order_items WHERE descr = 'x' ORDER BY ascent").unwrap();
        assert_eq!(query.table, "order_items");
        assert_eq!(query.conditions[0].column, "descr");
    }

    #[test]
    fn test_missing_from() {
        let err = parse("SELECT * WHERE status = 'ready'").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(ref m) if m.contains("missing FROM")));
    }

    #[test]
    fn test_non_select_rejected() {
        for sql in [
            "INSERT INTO t VALUES (1)",
            "UPDATE t SET a = 1",
            "DELETE FROM t",
            "  drop table t",
        ] {
            let err = parse(sql).unwrap_err();
            assert!(
                matches!(err, ParseError::Syntax(ref m) if m.contains("Only SELECT")),
                "{sql}: {err}"
            );
        }
    }

    #[test]
    fn test_empty_query() {
        assert!(matches!(parse("   ").unwrap_err(), ParseError::Syntax(_)));
    }

    #[test]
    fn test_out_of_grammar_rejected() {
        for sql in [
            "SELECT * FROM a, b",
            "SELECT * FROM a JOIN b ON a.id = b.id",
            "SELECT * FROM t WHERE a = 1 OR b = 2",
            "SELECT * FROM t WHERE NOT a = 1",
            "SELECT * FROM t WHERE (a = 1)",
            "SELECT * FROM t WHERE a = 1, b = 2",
            "SELECT * FROM t WHERE a",
            "SELECT * FROM t WHERE a = 1 garbage",
            "SELECT * FROM t ORDER BY a, b",
            "SELECT * FROM (SELECT * FROM t)",
            "SELECT count(*) FROM t",
            "SELECT * FROM t LIMIT 5 OFFSET 2",
        ] {
            assert!(parse(sql).is_err(), "should reject: {sql}");
        }
    }
}
