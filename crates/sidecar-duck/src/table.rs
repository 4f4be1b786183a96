//! Structured table operations
//!
//! Every value is bound as text and cast to the column's declared type
//! inside the store (`CAST(? AS <type>)`), so callers hand over plain
//! strings regardless of column type. `None` binds SQL `NULL`.

use duckdb::{params_from_iter, Connection};
use sidecar_ir::{scalar_text, ColumnarBatch, CompareOp, Row, SortDirection};

use crate::catalog::{ColumnInfo, TableSchema};
use crate::value::to_json;
use crate::{quote_ident, StoreError};

/// A table resolved from the catalog on a specific connection
pub struct Table<'c> {
    conn: &'c Connection,
    schema_name: &'c str,
    schema: TableSchema,
}

impl<'c> Table<'c> {
    pub(crate) fn new(conn: &'c Connection, schema_name: &'c str, schema: TableSchema) -> Self {
        Self {
            conn,
            schema_name,
            schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn column(&self, name: &str) -> Result<&ColumnInfo, StoreError> {
        self.schema.column(name)
    }

    fn qualified_name(&self) -> String {
        format!(
            "{}.{}",
            quote_ident(self.schema_name),
            quote_ident(&self.schema.name)
        )
    }

    pub fn select(&self) -> Select<'_, 'c> {
        Select {
            table: self,
            columns: None,
            filters: vec![],
            order: None,
            limit: None,
        }
    }

    /// Append every row of `batch`. Returns the number of rows written.
    pub fn insert(&self, batch: &ColumnarBatch) -> Result<usize, StoreError> {
        self.insert_rows(batch, 0..batch.row_count())
    }

    /// Append the rows of `batch` at `indices`
    pub fn insert_rows(
        &self,
        batch: &ColumnarBatch,
        indices: impl IntoIterator<Item = usize>,
    ) -> Result<usize, StoreError> {
        let columns = batch
            .column_names()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>, _>>()?;

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.qualified_name(),
            columns
                .iter()
                .map(|c| quote_ident(&c.name))
                .collect::<Vec<_>>()
                .join(", "),
            columns
                .iter()
                .map(|c| cast_param(c))
                .collect::<Vec<_>>()
                .join(", "),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut written = 0;
        for index in indices {
            let values: Vec<Option<String>> =
                batch.row(index).map(|(_, v)| scalar_text(v)).collect();
            written += stmt.execute(params_from_iter(values))?;
        }

        tracing::debug!(table = %self.name(), rows = written, "insert");
        Ok(written)
    }

    /// Whether any row matches every `(column, value)` pair, with `NULL`
    /// matching `NULL`.
    pub fn exists_where(&self, keys: &[(&str, Option<String>)]) -> Result<bool, StoreError> {
        let (clause, values) = self.null_safe_conditions(keys)?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE {clause} LIMIT 1",
            self.qualified_name()
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        Ok(rows.next()?.is_some())
    }

    /// `UPDATE ... SET ... WHERE` with null-safe equality on each condition.
    /// Returns the number of rows changed.
    pub fn update_where(
        &self,
        set: &[(&str, Option<String>)],
        conditions: &[(&str, Option<String>)],
    ) -> Result<usize, StoreError> {
        let mut assignments = Vec::with_capacity(set.len());
        let mut values = Vec::with_capacity(set.len() + conditions.len());
        for (name, value) in set {
            let column = self.column(name)?;
            assignments.push(format!("{} = {}", quote_ident(&column.name), cast_param(column)));
            values.push(value.clone());
        }

        let (clause, condition_values) = self.null_safe_conditions(conditions)?;
        values.extend(condition_values);

        let sql = format!(
            "UPDATE {} SET {} WHERE {clause}",
            self.qualified_name(),
            assignments.join(", ")
        );
        tracing::debug!(table = %self.name(), "update");

        Ok(self.conn.execute(&sql, params_from_iter(values))?)
    }

    fn null_safe_conditions(
        &self,
        pairs: &[(&str, Option<String>)],
    ) -> Result<(String, Vec<Option<String>>), StoreError> {
        let mut clauses = Vec::with_capacity(pairs.len());
        let mut values = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            let column = self.column(name)?;
            clauses.push(format!(
                "{} IS NOT DISTINCT FROM {}",
                quote_ident(&column.name),
                cast_param(column)
            ));
            values.push(value.clone());
        }

        let clause = if clauses.is_empty() {
            "TRUE".to_string()
        } else {
            clauses.join(" AND ")
        };
        Ok((clause, values))
    }
}

fn cast_param(column: &ColumnInfo) -> String {
    format!("CAST(? AS {})", column.data_type)
}

struct Filter {
    column: String,
    op: CompareOp,
    value: Option<String>,
}

enum OrderBy {
    Column(String, SortDirection),
    Distance {
        function: String,
        column: String,
        vector: Vec<f64>,
    },
}

/// Select builder: projection, ANDed filters, one ordering and a limit
pub struct Select<'t, 'c> {
    table: &'t Table<'c>,
    columns: Option<Vec<String>>,
    filters: Vec<Filter>,
    order: Option<OrderBy>,
    limit: Option<u64>,
}

impl<'t, 'c> Select<'t, 'c> {
    /// Project the given columns; all columns when never called
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Result<Self, StoreError> {
        let resolved = columns
            .iter()
            .map(|c| self.table.column(c.as_ref()).map(|c| c.name.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        self.columns = Some(resolved);
        Ok(self)
    }

    /// `Eq`/`Ne` against `None` become `IS NULL`/`IS NOT NULL`; `Like` is a
    /// substring match on the column's text form.
    pub fn filter(
        mut self,
        column: &str,
        op: CompareOp,
        value: Option<String>,
    ) -> Result<Self, StoreError> {
        let column = self.table.column(column)?.name.clone();
        self.filters.push(Filter { column, op, value });
        Ok(self)
    }

    pub fn order_by(mut self, column: &str, direction: SortDirection) -> Result<Self, StoreError> {
        let column = self.table.column(column)?.name.clone();
        self.order = Some(OrderBy::Column(column, direction));
        Ok(self)
    }

    /// Nearest-first by the store's own distance `function`; rows whose
    /// distance is `NULL` come last.
    pub fn order_by_distance(
        mut self,
        function: &str,
        column: &str,
        vector: &[f64],
    ) -> Result<Self, StoreError> {
        let column = self.table.column(column)?.name.clone();
        self.order = Some(OrderBy::Distance {
            function: function.to_string(),
            column,
            vector: vector.to_vec(),
        });
        Ok(self)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn projection(&self) -> Vec<String> {
        match &self.columns {
            Some(columns) => columns.clone(),
            None => self.table.schema.column_names().map(str::to_string).collect(),
        }
    }

    fn to_sql(&self, projection: &[String]) -> Result<(String, Vec<Option<String>>), StoreError> {
        let mut sql = format!(
            "SELECT {} FROM {}",
            projection
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", "),
            self.table.qualified_name()
        );
        let mut params = Vec::new();

        let mut clauses = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let column = self.table.column(&filter.column)?;
            let ident = quote_ident(&column.name);
            let clause = match (filter.op, &filter.value) {
                (CompareOp::Eq, None) => format!("{ident} IS NULL"),
                (CompareOp::Ne, None) => format!("{ident} IS NOT NULL"),
                (CompareOp::Like, value) => {
                    params.push(value.clone());
                    format!("contains(CAST({ident} AS VARCHAR), ?)")
                }
                (op, value) => {
                    params.push(value.clone());
                    format!("{ident} {} {}", op.as_sql(), cast_param(column))
                }
            };
            clauses.push(clause);
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        match &self.order {
            Some(OrderBy::Column(column, direction)) => {
                sql.push_str(&format!(" ORDER BY {} {}", quote_ident(column), direction.as_sql()));
            }
            Some(OrderBy::Distance {
                function,
                column,
                vector,
            }) => {
                let info = self.table.column(column)?;
                let elements: Vec<String> = vector.iter().map(f64::to_string).collect();
                params.push(Some(format!("[{}]", elements.join(", "))));
                // Function names come from the registry, never from the query
                sql.push_str(&format!(
                    " ORDER BY {function}({}, {}) ASC NULLS LAST",
                    quote_ident(&info.name),
                    cast_param(info)
                ));
            }
            None => {}
        }

        if let Some(limit) = self.limit {
            // DuckDB limits are signed
            let limit = limit.min(i64::MAX as u64);
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok((sql, params))
    }

    /// Run the select and materialize rows keyed by column name
    pub fn to_rows(self) -> Result<Vec<Row>, StoreError> {
        let projection = self.projection();
        let (sql, params) = self.to_sql(&projection)?;
        tracing::debug!(table = %self.table.name(), %sql, "select");

        let mut stmt = self.table.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (index, name) in projection.iter().enumerate() {
                record.insert(name.clone(), to_json(row.get(index)?));
            }
            out.push(record);
        }

        Ok(out)
    }
}
