//! Table schemas from the DuckDB information_schema

use duckdb::{params, Connection};

use crate::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// DuckDB type name, usable in `CAST(... AS <data_type>)`
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Name as stored in the catalog
    pub name: String,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Look up `table` in `schema`, ignoring case
    pub fn load(conn: &Connection, schema: &str, table: &str) -> Result<Self, StoreError> {
        let mut stmt = conn.prepare(
            "SELECT table_name, column_name, data_type \
             FROM information_schema.columns \
             WHERE table_schema = ? AND lower(table_name) = lower(?) \
             ORDER BY ordinal_position",
        )?;

        let rows = stmt
            .query_map(params![schema, table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    ColumnInfo {
                        name: row.get(1)?,
                        data_type: row.get(2)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let Some((name, _)) = rows.first() else {
            return Err(StoreError::TableNotFound(table.to_string()));
        };
        let name = name.clone();

        Ok(TableSchema {
            name,
            columns: rows.into_iter().map(|(_, column)| column).collect(),
        })
    }

    /// Find a column by name, ignoring case
    pub fn column(&self, name: &str) -> Result<&ColumnInfo, StoreError> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| StoreError::ColumnNotFound {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE media_assets (
                asset_id VARCHAR NOT NULL,
                status VARCHAR,
                embedding FLOAT[3]
            )",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_load_schema() {
        let schema = TableSchema::load(&conn(), "main", "media_assets").unwrap();

        assert_eq!(schema.name, "media_assets");
        assert_eq!(
            schema.column_names().collect::<Vec<_>>(),
            vec!["asset_id", "status", "embedding"]
        );
        assert_eq!(schema.columns[0].data_type, "VARCHAR");
        assert_eq!(schema.columns[2].data_type, "FLOAT[3]");
    }

    #[test]
    fn test_lookup_ignores_case() {
        let schema = TableSchema::load(&conn(), "main", "Media_Assets").unwrap();
        assert_eq!(schema.name, "media_assets");
        assert_eq!(schema.column("STATUS").unwrap().name, "status");
    }

    #[test]
    fn test_unknown_table_and_column() {
        let conn = conn();
        assert!(matches!(
            TableSchema::load(&conn, "main", "nope"),
            Err(StoreError::TableNotFound(t)) if t == "nope"
        ));

        let schema = TableSchema::load(&conn, "main", "media_assets").unwrap();
        assert!(matches!(
            schema.column("missing"),
            Err(StoreError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_other_schema_not_visible() {
        let conn = conn();
        conn.execute_batch("CREATE SCHEMA staging; CREATE TABLE staging.jobs (id INTEGER)")
            .unwrap();

        assert!(TableSchema::load(&conn, "main", "jobs").is_err());
        assert!(TableSchema::load(&conn, "staging", "jobs").is_ok());
    }
}
