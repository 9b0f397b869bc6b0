use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, Statement};
use serde_json::{Number, Value};
use sqlpane_core::dispatcher::{EngineError, EngineFactory, EngineResponse, QueryEngine};
use sqlpane_core::schema::{ColumnDef, Row, SampleTuples, TableDef, TableStructure};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteLoadError {
    #[error("failed to open in-memory database: {0}")]
    Open(#[source] rusqlite::Error),
    #[error("failed to create table `{table}`: {source}")]
    CreateTable {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to insert sample row into `{table}`: {source}")]
    InsertRow {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to commit sample data: {0}")]
    Commit(#[source] rusqlite::Error),
}

/// In-memory SQLite database seeded from the producer's structure and sample rows.
#[derive(Debug)]
pub struct SqliteQueryEngine {
    conn: Connection,
}

impl SqliteQueryEngine {
    pub fn load(structure: &TableStructure, tuples: &SampleTuples) -> Result<Self, SqliteLoadError> {
        let mut conn = Connection::open_in_memory().map_err(SqliteLoadError::Open)?;
        let tx = conn.transaction().map_err(SqliteLoadError::Open)?;

        for table in &structure.tables {
            tx.execute_batch(&create_table_sql(table))
                .map_err(|source| SqliteLoadError::CreateTable {
                    table: table.table_name.clone(),
                    source,
                })?;
        }

        let mut inserted = 0_usize;
        for table in &structure.tables {
            for row in tuples.rows_for(&table.table_name) {
                if row.is_empty() {
                    continue;
                }
                let columns = row.keys().map(|name| quote_ident(name)).collect::<Vec<_>>();
                let placeholders = vec!["?"; columns.len()].join(", ");
                let sql = format!(
                    "INSERT INTO {} ({}) VALUES ({placeholders})",
                    quote_ident(&table.table_name),
                    columns.join(", ")
                );
                tx.execute(&sql, params_from_iter(row.values().map(json_to_sql)))
                    .map_err(|source| SqliteLoadError::InsertRow {
                        table: table.table_name.clone(),
                        source,
                    })?;
                inserted += 1;
            }
        }

        tx.commit().map_err(SqliteLoadError::Commit)?;
        tracing::debug!(
            tables = structure.tables.len(),
            rows = inserted,
            "sqlite engine seeded"
        );
        Ok(Self { conn })
    }
}

impl QueryEngine for SqliteQueryEngine {
    fn execute_query(&self, sql: &str) -> Result<EngineResponse, EngineError> {
        let mut statement = self.conn.prepare(sql).map_err(to_engine_error)?;
        let columns = statement
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        if columns.is_empty() {
            return Ok(match statement.execute([]) {
                Ok(changed) => EngineResponse::done(format!("{changed} row(s) affected")),
                Err(error) => EngineResponse::failed(Some(error.to_string())),
            });
        }

        Ok(match collect_rows(&mut statement, &columns) {
            Ok(rows) => {
                let message = format!("{} row(s) returned", rows.len());
                EngineResponse::rows(rows, Some(message))
            }
            Err(error) => EngineResponse::failed(Some(error.to_string())),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEngineFactory;

impl EngineFactory for SqliteEngineFactory {
    fn build(
        &self,
        structure: &TableStructure,
        tuples: &SampleTuples,
    ) -> Result<Box<dyn QueryEngine>, EngineError> {
        let engine = SqliteQueryEngine::load(structure, tuples)
            .map_err(|error| EngineError::new(error.to_string()))?;
        Ok(Box::new(engine))
    }
}

fn collect_rows(statement: &mut Statement<'_>, columns: &[String]) -> rusqlite::Result<Vec<Row>> {
    let mut rows = Vec::new();
    let mut cursor = statement.query([])?;
    while let Some(row) = cursor.next()? {
        let mut record = Row::new();
        for (index, name) in columns.iter().enumerate() {
            record.insert(name.clone(), sql_to_json(row.get_ref(index)?));
        }
        rows.push(record);
    }
    Ok(rows)
}

fn create_table_sql(table: &TableDef) -> String {
    let primary_keys = table
        .columns
        .iter()
        .filter(|column| column.is_primary)
        .map(|column| quote_ident(&column.name))
        .collect::<Vec<_>>();
    let inline_primary = primary_keys.len() == 1;

    let mut definitions = table
        .columns
        .iter()
        .map(|column| column_sql(column, inline_primary))
        .collect::<Vec<_>>();
    if primary_keys.len() > 1 {
        definitions.push(format!("PRIMARY KEY ({})", primary_keys.join(", ")));
    }

    format!(
        "CREATE TABLE {} ({})",
        quote_ident(&table.table_name),
        definitions.join(", ")
    )
}

fn column_sql(column: &ColumnDef, inline_primary: bool) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.data_type);
    if column.is_primary && inline_primary {
        sql.push_str(" PRIMARY KEY");
    }
    if !column.nullable && !column.is_primary {
        sql.push_str(" NOT NULL");
    }
    if let Some(reference) = &column.references {
        sql.push_str(&format!(
            " REFERENCES {} ({})",
            quote_ident(&reference.table),
            quote_ident(&reference.column)
        ));
    }
    sql
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| number.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::String(text.to_string()),
            Err(_) => Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect()),
        },
    }
}

fn to_engine_error(error: rusqlite::Error) -> EngineError {
    EngineError::new(error.to_string())
}
