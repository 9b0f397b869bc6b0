use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result or sample record, keyed by column name in select order.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type", default = "default_column_type")]
    pub data_type: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub references: Option<ForeignKeyRef>,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_column_type() -> String {
    "TEXT".to_string()
}

fn default_nullable() -> bool {
    true
}

impl ColumnDef {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_primary: false,
            nullable: true,
            references: None,
            comment: None,
        }
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDef {
    pub table_name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    #[must_use]
    pub fn new(table_name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            table_name: table_name.into(),
            comment: None,
            columns,
        }
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }
}

/// Tables and columns produced by the upstream analysis step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableStructure {
    pub tables: Vec<TableDef>,
}

impl TableStructure {
    #[must_use]
    pub fn new(tables: Vec<TableDef>) -> Self {
        Self { tables }
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables
            .iter()
            .find(|table| table.table_name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|table| table.table_name.as_str())
    }

    /// Every column paired with its owning table, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = (&TableDef, &ColumnDef)> {
        self.tables
            .iter()
            .flat_map(|table| table.columns.iter().map(move |column| (table, column)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableTuples {
    pub table_name: String,
    #[serde(default)]
    pub tuple_data: Vec<Row>,
}

/// Sample rows used to seed the query engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleTuples {
    pub tables: Vec<TableTuples>,
}

impl SampleTuples {
    #[must_use]
    pub fn rows_for(&self, table_name: &str) -> &[Row] {
        self.tables
            .iter()
            .find(|tuples| tuples.table_name.eq_ignore_ascii_case(table_name))
            .map(|tuples| tuples.tuple_data.as_slice())
            .unwrap_or_default()
    }
}

/// Output of the schema producer. Either part may still be missing while the
/// producer is running.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutput {
    #[serde(default)]
    pub table_structure: Option<Arc<TableStructure>>,
    #[serde(default)]
    pub tuples: Option<Arc<SampleTuples>>,
}

impl AnalysisOutput {
    #[must_use]
    pub fn new(table_structure: TableStructure, tuples: SampleTuples) -> Self {
        Self {
            table_structure: Some(Arc::new(table_structure)),
            tuples: Some(Arc::new(tuples)),
        }
    }
}

pub type SchemaSnapshot = Arc<TableStructure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaChange {
    Unchanged,
    /// A different snapshot became current. Carries the remount generation.
    Replaced { generation: u64 },
    /// The snapshot went away; existing language services are left in place.
    Cleared,
}

/// Tracks the identity of the current schema snapshot.
///
/// Two snapshots are the same only when they are the same allocation; a deep-equal
/// copy still counts as a change.
#[derive(Debug, Default)]
pub struct SchemaWatcher {
    current: Option<SchemaSnapshot>,
    generation: u64,
}

impl SchemaWatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<&SchemaSnapshot> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn observe(&mut self, snapshot: Option<&SchemaSnapshot>) -> SchemaChange {
        if let (Some(current), Some(next)) = (self.current.as_ref(), snapshot) {
            if Arc::ptr_eq(current, next) {
                return SchemaChange::Unchanged;
            }
        }

        let Some(next) = snapshot else {
            if self.current.take().is_none() {
                return SchemaChange::Unchanged;
            }
            tracing::debug!("schema snapshot cleared");
            return SchemaChange::Cleared;
        };

        self.current = Some(Arc::clone(next));
        self.generation += 1;
        tracing::debug!(
            generation = self.generation,
            tables = next.tables.len(),
            "schema snapshot replaced"
        );
        SchemaChange::Replaced {
            generation: self.generation,
        }
    }
}
