//! Database schema types.
//!
//! Represents the tables and columns a connector can introspect, and the
//! search `search_objects` runs over them.

use serde::{Deserialize, Serialize};

use super::{ColumnInfo, QueryResult, Value};

/// Kind of schema object a search is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    Table,
    Column,
}

/// Represents the introspected schema of a database.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    /// All user tables, ordered by name.
    pub tables: Vec<Table>,
}

impl Schema {
    /// Creates a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a schema from `(table, column, data_type, is_nullable)` rows.
    ///
    /// Rows must be ordered by table; columns keep the order they arrive in.
    pub fn from_column_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String, String, bool)>,
    {
        let mut tables: Vec<Table> = Vec::new();

        for (table_name, column_name, data_type, is_nullable) in rows {
            let column = Column::new(column_name, data_type).nullable(is_nullable);
            match tables.last_mut() {
                Some(table) if table.name == table_name => table.columns.push(column),
                _ => {
                    let mut table = Table::new(table_name);
                    table.columns.push(column);
                    tables.push(table);
                }
            }
        }

        Self { tables }
    }

    /// Tables and columns whose name contains `pattern`, ignoring case.
    ///
    /// The result has one row per match with the columns `object_type`,
    /// `table`, `column`, `data_type` and `nullable`; the last three are
    /// null for table matches.
    pub fn search(&self, pattern: Option<&str>, object_type: Option<ObjectType>) -> QueryResult {
        let needle = pattern.unwrap_or_default().to_lowercase();
        let matches = |name: &str| name.to_lowercase().contains(&needle);
        let want_tables = object_type != Some(ObjectType::Column);
        let want_columns = object_type != Some(ObjectType::Table);

        let mut rows = Vec::new();
        for table in &self.tables {
            if want_tables && matches(&table.name) {
                rows.push(vec![
                    Value::from("table"),
                    Value::from(table.name.as_str()),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                ]);
            }
            if !want_columns {
                continue;
            }
            for column in table.columns.iter().filter(|c| matches(&c.name)) {
                rows.push(vec![
                    Value::from("column"),
                    Value::from(table.name.as_str()),
                    Value::from(column.name.as_str()),
                    Value::from(column.data_type.as_str()),
                    Value::Bool(column.is_nullable),
                ]);
            }
        }

        let columns = vec![
            ColumnInfo::new("object_type", "text"),
            ColumnInfo::new("table", "text"),
            ColumnInfo::new("column", "text"),
            ColumnInfo::new("data_type", "text"),
            ColumnInfo::new("nullable", "boolean"),
        ];
        QueryResult::with_data(columns, rows)
    }
}

/// Represents a database table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Table {
    /// Table name (schema-qualified where the engine has schemas).
    pub name: String,

    /// Columns in the table.
    pub columns: Vec<Column>,
}

impl Table {
    /// Creates a new table with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }
}

/// Represents a column in a table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

impl Column {
    /// Creates a new nullable column with the given name and type.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
        }
    }

    /// Sets whether the column is nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.is_nullable = nullable;
        self
    }
}
