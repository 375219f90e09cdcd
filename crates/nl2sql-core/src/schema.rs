//! Schema descriptor used to ground translation
//!
//! The descriptor is loaded once at startup, normalized to lowercase and
//! validated, then shared read-only behind an `Arc` for the life of the process.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema name is empty")]
    EmptyName,

    #[error("Schema {0} declares no tables")]
    NoTables(String),

    #[error("Duplicate table: {0}")]
    DuplicateTable(String),

    #[error("Table {0} declares no columns")]
    NoColumns(String),

    #[error("Duplicate column {column} in table {table}")]
    DuplicateColumn { table: String, column: String },

    #[error("Relationship references unknown column: {0}")]
    UnknownRelationshipColumn(String),
}

/// Declared semantic type of a column, used for prompt grounding only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Bigint,
    Numeric,
    Real,
    Double,
    Text,
    Varchar,
    Boolean,
    Date,
    Time,
    Timestamp,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Integer => "integer",
            ColumnType::Bigint => "bigint",
            ColumnType::Numeric => "numeric",
            ColumnType::Real => "real",
            ColumnType::Double => "double",
            ColumnType::Text => "text",
            ColumnType::Varchar => "varchar",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Time => "time",
            ColumnType::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A table of the target schema; `name` is unqualified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            description: None,
            columns,
        }
    }

    pub fn find_column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Join hint between two columns, written as `table.column`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
}

/// Worked request/guidance pair shown to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptExample {
    pub request: String,
    pub guidance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_dialect")]
    pub dialect: String,
    pub tables: Vec<TableDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<PromptExample>,
}

fn default_version() -> u32 {
    1
}

fn default_dialect() -> String {
    "duckdb".to_string()
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>, tables: Vec<TableDescriptor>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            dialect: default_dialect(),
            tables,
            relationships: Vec::new(),
            examples: Vec::new(),
        }
    }

    /// Lowercase every identifier and check structural rules
    pub fn normalize(mut self) -> Result<Self, SchemaError> {
        self.name = self.name.trim().to_lowercase();
        if self.name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if self.tables.is_empty() {
            return Err(SchemaError::NoTables(self.name));
        }

        let mut seen_tables = HashSet::new();
        for table in &mut self.tables {
            table.name = table.name.trim().to_lowercase();
            if !seen_tables.insert(table.name.clone()) {
                return Err(SchemaError::DuplicateTable(table.name.clone()));
            }
            if table.columns.is_empty() {
                return Err(SchemaError::NoColumns(table.name.clone()));
            }

            let mut seen_columns = HashSet::new();
            for column in &mut table.columns {
                column.name = column.name.trim().to_lowercase();
                if !seen_columns.insert(column.name.clone()) {
                    return Err(SchemaError::DuplicateColumn {
                        table: table.name.clone(),
                        column: column.name.clone(),
                    });
                }
            }
        }

        for rel in &mut self.relationships {
            rel.from = rel.from.trim().to_lowercase();
            rel.to = rel.to.trim().to_lowercase();
        }
        for rel in &self.relationships {
            for end in [&rel.from, &rel.to] {
                if self.resolve_column_ref(end).is_none() {
                    return Err(SchemaError::UnknownRelationshipColumn(end.clone()));
                }
            }
        }

        Ok(self)
    }

    /// `schema.table` for a table of this descriptor
    pub fn qualified_name(&self, table: &TableDescriptor) -> String {
        format!("{}.{}", self.name, table.name)
    }

    /// Look up a table by bare or schema-qualified name, ignoring case
    pub fn find_table(&self, name: &str) -> Option<&TableDescriptor> {
        let name = name.to_lowercase();
        let bare = match name.split_once('.') {
            Some((schema, table)) if schema == self.name => table,
            Some(_) => return None,
            None => name.as_str(),
        };
        self.tables.iter().find(|t| t.name == bare)
    }

    /// Whether `name` is exactly `schema.table` for a known table
    pub fn is_qualified_table(&self, name: &str) -> bool {
        name.contains('.') && self.find_table(name).is_some()
    }

    fn resolve_column_ref(&self, reference: &str) -> Option<&ColumnDescriptor> {
        let (table, column) = reference.rsplit_once('.')?;
        self.find_table(table)?.find_column(column)
    }

    /// SHA-256 over the canonical JSON form
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&json);
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
pub(crate) fn invoice_schema() -> SchemaDescriptor {
    SchemaDescriptor::new(
        "erp",
        vec![TableDescriptor::new(
            "invoice",
            vec![
                ColumnDescriptor::new("line_number", ColumnType::Integer),
                ColumnDescriptor::new("created_date_time", ColumnType::Timestamp),
                ColumnDescriptor::new("vendor_account", ColumnType::Varchar),
                ColumnDescriptor::new("product_name", ColumnType::Varchar),
                ColumnDescriptor::new("invoiced_qty", ColumnType::Integer),
                ColumnDescriptor::new("net_amount", ColumnType::Numeric),
                ColumnDescriptor::new("currency", ColumnType::Varchar),
            ],
        )],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_identifiers() {
        let mut schema = invoice_schema();
        schema.name = "ERP".to_string();
        schema.tables[0].name = "Invoice".to_string();
        schema.tables[0].columns[0].name = "Line_Number".to_string();

        let schema = schema.normalize().unwrap();
        assert_eq!(schema.name, "erp");
        assert_eq!(schema.tables[0].name, "invoice");
        assert_eq!(schema.tables[0].columns[0].name, "line_number");
    }

    #[test]
    fn test_normalize_rejects_duplicates() {
        let mut schema = invoice_schema();
        schema.tables[0]
            .columns
            .push(ColumnDescriptor::new("CURRENCY", ColumnType::Text));
        assert_eq!(
            schema.normalize(),
            Err(SchemaError::DuplicateColumn {
                table: "invoice".to_string(),
                column: "currency".to_string(),
            })
        );

        let mut schema = invoice_schema();
        let copy = schema.tables[0].clone();
        schema.tables.push(copy);
        assert_eq!(
            schema.normalize(),
            Err(SchemaError::DuplicateTable("invoice".to_string()))
        );
    }

    #[test]
    fn test_relationships_must_resolve() {
        let mut schema = invoice_schema();
        schema.relationships.push(Relationship {
            from: "invoice.vendor_account".to_string(),
            to: "vendor.account".to_string(),
        });
        assert!(matches!(
            schema.normalize(),
            Err(SchemaError::UnknownRelationshipColumn(_))
        ));
    }

    #[test]
    fn test_find_table() {
        let schema = invoice_schema().normalize().unwrap();
        assert!(schema.find_table("invoice").is_some());
        assert!(schema.find_table("ERP.Invoice").is_some());
        assert!(schema.find_table("other.invoice").is_none());
        assert!(schema.is_qualified_table("erp.invoice"));
        assert!(!schema.is_qualified_table("invoice"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = invoice_schema().normalize().unwrap();
        let b = invoice_schema().normalize().unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let mut c = b.clone();
        c.version = 2;
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_yaml_shape_deserializes() {
        let json = r#"{
            "name": "erp",
            "tables": [{"name": "invoice", "columns": [{"name": "quantity", "type": "integer"}]}]
        }"#;
        let schema: SchemaDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(schema.version, 1);
        assert_eq!(schema.dialect, "duckdb");
        assert_eq!(schema.tables[0].columns[0].column_type, ColumnType::Integer);
    }
}
