//! Abstract schema description models
//!
//! A pure value object parsed from a bundle's `schema.json` and consumed
//! once by the schema translator; never persisted by this core.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Abstract schema: an ordered list of tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

/// One table (collection) in the abstract schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub name: String,

    #[serde(default)]
    pub columns: Vec<ColumnDefinition>,

    /// Fields that get a unique index each
    #[serde(default)]
    pub unique_fields: Vec<String>,

    /// Fields that get a non-unique index each
    #[serde(default)]
    pub indexed_fields: Vec<String>,
}

/// One column in a table definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,

    /// Abstract type name, e.g. "String", "Integer", "Timestamp", "Array"
    #[serde(rename = "type")]
    pub column_type: String,

    /// Element type for array columns
    #[serde(default)]
    pub item_type: Option<String>,

    /// Constraint strings, e.g. "Not Null", "PK", "Check: IN ('a', 'b')"
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// Seed data: documents per named collection
pub type SeedData = BTreeMap<String, Vec<serde_json::Value>>;
