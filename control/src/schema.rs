//! Schema translation
//!
//! Maps an abstract table description into a document-store `$jsonSchema`
//! validator and a deterministic index set.

use serde_json::{json, Map, Value};

use crate::models::schema::TableDefinition;

/// Index specification derived from the unique/indexed field lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Deterministic index name: `{field}_unique` or `{field}_index`
    pub name: String,

    /// Indexed field
    pub field: String,

    /// Whether the index enforces uniqueness
    pub unique: bool,
}

/// Result of translating one table
#[derive(Debug, Clone)]
pub struct TranslatedTable {
    /// `$jsonSchema` validator document
    pub validator: Value,

    /// One index per unique/indexed field
    pub indexes: Vec<IndexSpec>,
}

/// Translate a table definition into a validator and its index set
pub fn translate(table: &TableDefinition) -> TranslatedTable {
    let mut required: Vec<String> = Vec::new();
    let mut properties = Map::new();

    for column in &table.columns {
        let mut property = Map::new();
        property.insert(
            "bsonType".to_string(),
            Value::String(map_type(&column.column_type).to_string()),
        );

        if map_type(&column.column_type) == "array" {
            let item_type = column.item_type.as_deref().map(map_type).unwrap_or("string");
            property.insert("items".to_string(), json!({ "bsonType": item_type }));
        }

        for constraint in &column.constraints {
            let trimmed = constraint.trim();
            if trimmed.eq_ignore_ascii_case("not null") || trimmed.eq_ignore_ascii_case("pk") {
                if !required.contains(&column.name) {
                    required.push(column.name.clone());
                }
            } else if let Some(values) = parse_check_in(trimmed) {
                property.insert(
                    "enum".to_string(),
                    Value::Array(values.into_iter().map(Value::String).collect()),
                );
            }
        }

        properties.insert(column.name.clone(), Value::Object(property));
    }

    let mut schema = Map::new();
    schema.insert("bsonType".to_string(), Value::String("object".to_string()));
    if !required.is_empty() {
        schema.insert(
            "required".to_string(),
            Value::Array(required.into_iter().map(Value::String).collect()),
        );
    }
    schema.insert("properties".to_string(), Value::Object(properties));

    let mut indexes = Vec::new();
    for field in &table.unique_fields {
        indexes.push(IndexSpec {
            name: format!("{}_unique", field),
            field: field.clone(),
            unique: true,
        });
    }
    for field in &table.indexed_fields {
        indexes.push(IndexSpec {
            name: format!("{}_index", field),
            field: field.clone(),
            unique: false,
        });
    }

    TranslatedTable {
        validator: json!({ "$jsonSchema": Value::Object(schema) }),
        indexes,
    }
}

/// Map an abstract type name to a document-store type.
///
/// Known names are table-driven; unrecognized names fall back to a
/// name-based heuristic.
fn map_type(abstract_type: &str) -> &'static str {
    match abstract_type.trim().to_lowercase().as_str() {
        "int" | "integer" | "number" | "long" | "double" | "decimal" | "float" => "number",
        "timestamp" | "datetime" | "date" | "time" => "date",
        "bool" | "boolean" => "bool",
        "array" | "list" => "array",
        "object" | "json" => "object",
        "string" | "text" | "uuid" | "guid" => "string",
        other => {
            if other.contains("time") || other.contains("date") {
                "date"
            } else if other.contains("num") || other.contains("int") {
                "number"
            } else {
                "string"
            }
        }
    }
}

/// Parse a `Check: IN (v1, v2, ...)` constraint into its value list
fn parse_check_in(constraint: &str) -> Option<Vec<String>> {
    let rest = constraint.strip_prefix("Check:").or_else(|| {
        constraint
            .to_lowercase()
            .starts_with("check:")
            .then(|| &constraint[6..])
    })?;
    let rest = rest.trim();
    if !rest.to_lowercase().starts_with("in") {
        return None;
    }

    let open = rest.find('(')?;
    let close = rest.rfind(')')?;
    if close <= open {
        return None;
    }

    let values = rest[open + 1..close]
        .split(',')
        .map(|v| v.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|v| !v.is_empty())
        .collect();
    Some(values)
}
