use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

// ---------------------------------------------------------------------------
// Registry types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// A `table.column` reference, used for relationships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relationship {
    pub from: ColumnRef,
    pub to: ColumnRef,
}

/// The authoritative, static set of tables and columns a generated query may
/// reference. Immutable once constructed; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaDescriptor {
    tables: Vec<TableSchema>,
    relationships: Vec<Relationship>,
}

// On-disk TOML shape, validated before it becomes a descriptor.
#[derive(Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    tables: Vec<TableSchema>,
    #[serde(default)]
    relationships: Vec<RelationshipDocument>,
}

#[derive(Deserialize)]
struct RelationshipDocument {
    from: String,
    to: String,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl SchemaDescriptor {
    /// Build a descriptor, validating identifiers, duplicates and
    /// relationship endpoints.
    pub fn new(
        tables: Vec<TableSchema>,
        relationships: Vec<(String, String)>,
    ) -> Result<Self, SchemaError> {
        if tables.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen_tables = HashSet::new();
        for table in &tables {
            validate_identifier(&table.name)?;
            if !seen_tables.insert(table.name.to_ascii_lowercase()) {
                return Err(SchemaError::DuplicateTable(table.name.clone()));
            }
            if table.columns.is_empty() {
                return Err(SchemaError::NoColumns(table.name.clone()));
            }
            let mut seen_columns = HashSet::new();
            for column in &table.columns {
                validate_identifier(column)?;
                if !seen_columns.insert(column.to_ascii_lowercase()) {
                    return Err(SchemaError::DuplicateColumn {
                        table: table.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        let mut descriptor = Self {
            tables,
            relationships: Vec::new(),
        };
        for (from, to) in relationships {
            let from = descriptor.resolve_column_ref(&from)?;
            let to = descriptor.resolve_column_ref(&to)?;
            descriptor.relationships.push(Relationship { from, to });
        }
        Ok(descriptor)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SchemaError> {
        let doc: SchemaDocument = toml::from_str(text)?;
        let relationships = doc
            .relationships
            .into_iter()
            .map(|r| (r.from, r.to))
            .collect();
        Self::new(doc.tables, relationships)
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// The recipe database as exposed to generated queries. `starred_recipes`
    /// is intentionally absent.
    pub fn recipes() -> Self {
        fn table(name: &str, description: &str, columns: &[&str]) -> TableSchema {
            TableSchema {
                name: name.to_string(),
                description: description.to_string(),
                columns: columns.iter().map(|c| c.to_string()).collect(),
            }
        }

        let tables = vec![
            table("users", "User information", &["id", "name"]),
            table(
                "recipes",
                "Recipe information with cooking details",
                &[
                    "id",
                    "name",
                    "description",
                    "instructions",
                    "prep_time",
                    "cook_time",
                    "servings",
                    "difficulty",
                    "cuisine_type",
                    "url",
                    "created_at",
                ],
            ),
            table("ingredients", "Available ingredients", &["id", "name", "category"]),
            table(
                "recipe_ingredients",
                "Junction table linking recipes to ingredients",
                &["id", "recipe_id", "ingredient_id", "quantity", "unit", "notes"],
            ),
        ];
        let column = |table: &str, column: &str| ColumnRef {
            table: table.to_string(),
            column: column.to_string(),
        };
        let relationships = vec![
            Relationship {
                from: column("recipe_ingredients", "recipe_id"),
                to: column("recipes", "id"),
            },
            Relationship {
                from: column("recipe_ingredients", "ingredient_id"),
                to: column("ingredients", "id"),
            },
        ];

        Self {
            tables,
            relationships,
        }
    }

    fn resolve_column_ref(&self, text: &str) -> Result<ColumnRef, SchemaError> {
        let (table, column) = text
            .split_once('.')
            .ok_or_else(|| SchemaError::DanglingRelationship(text.to_string()))?;
        let table = self
            .table(table)
            .filter(|t| t.has_column(column))
            .ok_or_else(|| SchemaError::DanglingRelationship(text.to_string()))?;
        Ok(ColumnRef {
            table: table.name.clone(),
            column: column.to_string(),
        })
    }
}

fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {
            chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier(name.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

impl SchemaDescriptor {
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Case-insensitive table lookup (SQLite identifier semantics).
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table).is_some_and(|t| t.has_column(column))
    }

    /// Schema text handed to the model alongside every generation request.
    pub fn documentation(&self) -> String {
        let mut doc = String::from("DATABASE SCHEMA:\n\n");
        for table in &self.tables {
            doc.push_str(&format!("Table: {}\n", table.name));
            if !table.description.is_empty() {
                doc.push_str(&format!("Description: {}\n", table.description));
            }
            doc.push_str(&format!("Columns: {}\n\n", table.columns.join(", ")));
        }
        if !self.relationships.is_empty() {
            doc.push_str("RELATIONSHIPS:\n");
            for rel in &self.relationships {
                doc.push_str(&format!("- {} -> {}\n", rel.from, rel.to));
            }
        }
        doc
    }
}
