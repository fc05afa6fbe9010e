//! Statement model for generated scripts.
//!
//! Scripts are assembled as a list of [`Statement`] values and rendered to
//! text at the end, which keeps ordering and escaping testable one statement
//! at a time.

use super::quote::{quote_identifier, quote_literal, quote_qualified};
use std::fmt;

/// One column of a synthesized `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    /// Already rendered SQL type, e.g. `character varying(255)`
    pub sql_type: String,
    pub not_null: bool,
    /// Default expression, copied verbatim
    pub default: Option<String>,
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", quote_identifier(&self.name), self.sql_type)?;
        if self.not_null {
            write!(f, " NOT NULL")?;
        }
        if let Some(default) = &self.default {
            write!(f, " DEFAULT {}", default)?;
        }
        Ok(())
    }
}

/// A single element of a generated SQL document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `-- text`, one comment line per input line
    Comment(String),
    /// Empty separator line
    Blank,
    DropType {
        schema: String,
        name: String,
    },
    CreateEnum {
        schema: String,
        name: String,
        labels: Vec<String>,
    },
    CreateTable {
        schema: String,
        name: String,
        columns: Vec<ColumnSpec>,
    },
    DropTable {
        schema: String,
        name: String,
    },
    Insert {
        schema: String,
        table: String,
        columns: Vec<String>,
        /// Already formatted SQL literals, one per column
        values: Vec<String>,
    },
    /// A statement taken verbatim from the catalog (index definitions)
    Raw(String),
}

impl Statement {
    /// Creates a comment statement.
    pub fn comment(text: impl Into<String>) -> Self {
        Self::Comment(text.into())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comment(text) => {
                // Each line gets its own marker so a newline inside a table
                // name cannot end the comment.
                let mut lines = text.split(['\n', '\r']);
                write!(f, "-- {}", lines.next().unwrap_or_default())?;
                for line in lines {
                    write!(f, "\n-- {}", line)?;
                }
                Ok(())
            }
            Self::Blank => Ok(()),
            Self::DropType { schema, name } => write!(
                f,
                "DROP TYPE IF EXISTS {} CASCADE;",
                quote_qualified(schema, name)
            ),
            Self::CreateEnum {
                schema,
                name,
                labels,
            } => {
                let labels: Vec<String> = labels.iter().map(|label| quote_literal(label)).collect();
                write!(
                    f,
                    "CREATE TYPE {} AS ENUM ({});",
                    quote_qualified(schema, name),
                    labels.join(", ")
                )
            }
            Self::CreateTable {
                schema,
                name,
                columns,
            } => {
                writeln!(
                    f,
                    "CREATE TABLE IF NOT EXISTS {} (",
                    quote_qualified(schema, name)
                )?;
                let columns: Vec<String> = columns
                    .iter()
                    .map(|column| format!("  {}", column))
                    .collect();
                if !columns.is_empty() {
                    writeln!(f, "{}", columns.join(",\n"))?;
                }
                write!(f, ");")
            }
            Self::DropTable { schema, name } => write!(
                f,
                "DROP TABLE IF EXISTS {} CASCADE;",
                quote_qualified(schema, name)
            ),
            Self::Insert {
                schema,
                table,
                columns,
                ..
            } if columns.is_empty() => write!(
                f,
                "INSERT INTO {} DEFAULT VALUES;",
                quote_qualified(schema, table)
            ),
            Self::Insert {
                schema,
                table,
                columns,
                values,
            } => {
                let columns: Vec<String> = columns.iter().map(|c| quote_identifier(c)).collect();
                write!(
                    f,
                    "INSERT INTO {} ({}) VALUES ({});",
                    quote_qualified(schema, table),
                    columns.join(", "),
                    values.join(", ")
                )
            }
            Self::Raw(sql) => {
                let sql = sql.trim_end();
                if sql.ends_with(';') {
                    write!(f, "{}", sql)
                } else {
                    write!(f, "{};", sql)
                }
            }
        }
    }
}

/// Renders statements one per line, with a trailing newline.
pub fn render(statements: &[Statement]) -> String {
    let mut out = String::new();
    for statement in statements {
        out.push_str(&statement.to_string());
        out.push('\n');
    }
    out
}
