//! Identifier and string literal quoting for generated SQL.
//!
//! Every schema, table, column and type name that reaches a generated script
//! passes through [`quote_identifier`]. Literals assume
//! `standard_conforming_strings = on`, the Postgres default, so backslashes
//! are ordinary characters.

/// Wraps an identifier in double quotes, doubling embedded double quotes.
///
/// # Example
/// ```rust
/// use pgharvest_core::sql::quote::quote_identifier;
///
/// assert_eq!(quote_identifier("users"), r#""users""#);
/// assert_eq!(quote_identifier(r#"odd"name"#), r#""odd""name""#);
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Renders `"schema"."name"`.
pub fn quote_qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(name))
}

/// Wraps text in single quotes, doubling embedded single quotes.
///
/// # Example
/// ```rust
/// use pgharvest_core::sql::quote::quote_literal;
///
/// assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
/// ```
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Renders a catalog type name, quoting it only when it is not a plain
/// lower-case identifier (so `int4` stays `int4`, `Mood` becomes `"Mood"`).
pub fn quote_type_name(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        quote_identifier(name)
    }
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first == '_' => chars
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
        _ => false,
    }
}
