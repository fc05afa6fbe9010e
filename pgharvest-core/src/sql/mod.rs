//! SQL rendering: identifier and literal quoting, value formatting, the
//! statement model and the reconstruction script generator.

pub mod format;
pub mod generator;
pub mod quote;
pub mod statement;

pub use format::{ValueFormatter, format_value};
pub use generator::ScriptGenerator;
pub use quote::{quote_identifier, quote_literal, quote_qualified};
pub use statement::{ColumnSpec, Statement, render};
