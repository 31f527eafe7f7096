//! KQL construction.
//!
//! Queries are assembled from fixed Tera templates and typed parameter
//! values. Caller-supplied text only ever reaches a query as an escaped
//! string literal.

pub mod parse;
pub mod queries;
pub mod template;
pub mod value;

use std::fmt;

pub use parse::source_tables;
pub use template::{render, KqlParams};
pub use value::{escape_string_literal, KqlValue, Limit, Lookback, TableName};

/// A rendered query and the tables it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KqlQuery {
    text: String,
    tables: Vec<String>,
}

impl KqlQuery {
    pub fn new(text: String, tables: Vec<String>) -> Self {
        Self { text, tables }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }
}

impl fmt::Display for KqlQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
