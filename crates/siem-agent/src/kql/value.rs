//! Typed KQL parameter values.
//!
//! Query templates only ever receive values through [`KqlValue`], which
//! renders each kind to a syntactically closed KQL fragment: strings become
//! escaped literals, identifiers are validated, numbers are numbers.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;
pub const MAX_LOOKBACK_DAYS: u32 = 365;
pub const MAX_LIMIT: u32 = 10_000;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,255}$").unwrap();
}

/// Render `value` as a double-quoted KQL string literal.
pub fn escape_string_literal(value: &str) -> String {
    let mut literal = String::with_capacity(value.len() + 2);
    literal.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => literal.push_str("\\\\"),
            '"' => literal.push_str("\\\""),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c if c.is_control() => {}
            c => literal.push(c),
        }
    }
    literal.push('"');
    literal
}

/// Lookback window in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookback(u32);

impl Lookback {
    pub fn days(days: u32) -> Result<Self> {
        if days == 0 || days > MAX_LOOKBACK_DAYS {
            return Err(Error::Validation(format!(
                "lookback must be between 1 and {} days, got {}",
                MAX_LOOKBACK_DAYS, days
            )));
        }
        Ok(Self(days))
    }

    /// `None` means the default window.
    pub fn from_optional(days: Option<u32>) -> Result<Self> {
        days.map_or(Ok(Self::default()), Self::days)
    }

    pub fn as_days(&self) -> u32 {
        self.0
    }
}

impl Default for Lookback {
    fn default() -> Self {
        Self(DEFAULT_LOOKBACK_DAYS)
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.0)
    }
}

/// A workspace table name that is safe to place in query text unquoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: &str) -> Result<Self> {
        let name = name.trim();
        if !IDENTIFIER.is_match(name) {
            return Err(Error::Validation(format!(
                "'{}' is not a valid table name",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Row cap for `take`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limit(u32);

impl Limit {
    pub fn new(rows: u32) -> Result<Self> {
        if rows == 0 || rows > MAX_LIMIT {
            return Err(Error::Validation(format!(
                "row limit must be between 1 and {}, got {}",
                MAX_LIMIT, rows
            )));
        }
        Ok(Self(rows))
    }

    pub fn rows(&self) -> u32 {
        self.0
    }
}

impl Default for Limit {
    fn default() -> Self {
        Self(10)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KqlValue {
    String(String),
    Timespan(Lookback),
    Limit(Limit),
    Table(TableName),
}

impl KqlValue {
    pub fn render(&self) -> String {
        match self {
            KqlValue::String(value) => escape_string_literal(value),
            KqlValue::Timespan(lookback) => lookback.to_string(),
            KqlValue::Limit(limit) => limit.rows().to_string(),
            KqlValue::Table(table) => table.to_string(),
        }
    }
}

impl From<&str> for KqlValue {
    fn from(value: &str) -> Self {
        KqlValue::String(value.to_string())
    }
}

impl From<Lookback> for KqlValue {
    fn from(value: Lookback) -> Self {
        KqlValue::Timespan(value)
    }
}

impl From<Limit> for KqlValue {
    fn from(value: Limit) -> Self {
        KqlValue::Limit(value)
    }
}

impl From<TableName> for KqlValue {
    fn from(value: TableName) -> Self {
        KqlValue::Table(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_ip_is_quoted() {
        assert_eq!(escape_string_literal("34.99.24.149"), "\"34.99.24.149\"");
    }

    #[test]
    fn test_quotes_and_backslashes_are_escaped() {
        let hostile = r#"1.2.3.4" or 1==1 or IPAddress == "x\"#;
        let literal = escape_string_literal(hostile);
        assert_eq!(literal, r#""1.2.3.4\" or 1==1 or IPAddress == \"x\\""#);
    }

    #[test]
    fn test_line_breaks_cannot_start_a_new_statement() {
        let literal = escape_string_literal("1.2.3.4\n| take 1000000");
        assert!(!literal.contains('\n'));
        assert!(literal.contains("\\n"));
    }

    #[test]
    fn test_control_characters_are_dropped() {
        assert_eq!(escape_string_literal("a\u{0}b\u{7}c"), "\"abc\"");
    }

    #[test]
    fn test_lookback_bounds() {
        assert_eq!(Lookback::default().to_string(), "7d");
        assert_eq!(Lookback::days(30).unwrap().to_string(), "30d");
        assert!(Lookback::days(0).is_err());
        assert!(Lookback::days(366).is_err());
        assert_eq!(Lookback::from_optional(None).unwrap().as_days(), 7);
        assert_eq!(Lookback::from_optional(Some(14)).unwrap().as_days(), 14);
    }

    #[test]
    fn test_table_names() {
        assert!(TableName::new("SigninLogs").is_ok());
        assert!(TableName::new("MyApp_CL").is_ok());
        assert_eq!(TableName::new("  Syslog ").unwrap().as_str(), "Syslog");
        assert!(TableName::new("").is_err());
        assert!(TableName::new("Syslog | take 1").is_err());
        assert!(TableName::new("1Table").is_err());
        assert!(TableName::new("Sign-in").is_err());
    }

    #[test]
    fn test_limit_bounds() {
        assert_eq!(Limit::default().rows(), 10);
        assert!(Limit::new(0).is_err());
        assert!(Limit::new(MAX_LIMIT + 1).is_err());
    }

    #[test]
    fn test_render_by_kind() {
        assert_eq!(KqlValue::from("x\"y").render(), "\"x\\\"y\"");
        assert_eq!(KqlValue::from(Lookback::days(3).unwrap()).render(), "3d");
        assert_eq!(KqlValue::from(Limit::new(5).unwrap()).render(), "5");
        assert_eq!(
            KqlValue::from(TableName::new("DeviceInfo").unwrap()).render(),
            "DeviceInfo"
        );
    }
}
