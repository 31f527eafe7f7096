//! Lightweight extraction of source tables from KQL text.
//!
//! This is not a KQL parser. It recognises the shapes the query builders
//! and typical agent-written queries use: a tabular source alone at the start
//! of a line (optionally followed by a pipe), and `union` operands.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref STRING_LITERAL: Regex = Regex::new(r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#).unwrap();
    static ref LET_BINDING: Regex = Regex::new(r"\blet\s+([A-Za-z_][A-Za-z0-9_]*)\s*=").unwrap();
    static ref LINE_SOURCE: Regex =
        Regex::new(r"(?m)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(?:\|.*|;)?\s*$").unwrap();
    static ref UNION_OPERANDS: Regex =
        Regex::new(r"\bunion\s+(?:kind\s*=\s*\w+\s+)?([A-Za-z_][A-Za-z0-9_]*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_]*)*)").unwrap();
}

const KEYWORDS: &[&str] = &["let", "union", "print", "datatable", "range", "set", "declare"];

/// Source tables referenced by `query`, in order of first appearance.
pub fn source_tables(query: &str) -> Vec<String> {
    let stripped = STRING_LITERAL.replace_all(query, "\"\"");

    let bound: HashSet<&str> = LET_BINDING
        .captures_iter(&stripped)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str())
        .collect();

    let mut candidates: Vec<(usize, &str)> = Vec::new();
    for cap in LINE_SOURCE.captures_iter(&stripped) {
        if let Some(m) = cap.get(1) {
            candidates.push((m.start(), m.as_str()));
        }
    }
    for cap in UNION_OPERANDS.captures_iter(&stripped) {
        if let Some(operands) = cap.get(1) {
            let mut offset = operands.start();
            for operand in operands.as_str().split(',') {
                candidates.push((offset, operand.trim()));
                offset += operand.len() + 1;
            }
        }
    }
    candidates.sort_by_key(|(position, _)| *position);

    let mut seen = HashSet::new();
    let mut tables = Vec::new();
    for (_, name) in candidates {
        if name.is_empty() || bound.contains(name) || KEYWORDS.contains(&name) {
            continue;
        }
        if seen.insert(name) {
            tables.push(name.to_string());
        }
    }
    tables
}
