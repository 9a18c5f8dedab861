//! The summary-line grammar of tool reports.
//!
//! Comparison and diff reports announce their results on their first line as
//! a run of `key:value;` fields, e.g.
//!
//! ```text
//! <!-- verdict:incompatible;affected:12.5;added:3;removed:1;type_problems_high:2;interface_problems_low:1; -->
//! ```
//!
//! Rules:
//! - only the first line is read, and surrounding text (such as an HTML
//!   comment wrapper) is ignored;
//! - keys are identifiers (`[A-Za-z_][A-Za-z0-9_]*`), values run to the next
//!   `;` and are trimmed;
//! - unknown keys are ignored, and so are values that do not parse as the
//!   expected number;
//! - every key containing `_problems_` is summed into a single problem total.
//!
//! Dump headers use the same grammar (`symbols:N;language:C;version:1.1;`),
//! or a JSON object with the fields `symbols`, `language` and `tool_version`.

use crate::patterns::SUMMARY_FIELD;

/// Result fields of one object-pair comparison.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompareSummary {
    /// Percentage of old symbols affected by incompatible changes.
    pub affected: f64,
    /// Added symbols.
    pub added: u64,
    /// Removed symbols.
    pub removed: u64,
    /// Sum of every `*_problems_*` field.
    pub problems: u64,
}

/// Result fields of a header or package diff.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Changed files.
    pub changed: u64,
    /// Added files.
    pub added: u64,
    /// Removed files.
    pub removed: u64,
}

/// Metadata announced at the top of a dump file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DumpHeader {
    /// Exported symbol count.
    pub symbols: u64,
    /// Implementation language.
    pub language: Option<String>,
    /// Version of the producing tool.
    pub tool_version: Option<String>,
}

/// Iterates over the `key:value;` fields of the first line of `text`.
pub fn fields(text: &str) -> impl Iterator<Item = (&str, &str)> {
    let first = text.lines().next().unwrap_or("");
    SUMMARY_FIELD.captures_iter(first).filter_map(|caps| {
        let key = caps.get(1)?.as_str();
        let value = caps.get(2)?.as_str().trim();
        Some((key, value))
    })
}

/// Parses the summary line of a comparison report.
pub fn parse_compare(text: &str) -> CompareSummary {
    let mut summary = CompareSummary::default();
    for (key, value) in fields(text) {
        match key {
            "affected" => {
                if let Ok(v) = value.parse::<f64>() {
                    if v.is_finite() {
                        summary.affected = v.clamp(0.0, 100.0);
                    }
                }
            }
            "added" => set_count(&mut summary.added, value),
            "removed" => set_count(&mut summary.removed, value),
            _ if key.contains("_problems_") => {
                if let Ok(v) = value.parse::<u64>() {
                    summary.problems = summary.problems.saturating_add(v);
                }
            }
            _ => {}
        }
    }
    summary
}

/// Parses the summary line of a diff report.
pub fn parse_diff(text: &str) -> DiffSummary {
    let mut summary = DiffSummary::default();
    for (key, value) in fields(text) {
        match key {
            "changed" => set_count(&mut summary.changed, value),
            "added" => set_count(&mut summary.added, value),
            "removed" => set_count(&mut summary.removed, value),
            _ => {}
        }
    }
    summary
}

/// Parses a dump header, trying the summary-line grammar first and JSON second.
pub fn parse_dump_header(text: &str) -> DumpHeader {
    let mut header = DumpHeader::default();
    let mut seen = false;
    for (key, value) in fields(text) {
        match key {
            "symbols" => {
                set_count(&mut header.symbols, value);
                seen = true;
            }
            "language" if !value.is_empty() => {
                header.language = Some(value.to_string());
                seen = true;
            }
            "version" if !value.is_empty() => {
                header.tool_version = Some(value.to_string());
                seen = true;
            }
            _ => {}
        }
    }
    if seen {
        return header;
    }

    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(text) {
        if let Some(n) = map.get("symbols").and_then(serde_json::Value::as_u64) {
            header.symbols = n;
        }
        header.language = map
            .get("language")
            .and_then(serde_json::Value::as_str)
            .map(String::from);
        header.tool_version = map
            .get("tool_version")
            .and_then(serde_json::Value::as_str)
            .map(String::from);
    }
    header
}

fn set_count(slot: &mut u64, value: &str) {
    if let Ok(v) = value.parse::<u64>() {
        *slot = v;
    }
}
