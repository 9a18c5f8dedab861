//! Diagnostic codes with category prefixes for structured error identification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a diagnostic code, determining its prefix letter.
///
/// Categories follow the error taxonomy: fatal tool/module problems (`F`),
/// access problems (`A`), per-item build failures (`B`), object matching
/// problems (`M`), and skipped prerequisites (`W`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// A required tool is missing or too old, prefixed with `F`.
    Fatal,
    /// An input could not be read, prefixed with `A`.
    Access,
    /// A single item failed to build, prefixed with `B`.
    Build,
    /// Object identity resolution problems, prefixed with `M`.
    Match,
    /// A prerequisite was missing and work was skipped, prefixed with `W`.
    Warning,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Fatal => 'F',
            Category::Access => 'A',
            Category::Build => 'B',
            Category::Match => 'M',
            Category::Warning => 'W',
        }
    }
}

/// A structured diagnostic code combining a category prefix and a numeric identifier.
///
/// Displayed as the category prefix followed by a zero-padded 3-digit number,
/// e.g. `F101`, `B201`, `M301`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
    /// The category of this diagnostic.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl DiagnosticCode {
    /// Creates a new diagnostic code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}
