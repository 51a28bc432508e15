//! Read-only guard for warehouse statements.
//!
//! Dashboard widgets only read. Statements are parsed with the Snowflake
//! dialect and rated by the most dangerous thing they do; the warehouse client
//! refuses anything that is not [`SafetyLevel::Safe`].

mod parser;

pub use parser::{classify_sql, SqlClassifier};

use std::fmt;

/// Safety level of a SQL statement, ordered from harmless to dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SafetyLevel {
    /// Read-only (SELECT, EXPLAIN, SHOW, DESCRIBE).
    Safe,
    /// Modifies rows (INSERT, UPDATE, MERGE).
    Mutating,
    /// Deletes data or changes schema or grants.
    Destructive,
}

impl SafetyLevel {
    /// Returns true if the statement may run from a dashboard.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Safe)
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Mutating => write!(f, "Mutating"),
            Self::Destructive => write!(f, "Destructive"),
        }
    }
}

/// The kind of statement detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Explain,
    Show,
    Insert,
    Update,
    Merge,
    Delete,
    Drop,
    Truncate,
    Alter,
    Create,
    Grant,
    Revoke,
    /// Several statements; holds the most dangerous kind.
    Multiple(Box<StatementKind>),
    Unknown,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::Explain => write!(f, "EXPLAIN"),
            Self::Show => write!(f, "SHOW"),
            Self::Insert => write!(f, "INSERT"),
            Self::Update => write!(f, "UPDATE"),
            Self::Merge => write!(f, "MERGE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Drop => write!(f, "DROP"),
            Self::Truncate => write!(f, "TRUNCATE"),
            Self::Alter => write!(f, "ALTER"),
            Self::Create => write!(f, "CREATE"),
            Self::Grant => write!(f, "GRANT"),
            Self::Revoke => write!(f, "REVOKE"),
            Self::Multiple(inner) => write!(f, "Multiple ({})", inner),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of classifying a SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub level: SafetyLevel,
    pub kind: StatementKind,
    /// Set when the SQL could not be parsed or was empty.
    pub note: Option<String>,
}

impl Classification {
    pub fn new(level: SafetyLevel, kind: StatementKind) -> Self {
        Self {
            level,
            kind,
            note: None,
        }
    }

    pub fn with_note(level: SafetyLevel, kind: StatementKind, note: impl Into<String>) -> Self {
        Self {
            level,
            kind,
            note: Some(note.into()),
        }
    }

    /// Returns true if the statement may run from a dashboard.
    pub fn is_read_only(&self) -> bool {
        self.level.is_read_only()
    }
}
