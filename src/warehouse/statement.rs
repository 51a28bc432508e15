//! Parameterized warehouse statements.
//!
//! A [`Statement`] is the query identifier dashboards hand to the executor:
//! SQL with `?` placeholders plus the values bound to them. Values never get
//! spliced into the SQL text.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

/// Snowflake binding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BindType {
    Text,
    Fixed,
    Real,
    Boolean,
}

/// A value bound to one `?` placeholder.
///
/// Values travel as strings, the way the SQL API expects them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Binding {
    #[serde(rename = "type")]
    pub kind: BindType,
    pub value: Option<String>,
}

impl Binding {
    /// A NULL binding.
    pub fn null() -> Self {
        Self {
            kind: BindType::Text,
            value: None,
        }
    }

    fn new(kind: BindType, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: Some(value.into()),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.value, self.kind) {
            (None, _) => write!(f, "NULL"),
            (Some(v), BindType::Text) => write!(f, "'{v}'"),
            (Some(v), _) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Binding {
    fn from(v: &str) -> Self {
        Self::new(BindType::Text, v)
    }
}

impl From<String> for Binding {
    fn from(v: String) -> Self {
        Self::new(BindType::Text, v)
    }
}

impl From<i64> for Binding {
    fn from(v: i64) -> Self {
        Self::new(BindType::Fixed, v.to_string())
    }
}

impl From<i32> for Binding {
    fn from(v: i32) -> Self {
        Self::new(BindType::Fixed, v.to_string())
    }
}

impl From<f64> for Binding {
    fn from(v: f64) -> Self {
        Self::new(BindType::Real, v.to_string())
    }
}

impl From<bool> for Binding {
    fn from(v: bool) -> Self {
        Self::new(BindType::Boolean, v.to_string())
    }
}

impl From<NaiveDate> for Binding {
    /// Dates bind as ISO-8601 text and are cast by the warehouse.
    fn from(v: NaiveDate) -> Self {
        Self::new(BindType::Text, v.format("%Y-%m-%d").to_string())
    }
}

impl<T: Into<Binding>> From<Option<T>> for Binding {
    fn from(v: Option<T>) -> Self {
        v.map_or_else(Binding::null, Into::into)
    }
}

/// SQL text plus positional bindings.
///
/// Two statements are the same query when both the SQL and the bound values
/// are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Statement {
    sql: String,
    bindings: Vec<Binding>,
}

impl Statement {
    /// Creates a statement without bindings.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            bindings: Vec::new(),
        }
    }

    /// Binds the next `?` placeholder.
    pub fn bind(mut self, value: impl Into<Binding>) -> Self {
        self.bindings.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Bindings keyed by 1-based position, as the SQL API wants them.
    pub(crate) fn numbered_bindings(&self) -> Option<BTreeMap<String, Binding>> {
        if self.bindings.is_empty() {
            return None;
        }
        Some(
            self.bindings
                .iter()
                .enumerate()
                .map(|(i, b)| ((i + 1).to_string(), b.clone()))
                .collect(),
        )
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.bindings.is_empty() {
            let values: Vec<String> = self.bindings.iter().map(ToString::to_string).collect();
            write!(f, " [{}]", values.join(", "))?;
        }
        Ok(())
    }
}

impl From<&str> for Statement {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}
