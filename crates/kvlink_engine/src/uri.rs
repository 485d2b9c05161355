//! Object URIs.

use crate::error::{EngineError, EngineResult};
use std::fmt;

/// A parsed object URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectUri {
    /// `table:<name>`
    Table(String),
    /// `index:<table>:<name>`
    Index {
        /// Owning table.
        table: String,
        /// Index name.
        name: String,
    },
    /// `statistics:`
    Statistics,
}

impl ObjectUri {
    /// Parses a URI string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for unknown schemes or empty names.
    pub fn parse(uri: &str) -> EngineResult<Self> {
        if let Some(name) = uri.strip_prefix("table:") {
            validate_name(name, uri)?;
            return Ok(Self::Table(name.to_string()));
        }
        if let Some(rest) = uri.strip_prefix("index:") {
            let (table, name) = rest.split_once(':').ok_or_else(|| {
                EngineError::invalid_argument(format!("index URI must be index:<table>:<name>: {uri}"))
            })?;
            validate_name(table, uri)?;
            validate_name(name, uri)?;
            return Ok(Self::Index {
                table: table.to_string(),
                name: name.to_string(),
            });
        }
        if uri == "statistics:" {
            return Ok(Self::Statistics);
        }
        Err(EngineError::invalid_argument(format!(
            "unsupported object URI: {uri}"
        )))
    }

    /// Name of the table this URI refers to, if any.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::Table(table) | Self::Index { table, .. } => Some(table),
            Self::Statistics => None,
        }
    }
}

impl fmt::Display for ObjectUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(name) => write!(f, "table:{name}"),
            Self::Index { table, name } => write!(f, "index:{table}:{name}"),
            Self::Statistics => f.write_str("statistics:"),
        }
    }
}

fn validate_name(name: &str, uri: &str) -> EngineResult<()> {
    if name.is_empty() || name.contains(':') || name.contains('\0') {
        return Err(EngineError::invalid_argument(format!(
            "invalid object name in URI: {uri}"
        )));
    }
    Ok(())
}
