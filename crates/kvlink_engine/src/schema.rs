//! Table and index schemas and item packing.
//!
//! Two item formats are supported:
//!
//! | Format | Item                  | Stored form                      |
//! |--------|-----------------------|----------------------------------|
//! | `S`    | string without NULs   | item bytes followed by one `0x00` |
//! | `u`    | arbitrary bytes       | item bytes as-is                 |
//!
//! Ordering is by the stored form, so `S` keys sort as C strings.

use crate::config::{ConfigMap, ConfigWriter};
use crate::error::{EngineError, EngineResult};

/// Keys accepted when creating a table.
pub const TABLE_CONFIG_KEYS: &[&str] = &["key_format", "value_format", "columns", "block_compressor"];

/// Keys accepted when creating an index.
pub const INDEX_CONFIG_KEYS: &[&str] = &["columns"];

/// Item format of a key or value column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// NUL-terminated string.
    #[default]
    String,
    /// Raw bytes.
    Bytes,
}

impl Format {
    /// Parses a format code.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for anything but `S` or `u`.
    pub fn parse(code: &str, what: &str) -> EngineResult<Self> {
        match code {
            "S" => Ok(Self::String),
            "u" => Ok(Self::Bytes),
            other => Err(EngineError::invalid_config(format!(
                "unsupported {what} '{other}', expected 'S' or 'u'"
            ))),
        }
    }

    /// The format code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::String => "S",
            Self::Bytes => "u",
        }
    }

    /// Converts an item into its stored form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a string item contains a NUL byte.
    pub fn pack(self, item: &[u8]) -> EngineResult<Vec<u8>> {
        match self {
            Self::String => {
                if item.contains(&0) {
                    return Err(EngineError::invalid_argument(
                        "string items cannot contain NUL bytes",
                    ));
                }
                let mut packed = Vec::with_capacity(item.len() + 1);
                packed.extend_from_slice(item);
                packed.push(0);
                Ok(packed)
            }
            Self::Bytes => Ok(item.to_vec()),
        }
    }

    /// Converts a stored form back into the item.
    #[must_use]
    pub fn unpack(self, packed: &[u8]) -> Vec<u8> {
        match self {
            Self::String => match packed.split_last() {
                Some((0, item)) => item.to_vec(),
                _ => packed.to_vec(),
            },
            Self::Bytes => packed.to_vec(),
        }
    }

    /// Checks bytes supplied in stored form by a raw cursor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if a string is not NUL-terminated or has an
    /// interior NUL.
    pub fn validate_packed(self, packed: &[u8]) -> EngineResult<()> {
        if self == Self::Bytes {
            return Ok(());
        }
        match packed.split_last() {
            Some((0, item)) if !item.contains(&0) => Ok(()),
            _ => Err(EngineError::invalid_argument(
                "packed string items must end with a single NUL byte",
            )),
        }
    }
}

/// Which half of a record a named column refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// The key column.
    Key,
    /// The value column.
    Value,
}

/// Schema of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Key format.
    pub key_format: Format,
    /// Value format.
    pub value_format: Format,
    /// Key and value column names, when declared.
    pub columns: Option<(String, String)>,
    /// Block compressor extension, when configured.
    pub block_compressor: Option<String>,
}

impl TableSchema {
    /// Builds a schema from a table creation configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for unknown keys, unsupported formats or a
    /// column list that does not name exactly one key and one value column.
    pub fn from_config(name: &str, config: &ConfigMap) -> EngineResult<Self> {
        config.ensure_only(TABLE_CONFIG_KEYS, "table creation")?;

        let key_format = match config.get_str("key_format")? {
            Some(code) => Format::parse(code, "key_format")?,
            None => Format::String,
        };
        let value_format = match config.get_str("value_format")? {
            Some(code) => Format::parse(code, "value_format")?,
            None => Format::String,
        };

        let columns = match config.get_list("columns")? {
            None => None,
            Some(list) => match <[String; 2]>::try_from(list) {
                Ok([key, value]) if key != value => Some((key, value)),
                Ok(_) => {
                    return Err(EngineError::invalid_config("column names must be distinct"))
                }
                Err(list) => {
                    return Err(EngineError::invalid_config(format!(
                        "columns must name one key and one value column, found {}",
                        list.len()
                    )))
                }
            },
        };

        let block_compressor = config
            .get_str("block_compressor")?
            .filter(|c| !c.is_empty() && *c != "none")
            .map(str::to_string);

        Ok(Self {
            name: name.to_string(),
            key_format,
            value_format,
            columns,
            block_compressor,
        })
    }

    /// Renders the canonical creation configuration.
    #[must_use]
    pub fn to_config(&self) -> String {
        let mut writer = ConfigWriter::new()
            .value("key_format", self.key_format.code())
            .value("value_format", self.value_format.code());
        if let Some((key, value)) = &self.columns {
            writer = writer.list("columns", [key, value]);
        }
        writer
            .opt_value("block_compressor", self.block_compressor.as_deref())
            .finish()
    }

    /// Resolves a column name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Column> {
        let (key, value) = self.columns.as_ref()?;
        if name == key {
            Some(Column::Key)
        } else if name == value {
            Some(Column::Value)
        } else {
            None
        }
    }

    /// Format of a column.
    #[must_use]
    pub fn format_of(&self, column: Column) -> Format {
        match column {
            Column::Key => self.key_format,
            Column::Value => self.value_format,
        }
    }
}

/// Schema of an index over one table column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Owning table.
    pub table: String,
    /// Index name.
    pub name: String,
    /// Column name as declared.
    pub column_name: String,
    /// Indexed column.
    pub column: Column,
}

impl IndexSchema {
    /// Builds an index schema from its creation configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` unless `columns` names exactly one column of
    /// the table, and `InvalidArgument` if the table declares no columns.
    pub fn from_config(table: &TableSchema, name: &str, config: &ConfigMap) -> EngineResult<Self> {
        config.ensure_only(INDEX_CONFIG_KEYS, "index creation")?;

        if table.columns.is_none() {
            return Err(EngineError::invalid_argument(format!(
                "table '{}' declares no columns to index",
                table.name
            )));
        }
        let list = config
            .get_list("columns")?
            .ok_or_else(|| EngineError::invalid_config("index requires a columns list"))?;
        let [column_name] = <[String; 1]>::try_from(list).map_err(|list| {
            EngineError::invalid_config(format!(
                "index must name exactly one column, found {}",
                list.len()
            ))
        })?;
        let column = table.column(&column_name).ok_or_else(|| {
            EngineError::invalid_config(format!(
                "table '{}' has no column '{column_name}'",
                table.name
            ))
        })?;

        Ok(Self {
            table: table.name.clone(),
            name: name.to_string(),
            column_name,
            column,
        })
    }

    /// Renders the canonical creation configuration.
    #[must_use]
    pub fn to_config(&self) -> String {
        ConfigWriter::new()
            .list("columns", [&self.column_name])
            .finish()
    }
}
