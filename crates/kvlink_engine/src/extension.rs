//! Extension modules.
//!
//! The bundled engine recognizes compressor extensions by file name:
//! `libkvlink_<name>.so` (or `.dll` on Windows) where `<name>` is one of
//! [`KNOWN_COMPRESSORS`]. Loading validates the file and registers the
//! compressor so tables may name it as their `block_compressor`.

use crate::config::ConfigMap;
use crate::error::{EngineError, EngineResult};
use std::collections::BTreeSet;
use std::path::Path;

/// Compressors an extension may provide.
pub const KNOWN_COMPRESSORS: &[&str] = &["snappy", "zlib", "lz4", "zstd"];

/// Entry point every extension module exports.
pub const ENTRY_POINT: &str = "kvlink_extension_init";

/// Keys accepted by `load_extension`.
pub const EXTENSION_CONFIG_KEYS: &[&str] = &["entry", "config", "terminate", "early_load"];

/// Platform file extension for loadable modules.
pub const MODULE_SUFFIX: &str = if cfg!(windows) { "dll" } else { "so" };

/// File name of the module providing a compressor.
#[must_use]
pub fn module_file_name(compressor: &str) -> String {
    format!("libkvlink_{compressor}.{MODULE_SUFFIX}")
}

/// Compressors registered on a connection.
#[derive(Debug, Default)]
pub struct ExtensionRegistry {
    compressors: BTreeSet<String>,
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers an extension module.
    ///
    /// Returns the compressor name it provides. Loading the same module twice
    /// is allowed.
    ///
    /// # Errors
    ///
    /// Returns `Extension` if the file is missing, is not a recognized
    /// module, or the configured entry point is not exported.
    pub fn load(&mut self, path: &Path, config: &ConfigMap) -> EngineResult<String> {
        config
            .ensure_only(EXTENSION_CONFIG_KEYS, "extension loading")
            .map_err(|err| EngineError::extension(path, err.to_string()))?;

        if !path.is_file() {
            return Err(EngineError::extension(path, "No such file or directory"));
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EngineError::extension(path, "invalid module file name"))?;
        let compressor = file_name
            .strip_prefix("libkvlink_")
            .and_then(|rest| rest.rsplit_once('.'))
            .filter(|(_, suffix)| matches!(*suffix, "so" | "dll"))
            .map(|(name, _)| name)
            .filter(|name| KNOWN_COMPRESSORS.contains(name))
            .ok_or_else(|| {
                EngineError::extension(path, format!("'{file_name}' is not a kvlink extension module"))
            })?;

        let entry = config
            .get_str("entry")
            .map_err(|err| EngineError::extension(path, err.to_string()))?
            .unwrap_or(ENTRY_POINT);
        if entry != ENTRY_POINT {
            return Err(EngineError::extension(
                path,
                format!("entry point '{entry}' not found"),
            ));
        }

        self.compressors.insert(compressor.to_string());
        Ok(compressor.to_string())
    }

    /// Returns true if the compressor has been loaded.
    #[must_use]
    pub fn has_compressor(&self, name: &str) -> bool {
        self.compressors.contains(name)
    }

    /// Loaded compressors in name order.
    pub fn compressors(&self) -> impl Iterator<Item = &str> {
        self.compressors.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn config(s: &str) -> ConfigMap {
        ConfigMap::parse(s).unwrap()
    }

    #[test]
    fn loads_named_module() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(module_file_name("zstd"));
        fs::write(&path, b"module").unwrap();

        let mut registry = ExtensionRegistry::new();
        assert_eq!(registry.load(&path, &config("")).unwrap(), "zstd");
        assert!(registry.has_compressor("zstd"));
        assert_eq!(
            registry.load(&path, &config("entry=kvlink_extension_init")).unwrap(),
            "zstd"
        );
        assert_eq!(registry.compressors().collect::<Vec<_>>(), vec!["zstd"]);
    }

    #[test]
    fn missing_file_fails() {
        let mut registry = ExtensionRegistry::new();
        let err = registry
            .load(Path::new("/fake/path/extension.so"), &config(""))
            .unwrap_err();
        assert!(err.to_string().contains("/fake/path/extension.so"));
    }

    #[test]
    fn unknown_module_or_entry_fails() {
        let dir = tempdir().unwrap();
        let other = dir.path().join("libother.so");
        fs::write(&other, b"x").unwrap();
        let brotli = dir.path().join("libkvlink_brotli.so");
        fs::write(&brotli, b"x").unwrap();
        let snappy = dir.path().join(module_file_name("snappy"));
        fs::write(&snappy, b"x").unwrap();

        let mut registry = ExtensionRegistry::new();
        assert!(registry.load(&other, &config("")).is_err());
        assert!(registry.load(&brotli, &config("")).is_err());
        assert!(registry.load(&snappy, &config("entry=ext_init")).is_err());
        assert!(registry.load(&snappy, &config("bogus=1")).is_err());
        assert!(!registry.has_compressor("snappy"));
    }
}
