//! Best-effort discovery of compression extensions.
//!
//! After a connection opens, each candidate compressor is looked up at
//! `<dir>/<name>/libkvlink_<name>.<so|dll>` and loaded if present. The
//! directory defaults to `<engine install dir>/ext/compressors`. A missing
//! or broken module is recorded in the [`ExtensionReport`] and logged, never
//! returned as an error: creating a table that names an unavailable
//! compressor is where the failure surfaces.

use kvlink_engine::{module_file_name, EngineResult, KNOWN_COMPRESSORS};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which compressors to look for, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDiscovery {
    /// Run discovery at all.
    pub enabled: bool,
    /// Directory holding one subdirectory per compressor.
    pub directory: Option<PathBuf>,
    /// Compressor names to look for, in order.
    pub compressors: Vec<String>,
}

impl Default for ExtensionDiscovery {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            compressors: KNOWN_COMPRESSORS.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl ExtensionDiscovery {
    /// Discovery turned off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Looks in `dir` instead of the engine's install directory.
    #[must_use]
    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    /// Looks only for the given compressors.
    #[must_use]
    pub fn compressors<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compressors = names.into_iter().map(Into::into).collect();
        self
    }

    /// Resolves the directory to scan.
    #[must_use]
    pub fn resolve_directory(&self, install_dir: Option<&Path>) -> Option<PathBuf> {
        self.directory
            .clone()
            .or_else(|| install_dir.map(|dir| dir.join("ext").join("compressors")))
    }

    /// Candidate module paths, one per compressor.
    #[must_use]
    pub fn candidates(&self, install_dir: Option<&Path>) -> Vec<(String, PathBuf)> {
        let Some(dir) = self.resolve_directory(install_dir) else {
            return Vec::new();
        };
        self.compressors
            .iter()
            .map(|name| (name.clone(), dir.join(name).join(module_file_name(name))))
            .collect()
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The module was loaded.
    Loaded,
    /// No module file at the candidate path.
    Missing,
    /// The engine refused the module.
    Failed(String),
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => f.write_str("loaded"),
            Self::Missing => f.write_str("missing"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// One candidate compressor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionAttempt {
    /// Compressor name.
    pub compressor: String,
    /// Path that was checked.
    pub path: PathBuf,
    /// Result of the lookup.
    pub outcome: LoadOutcome,
}

/// Result of discovery for one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionReport {
    attempts: Vec<ExtensionAttempt>,
}

impl ExtensionReport {
    /// Every attempt, in candidate order.
    #[must_use]
    pub fn attempts(&self) -> &[ExtensionAttempt] {
        &self.attempts
    }

    /// Names of the compressors that loaded.
    pub fn loaded(&self) -> impl Iterator<Item = &str> {
        self.attempts
            .iter()
            .filter(|p| p.outcome == LoadOutcome::Loaded)
            .map(|p| p.compressor.as_str())
    }

    /// Returns true if no candidate was checked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }
}

/// Checks every candidate, loading the ones that exist.
pub(crate) fn discover<F>(
    discovery: &ExtensionDiscovery,
    install_dir: Option<&Path>,
    mut load: F,
) -> ExtensionReport
where
    F: FnMut(&Path) -> EngineResult<()>,
{
    if !discovery.enabled {
        return ExtensionReport::default();
    }
    let candidates = discovery.candidates(install_dir);
    if candidates.is_empty() {
        tracing::debug!("no extension directory configured, skipping discovery");
    }

    let attempts = candidates
        .into_iter()
        .map(|(compressor, path)| {
            let outcome = if !path.is_file() {
                LoadOutcome::Missing
            } else {
                match load(&path) {
                    Ok(()) => LoadOutcome::Loaded,
                    Err(err) => {
                        tracing::warn!(
                            compressor = %compressor,
                            path = %path.display(),
                            error = %err,
                            "compression extension failed to load"
                        );
                        LoadOutcome::Failed(err.to_string())
                    }
                }
            };
            tracing::debug!(compressor = %compressor, outcome = %outcome, "extension candidate checked");
            ExtensionAttempt {
                compressor,
                path,
                outcome,
            }
        })
        .collect();
    ExtensionReport { attempts }
}
