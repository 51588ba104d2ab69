//! Existence probes for script files referenced by tools and script nodes.

use std::collections::HashSet;
use std::path::PathBuf;

/// Answers whether `tools/<path>` exists in the project being compiled.
pub trait ScriptResolver {
    fn exists(&self, path: &str) -> bool;
}

/// Probes the filesystem under `<project_dir>/tools`.
#[derive(Debug, Clone)]
pub struct FsScriptResolver {
    tools_dir: PathBuf,
}

impl FsScriptResolver {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        FsScriptResolver {
            tools_dir: project_dir.into().join("tools"),
        }
    }
}

impl ScriptResolver for FsScriptResolver {
    fn exists(&self, path: &str) -> bool {
        self.tools_dir.join(path).exists()
    }
}

/// Fixed set of known script paths (relative to `tools/`).
#[derive(Debug, Clone, Default)]
pub struct KnownScripts {
    paths: HashSet<String>,
}

impl KnownScripts {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KnownScripts {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl ScriptResolver for KnownScripts {
    fn exists(&self, path: &str) -> bool {
        self.paths.contains(path)
    }
}
