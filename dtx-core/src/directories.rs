//! Test project directories
//!
//! Directories are found by expanding the configured glob under every
//! workspace root. A match only counts if its directory holds something the
//! toolchain can build. Discovered test names are remembered per directory so
//! runs can be routed to the directories that own the selected tests.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::filter::run_id;
use crate::Result;

/// Project manifest extensions the toolchain can build
pub const PROJECT_EXTENSIONS: &[&str] = &["csproj", "sln", "fsproj"];

/// A discovered test name and the directory it came from
#[derive(Debug, Clone, PartialEq, Eq)]
struct OwnedTest {
    directory: PathBuf,
    name: String,
}

/// Tracks test directories and which of them own which tests
#[derive(Debug, Clone, Default)]
pub struct TestDirectories {
    directories: Vec<PathBuf>,
    tests: Vec<OwnedTest>,
}

impl TestDirectories {
    /// Create a tracker over an explicit directory list
    pub fn new(directories: Vec<PathBuf>) -> Self {
        Self {
            directories,
            tests: Vec::new(),
        }
    }

    /// Find test directories for a glob under each workspace root
    ///
    /// Invalid matches are logged and skipped. An empty pattern selects the
    /// roots themselves.
    pub fn resolve(workspace_roots: &[PathBuf], pattern: &str) -> Result<Self> {
        let mut resolved = Self::default();
        let mut matches = Vec::new();

        for root in workspace_roots {
            let root_str = root.to_string_lossy().replace('\\', "/");
            let pattern = pattern.trim_start_matches('/');
            if pattern.is_empty() {
                matches.push(root.clone());
                continue;
            }

            let full_pattern = format!("{}/{}", root_str.trim_end_matches('/'), pattern);
            tracing::info!(pattern = %full_pattern, "Finding projects for pattern");

            let mut found = 0usize;
            for entry in glob::glob(&full_pattern)? {
                match entry {
                    Ok(path) => {
                        found += 1;
                        matches.push(path);
                    }
                    Err(e) => tracing::warn!(error = %e, "Unreadable glob match"),
                }
            }
            tracing::info!(
                root = %root.display(),
                matches = found,
                "Found matches for pattern in workspace folder"
            );
        }

        for candidate in matches {
            tracing::debug!(path = %candidate.display(), "Evaluating match");
            resolved.evaluate(&candidate);
        }

        Ok(resolved)
    }

    /// Accept a candidate path if it is (or sits in) a buildable directory
    fn evaluate(&mut self, candidate: &Path) {
        if !candidate.exists() {
            tracing::warn!(path = %candidate.display(), "Path is not valid");
            return;
        }

        let directory = if candidate.is_file() {
            match candidate.parent() {
                Some(parent) => parent.to_path_buf(),
                None => return,
            }
        } else {
            candidate.to_path_buf()
        };

        if !has_project_file(&directory) {
            tracing::warn!(
                path = %directory.display(),
                "Skipping path since it does not contain something we can build (.sln, .csproj, .fsproj)"
            );
            return;
        }

        if self.directories.contains(&directory) {
            return;
        }

        tracing::info!(path = %directory.display(), "Adding directory");
        self.directories.push(directory);
    }

    /// Remember the tests discovered in a directory
    pub fn add_tests_for_directory(&mut self, directory: &Path, names: &[String]) {
        self.tests.extend(names.iter().map(|name| OwnedTest {
            directory: directory.to_path_buf(),
            name: name.clone(),
        }));
    }

    /// Forget all discovered tests
    pub fn clear_tests(&mut self) {
        self.tests.clear();
    }

    /// First discovered test of a directory
    pub fn first_test_for_directory(&self, directory: &Path) -> Option<&str> {
        self.tests
            .iter()
            .find(|t| t.directory == directory)
            .map(|t| t.name.as_str())
    }

    /// Test directories, optionally restricted to those owning a name prefix
    ///
    /// With an empty or missing filter every tracked directory is returned.
    /// Names and prefix are compared as run identifiers, so `Outer+Inner`
    /// and `Outer.Inner` select the same tests.
    pub fn test_directories(&self, filter: Option<&str>) -> Vec<PathBuf> {
        match filter {
            Some(prefix) if !prefix.is_empty() => {
                let prefix = run_id(prefix);
                let mut seen = HashSet::new();
                self.tests
                    .iter()
                    .filter(|t| run_id(&t.name).starts_with(&prefix))
                    .filter(|t| seen.insert(t.directory.clone()))
                    .map(|t| t.directory.clone())
                    .collect()
            }
            _ => self.directories.clone(),
        }
    }

    /// Stop tracking a directory
    pub fn remove_directory(&mut self, directory: &Path) {
        self.directories.retain(|d| d != directory);
        tracing::warn!(
            path = %directory.display(),
            "Removed directory due to it not containing any tests"
        );
    }

    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }
}

fn has_project_file(directory: &Path) -> bool {
    let Ok(entries) = fs::read_dir(directory) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|entry| {
        let path = entry.path();
        path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| PROJECT_EXTENSIONS.contains(&e))
                .unwrap_or(false)
    })
}
