use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::log_warn;

/// Extension of the files picked up when walking a directory.
const SOURCE_EXTENSION: &str = "py";

/// Directories a walk never descends into.
fn should_skip_directory(dir_name: &str) -> bool {
    dir_name.starts_with('.')
        || matches!(
            dir_name,
            "__pycache__" | "node_modules" | "venv" | "site-packages" | "build" | "dist"
        )
}

/// A list of glob patterns. A pattern containing `/` is matched against the
/// whole relative path, any other pattern against the file name alone.
#[derive(Debug)]
struct Patterns {
    paths: GlobSet,
    names: GlobSet,
}

impl Patterns {
    fn new(patterns: &[String]) -> anyhow::Result<Option<Self>> {
        if patterns.is_empty() {
            return Ok(None);
        }
        let mut paths = GlobSetBuilder::new();
        let mut names = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .with_context(|| format!("Invalid glob pattern {:?}", pattern))?;
            if pattern.contains('/') {
                paths.add(glob);
            } else {
                names.add(glob);
            }
        }
        Ok(Some(Self {
            paths: paths.build()?,
            names: names.build()?,
        }))
    }

    fn is_match(&self, relative: &Path) -> bool {
        self.paths.is_match(relative)
            || relative
                .file_name()
                .is_some_and(|name| self.names.is_match(name))
    }
}

/// Selects the files found in directories by `include` and `exclude`
/// globs. Without include patterns every file is included.
#[derive(Debug)]
pub struct SourceFilter {
    include: Option<Patterns>,
    exclude: Option<Patterns>,
}

impl SourceFilter {
    pub fn new(include: &[String], exclude: &[String]) -> anyhow::Result<Self> {
        Ok(Self {
            include: Patterns::new(include)?,
            exclude: Patterns::new(exclude)?,
        })
    }

    pub fn accepts(&self, relative: &Path) -> bool {
        self.include
            .as_ref()
            .is_none_or(|patterns| patterns.is_match(relative))
            && !self
                .exclude
                .as_ref()
                .is_some_and(|patterns| patterns.is_match(relative))
    }
}

/// Expand `paths` into the files to clean up.
///
/// A path that is not a directory is kept as given, even when it does not
/// exist, so that reading it reports the error. Directories are walked in
/// file name order for `.py` files that `filter` accepts, matched by their
/// path relative to `cwd`. Every file is returned once.
pub fn collect_sources(paths: &[PathBuf], cwd: &Path, filter: &SourceFilter) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for path in paths {
        let path: PathBuf = cwd.join(path).components().collect();
        if !path.is_dir() {
            if seen.insert(path.clone()) {
                sources.push(path);
            }
            continue;
        }
        let walker = WalkDir::new(&path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || entry
                        .file_name()
                        .to_str()
                        .is_none_or(|name| !should_skip_directory(name))
            });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log_warn!("sources", error = err);
                    continue;
                }
            };
            let file = entry.path();
            if !entry.file_type().is_file()
                || file.extension().is_none_or(|ext| ext != SOURCE_EXTENSION)
            {
                continue;
            }
            let relative = file.strip_prefix(cwd).unwrap_or(file);
            if filter.accepts(relative) && seen.insert(file.to_path_buf()) {
                sources.push(file.to_path_buf());
            }
        }
    }
    sources
}
