use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context as _, Result};

use crate::config::FlagpruneConfig;
use crate::document::DocumentAnnotator;
use crate::engine::{CleanupError, Engine, OutputMode, Options};
use crate::flag::FlagSpec;
use crate::sources::{SourceFilter, collect_sources};
use crate::{log_debug, log_error, log_info, log_warn};

use super::Cli;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CleanupResult {
    pub files_rewritten: usize,
    pub files_unchanged: usize,
    pub files_failed: usize,
}

pub fn execute(cli: &Cli) -> Result<CleanupResult> {
    let cwd = std::env::current_dir().context("Failed to determine the working directory")?;
    let stdout = io::stdout();
    run(cli, &cwd, &mut stdout.lock())
}

/// Clean up every file of `cli` in turn. A file that fails is reported and
/// skipped. An invalid flag value or glob fails before any file is read.
pub fn run(cli: &Cli, cwd: &Path, stdout: &mut dyn Write) -> Result<CleanupResult> {
    let config = FlagpruneConfig::load(cli.config.as_deref(), cwd)?;

    let flag = FlagSpec::new(cli.key.clone(), cli.flag_type, cli.value.clone());
    let mut aliases = config.aliases_for(&cli.key);
    aliases.extend(cli.aliases.iter().cloned());
    let options = Options {
        output: cli.output.or(config.output).unwrap_or_default(),
        aliases,
    };
    let engine = Engine::new(&flag, options)?;

    let include = if cli.include.is_empty() {
        &config.include
    } else {
        &cli.include
    };
    let exclude = if cli.exclude.is_empty() {
        &config.exclude
    } else {
        &cli.exclude
    };
    let files = collect_sources(&cli.paths, cwd, &SourceFilter::new(include, exclude)?);
    log_debug!(
        "cleanup",
        key = flag.key,
        flag_type = flag.flag_type,
        aliases = engine.options().aliases.len(),
        files = files.len(),
    );
    if files.is_empty() {
        log_warn!("cleanup", message = "No files found to process");
    }

    let mut result = CleanupResult::default();
    for path in &files {
        match engine.refactor_file(path, stdout) {
            Ok(refactored) => {
                if refactored.dirty {
                    result.files_rewritten += 1;
                } else {
                    result.files_unchanged += 1;
                }
                if engine.options().output == OutputMode::File {
                    log_info!(
                        "cleanup",
                        file = path.display(),
                        status = if refactored.written { "rewrote" } else { "unchanged" },
                    );
                }
            }
            Err(err) => {
                result.files_failed += 1;
                report(&err);
            }
        }
    }
    Ok(result)
}

fn report(err: &CleanupError) {
    log_error!("cleanup", error = err);
    if let CleanupError::Parse { path, source } = err {
        let filename = path.display().to_string();
        eprint!(
            "{}",
            DocumentAnnotator::new()
                .with_label("error")
                .with_location()
                .with_lines_before(1)
                .annotate(Some(&filename), [source])
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser as _;
    use indoc::indoc;
    use std::fs;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("flagprune").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn should_rewrite_files_in_place() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("app.py"),
            indoc! {r#"
                if client.variable(user, SHOW, False).value:
                    show()
            "#},
        )
        .unwrap();
        fs::write(dir.path().join("other.py"), "show()\n").unwrap();
        fs::write(
            dir.path().join("flagprune.toml"),
            indoc! {r#"
                output = "file"

                [aliases]
                SHOW = "show-button"
            "#},
        )
        .unwrap();

        let mut stdout = Vec::new();
        let result = run(
            &cli(&["app.py", "other.py", "-k", "show-button", "-t", "boolean", "-v", "false"]),
            dir.path(),
            &mut stdout,
        )
        .unwrap();

        assert_eq!(
            result,
            CleanupResult {
                files_rewritten: 1,
                files_unchanged: 1,
                files_failed: 0,
            }
        );
        assert_eq!(fs::read_to_string(dir.path().join("app.py")).unwrap(), "");
        assert_eq!(fs::read_to_string(dir.path().join("other.py")).unwrap(), "show()\n");
        assert!(stdout.is_empty());
    }

    #[test]
    fn should_print_results_and_continue_after_failures() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.py"), "if (:\n").unwrap();
        fs::write(
            dir.path().join("app.py"),
            "label = client.variable(user, 'color', 'red').value\n",
        )
        .unwrap();

        let mut stdout = Vec::new();
        let result = run(
            &cli(&["broken.py", "missing.py", "app.py", "-k", "color", "-t", "string", "-v", "blue"]),
            dir.path(),
            &mut stdout,
        )
        .unwrap();

        assert_eq!(result.files_failed, 2);
        assert_eq!(result.files_rewritten, 1);
        assert_eq!(String::from_utf8(stdout).unwrap(), "label = 'blue'\n");
        assert_eq!(fs::read_to_string(dir.path().join("broken.py")).unwrap(), "if (:\n");
    }

    #[test]
    fn should_clean_up_directories_with_configured_globs() {
        let dir = TempDir::new().unwrap();
        let flagged = "if client.variable(user, 'flag', False).value:\n    go()\n";
        for file in ["app/views.py", "app/test_views.py", "app/data.json", "scripts/run.py"] {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, flagged).unwrap();
        }
        fs::write(
            dir.path().join("flagprune.toml"),
            indoc! {r#"
                output = "file"
                exclude = ["test_*.py"]
            "#},
        )
        .unwrap();

        let result = run(
            &cli(&["app", "-k", "flag", "-t", "boolean", "-v", "true"]),
            dir.path(),
            &mut io::sink(),
        )
        .unwrap();
        assert_eq!(result.files_rewritten, 1);
        assert_eq!(fs::read_to_string(dir.path().join("app/views.py")).unwrap(), "go()\n");
        assert_eq!(fs::read_to_string(dir.path().join("app/test_views.py")).unwrap(), flagged);
        assert_eq!(fs::read_to_string(dir.path().join("app/data.json")).unwrap(), flagged);
        assert_eq!(fs::read_to_string(dir.path().join("scripts/run.py")).unwrap(), flagged);

        // globs on the command line replace the configured ones
        let result = run(
            &cli(&["-k", "flag", "-t", "boolean", "-v", "true", "--exclude", "views.py"]),
            dir.path(),
            &mut io::sink(),
        )
        .unwrap();
        assert_eq!(result.files_rewritten, 2);
        assert_eq!(fs::read_to_string(dir.path().join("app/test_views.py")).unwrap(), "go()\n");
        assert_eq!(fs::read_to_string(dir.path().join("scripts/run.py")).unwrap(), "go()\n");
    }

    #[test]
    fn should_fail_before_reading_files_when_the_value_is_invalid() {
        let dir = TempDir::new().unwrap();
        let err = run(
            &cli(&["missing.py", "-k", "limit", "-t", "number", "-v", "lots"]),
            dir.path(),
            &mut io::sink(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), r#"Value "lots" of flag 'limit' is not a number"#);
    }
}
