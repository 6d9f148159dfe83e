use eyre::{Context, Result, eyre};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Give extensionless files a `.json` extension before scanning.
    pub rename_extensionless: bool,
    /// Glob patterns, relative to the source directory. Empty keeps everything.
    pub include: Vec<String>,
    /// Glob patterns, relative to the source directory, to leave out.
    pub exclude: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            rename_extensionless: false,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

fn build_globs(patterns: &[String]) -> Result<Option<GlobSet>> {
    let patterns: Vec<&str> = patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).wrap_err_with(|| format!("Invalid glob: {pattern}"))?);
    }
    Ok(Some(builder.build()?))
}

/// Collect the export files to convert, sorted by path.
///
/// A file argument is returned as-is whatever its extension; a directory
/// yields its `.json` files (case-insensitive), descending into
/// subdirectories when `recursive` is set, narrowed by the include and
/// exclude globs matched against the path relative to `source`.
pub fn collect_inputs(source: &Path, opts: &ScanOptions) -> Result<Vec<PathBuf>> {
    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }
    if !source.is_dir() {
        return Err(eyre!("Source not found: {}", source.display()));
    }

    if opts.rename_extensionless {
        let renamed = rename_extensionless(source, opts.recursive);
        if renamed > 0 {
            info!("Renamed {renamed} extensionless file(s) to .json");
        }
    }

    let include = build_globs(&opts.include)?;
    let exclude = build_globs(&opts.exclude)?;

    let mut inputs: Vec<PathBuf> = walk(source, opts.recursive)
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .filter(|p| {
            let rel = p.strip_prefix(source).unwrap_or(p);
            include.as_ref().is_none_or(|set| set.is_match(rel))
                && !exclude.as_ref().is_some_and(|set| set.is_match(rel))
        })
        .collect();
    inputs.sort();
    debug!(count = inputs.len(), source = %source.display(), "scanned");
    Ok(inputs)
}

fn walk(root: &Path, recursive: bool) -> impl Iterator<Item = PathBuf> {
    let depth = if recursive { usize::MAX } else { 1 };
    WalkDir::new(root)
        .max_depth(depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
}

/// Rename files without an extension to `<name>.json`. Only names change;
/// hidden files and files whose renamed path already exists are left alone.
fn rename_extensionless(root: &Path, recursive: bool) -> usize {
    let candidates: Vec<PathBuf> = walk(root, recursive)
        .filter(|p| p.extension().is_none())
        .filter(|p| {
            p.file_name()
                .is_some_and(|n| !n.to_string_lossy().starts_with('.'))
        })
        .collect();

    let mut renamed = 0;
    for path in candidates {
        let target = path.with_extension("json");
        if target.exists() {
            warn!(
                "Not renaming {}: {} already exists",
                path.display(),
                target.display()
            );
            continue;
        }
        match fs::rename(&path, &target) {
            Ok(()) => {
                debug!(from = %path.display(), to = %target.display(), "renamed");
                renamed += 1;
            }
            Err(e) => warn!("Failed to rename {}: {e}", path.display()),
        }
    }
    renamed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "{}").unwrap();
    }

    #[test]
    fn finds_json_recursively_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.json"));
        touch(&dir.path().join("a.JSON"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("sub/c.json"));

        let all = collect_inputs(dir.path(), &ScanOptions::default()).unwrap();
        let names: Vec<String> = all
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JSON", "b.json", "sub/c.json"]);

        let flat = collect_inputs(
            dir.path(),
            &ScanOptions {
                recursive: false,
                ..ScanOptions::default()
            },
        )
        .unwrap();
        assert_eq!(flat.len(), 2);
    }

    #[test]
    fn renames_extensionless_files_only_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("export"));
        touch(&dir.path().join(".hidden"));
        touch(&dir.path().join("taken"));
        touch(&dir.path().join("taken.json"));

        assert_eq!(collect_inputs(dir.path(), &ScanOptions::default()).unwrap().len(), 1);

        let opts = ScanOptions {
            rename_extensionless: true,
            ..ScanOptions::default()
        };
        let inputs = collect_inputs(dir.path(), &opts).unwrap();
        assert_eq!(inputs.len(), 2);
        assert!(dir.path().join("export.json").exists());
        assert!(dir.path().join(".hidden").exists());
        assert!(dir.path().join("taken").exists());
        assert_eq!(fs::read_to_string(dir.path().join("export.json")).unwrap(), "{}");
    }

    #[test]
    fn include_and_exclude_globs_are_relative_to_source() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("2024/jan.json"));
        touch(&dir.path().join("2024/draft-feb.json"));
        touch(&dir.path().join("2025/mar.json"));
        touch(&dir.path().join("loose.json"));

        let names = |opts: &ScanOptions| -> Vec<String> {
            collect_inputs(dir.path(), opts)
                .unwrap()
                .iter()
                .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().into_owned())
                .collect()
        };

        let only_2024 = ScanOptions {
            include: vec!["2024/*.json".into()],
            ..ScanOptions::default()
        };
        assert_eq!(names(&only_2024), vec!["2024/draft-feb.json", "2024/jan.json"]);

        let no_drafts = ScanOptions {
            include: vec!["2024/*".into(), " loose.json ".into(), "".into()],
            exclude: vec!["**/draft-*".into()],
            ..ScanOptions::default()
        };
        assert_eq!(names(&no_drafts), vec!["2024/jan.json", "loose.json"]);
    }

    #[test]
    fn invalid_glob_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ScanOptions {
            exclude: vec!["[unclosed".into()],
            ..ScanOptions::default()
        };
        assert!(collect_inputs(dir.path(), &opts).is_err());
    }

    #[test]
    fn single_file_is_taken_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("conversation.txt");
        touch(&file);
        assert_eq!(collect_inputs(&file, &ScanOptions::default()).unwrap(), vec![file]);
    }

    #[test]
    fn missing_source_is_an_error() {
        assert!(collect_inputs(Path::new("/definitely/not/here"), &ScanOptions::default()).is_err());
    }
}
