use crate::config::{ConvertConfig, DocFormat};
use crate::error::ConvertError;
use eyre::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where each rendered format of one input will be written.
pub type Destinations = Vec<(DocFormat, PathBuf)>;

/// Allocate output paths for every input, in input order.
///
/// The file stem is kept and the source subfolder mirrored (unless
/// disabled). When two inputs would land on the same path, compared
/// case-insensitively, the later one gets `-1`, `-2`, ... appended.
/// Allocation depends only on the input list, so rerunning over the same
/// inputs yields the same paths. Nothing is created on disk here.
pub fn plan_destinations(inputs: &[PathBuf], config: &ConvertConfig) -> Vec<Destinations> {
    let formats = config.render.output_format.formats();
    let mut claimed: HashSet<String> = HashSet::new();

    inputs
        .iter()
        .map(|input| {
            let dir = output_dir(input, config);
            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "conversation".to_string());

            let mut n = 0usize;
            loop {
                let candidate = if n == 0 {
                    stem.clone()
                } else {
                    format!("{stem}-{n}")
                };
                let paths: Destinations = formats
                    .iter()
                    .map(|f| (*f, dir.join(format!("{candidate}.{}", f.extension()))))
                    .collect();
                let keys: Vec<String> = paths.iter().map(|(_, p)| claim_key(p)).collect();
                if keys.iter().all(|k| !claimed.contains(k)) {
                    claimed.extend(keys);
                    break paths;
                }
                n += 1;
            }
        })
        .collect()
}

fn output_dir(input: &Path, config: &ConvertConfig) -> PathBuf {
    if !config.mirror_subfolders {
        return config.dest_dir.clone();
    }
    let rel = input.parent().and_then(|parent| {
        config
            .source_roots
            .iter()
            .filter_map(|root| parent.strip_prefix(root).ok())
            .min_by_key(|rel| rel.components().count())
            .filter(|rel| !rel.as_os_str().is_empty())
    });
    match rel {
        Some(rel) => config.dest_dir.join(rel),
        None => config.dest_dir.clone(),
    }
}

fn claim_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Write `contents` to `path` all at once.
///
/// Data goes to a temporary file in the destination directory that is
/// renamed over `path` only when complete, so readers never see a partial
/// document and a failed write leaves nothing behind.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), ConvertError> {
    let err = |source: std::io::Error| ConvertError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir).map_err(err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(err)?;
    tmp.write_all(contents.as_bytes()).map_err(err)?;
    tmp.as_file().sync_all().map_err(err)?;
    tmp.persist(path).map_err(|e| err(e.error))?;
    Ok(())
}

/// Fail early when the destination cannot hold any output at all.
pub fn ensure_writable(dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir)
        .wrap_err_with(|| format!("Failed to create destination: {}", dest_dir.display()))?;
    tempfile::Builder::new()
        .prefix(".writable-")
        .tempfile_in(dest_dir)
        .wrap_err_with(|| format!("Destination is not writable: {}", dest_dir.display()))?;
    Ok(())
}
