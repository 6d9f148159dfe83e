use eyre::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

pub const DEFAULT_ARCHIVE_NAME: &str = "export.zip";

/// Pack `files` into a deflated zip at `archive_path` and return how many
/// went in.
///
/// Entry names are relative to `dest_dir` with `/` separators, so the
/// mirrored subfolders survive; a file outside `dest_dir` keeps only its
/// name. Entries are sorted and duplicates dropped. Anything else in
/// `dest_dir`, a previous archive included, stays out.
pub fn zip_outputs(dest_dir: &Path, files: &[PathBuf], archive_path: &Path) -> Result<usize> {
    let parent = archive_path.parent().unwrap_or(Path::new("."));
    let tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(".zip")
        .tempfile_in(parent)
        .wrap_err_with(|| format!("Failed to create archive in {}", parent.display()))?;

    let mut files: Vec<&PathBuf> = files.iter().filter(|p| p.as_path() != archive_path).collect();
    files.sort();
    files.dedup();

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(tmp);

    for path in &files {
        let name = entry_name(dest_dir, path);
        zip.start_file(name.as_str(), options)
            .wrap_err_with(|| format!("Failed to add {name} to archive"))?;
        let mut file =
            File::open(path).wrap_err_with(|| format!("Failed to open: {}", path.display()))?;
        io::copy(&mut file, &mut zip)
            .wrap_err_with(|| format!("Failed to compress: {}", path.display()))?;
        debug!(entry = %name, "archived");
    }

    let tmp = zip.finish().wrap_err("Failed to finalize archive")?;
    tmp.persist(archive_path)
        .wrap_err_with(|| format!("Failed to write archive: {}", archive_path.display()))?;
    Ok(files.len())
}

fn entry_name(dest_dir: &Path, path: &Path) -> String {
    match path.strip_prefix(dest_dir) {
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}
