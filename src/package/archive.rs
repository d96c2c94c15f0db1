//! Gzipped tar archives of a source tree.

use std::fs::File;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;

use super::{Artifact, PackageError};

/// Archives `source` into `<staging_dir>/<source name>-<random>/<source name>.tar.gz`.
///
/// Every call gets its own run directory, so concurrent packaging of
/// same-named sources never shares a file. Entries are stored relative to
/// the source root. Symlinks are archived as links rather than followed.
///
/// # Errors
///
/// Returns [`PackageError::Archive`] when the source has no usable name, the
/// staging directory sits inside the source, or any filesystem operation
/// fails.
pub async fn write(source: &Utf8Path, staging_dir: &Utf8Path) -> Result<Artifact, PackageError> {
    let root = source.to_path_buf();
    let staging = staging_dir.to_path_buf();
    tokio::task::spawn_blocking(move || write_blocking(&root, &staging))
        .await
        .map_err(|err| PackageError::Archive {
            path: Utf8PathBuf::new(),
            message: err.to_string(),
        })?
}

fn write_blocking(source: &Utf8Path, staging_dir: &Utf8Path) -> Result<Artifact, PackageError> {
    let archive_error = |path: &Utf8Path, err: &dyn std::fmt::Display| PackageError::Archive {
        path: path.to_path_buf(),
        message: err.to_string(),
    };

    let root = source
        .canonicalize_utf8()
        .map_err(|err| archive_error(source, &err))?;
    let Some(name) = root.file_name() else {
        return Err(archive_error(source, &"source directory has no name"));
    };

    let staging = resolve(staging_dir).map_err(|err| archive_error(staging_dir, &err))?;
    if staging.starts_with(&root) {
        return Err(archive_error(
            staging_dir,
            &"staging directory must not be inside the source tree",
        ));
    }
    std::fs::create_dir_all(&staging).map_err(|err| archive_error(&staging, &err))?;

    let run_dir = tempfile::Builder::new()
        .prefix(&format!("{name}-"))
        .tempdir_in(&staging)
        .map_err(|err| archive_error(&staging, &err))?
        .keep();
    let dir = Utf8PathBuf::from_path_buf(run_dir).map_err(|path| {
        archive_error(&staging, &format!("non UTF-8 run directory {}", path.display()))
    })?;

    let file_name = format!("{name}.tar.gz");
    let path = dir.join(&file_name);
    if let Err(err) = build(&root, &path) {
        std::fs::remove_dir_all(&dir).ok();
        return Err(archive_error(&path, &err));
    }

    Ok(Artifact {
        path,
        file_name,
        dir,
    })
}

/// Absolute form of `path`, resolving symlinks in the part that exists.
fn resolve(path: &Utf8Path) -> io::Result<Utf8PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match existing.canonicalize_utf8() {
            Ok(base) => {
                return Ok(missing
                    .iter()
                    .rev()
                    .fold(base, |resolved, part| resolved.join(part)));
            }
            Err(err) => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(err);
                };
                missing.push(name);
                existing = if parent.as_str().is_empty() {
                    Utf8Path::new(".")
                } else {
                    parent
                };
            }
        }
    }
}

fn build(root: &Utf8Path, destination: &Utf8Path) -> io::Result<()> {
    let file = File::create(destination)?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(".", root)?;
    builder.into_inner()?.finish()?;
    Ok(())
}
