// dbbackup/src/backup/archive.rs
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder};

use crate::errors::{BackupError, Result};
use crate::utils::{file_name_of, has_suffix, parent_dir, strip_suffix, with_suffix};

const TAR_GZ_SUFFIXES: [&str; 2] = [".tar.gz", ".tgz"];

/// Creates a GZipped TAR archive from a file or directory.
///
/// The source's base name becomes the single top-level entry of the archive,
/// so extraction reproduces the original folder (or file) name.
///
/// # Arguments
/// * `source` - The file or directory to archive.
/// * `archive_dest_path` - The full path where the `.tar.gz` archive will be created.
///
/// # Returns
/// Path to the created archive file.
pub fn create_tar_gz_archive(source: &Path, archive_dest_path: &Path) -> Result<PathBuf> {
    let entry_name = file_name_of(source)?;
    if let Some(parent) = archive_dest_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    tracing::info!(
        source = %source.display(),
        archive = %archive_dest_path.display(),
        "creating tar.gz archive"
    );

    let archive_file = File::create(archive_dest_path)?;
    let enc = GzEncoder::new(BufWriter::new(archive_file), Compression::default());
    let mut tar_builder = Builder::new(enc);

    if source.is_dir() {
        tar_builder.append_dir_all(&entry_name, source)?;
    } else if source.is_file() {
        tar_builder.append_path_with_name(source, &entry_name)?;
    } else {
        return Err(BackupError::ArtifactMissing(source.to_path_buf()));
    }

    let encoder = tar_builder.into_inner()?;
    encoder.finish()?.flush()?;

    tracing::info!(archive = %archive_dest_path.display(), "✓ tar.gz archive created");
    Ok(archive_dest_path.to_path_buf())
}

/// Extracts a `.tar.gz`/`.tgz` archive into the directory containing it.
///
/// Returns the archive's single top-level entry when it has exactly one;
/// otherwise the name obtained by stripping the archive suffix. The returned
/// path always exists.
pub fn extract_tar_gz_archive(archive_path: &Path) -> Result<PathBuf> {
    let derived = TAR_GZ_SUFFIXES
        .iter()
        .find_map(|suffix| strip_suffix(archive_path, suffix))
        .ok_or_else(|| {
            BackupError::InvalidFormat(format!(
                "{} must be a .tar.gz or .tgz file",
                archive_path.display()
            ))
        })?;
    if !archive_path.is_file() {
        return Err(BackupError::ArtifactMissing(archive_path.to_path_buf()));
    }

    let extract_to_dir = parent_dir(archive_path);
    tracing::info!(
        archive = %archive_path.display(),
        destination = %extract_to_dir.display(),
        "extracting tar.gz archive"
    );

    let archive_file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(archive_file)));
    let mut top_level: BTreeSet<OsString> = BTreeSet::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        if let Some(Component::Normal(first)) = entry_path
            .components()
            .find(|c| !matches!(c, Component::CurDir))
        {
            top_level.insert(first.to_os_string());
        }
        // unpack_in refuses entries that would escape the destination
        entry.unpack_in(&extract_to_dir)?;
    }

    let extracted = match top_level.len() {
        1 => top_level
            .into_iter()
            .next()
            .map(|name| extract_to_dir.join(name))
            .unwrap_or(derived),
        _ => derived,
    };
    if !extracted.exists() {
        return Err(BackupError::InvalidFormat(format!(
            "archive {} did not contain the expected entry {}",
            archive_path.display(),
            extracted.display()
        )));
    }

    tracing::info!(extracted = %extracted.display(), "✓ tar.gz archive extracted");
    Ok(extracted)
}

/// Gzips a single file into a `.gz` sibling, leaving the original in place.
pub fn gzip_file(source: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(BackupError::InvalidFormat(format!(
            "gzip compression needs a single file, got {}",
            source.display()
        )));
    }
    let dest = with_suffix(source, ".gz");
    tracing::info!(source = %source.display(), dest = %dest.display(), "compressing with gzip");

    let mut reader = BufReader::new(File::open(source)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&dest)?), Compression::default());
    io::copy(&mut reader, &mut encoder)?;
    encoder.finish()?.flush()?;
    Ok(dest)
}

/// Reverses [`gzip_file`]: `name.gz` is decompressed into `name`.
pub fn gunzip_file(source: &Path) -> Result<PathBuf> {
    let dest = strip_suffix(source, ".gz").ok_or_else(|| {
        BackupError::InvalidFormat(format!("{} must be a .gz file", source.display()))
    })?;
    tracing::info!(source = %source.display(), dest = %dest.display(), "decompressing gzip file");

    let mut decoder = GzDecoder::new(BufReader::new(File::open(source)?));
    let mut writer = BufWriter::new(File::create(&dest)?);
    io::copy(&mut decoder, &mut writer)?;
    writer.flush()?;
    Ok(dest)
}

/// Picks the decompression step from the file suffix. Anything that is not
/// a tarball or gzip file is returned unchanged.
pub fn decompress_by_suffix(path: &Path) -> Result<PathBuf> {
    if TAR_GZ_SUFFIXES.iter().any(|suffix| has_suffix(path, suffix)) {
        extract_tar_gz_archive(path)
    } else if has_suffix(path, ".gz") {
        gunzip_file(path)
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walkdir::WalkDir;

    fn write_tree(root: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(root.join("nested/deeper"))?;
        fs::write(root.join("users.bson"), b"\x10\x00\x00\x00user-bytes")?;
        fs::write(root.join("users.metadata.json"), br#"{"indexes":[]}"#)?;
        fs::write(root.join("nested/deeper/posts.bson"), vec![7u8; 4096])?;
        Ok(())
    }

    fn snapshot(root: &Path) -> anyhow::Result<Vec<(PathBuf, Vec<u8>)>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                let rel = entry.path().strip_prefix(root)?.to_path_buf();
                files.push((rel, fs::read(entry.path())?));
            }
        }
        Ok(files)
    }

    #[test]
    fn test_directory_round_trip_preserves_name_and_bytes() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let source = work.path().join("blogDB");
        write_tree(&source)?;
        let before = snapshot(&source)?;

        let out_dir = work.path().join("out");
        let archive = create_tar_gz_archive(&source, &out_dir.join("blogDB.tar.gz"))?;
        let extracted = extract_tar_gz_archive(&archive)?;

        assert_eq!(extracted, out_dir.join("blogDB"));
        assert_eq!(snapshot(&extracted)?, before);
        Ok(())
    }

    #[test]
    fn test_extract_uses_actual_entry_when_archive_was_renamed() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let source = work.path().join("inventory");
        write_tree(&source)?;

        let out_dir = work.path().join("out");
        create_tar_gz_archive(&source, &out_dir.join("nightly-2024.tgz"))?;
        let extracted = extract_tar_gz_archive(&out_dir.join("nightly-2024.tgz"))?;

        assert_eq!(extracted, out_dir.join("inventory"));
        assert!(extracted.join("users.bson").is_file());
        Ok(())
    }

    #[test]
    fn test_single_file_archive() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let dump = work.path().join("shop.sql");
        fs::write(&dump, "CREATE TABLE orders (id int);\n")?;

        let out_dir = work.path().join("archived");
        let archive = create_tar_gz_archive(&dump, &out_dir.join("shop.sql.tar.gz"))?;
        let extracted = extract_tar_gz_archive(&archive)?;

        assert_eq!(extracted, out_dir.join("shop.sql"));
        assert_eq!(fs::read(&extracted)?, fs::read(&dump)?);
        Ok(())
    }

    #[test]
    fn test_extract_rejects_unknown_suffix() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let zip = work.path().join("backup.zip");
        fs::write(&zip, b"PK")?;
        assert!(matches!(
            extract_tar_gz_archive(&zip),
            Err(BackupError::InvalidFormat(_))
        ));
        Ok(())
    }

    #[test]
    fn test_gzip_round_trip_keeps_original() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let dump = work.path().join("pg.dump");
        let payload: Vec<u8> = (0..10_000u32).flat_map(|n| n.to_le_bytes()).collect();
        fs::write(&dump, &payload)?;

        let compressed = gzip_file(&dump)?;
        assert_eq!(compressed, work.path().join("pg.dump.gz"));
        assert!(dump.exists());

        fs::remove_file(&dump)?;
        let restored = gunzip_file(&compressed)?;
        assert_eq!(restored, dump);
        assert_eq!(fs::read(&restored)?, payload);
        Ok(())
    }

    #[test]
    fn test_gzip_rejects_directories() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        assert!(matches!(
            gzip_file(work.path()),
            Err(BackupError::InvalidFormat(_))
        ));
        Ok(())
    }

    #[test]
    fn test_decompress_by_suffix_dispatch() -> anyhow::Result<()> {
        let work = tempfile::tempdir()?;
        let plain = work.path().join("shop.sql");
        fs::write(&plain, "SELECT 1;\n")?;
        assert_eq!(decompress_by_suffix(&plain)?, plain);

        let gz = gzip_file(&plain)?;
        fs::remove_file(&plain)?;
        assert_eq!(decompress_by_suffix(&gz)?, plain);
        assert_eq!(fs::read_to_string(&plain)?, "SELECT 1;\n");
        Ok(())
    }
}
