use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

use crate::error::PipelineError;

pub const ARCHIVE_EXT: &str = "tar.gz";

fn archive_error(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::ArchiveFailure {
        path: path.to_path_buf(),
        source,
    }
}

/// SHA-256 hex of a file's bytes, streamed.
pub fn hash_file(path: &Path) -> Result<String, PipelineError> {
    let mut file = File::open(path).map_err(archive_error(path))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(archive_error(path))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Package `binary` as the single executable entry `entry_name` of
/// `<dest_dir>/<sha256 of binary>.tar.gz`.
///
/// Headers carry no timestamps or owners, so identical binaries yield
/// byte-identical archives under identical names.
pub fn archive_binary(binary: &Path, dest_dir: &Path, entry_name: &str) -> Result<PathBuf, PipelineError> {
    let digest = hash_file(binary)?;
    std::fs::create_dir_all(dest_dir).map_err(archive_error(dest_dir))?;
    let archive_path = dest_dir.join(format!("{digest}.{ARCHIVE_EXT}"));

    let source = File::open(binary).map_err(archive_error(binary))?;
    let size = source.metadata().map_err(archive_error(binary))?.len();

    let mut header = tar::Header::new_gnu();
    header
        .set_path(entry_name)
        .map_err(archive_error(binary))?;
    header.set_size(size);
    header.set_mode(0o755);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();

    let out = File::create(&archive_path).map_err(archive_error(&archive_path))?;
    let mut builder = tar::Builder::new(GzEncoder::new(out, Compression::best()));
    builder
        .append(&header, BufReader::new(source))
        .map_err(archive_error(&archive_path))?;
    builder
        .into_inner()
        .and_then(GzEncoder::finish)
        .map_err(archive_error(&archive_path))?;

    tracing::debug!(
        binary = %binary.display(),
        archive = %archive_path.display(),
        size,
        "Archived binary"
    );
    Ok(archive_path)
}

/// Every entry of an archive written by [`archive_binary`], as (path, mode, bytes).
pub fn read_entries(archive: &Path) -> Result<Vec<(String, u32, Vec<u8>)>, PipelineError> {
    let file = File::open(archive).map_err(archive_error(archive))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    let mut entries = Vec::new();
    for entry in tar.entries().map_err(archive_error(archive))? {
        let mut entry = entry.map_err(archive_error(archive))?;
        let path = entry
            .path()
            .map_err(archive_error(archive))?
            .to_string_lossy()
            .into_owned();
        let mode = entry.header().mode().map_err(archive_error(archive))?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).map_err(archive_error(archive))?;
        entries.push((path, mode, bytes));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn hash_is_sha256_hex() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "empty", b"");
        assert_eq!(
            hash_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn archive_holds_exactly_the_binary() {
        let tmp = TempDir::new().unwrap();
        let binary = write(tmp.path(), "bootstrap", b"\x7fELF fake binary");
        let archive = archive_binary(&binary, &tmp.path().join("assets"), "bootstrap").unwrap();

        let digest = hash_file(&binary).unwrap();
        assert_eq!(
            archive.file_name().unwrap().to_string_lossy(),
            format!("{digest}.tar.gz")
        );

        let entries = read_entries(&archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "bootstrap");
        assert_eq!(entries[0].1, 0o755);
        assert_eq!(entries[0].2, b"\x7fELF fake binary");
    }

    #[test]
    fn identical_binaries_share_name_and_bytes() {
        let tmp = TempDir::new().unwrap();
        let a = write(tmp.path(), "a", b"same bytes");
        let b = write(tmp.path(), "b", b"same bytes");
        let c = write(tmp.path(), "c", b"other bytes");

        let first = archive_binary(&a, &tmp.path().join("one"), "bootstrap").unwrap();
        let second = archive_binary(&b, &tmp.path().join("two"), "bootstrap").unwrap();
        let third = archive_binary(&c, &tmp.path().join("two"), "bootstrap").unwrap();

        assert_eq!(first.file_name(), second.file_name());
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
        assert_ne!(second.file_name(), third.file_name());
    }

    #[test]
    fn missing_binary_is_an_archive_failure() {
        let tmp = TempDir::new().unwrap();
        let err = archive_binary(&tmp.path().join("nope"), tmp.path(), "bootstrap").unwrap_err();
        assert!(matches!(err, PipelineError::ArchiveFailure { .. }));
    }
}
