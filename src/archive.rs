//! Result archive handling
//!
//! Retrieve-style jobs deliver their result as a base64-encoded tar
//! archive. Decoding and extraction live here: the decoded bytes go to a
//! scoped scratch file, the archive is walked entry by entry, and every
//! entry is written under the destination using its name verbatim,
//! overwriting existing files. The scratch file is removed unconditionally
//! once extraction finishes, success or failure.
//!
//! Entry names are not sanitized against path traversal; callers must
//! trust the gateway they point at.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tempfile::NamedTempFile;

/// Errors from payload decoding and extraction
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Malformed base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("Result payload is structured deploy detail, not an archive")]
    NotAnArchive,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Decode a base64 result payload into raw archive bytes
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, ArchiveError> {
    Ok(BASE64.decode(payload)?)
}

/// Encode raw archive bytes the way the service would ship them.
///
/// Counterpart of [`decode_base64`]; mock gateways and tests use it to
/// script retrieve results.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Unpack archive bytes under `dest`, returning the number of file
/// entries written.
///
/// The bytes are staged in a scratch file first, so a half-written archive
/// never lingers anywhere the caller can see; the scratch file is removed
/// when this function returns, on every path.
pub fn extract(bytes: &[u8], dest: &Path) -> Result<usize, ArchiveError> {
    // NamedTempFile removes itself on drop, including early error returns
    let mut scratch = NamedTempFile::new()?;
    scratch.write_all(bytes)?;
    scratch.flush()?;

    let mut archive = tar::Archive::new(scratch.reopen()?);
    let mut written = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let name = entry.path()?.into_owned();
        let target = dest.join(&name);

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build an in-memory tar archive from (name, contents) pairs
    fn build_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn base64_round_trip() {
        let bytes = b"archive bytes".to_vec();
        let encoded = encode_base64(&bytes);
        assert_eq!(decode_base64(&encoded).unwrap(), bytes);
    }

    #[test]
    fn malformed_base64_is_a_decode_error() {
        let result = decode_base64("not!!valid@@base64");
        assert!(matches!(result, Err(ArchiveError::Decode(_))));
    }

    #[test]
    fn extract_writes_every_entry() {
        let tar = build_tar(&[("a.txt", b"hello"), ("b.txt", b"world")]);
        let dest = tempfile::tempdir().unwrap();

        let written = extract(&tar, dest.path()).unwrap();

        assert_eq!(written, 2);
        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(dest.path().join("b.txt")).unwrap(), b"world");
    }

    #[test]
    fn extract_creates_parent_directories() {
        let tar = build_tar(&[("unpackaged/classes/Foo.cls", b"class Foo {}")]);
        let dest = tempfile::tempdir().unwrap();

        extract(&tar, dest.path()).unwrap();

        let target = dest.path().join("unpackaged/classes/Foo.cls");
        assert_eq!(fs::read(target).unwrap(), b"class Foo {}");
    }

    #[test]
    fn extract_overwrites_existing_files() {
        let tar = build_tar(&[("a.txt", b"fresh")]);
        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("a.txt"), b"stale").unwrap();

        extract(&tar, dest.path()).unwrap();

        assert_eq!(fs::read(dest.path().join("a.txt")).unwrap(), b"fresh");
    }

    #[test]
    fn truncated_archive_is_an_io_error() {
        let mut tar = build_tar(&[("a.txt", b"hello")]);
        tar.truncate(100);
        let dest = tempfile::tempdir().unwrap();

        let result = extract(&tar, dest.path());
        assert!(matches!(result, Err(ArchiveError::Io(_))));
    }
}
