//! # Payload
//!
//! The CFGEditor release archive is linked into the bootstrapper by `build.rs`.
//! At install time it is written next to the bootstrapper, extracted into the app
//! directory, and the archive file is deleted again.

use std::{
    fs::{self, File},
    io,
    path::{Component, Path, PathBuf},
};

use log::{debug, trace};
use zip::{ZipArchive, result::ZipError};

use crate::error::BootstrapError;

pub const EMBEDDED_PAYLOAD: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/CFGEditor.zip"));

/// Writes `bytes` to `archive`, replacing a stale archive left by an interrupted run.
pub fn write_archive(archive: &Path, bytes: &[u8]) -> Result<(), BootstrapError> {
    if bytes.is_empty() {
        return Err(BootstrapError::EmptyPayload);
    }
    fs::write(archive, bytes).map_err(|source| BootstrapError::PayloadWrite {
        path: archive.to_path_buf(),
        source,
    })?;
    debug!("Wrote {} bytes to {:?}", bytes.len(), archive);
    Ok(())
}

/// Extracts `archive` into `dest`, creating `dest` if needed.
///
/// Returns the number of files written. Entries that would land outside `dest`
/// (absolute paths, `..`, drive prefixes) fail the whole extraction.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize, BootstrapError> {
    extract_into(archive, dest).map_err(|source| BootstrapError::Extraction {
        archive: archive.to_path_buf(),
        source,
    })
}

fn extract_into(archive: &Path, dest: &Path) -> Result<usize, ZipError> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    fs::create_dir_all(dest)?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let rel = entry_path(entry.name())?;
        let out_path = dest.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        let bytes = io::copy(&mut entry, &mut out_file)?;
        drop(out_file);

        // Keep the executable bit so the entry can be spawned directly on POSIX desktops.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
        trace!("Extracted {:?} ({} bytes)", rel, bytes);
        written += 1;
    }
    Ok(written)
}

/// Validates an archive entry name and converts it to a relative path.
pub fn entry_path(name: &str) -> Result<PathBuf, ZipError> {
    let path = Path::new(name);
    let escapes = path.is_absolute()
        || name.starts_with('/')
        || name.starts_with('\\')
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir));
    // Zip entries written on Windows may use '\' even though the format says '/'.
    let backslash_escape = name.split('\\').any(|part| part == "..");
    if escapes || backslash_escape || name.is_empty() {
        return Err(ZipError::Io(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsafe entry path in payload: {name}"),
        )));
    }
    Ok(path.to_path_buf())
}

/// Deletes the transient archive. A missing archive is not an error.
pub fn remove_archive(archive: &Path) -> Result<(), BootstrapError> {
    match fs::remove_file(archive) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(BootstrapError::ArchiveCleanup {
            path: archive.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use zip::{ZipWriter, write::SimpleFileOptions};

    /// Builds an in-memory zip from `(name, contents)` pairs. Names ending in `/` become directories.
    pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(io::Cursor::new(Vec::new()));
        for (name, contents) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(contents.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap().into_inner()
    }

    /// Builds an in-memory zip holding one file with the given unix permission bits.
    pub(crate) fn zip_with_mode(name: &str, contents: &str, mode: u32) -> Vec<u8> {
        let mut zip = ZipWriter::new(io::Cursor::new(Vec::new()));
        zip.start_file(name, SimpleFileOptions::default().unix_permissions(mode))
            .unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn embedded_payload_is_a_zip_with_entry_executable() {
        let mut zip = ZipArchive::new(io::Cursor::new(EMBEDDED_PAYLOAD)).unwrap();
        assert!(zip.by_name("CFGEditorPlusPlus.exe").is_ok());
    }

    #[test]
    fn write_archive_rejects_empty_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("CFGEditor.zip");
        let err = write_archive(&archive, &[]).unwrap_err();
        assert!(matches!(err, BootstrapError::EmptyPayload));
        assert!(!archive.exists());
    }

    #[test]
    fn write_archive_overwrites_stale_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("CFGEditor.zip");
        fs::write(&archive, b"stale and longer than the new one").unwrap();
        write_archive(&archive, b"fresh").unwrap();
        assert_eq!(fs::read(&archive).unwrap(), b"fresh");
    }

    #[test]
    fn extract_archive_writes_nested_plugin_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("CFGEditor.zip");
        fs::write(
            &archive,
            zip_bytes(&[
                ("Qt6Core.dll", "core"),
                ("platforms/", ""),
                ("platforms/qwindows.dll", "qpa"),
                ("CFGEditorPlusPlus.exe", "MZ"),
            ]),
        )
        .unwrap();

        let dest = tmp.path().join("CFGEditor");
        let written = extract_archive(&archive, &dest).unwrap();

        assert_eq!(written, 3);
        assert_eq!(fs::read(dest.join("platforms/qwindows.dll")).unwrap(), b"qpa");
        assert_eq!(fs::read(dest.join("CFGEditorPlusPlus.exe")).unwrap(), b"MZ");
    }

    #[cfg(unix)]
    #[test]
    fn extract_archive_keeps_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("CFGEditor.zip");
        fs::write(&archive, zip_with_mode("CFGEditorPlusPlus.exe", "#!/bin/sh\nexit 0\n", 0o755)).unwrap();

        let dest = tmp.path().join("CFGEditor");
        extract_archive(&archive, &dest).unwrap();

        let mode = fs::metadata(dest.join("CFGEditorPlusPlus.exe")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn embedded_entry_executable_is_marked_executable() {
        let mut zip = ZipArchive::new(io::Cursor::new(EMBEDDED_PAYLOAD)).unwrap();
        let entry = zip.by_name("CFGEditorPlusPlus.exe").unwrap();
        assert_eq!(entry.unix_mode().map(|m| m & 0o111), Some(0o111));
    }

    #[test]
    fn extract_archive_rejects_corrupt_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("CFGEditor.zip");
        fs::write(&archive, b"PK\x03\x04 this is not a zip").unwrap();

        let err = extract_archive(&archive, &tmp.path().join("CFGEditor")).unwrap_err();
        assert!(matches!(err, BootstrapError::Extraction { .. }));
    }

    #[test]
    fn extract_archive_rejects_zip_slip() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("CFGEditor.zip");
        fs::write(&archive, zip_bytes(&[("../evil.exe", "x")])).unwrap();

        let dest = tmp.path().join("CFGEditor");
        let err = extract_archive(&archive, &dest).unwrap_err();
        assert!(matches!(err, BootstrapError::Extraction { .. }));
        assert!(!tmp.path().join("evil.exe").exists());
    }

    #[test]
    fn remove_archive_tolerates_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("CFGEditor.zip");
        remove_archive(&archive).unwrap();
        fs::write(&archive, b"x").unwrap();
        remove_archive(&archive).unwrap();
        assert!(!archive.exists());
    }

    #[test]
    fn entry_path_rejects_windows_style_traversal() {
        assert!(entry_path(r"..\evil.exe").is_err());
        assert!(entry_path(r"styles\..\..\evil.exe").is_err());
        assert!(entry_path("/etc/passwd").is_err());
        assert!(entry_path("").is_err());
    }

    proptest! {
        #[test]
        fn relative_entry_names_stay_relative(parts in prop::collection::vec("[A-Za-z0-9_]{1,8}(\\.dll)?", 1..5)) {
            let name = parts.join("/");
            let path = entry_path(&name).unwrap();
            prop_assert!(path.is_relative());
            prop_assert!(Path::new("/install/CFGEditor").join(&path).starts_with("/install/CFGEditor"));
        }

        #[test]
        fn parent_components_are_always_rejected(
            prefix in prop::collection::vec("[a-z]{1,6}", 0..3),
            suffix in prop::collection::vec("[a-z]{1,6}", 0..3),
        ) {
            let mut parts = prefix.clone();
            parts.push("..".to_string());
            parts.extend(suffix);
            prop_assert!(entry_path(&parts.join("/")).is_err());
        }
    }
}
