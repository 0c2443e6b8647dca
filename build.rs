//! # Build Script
//!
//! Runs before compilation and does two things:
//!
//! 1. Packages the CFGEditor payload archive into `OUT_DIR/CFGEditor.zip`, which
//!    `src/payload.rs` links into the binary with `include_bytes!`.
//! 2. Embeds the Windows Application Manifest (`app.manifest`, through `bootstrap.rc`)
//!    so the bootstrapper runs `asInvoker` and never triggers a UAC prompt.
//!
//! The payload is collected from a staging directory (`CFGEDITOR_BUILD_DIR`, default `build/`)
//! laid out the way the CFGEditor release build leaves it:
//!
//! ```text
//! build/CFGEditorPlusPlus.exe
//! build/Qt6*.dll
//! build/imageformats/*.dll
//! build/platforms/*.dll
//! build/styles/*.dll
//! ```

use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use walkdir::WalkDir;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

const ENTRY_EXECUTABLE: &str = "CFGEditorPlusPlus.exe";
const PAYLOAD_FILE_NAME: &str = "CFGEditor.zip";
const PLUGIN_DIRS: [&str; 3] = ["imageformats", "platforms", "styles"];

fn main() {
    println!("cargo:rerun-if-env-changed=CFGEDITOR_BUILD_DIR");
    println!("cargo:rerun-if-changed=app.manifest");
    println!("cargo:rerun-if-changed=bootstrap.rc");

    let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR not set"));

    let staging = std::env::var_os("CFGEDITOR_BUILD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| manifest_dir.join("build"));
    println!("cargo:rerun-if-changed={}", staging.display());

    let out_path = out_dir.join(PAYLOAD_FILE_NAME);
    let result = if staging.join(ENTRY_EXECUTABLE).is_file() {
        write_payload_zip(&staging, &out_path)
    } else {
        println!(
            "cargo:warning=no {} in {}; embedding a placeholder payload",
            ENTRY_EXECUTABLE,
            staging.display()
        );
        write_placeholder_zip(&out_path)
    };
    if let Err(err) = result {
        panic!("failed to build payload zip: {err}");
    }

    // The app still builds without the manifest, so a failure here is not fatal.
    let _ = embed_resource::compile("bootstrap.rc", embed_resource::NONE);
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// The entry executable keeps its executable bit when extracted on POSIX.
fn entry_options() -> SimpleFileOptions {
    options().unix_permissions(0o755)
}

/// Collects the executable, the Qt core DLLs and the Qt plugin DLLs.
fn payload_files(staging: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(staging)? {
        let path = entry?.path();
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if path.is_file() && name.starts_with("Qt6") && has_dll_extension(&path) {
            files.push(path);
        }
    }

    for dir in PLUGIN_DIRS {
        let plugin_dir = staging.join(dir);
        if !plugin_dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&plugin_dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && has_dll_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files.push(staging.join(ENTRY_EXECUTABLE));
    Ok(files)
}

fn has_dll_extension(path: &Path) -> bool {
    path.extension().map(|e| e.eq_ignore_ascii_case("dll")).unwrap_or(false)
}

fn write_payload_zip(staging: &Path, out_path: &Path) -> io::Result<()> {
    let mut zip = ZipWriter::new(File::create(out_path)?);
    for path in payload_files(staging)? {
        let rel = path.strip_prefix(staging).unwrap_or(&path);
        let name = rel.to_string_lossy().replace('\\', "/");
        let opts = if rel == Path::new(ENTRY_EXECUTABLE) { entry_options() } else { options() };
        zip.start_file(name, opts)?;
        zip.write_all(&std::fs::read(&path)?)?;
    }
    zip.finish()?;
    Ok(())
}

fn write_placeholder_zip(out_path: &Path) -> io::Result<()> {
    let mut zip = ZipWriter::new(File::create(out_path)?);
    // A shell script so a development build can run the whole install-and-launch path on POSIX.
    zip.start_file(ENTRY_EXECUTABLE, entry_options())?;
    zip.write_all(b"#!/bin/sh\necho 'placeholder: set CFGEDITOR_BUILD_DIR to a CFGEditor release build'\n")?;
    zip.finish()?;
    Ok(())
}
