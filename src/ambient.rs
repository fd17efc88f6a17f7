//! File access through `cap-std` with ambient authority.
//!
//! Paths supplied on the command line are resolved by opening their parent
//! directory and reading the leaf name relative to it.

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};

fn open_parent(path: &Utf8Path) -> Result<(Dir, &Utf8Path), String> {
    let file_name = path
        .file_name()
        .ok_or_else(|| format!("path has no file name: {path}"))?;

    let dir_path = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };

    let dir =
        Dir::open_ambient_dir(dir_path, ambient_authority()).map_err(|err| err.to_string())?;
    Ok((dir, Utf8Path::new(file_name)))
}

/// Reads a whole file as bytes.
pub(crate) fn read_bytes(path: &Utf8Path) -> Result<Vec<u8>, String> {
    let (dir, file_name) = open_parent(path)?;
    dir.read(file_name).map_err(|err| err.to_string())
}

/// Reads a whole file as UTF-8 text.
pub(crate) fn read_to_string(path: &Utf8Path) -> Result<String, String> {
    let (dir, file_name) = open_parent(path)?;
    dir.read_to_string(file_name).map_err(|err| err.to_string())
}
