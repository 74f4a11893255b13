use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::{RemBgError, Result};

/// Extensions picked up in batch mode, matched after lowercasing.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

const OUTPUT_SUFFIX: &str = "_no_bg";

pub fn is_supported_image_format(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// `<parent>/<stem>_no_bg.png`, whatever the input extension is.
pub fn default_output_path(input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| RemBgError::Configuration {
            message: format!("cannot derive an output name from {}", input.display()),
        })?;

    let mut file_name = stem.to_os_string();
    file_name.push(OUTPUT_SUFFIX);
    file_name.push(".png");

    Ok(input
        .parent()
        .unwrap_or(Path::new(""))
        .join(file_name))
}

/// Output file for `input` inside a batch output directory.
pub fn batch_output_path(input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let file_name = default_output_path(input)?
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| RemBgError::Configuration {
            message: format!("cannot derive an output name from {}", input.display()),
        })?;
    Ok(output_dir.join(file_name))
}

/// Batch input must be an existing directory.
pub fn ensure_input_dir(input_dir: &Path) -> Result<()> {
    if input_dir.is_dir() {
        Ok(())
    } else {
        Err(RemBgError::InputDirectoryMissing {
            path: input_dir.to_path_buf(),
        })
    }
}

/// `<parent>/<name>_no_bg` next to the input directory.
///
/// Directories without a final component (`.`, `..`) are canonicalized first.
pub fn default_output_dir(input_dir: &Path) -> Result<PathBuf> {
    let resolved;
    let input_dir = if input_dir.file_name().is_some() {
        input_dir
    } else {
        resolved = input_dir
            .canonicalize()
            .map_err(|e| RemBgError::FileSystem {
                path: input_dir.to_path_buf(),
                operation: "canonicalize input directory".to_string(),
                source: e,
            })?;
        resolved.as_path()
    };

    let name = input_dir
        .file_name()
        .ok_or_else(|| RemBgError::Configuration {
            message: format!(
                "cannot derive an output directory from {}",
                input_dir.display()
            ),
        })?;

    let mut dir_name = name.to_os_string();
    dir_name.push(OUTPUT_SUFFIX);

    Ok(input_dir
        .parent()
        .unwrap_or(Path::new(""))
        .join(dir_name))
}

/// Supported images directly inside `input_dir`.
///
/// Symlinks are listed by name and only resolved when read, so a dangling
/// link becomes a failure of that one file. Each file appears once even if
/// several entries resolve to it, and the result is sorted by file name.
pub fn collect_image_files(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut image_files = Vec::new();

    let walker = WalkDir::new(input_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // the directory itself could not be listed
            Err(e) if e.depth() == 0 => {
                return Err(RemBgError::FileSystem {
                    path: input_dir.to_path_buf(),
                    operation: "directory listing".to_string(),
                    source: e.into(),
                });
            }
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", input_dir.display(), e);
                continue;
            }
        };

        let path = entry.path();
        let file_type = entry.file_type();
        let is_candidate = file_type.is_file() || (file_type.is_symlink() && !path.is_dir());
        if !is_candidate || !is_supported_image_format(path) {
            continue;
        }

        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if seen.insert(key) {
            image_files.push(entry.into_path());
        } else {
            debug!("Skipping duplicate entry {}", path.display());
        }
    }

    Ok(image_files)
}
