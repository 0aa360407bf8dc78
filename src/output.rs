//! Encoding results and writing them to disk.
//!
//! Everything is encoded in memory first.  `persist_all()` then writes
//! each file next to its destination under a temporary name and renames
//! them into place, so a failed invocation leaves nothing behind and
//! doesn't disturb files that were already there.

use std::{
    fs,
    io::{BufReader, Cursor, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use image::{DynamicImage, ImageFormat, Rgb32FImage, RgbImage};
use log::{info, warn};

use crate::{merge::RadianceMap, MergeError};

/// Radiance map container, chosen by the output file extension.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// Radiance RGBE.
    Hdr,
    /// OpenEXR, 32-bit float.
    Exr,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Result<OutputFormat, MergeError> {
        match extension(path).as_deref() {
            Some("hdr") => Ok(OutputFormat::Hdr),
            Some("exr") => Ok(OutputFormat::Exr),
            _ => Err(MergeError::UnsupportedFormat(format!(
                "'{}': radiance maps can be written as .hdr or .exr",
                path.display()
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PreviewFormat {
    Png,
    Jpeg,
}

impl PreviewFormat {
    pub fn from_path(path: &Path) -> Result<PreviewFormat, MergeError> {
        match extension(path).as_deref() {
            Some("png") => Ok(PreviewFormat::Png),
            Some("jpg") | Some("jpeg") => Ok(PreviewFormat::Jpeg),
            _ => Err(MergeError::UnsupportedFormat(format!(
                "'{}': previews can be written as .png, .jpg or .jpeg",
                path.display()
            ))),
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// A fully encoded file waiting to be written.
#[derive(Debug, Clone)]
pub struct EncodedFile {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

pub fn encode_radiance(map: &RadianceMap, path: &Path) -> Result<EncodedFile, MergeError> {
    let encode_err = |message: String| MergeError::WriteFailure {
        path: path.to_path_buf(),
        message: message,
    };

    let bytes = match OutputFormat::from_path(path)? {
        OutputFormat::Hdr => {
            let mut bytes = Vec::new();
            hdr::write_hdr(&mut bytes, &map.pixels, map.width, map.height)
                .map_err(|e| encode_err(e.to_string()))?;
            bytes
        }
        OutputFormat::Exr => {
            let raw: Vec<f32> = map.pixels.iter().flat_map(|p| p.iter().copied()).collect();
            let img = Rgb32FImage::from_raw(map.width as u32, map.height as u32, raw)
                .ok_or_else(|| encode_err("pixel count doesn't match dimensions".into()))?;
            let mut cursor = Cursor::new(Vec::new());
            DynamicImage::ImageRgb32F(img)
                .write_to(&mut cursor, ImageFormat::OpenExr)
                .map_err(|e| encode_err(e.to_string()))?;
            cursor.into_inner()
        }
    };

    Ok(EncodedFile {
        path: path.to_path_buf(),
        bytes: bytes,
    })
}

pub fn encode_preview(
    pixels: &[[u8; 3]],
    width: usize,
    height: usize,
    path: &Path,
) -> Result<EncodedFile, MergeError> {
    let encode_err = |message: String| MergeError::WriteFailure {
        path: path.to_path_buf(),
        message: message,
    };

    let format = match PreviewFormat::from_path(path)? {
        PreviewFormat::Png => ImageFormat::Png,
        PreviewFormat::Jpeg => ImageFormat::Jpeg,
    };
    let raw: Vec<u8> = pixels.iter().flat_map(|p| p.iter().copied()).collect();
    let img = RgbImage::from_raw(width as u32, height as u32, raw)
        .ok_or_else(|| encode_err("pixel count doesn't match dimensions".into()))?;
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut cursor, format)
        .map_err(|e| encode_err(e.to_string()))?;

    Ok(EncodedFile {
        path: path.to_path_buf(),
        bytes: cursor.into_inner(),
    })
}

/// Numbers sibling paths so that no two calls in this process collide.
static SIBLING_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A hidden, unique sibling of `path`, e.g. `.out.hdr.1234.0.partial`.
fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = SIBLING_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.{}", name, std::process::id(), n, suffix))
}

fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// How far `write_and_rename()` got.
#[derive(Default)]
struct Progress {
    written: usize,
    renamed: usize,
    /// Where each pre-existing destination was moved aside to, in file
    /// order.  One entry per file whose rename was attempted.
    backups: Vec<Option<PathBuf>>,
}

/// Writes all of `files`, or none of them.
///
/// Every file is written under a temporary name first.  Destinations that
/// already exist are moved aside before being replaced, and are put back
/// if anything fails, so a failed call leaves the directory as it found
/// it.
pub fn persist_all(files: &[EncodedFile]) -> Result<(), MergeError> {
    let temps: Vec<PathBuf> = files.iter().map(|f| sibling_path(&f.path, "partial")).collect();
    let mut progress = Progress::default();

    let result = write_and_rename(files, &temps, &mut progress);
    match result {
        Ok(()) => {
            for backup in progress.backups.iter().flatten() {
                if let Err(e) = fs::remove_file(backup) {
                    warn!("Couldn't remove '{}': {}", backup.display(), e);
                }
            }
        }
        Err(_) => roll_back(files, &temps, &progress),
    }

    result
}

fn roll_back(files: &[EncodedFile], temps: &[PathBuf], progress: &Progress) {
    // Outputs already moved into place.
    for file in files[..progress.renamed].iter() {
        if let Err(e) = fs::remove_file(&file.path) {
            warn!("Couldn't remove '{}': {}", file.path.display(), e);
        }
    }
    for (file, backup) in files.iter().zip(progress.backups.iter()) {
        if let Some(backup) = backup {
            if let Err(e) = fs::rename(backup, &file.path) {
                warn!(
                    "Couldn't restore '{}' from '{}': {}",
                    file.path.display(),
                    backup.display(),
                    e
                );
            }
        }
    }
    // The temp that failed mid-write may exist too.
    let partial_end = (progress.written + 1).min(temps.len());
    for temp in temps[progress.renamed..partial_end].iter() {
        let _ = fs::remove_file(temp);
    }
}

fn write_and_rename(
    files: &[EncodedFile],
    temps: &[PathBuf],
    progress: &mut Progress,
) -> Result<(), MergeError> {
    let write_err = |file: &EncodedFile, e: std::io::Error| MergeError::WriteFailure {
        path: file.path.clone(),
        message: e.to_string(),
    };

    for (file, temp) in files.iter().zip(temps.iter()) {
        write_file(temp, &file.bytes).map_err(|e| write_err(file, e))?;
        progress.written += 1;
    }
    for (file, temp) in files.iter().zip(temps.iter()) {
        if file.path.is_file() {
            let backup = sibling_path(&file.path, "backup");
            fs::rename(&file.path, &backup).map_err(|e| write_err(file, e))?;
            progress.backups.push(Some(backup));
        } else {
            progress.backups.push(None);
        }
        fs::rename(temp, &file.path).map_err(|e| write_err(file, e))?;
        progress.renamed += 1;
        info!("Wrote '{}'", file.path.display());
    }
    Ok(())
}

/// Reads back a radiance map written by `encode_radiance()`.
pub fn read_radiance(path: &Path) -> Result<RadianceMap, MergeError> {
    let read_err = |message: String| MergeError::UnsupportedFormat(format!(
        "'{}': {}",
        path.display(),
        message
    ));

    match OutputFormat::from_path(path)? {
        OutputFormat::Hdr => {
            let file = fs::File::open(path).map_err(|e| read_err(e.to_string()))?;
            let img = hdr::read_hdr(&mut BufReader::new(file))
                .map_err(|e| read_err(e.to_string()))?;
            Ok(RadianceMap {
                width: img.width,
                height: img.height,
                pixels: img.pixels,
            })
        }
        OutputFormat::Exr => {
            let bytes = fs::read(path).map_err(|e| read_err(e.to_string()))?;
            let img = image::load_from_memory_with_format(&bytes, ImageFormat::OpenExr)
                .map_err(|e| read_err(e.to_string()))?
                .to_rgb32f();
            let (width, height) = (img.width() as usize, img.height() as usize);
            Ok(RadianceMap {
                width: width,
                height: height,
                pixels: img.pixels().map(|p| p.0).collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> RadianceMap {
        let (width, height) = (16, 4);
        let pixels = (0..width * height)
            .map(|i| {
                let v = 0.01 * 1.2f32.powi(i as i32);
                [v, v * 0.5, v * 2.0]
            })
            .collect();
        RadianceMap {
            width: width,
            height: height,
            pixels: pixels,
        }
    }

    #[test]
    fn formats_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("a.HDR")).unwrap(), OutputFormat::Hdr);
        assert_eq!(OutputFormat::from_path(Path::new("a.exr")).unwrap(), OutputFormat::Exr);
        assert!(matches!(
            OutputFormat::from_path(Path::new("a.tiff")),
            Err(MergeError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            OutputFormat::from_path(Path::new("noext")),
            Err(MergeError::UnsupportedFormat(_))
        ));
        assert_eq!(PreviewFormat::from_path(Path::new("p.jpeg")).unwrap(), PreviewFormat::Jpeg);
        assert!(matches!(
            PreviewFormat::from_path(Path::new("p.hdr")),
            Err(MergeError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn exr_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.exr");
        let original = map();
        persist_all(&[encode_radiance(&original, &path).unwrap()]).unwrap();

        let read = read_radiance(&path).unwrap();
        assert_eq!((read.width, read.height), (original.width, original.height));
        for (a, b) in read.pixels.iter().zip(original.pixels.iter()) {
            for c in 0..3 {
                assert!((a[c] - b[c]).abs() <= b[c] * 1e-6, "{} vs {}", a[c], b[c]);
            }
        }
    }

    #[test]
    fn hdr_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.hdr");
        let original = map();
        persist_all(&[encode_radiance(&original, &path).unwrap()]).unwrap();

        let read = read_radiance(&path).unwrap();
        assert_eq!(read.pixels.len(), original.pixels.len());
        for (a, b) in read.pixels.iter().zip(original.pixels.iter()) {
            // RGBE keeps about 8 bits of mantissa relative to the largest
            // component.
            let max = b[0].max(b[1]).max(b[2]);
            for c in 0..3 {
                assert!((a[c] - b[c]).abs() <= max / 128.0);
            }
        }
    }

    #[test]
    fn preview_encodes() {
        let dir = tempfile::tempdir().unwrap();
        let pixels = vec![[200u8, 100, 50]; 6];
        for name in ["p.png", "p.jpg"] {
            let path = dir.path().join(name);
            persist_all(&[encode_preview(&pixels, 3, 2, &path).unwrap()]).unwrap();
            let img = image::open(&path).unwrap();
            assert_eq!((img.width(), img.height()), (3, 2));
        }
    }

    #[test]
    fn failed_persist_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.hdr");
        let bad = dir.path().join("missing_dir").join("bad.png");
        let files = vec![
            encode_radiance(&map(), &good).unwrap(),
            EncodedFile {
                path: bad.clone(),
                bytes: vec![1, 2, 3],
            },
        ];

        assert!(matches!(
            persist_all(&files),
            Err(MergeError::WriteFailure { .. })
        ));
        assert!(!good.exists());
        assert!(!bad.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_persist_restores_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.hdr");
        fs::write(&good, b"old").unwrap();
        // Renaming a file over a non-empty directory fails, after `good`
        // has already been moved into place.
        let blocked = dir.path().join("blocked.png");
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), b"x").unwrap();
        let files = vec![
            encode_radiance(&map(), &good).unwrap(),
            EncodedFile {
                path: blocked.clone(),
                bytes: vec![1, 2, 3],
            },
        ];

        assert!(matches!(
            persist_all(&files),
            Err(MergeError::WriteFailure { .. })
        ));
        assert_eq!(fs::read(&good).unwrap(), b"old");
        assert!(blocked.is_dir());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn sibling_paths_are_unique() {
        let target = Path::new("/tmp/out/merged.hdr");
        let a = sibling_path(target, "partial");
        let b = sibling_path(target, "partial");
        assert_ne!(a, b);
        assert_eq!(a.parent(), target.parent());
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".merged.hdr."));
        assert!(name.ends_with(".partial"));
    }

    #[test]
    fn overwrites_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.hdr");
        fs::write(&path, b"old").unwrap();
        persist_all(&[encode_radiance(&map(), &path).unwrap()]).unwrap();
        assert!(fs::read(&path).unwrap().starts_with(b"#?RADIANCE"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
