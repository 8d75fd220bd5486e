//! Destinations for optimized images
//!
//! `DirectorySink` writes content-addressed files (`<hash12>_<stem>.jpg`) and a
//! `manifest.json` batch report. `MemorySink` keeps everything in memory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use crate::error::Result;
use crate::pipeline::{BatchEntry, OptimizedImage};

pub trait ResultSink {
    /// Store one image, returning where it went
    fn persist(&mut self, name: &str, image: &OptimizedImage) -> Result<String>;
}

/// SHA-256 of the given bytes as lowercase hex
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// `<first 12 hex chars of hash>_<file stem>.jpg`
pub fn output_filename(name: &str, bytes: &[u8]) -> String {
    let hash = hash_bytes(bytes);
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    let safe_stem = stem.replace(['/', '\\', ':', ' '], "_");
    format!("{}_{}.jpg", &hash[..12], safe_stem)
}

// ============================================================================
// DIRECTORY
// ============================================================================

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    generated_at: String,
    processed: usize,
    failed: usize,
    items: &'a [BatchEntry],
}

#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn write_manifest(&self, entries: &[BatchEntry]) -> Result<PathBuf> {
        fs::create_dir_all(&self.root)?;
        let failed = entries.iter().filter(|e| !e.is_ok()).count();
        let manifest = Manifest {
            generated_at: chrono::Utc::now().to_rfc3339(),
            processed: entries.len() - failed,
            failed,
            items: entries,
        };

        let path = self.root.join("manifest.json");
        let content = serde_json::to_string_pretty(&manifest)?;
        fs::write(&path, content)?;
        log::info!("Wrote manifest for {} items to {}", entries.len(), path.display());
        Ok(path)
    }
}

impl ResultSink for DirectorySink {
    fn persist(&mut self, name: &str, image: &OptimizedImage) -> Result<String> {
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(output_filename(name, &image.bytes));
        fs::write(&path, &image.bytes)?;
        log::debug!("Saved {} ({:.1} KB) to {}", name, image.size_kb, path.display());
        Ok(path.display().to_string())
    }
}

// ============================================================================
// MEMORY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    images: BTreeMap<String, OptimizedImage>,
}

impl MemorySink {
    pub fn get(&self, name: &str) -> Option<&OptimizedImage> {
        self.images.get(name)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl ResultSink for MemorySink {
    fn persist(&mut self, name: &str, image: &OptimizedImage) -> Result<String> {
        self.images.insert(name.to_string(), image.clone());
        Ok(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::orientation::OrientationTag;

    fn image(bytes: &[u8]) -> OptimizedImage {
        OptimizedImage {
            bytes: bytes.to_vec(),
            size_kb: bytes.len() as f64 / 1024.0,
            quality: 85,
            target_met: true,
            width: 10,
            height: 20,
            segmented: true,
            orientation: OrientationTag::Normal,
            attempts: Vec::new(),
        }
    }

    #[test]
    fn test_hash_bytes() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename("photos/blue shirt.png", b"abc"), "ba7816bf8f01_blue_shirt.jpg");
        assert_eq!(output_filename("", b"abc"), "ba7816bf8f01_image.jpg");
    }

    #[test]
    fn test_directory_sink_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("out"));

        let location = sink.persist("jacket.heic", &image(b"abc")).unwrap();
        let path = PathBuf::from(&location);
        assert_eq!(path.file_name().unwrap(), "ba7816bf8f01_jacket.jpg");
        assert_eq!(fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_manifest_counts() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path());
        let entries = vec![
            BatchEntry { name: "a.png".into(), location: Some("x".into()), image: Some(image(b"")), error: None },
            BatchEntry {
                name: "b.png".into(),
                location: None,
                image: None,
                error: Some(PipelineError::Decode("bad header".into())),
            },
        ];

        let path = sink.write_manifest(&entries).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(json["processed"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["items"][0]["image"]["quality"], 85);
        assert_eq!(json["items"][1]["error"], "Decode error: bad header");
        assert!(json["generated_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemorySink::default();
        assert!(sink.is_empty());
        assert_eq!(sink.persist("a", &image(b"12")).unwrap(), "a");
        assert_eq!(sink.get("a").unwrap().bytes, b"12");
        assert_eq!(sink.len(), 1);
    }
}
