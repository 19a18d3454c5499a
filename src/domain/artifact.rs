//! Source files and the artifacts produced from them.
//!
//! A `SourceItem` is converted into exactly one `ConversionResult`; every
//! successful conversion is uploaded into exactly one `UploadResult`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A source audio file selected for conversion (identity = path)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceItem {
    path: PathBuf,
}

impl SourceItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full file name including extension (e.g. `Episode1.wav`)
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    /// File name without extension
    pub fn stem(&self) -> String {
        stem_of(&self.path)
    }

    /// Where the converted artifact for this source lands: `<dir>/<stem>.<ext>`
    pub fn output_path(&self, output_dir: &Path, extension: &str) -> PathBuf {
        output_dir.join(format!("{}.{}", self.stem(), extension))
    }
}

/// Outcome of converting a single source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ConversionOutcome {
    Success,
    Failed { reason: String },
}

/// Result of converting one source file. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub source: SourceItem,
    pub output_path: PathBuf,
    pub outcome: ConversionOutcome,
}

impl ConversionResult {
    pub fn success(source: SourceItem, output_path: PathBuf) -> Self {
        Self {
            source,
            output_path,
            outcome: ConversionOutcome::Success,
        }
    }

    pub fn failed(source: SourceItem, output_path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            source,
            output_path,
            outcome: ConversionOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    /// Rebuild a successful result for an artifact converted in an earlier run.
    ///
    /// The source is assumed to sit next to the artifact with `source_extension`.
    pub fn from_artifact(artifact: &Path, source_extension: &str) -> Self {
        let source = artifact.with_extension(source_extension);
        Self::success(SourceItem::new(source), artifact.to_path_buf())
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ConversionOutcome::Success)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            ConversionOutcome::Failed { reason } => Some(reason),
            ConversionOutcome::Success => None,
        }
    }
}

/// A file stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Stable identifier assigned by the storage service
    pub id: String,

    /// Public reference to the file
    pub link: String,
}

/// Outcome of uploading one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum UploadOutcome {
    Success { id: String, link: String },
    Failed { reason: String },
}

/// Result of uploading one converted artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Original source file name, used for matching against sheet rows
    pub source_name: String,

    /// Artifact file stem
    pub display_name: String,

    pub artifact_path: PathBuf,

    pub outcome: UploadOutcome,
}

impl UploadResult {
    pub fn new(conversion: &ConversionResult, outcome: UploadOutcome) -> Self {
        Self {
            source_name: conversion.source.file_name(),
            display_name: stem_of(&conversion.output_path),
            artifact_path: conversion.output_path.clone(),
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, UploadOutcome::Success { .. })
    }

    /// Public link, when the upload succeeded
    pub fn link(&self) -> Option<&str> {
        match &self.outcome {
            UploadOutcome::Success { link, .. } => Some(link),
            UploadOutcome::Failed { .. } => None,
        }
    }

    /// Label shown for the link: the artifact's file name (e.g. `a.mp3`)
    pub fn label(&self) -> String {
        file_name_of(&self.artifact_path)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_names() {
        let source = SourceItem::new("/music/Episode1.wav");

        assert_eq!(source.file_name(), "Episode1.wav");
        assert_eq!(source.stem(), "Episode1");
        assert_eq!(
            source.output_path(Path::new("/out"), "mp3"),
            PathBuf::from("/out/Episode1.mp3")
        );
    }

    #[test]
    fn test_dotted_stem_keeps_inner_dots() {
        let source = SourceItem::new("/music/show.2024.01.wav");
        assert_eq!(source.stem(), "show.2024.01");
        assert_eq!(
            source.output_path(Path::new("/out"), "mp3"),
            PathBuf::from("/out/show.2024.01.mp3")
        );
    }

    #[test]
    fn test_from_artifact_rebuilds_source_name() {
        let result = ConversionResult::from_artifact(Path::new("/out/a.mp3"), "wav");

        assert!(result.is_success());
        assert_eq!(result.source.file_name(), "a.wav");
        assert_eq!(result.output_path, PathBuf::from("/out/a.mp3"));
    }

    #[test]
    fn test_upload_result_names() {
        let conversion = ConversionResult::success(
            SourceItem::new("/music/b.wav"),
            PathBuf::from("/out/b.mp3"),
        );
        let upload = UploadResult::new(
            &conversion,
            UploadOutcome::Success {
                id: "file-1".to_string(),
                link: "https://example.com/b".to_string(),
            },
        );

        assert_eq!(upload.source_name, "b.wav");
        assert_eq!(upload.display_name, "b");
        assert_eq!(upload.label(), "b.mp3");
        assert_eq!(upload.link(), Some("https://example.com/b"));
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = ConversionOutcome::Failed {
            reason: "bad header".to_string(),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(json, r#"{"status":"failed","reason":"bad header"}"#);
    }
}
