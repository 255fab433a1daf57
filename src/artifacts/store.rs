//! File-backed artifact store.
//!
//! Layout under the artifacts directory:
//! - `index.json` - artifact id → `ArtifactMetadata`
//! - `<type>/<id>.<ext>[.gz]` - payloads, gzip-compressed above the threshold
//! - `.index.lock` - held for every read-modify-write of the index

use super::quality::QualityCheckers;
use super::types::{
    ArtifactContent, ArtifactFilter, ArtifactMetadata, ArtifactStatus, ArtifactType,
    CleanupReport, StoreStats, WorkflowArtifact,
};
use crate::errors::ArtifactError;
use crate::hooks::{Checkpoint, PhaseCheckSet};
use crate::storage::{FileLock, write_atomic};
use chrono::{DateTime, Duration, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

const INDEX_FILE: &str = "index.json";
const LOCK_FILE: &str = ".index.lock";

/// Score at or above which `validate` promotes a draft.
pub const VALIDATION_THRESHOLD: f64 = 70.0;

type Index = BTreeMap<String, ArtifactMetadata>;

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub struct ArtifactStore {
    root: PathBuf,
    compression_threshold: usize,
    checkers: QualityCheckers,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, compression_threshold: usize) -> Self {
        Self {
            root: root.into(),
            compression_threshold,
            checkers: QualityCheckers::default(),
        }
    }

    pub fn with_checkers(mut self, checkers: QualityCheckers) -> Self {
        self.checkers = checkers;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> Result<FileLock, ArtifactError> {
        Ok(FileLock::exclusive(self.root.join(LOCK_FILE))?)
    }

    fn load_index(&self) -> Result<Index, ArtifactError> {
        let path = self.root.join(INDEX_FILE);
        if !path.exists() {
            return Ok(Index::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Index::new());
        }
        serde_json::from_str(&content).map_err(|source| ArtifactError::IndexCorruption { path, source })
    }

    fn save_index(&self, index: &Index) -> Result<(), ArtifactError> {
        let json = serde_json::to_string_pretty(index).map_err(anyhow::Error::from)?;
        write_atomic(&self.root.join(INDEX_FILE), json.as_bytes())?;
        Ok(())
    }

    /// Store a new artifact as a draft and return its id.
    pub fn store(
        &self,
        artifact_type: ArtifactType,
        name: &str,
        content: impl Into<ArtifactContent>,
        tags: Vec<String>,
        dependencies: Vec<String>,
    ) -> Result<String, ArtifactError> {
        self.store_at(artifact_type, name, content.into(), tags, dependencies, Utc::now())
    }

    pub(crate) fn store_at(
        &self,
        artifact_type: ArtifactType,
        name: &str,
        content: ArtifactContent,
        tags: Vec<String>,
        dependencies: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<String, ArtifactError> {
        let bytes = content.to_bytes();
        let checksum = sha256_hex(bytes);
        let compressed = bytes.len() > self.compression_threshold;
        let stored = if compressed { gzip(bytes)? } else { bytes.to_vec() };

        let assessment = self.checkers.assess(artifact_type, &content, now, now);

        let _lock = self.lock()?;
        let mut index = self.load_index()?;

        let version = index
            .values()
            .filter(|m| m.artifact_type == artifact_type && m.name == name)
            .map(|m| m.version)
            .max()
            .unwrap_or(0)
            + 1;

        let simple = Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", artifact_type, &simple[..12]);
        let mut relative = format!("{}/{}.{}", artifact_type, id, content.kind().extension());
        if compressed {
            relative.push_str(".gz");
        }
        write_atomic(&self.root.join(&relative), &stored)?;

        let metadata = ArtifactMetadata {
            id: id.clone(),
            artifact_type,
            name: name.to_string(),
            version,
            status: ArtifactStatus::Draft,
            quality_level: assessment.level,
            quality_score: assessment.overall,
            checksum,
            tags,
            dependencies,
            validation: assessment.validation,
            issues: assessment.issues,
            recommendations: assessment.recommendations,
            size_bytes: bytes.len() as u64,
            stored_bytes: stored.len() as u64,
            compressed,
            content_kind: content.kind(),
            path: relative,
            created_at: now,
            updated_at: now,
        };
        index.insert(id.clone(), metadata);
        self.save_index(&index)?;

        info!(
            id = %id,
            artifact_type = %artifact_type,
            version,
            score = assessment.overall,
            compressed,
            "Stored artifact"
        );
        Ok(id)
    }

    pub fn metadata(&self, id: &str) -> Result<ArtifactMetadata, ArtifactError> {
        let _lock = self.lock()?;
        self.load_index()?
            .remove(id)
            .ok_or_else(|| ArtifactError::NotFound { id: id.to_string() })
    }

    /// Load and decode an artifact. A checksum mismatch is logged, not fatal.
    pub fn retrieve(&self, id: &str) -> Result<WorkflowArtifact, ArtifactError> {
        let metadata = self.metadata(id)?;
        let content = self.read_content(&metadata)?;
        Ok(WorkflowArtifact { metadata, content })
    }

    fn read_content(&self, metadata: &ArtifactMetadata) -> Result<ArtifactContent, ArtifactError> {
        let path = self.root.join(&metadata.path);
        if !path.exists() {
            return Err(ArtifactError::PayloadMissing {
                id: metadata.id.clone(),
                path,
            });
        }
        let stored = std::fs::read(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        let bytes = if metadata.compressed {
            gunzip(&stored).map_err(|e| ArtifactError::Decode {
                id: metadata.id.clone(),
                message: e.to_string(),
            })?
        } else {
            stored
        };

        let actual = sha256_hex(&bytes);
        if actual != metadata.checksum {
            warn!(
                id = %metadata.id,
                expected = %metadata.checksum,
                actual = %actual,
                "Artifact checksum mismatch"
            );
        }

        ArtifactContent::from_bytes(metadata.content_kind, &bytes).map_err(|e| {
            ArtifactError::Decode {
                id: metadata.id.clone(),
                message: e.to_string(),
            }
        })
    }

    /// Re-score an artifact and promote a draft to validated when the score reaches 70.
    pub fn validate(&self, id: &str) -> Result<ArtifactMetadata, ArtifactError> {
        let _lock = self.lock()?;
        let mut index = self.load_index()?;
        let metadata = index
            .get_mut(id)
            .ok_or_else(|| ArtifactError::NotFound { id: id.to_string() })?;
        let content = self.read_content(metadata)?;

        let now = Utc::now();
        let assessment = self
            .checkers
            .assess(metadata.artifact_type, &content, metadata.created_at, now);
        metadata.quality_score = assessment.overall;
        metadata.quality_level = assessment.level;
        metadata.validation = assessment.validation;
        metadata.issues = assessment.issues;
        metadata.recommendations = assessment.recommendations;
        metadata.updated_at = now;
        if metadata.status == ArtifactStatus::Draft && assessment.overall >= VALIDATION_THRESHOLD {
            metadata.status = ArtifactStatus::Validated;
        }

        let updated = metadata.clone();
        self.save_index(&index)?;
        info!(
            id,
            score = updated.quality_score,
            status = %updated.status,
            "Validated artifact"
        );
        Ok(updated)
    }

    /// Set the lifecycle status. Any status may follow any other.
    pub fn update_status(
        &self,
        id: &str,
        status: ArtifactStatus,
    ) -> Result<ArtifactMetadata, ArtifactError> {
        let _lock = self.lock()?;
        let mut index = self.load_index()?;
        let metadata = index
            .get_mut(id)
            .ok_or_else(|| ArtifactError::NotFound { id: id.to_string() })?;
        let previous = metadata.status;
        metadata.status = status;
        metadata.updated_at = Utc::now();
        let updated = metadata.clone();
        self.save_index(&index)?;
        info!(id, from = %previous, to = %status, "Updated artifact status");
        Ok(updated)
    }

    /// Remove artifacts older than `retention_days` unless deployed.
    pub fn cleanup(&self, retention_days: u32, dry_run: bool) -> Result<CleanupReport, ArtifactError> {
        self.cleanup_at(retention_days, dry_run, Utc::now())
    }

    pub(crate) fn cleanup_at(
        &self,
        retention_days: u32,
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<CleanupReport, ArtifactError> {
        let _lock = self.lock()?;
        let mut index = self.load_index()?;
        let cutoff = now - Duration::days(i64::from(retention_days));

        let candidates: Vec<String> = index
            .values()
            .filter(|m| m.created_at < cutoff && m.status != ArtifactStatus::Deployed)
            .map(|m| m.id.clone())
            .collect();

        let mut report = CleanupReport {
            dry_run,
            cutoff: Some(cutoff),
            candidates: candidates.clone(),
            removed: 0,
            bytes_freed: 0,
        };

        if dry_run {
            report.bytes_freed = candidates
                .iter()
                .filter_map(|id| index.get(id))
                .map(|m| m.stored_bytes)
                .sum();
            debug!(count = candidates.len(), "Cleanup dry run");
            return Ok(report);
        }

        for id in &candidates {
            let Some(metadata) = index.remove(id) else {
                continue;
            };
            let path = self.root.join(&metadata.path);
            match std::fs::metadata(&path) {
                Ok(meta) => {
                    std::fs::remove_file(&path).map_err(|source| ArtifactError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    report.bytes_freed += meta.len();
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(id = %id, "Payload already gone");
                }
                Err(source) => return Err(ArtifactError::Io { path, source }),
            }
            report.removed += 1;
        }
        self.save_index(&index)?;

        info!(
            removed = report.removed,
            bytes_freed = report.bytes_freed,
            "Artifact cleanup complete"
        );
        Ok(report)
    }

    /// Artifacts a checkpoint's checks read under the default checkpoint map:
    /// the newest validated, approved or deployed artifact of each type its phase uses.
    pub fn get_artifacts_for_hook(&self, hook_name: &str) -> Result<Vec<ArtifactMetadata>, ArtifactError> {
        let Ok(checkpoint) = hook_name.parse::<Checkpoint>() else {
            return Ok(Vec::new());
        };
        let types = PhaseCheckSet::for_phase(checkpoint.default_phase()).artifact_type_list();
        self.latest_usable_of(&types)
    }

    /// Newest usable artifact of each type, in the order of `types`.
    pub fn latest_usable_of(&self, types: &[ArtifactType]) -> Result<Vec<ArtifactMetadata>, ArtifactError> {
        let mut found = Vec::new();
        for artifact_type in types {
            if let Some(meta) = self.latest(*artifact_type, true)? {
                found.push(meta);
            }
        }
        Ok(found)
    }

    /// Matching artifacts, oldest first.
    pub fn list(&self, filter: &ArtifactFilter) -> Result<Vec<ArtifactMetadata>, ArtifactError> {
        let _lock = self.lock()?;
        let mut items: Vec<ArtifactMetadata> = self
            .load_index()?
            .into_values()
            .filter(|m| filter.matches(m))
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Newest artifact of a type, optionally restricted to validated/approved/deployed ones.
    pub fn latest(
        &self,
        artifact_type: ArtifactType,
        usable_only: bool,
    ) -> Result<Option<ArtifactMetadata>, ArtifactError> {
        Ok(self
            .list(&ArtifactFilter::of_type(artifact_type))?
            .into_iter()
            .filter(|m| !usable_only || m.status.is_usable())
            .max_by(|a, b| {
                a.version
                    .cmp(&b.version)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            }))
    }

    pub fn stats(&self) -> Result<StoreStats, ArtifactError> {
        let items = self.list(&ArtifactFilter::default())?;
        let mut stats = StoreStats {
            total: items.len(),
            ..Default::default()
        };
        for m in &items {
            *stats.by_status.entry(m.status.to_string()).or_default() += 1;
            *stats.by_type.entry(m.artifact_type.to_string()).or_default() += 1;
            stats.original_bytes += m.size_bytes;
            if m.compressed {
                stats.compressed += 1;
            }
        }
        if !items.is_empty() {
            let sum: f64 = items.iter().map(|m| m.quality_score).sum();
            stats.average_score = (sum / items.len() as f64 * 100.0).round() / 100.0;
        }
        stats.stored_bytes = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.file_name() != LOCK_FILE)
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();
        Ok(stats)
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, ArtifactError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(anyhow::Error::from)?;
    Ok(encoder.finish().map_err(anyhow::Error::from)?)
}

fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
