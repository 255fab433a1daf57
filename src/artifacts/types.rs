use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of work product held in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Requirements,
    Plan,
    AgentSelection,
    Code,
    TestResults,
    QualityReport,
    ReviewReport,
    DeploymentConfig,
    MonitoringConfig,
    Documentation,
    CheckReport,
}

impl ArtifactType {
    pub fn all() -> &'static [ArtifactType] {
        &[
            ArtifactType::Requirements,
            ArtifactType::Plan,
            ArtifactType::AgentSelection,
            ArtifactType::Code,
            ArtifactType::TestResults,
            ArtifactType::QualityReport,
            ArtifactType::ReviewReport,
            ArtifactType::DeploymentConfig,
            ArtifactType::MonitoringConfig,
            ArtifactType::Documentation,
            ArtifactType::CheckReport,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactType::Requirements => "requirements",
            ArtifactType::Plan => "plan",
            ArtifactType::AgentSelection => "agent_selection",
            ArtifactType::Code => "code",
            ArtifactType::TestResults => "test_results",
            ArtifactType::QualityReport => "quality_report",
            ArtifactType::ReviewReport => "review_report",
            ArtifactType::DeploymentConfig => "deployment_config",
            ArtifactType::MonitoringConfig => "monitoring_config",
            ArtifactType::Documentation => "documentation",
            ArtifactType::CheckReport => "check_report",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ArtifactType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = ArtifactType::all().iter().map(|t| t.as_str()).collect();
                anyhow::anyhow!(
                    "Invalid artifact type '{}'. Valid values: {}",
                    s,
                    valid.join(", ")
                )
            })
    }
}

/// Lifecycle status. Transitions between statuses are not validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Draft,
    Validated,
    Approved,
    Deployed,
    Archived,
    Deprecated,
}

impl ArtifactStatus {
    pub fn all() -> &'static [ArtifactStatus] {
        &[
            ArtifactStatus::Draft,
            ArtifactStatus::Validated,
            ArtifactStatus::Approved,
            ArtifactStatus::Deployed,
            ArtifactStatus::Archived,
            ArtifactStatus::Deprecated,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactStatus::Draft => "draft",
            ArtifactStatus::Validated => "validated",
            ArtifactStatus::Approved => "approved",
            ArtifactStatus::Deployed => "deployed",
            ArtifactStatus::Archived => "archived",
            ArtifactStatus::Deprecated => "deprecated",
        }
    }

    /// Validated or further along the happy path.
    pub fn is_usable(self) -> bool {
        matches!(
            self,
            ArtifactStatus::Validated | ArtifactStatus::Approved | ArtifactStatus::Deployed
        )
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        ArtifactStatus::all()
            .iter()
            .copied()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid artifact status '{}'. Valid values: draft, validated, approved, deployed, archived, deprecated",
                    s
                )
            })
    }
}

/// Banded quality score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Excellent,
    Good,
    Acceptable,
    Poor,
    Failed,
}

impl QualityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityLevel::Excellent
        } else if score >= 80.0 {
            QualityLevel::Good
        } else if score >= 70.0 {
            QualityLevel::Acceptable
        } else if score >= 60.0 {
            QualityLevel::Poor
        } else {
            QualityLevel::Failed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityLevel::Excellent => "excellent",
            QualityLevel::Good => "good",
            QualityLevel::Acceptable => "acceptable",
            QualityLevel::Poor => "poor",
            QualityLevel::Failed => "failed",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the payload was serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Json,
    Binary,
}

impl ContentKind {
    pub fn extension(self) -> &'static str {
        match self {
            ContentKind::Text => "txt",
            ContentKind::Json => "json",
            ContentKind::Binary => "bin",
        }
    }
}

/// Artifact payload.
///
/// JSON keeps the text it was parsed from, so what is stored and checksummed
/// is exactly what was given.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    Text(String),
    Json { raw: String, value: serde_json::Value },
    Binary(Vec<u8>),
}

impl ArtifactContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            ArtifactContent::Text(_) => ContentKind::Text,
            ArtifactContent::Json { .. } => ContentKind::Json,
            ArtifactContent::Binary(_) => ContentKind::Binary,
        }
    }

    /// Treat `raw` as JSON when it parses as an object or array, otherwise as text.
    pub fn detect(raw: String) -> Self {
        let trimmed = raw.trim_start();
        if (trimmed.starts_with('{') || trimmed.starts_with('['))
            && let Ok(value) = serde_json::from_str(&raw)
        {
            return ArtifactContent::Json { raw, value };
        }
        ArtifactContent::Text(raw)
    }

    /// Like [`detect`](Self::detect), falling back to binary for non-UTF-8 input.
    pub fn detect_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::detect(text),
            Err(err) => ArtifactContent::Binary(err.into_bytes()),
        }
    }

    /// Bytes written to disk (before compression) and checksummed.
    pub fn to_bytes(&self) -> &[u8] {
        match self {
            ArtifactContent::Text(text) => text.as_bytes(),
            ArtifactContent::Json { raw, .. } => raw.as_bytes(),
            ArtifactContent::Binary(bytes) => bytes,
        }
    }

    pub fn from_bytes(kind: ContentKind, bytes: &[u8]) -> anyhow::Result<Self> {
        match kind {
            ContentKind::Text => Ok(ArtifactContent::Text(String::from_utf8(bytes.to_vec())?)),
            ContentKind::Json => {
                let raw = String::from_utf8(bytes.to_vec())?;
                let value = serde_json::from_str(&raw)?;
                Ok(ArtifactContent::Json { raw, value })
            }
            ContentKind::Binary => Ok(ArtifactContent::Binary(bytes.to_vec())),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ArtifactContent::Json { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Text view of the content. JSON is shown as stored; binary is decoded lossily.
    pub fn as_text(&self) -> String {
        match self {
            ArtifactContent::Text(text) => text.clone(),
            ArtifactContent::Json { raw, .. } => raw.clone(),
            ArtifactContent::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl From<serde_json::Value> for ArtifactContent {
    fn from(value: serde_json::Value) -> Self {
        let raw = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        ArtifactContent::Json { raw, value }
    }
}

impl From<String> for ArtifactContent {
    fn from(text: String) -> Self {
        ArtifactContent::Text(text)
    }
}

impl From<&str> for ArtifactContent {
    fn from(text: &str) -> Self {
        ArtifactContent::Text(text.to_string())
    }
}

/// Per-dimension quality scores, each in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResults {
    pub completeness: f64,
    pub accuracy: f64,
    pub consistency: f64,
    pub timeliness: f64,
}

/// Everything the index records about one artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub id: String,
    pub artifact_type: ArtifactType,
    pub name: String,
    pub version: u32,
    pub status: ArtifactStatus,
    pub quality_level: QualityLevel,
    pub quality_score: f64,
    /// SHA-256 hex of the uncompressed payload.
    pub checksum: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    pub validation: ValidationResults,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub size_bytes: u64,
    pub stored_bytes: u64,
    pub compressed: bool,
    pub content_kind: ContentKind,
    /// Payload path relative to the artifacts directory.
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata plus decoded content.
#[derive(Debug, Clone)]
pub struct WorkflowArtifact {
    pub metadata: ArtifactMetadata,
    pub content: ArtifactContent,
}

/// Selection criteria for `ArtifactStore::list`.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    pub artifact_type: Option<ArtifactType>,
    pub status: Option<ArtifactStatus>,
    pub name: Option<String>,
    pub tag: Option<String>,
}

impl ArtifactFilter {
    pub fn of_type(artifact_type: ArtifactType) -> Self {
        Self {
            artifact_type: Some(artifact_type),
            ..Default::default()
        }
    }

    pub fn matches(&self, meta: &ArtifactMetadata) -> bool {
        self.artifact_type.is_none_or(|t| meta.artifact_type == t)
            && self.status.is_none_or(|s| meta.status == s)
            && self.name.as_ref().is_none_or(|n| &meta.name == n)
            && self.tag.as_ref().is_none_or(|t| meta.tags.contains(t))
    }
}

/// Outcome of a cleanup pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub cutoff: Option<DateTime<Utc>>,
    /// Candidate artifact ids in id order.
    pub candidates: Vec<String>,
    pub removed: usize,
    pub bytes_freed: u64,
}

/// Aggregate numbers for `phasegate artifacts stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub stored_bytes: u64,
    pub original_bytes: u64,
    pub compressed: usize,
    pub average_score: f64,
}
