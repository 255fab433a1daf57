//! Typed, versioned, quality-scored storage for workflow work products.

pub mod quality;
pub mod store;
pub mod types;

pub use quality::{QualityAssessment, QualityChecker, QualityCheckers};
pub use store::{ArtifactStore, VALIDATION_THRESHOLD};
pub use types::{
    ArtifactContent, ArtifactFilter, ArtifactMetadata, ArtifactStatus, ArtifactType,
    CleanupReport, ContentKind, QualityLevel, StoreStats, ValidationResults, WorkflowArtifact,
};
