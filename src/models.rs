//! Row types for documents, chunks, derived relationships, and users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The two kinds of regulatory document this pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentType {
    Norm,
    Guideline,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Norm => "NORM",
            DocumentType::Guideline => "GUIDELINE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NORM" => Some(DocumentType::Norm),
            "GUIDELINE" => Some(DocumentType::Guideline),
            _ => None,
        }
    }
}

/// Lifecycle state of a document as it moves through the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Uploading,
    Extracting,
    Analyzing,
    Embedding,
    Ready,
    Error,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "UPLOADING",
            DocumentStatus::Extracting => "EXTRACTING",
            DocumentStatus::Analyzing => "ANALYZING",
            DocumentStatus::Embedding => "EMBEDDING",
            DocumentStatus::Ready => "READY",
            DocumentStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UPLOADING" => Some(DocumentStatus::Uploading),
            "EXTRACTING" => Some(DocumentStatus::Extracting),
            "ANALYZING" => Some(DocumentStatus::Analyzing),
            "EMBEDDING" => Some(DocumentStatus::Embedding),
            "READY" => Some(DocumentStatus::Ready),
            "ERROR" => Some(DocumentStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Ready | DocumentStatus::Error)
    }
}

/// Typed relationship between two documents, as discovered by the
/// relationship extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationshipType {
    Compliance,
    Conflict,
    Reference,
    Similar,
    Supersedes,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Compliance => "COMPLIANCE",
            RelationshipType::Conflict => "CONFLICT",
            RelationshipType::Reference => "REFERENCE",
            RelationshipType::Similar => "SIMILAR",
            RelationshipType::Supersedes => "SUPERSEDES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMPLIANCE" => Some(RelationshipType::Compliance),
            "CONFLICT" => Some(RelationshipType::Conflict),
            "REFERENCE" => Some(RelationshipType::Reference),
            "SIMILAR" => Some(RelationshipType::Similar),
            "SUPERSEDES" => Some(RelationshipType::Supersedes),
            _ => None,
        }
    }
}

/// Review state of an automatically detected relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    AutoDetected,
    PendingReview,
    Approved,
    Rejected,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::AutoDetected => "AUTO_DETECTED",
            ValidationStatus::PendingReview => "PENDING_REVIEW",
            ValidationStatus::Approved => "APPROVED",
            ValidationStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO_DETECTED" => Some(ValidationStatus::AutoDetected),
            "PENDING_REVIEW" => Some(ValidationStatus::PendingReview),
            "APPROVED" => Some(ValidationStatus::Approved),
            "REJECTED" => Some(ValidationStatus::Rejected),
            _ => None,
        }
    }
}

/// A regulatory document uploaded to the system.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub document_type: String,
    /// Object name of the source file in the blob store.
    pub file_path: String,
    pub file_type: String,
    pub file_size: i64,
    pub author: Option<String>,
    pub category: Option<String>,
    /// JSON-encoded unordered set of short tag strings.
    pub tags_json: String,
    pub description: Option<String>,
    /// Free-form, lexicographically compared version string.
    pub version: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub upload_date: DateTime<Utc>,
    pub processed_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn document_type(&self) -> Option<DocumentType> {
        DocumentType::parse(&self.document_type)
    }

    pub fn status(&self) -> Option<DocumentStatus> {
        DocumentStatus::parse(&self.status)
    }

    pub fn tags(&self) -> Vec<String> {
        serde_json::from_str(&self.tags_json).unwrap_or_default()
    }
}

/// A single chunk of extracted text belonging to a document.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Used verbatim as the point id in the vector index's `chunks` collection.
    pub id: i64,
    pub doc_id: i64,
    /// 0-based, dense within the owning document.
    pub chunk_index: i32,
    pub chunk_text: String,
    pub char_count: i32,
    pub section_title: Option<String>,
    pub section_level: Option<i32>,
    pub page_number: Option<i32>,
}

/// Structured detail payload attached to a `DocumentRelationship`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDetails {
    pub matched_chunks_count: usize,
    pub avg_similarity: f32,
    pub max_similarity: f32,
    pub min_similarity: f32,
    pub matched_sections: Vec<String>,
    pub chunk_pairs: Vec<ChunkPair>,
}

/// One matched chunk pair contributing to a relationship's evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPair {
    pub source_chunk_id: i64,
    pub target_chunk_id: i64,
    pub score: f32,
}

/// A typed relationship discovered between two documents.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentRelationship {
    pub id: i64,
    pub source_doc_id: i64,
    pub target_doc_id: i64,
    pub relationship_type: String,
    /// In `[0, 100]`.
    pub confidence: f32,
    pub summary: String,
    /// JSON-encoded `RelationshipDetails`.
    pub details_json: String,
    pub validation_status: String,
    /// Email of the reviewer who validated this relationship, if any.
    pub validated_by: Option<String>,
    pub validation_notes: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRelationship {
    pub fn relationship_type(&self) -> Option<RelationshipType> {
        RelationshipType::parse(&self.relationship_type)
    }

    pub fn validation_status(&self) -> Option<ValidationStatus> {
        ValidationStatus::parse(&self.validation_status)
    }

    pub fn details(&self) -> Option<RelationshipDetails> {
        serde_json::from_str(&self.details_json).ok()
    }
}

/// A system user. Carried for schema completeness; authentication/
/// authorization is out of scope for this crate.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_admin: bool,
    pub is_reviewer: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_round_trip() {
        assert_eq!(DocumentType::parse("NORM"), Some(DocumentType::Norm));
        assert_eq!(DocumentType::Guideline.as_str(), "GUIDELINE");
        assert_eq!(DocumentType::parse("bogus"), None);
    }

    #[test]
    fn test_status_is_terminal() {
        assert!(DocumentStatus::Ready.is_terminal());
        assert!(DocumentStatus::Error.is_terminal());
        assert!(!DocumentStatus::Extracting.is_terminal());
    }

    #[test]
    fn test_relationship_type_round_trip() {
        for (s, t) in [
            ("COMPLIANCE", RelationshipType::Compliance),
            ("CONFLICT", RelationshipType::Conflict),
            ("REFERENCE", RelationshipType::Reference),
            ("SIMILAR", RelationshipType::Similar),
            ("SUPERSEDES", RelationshipType::Supersedes),
        ] {
            assert_eq!(RelationshipType::parse(s), Some(t));
            assert_eq!(t.as_str(), s);
        }
    }
}
