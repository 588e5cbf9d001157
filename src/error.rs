use thiserror::Error;

use crate::graph::Kinship;

/// Main error type for the family tree service
#[derive(Error, Debug)]
pub enum FamilyTreeError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Person not found (or soft-deleted)
    #[error("Person not found: {0}")]
    PersonNotFound(String),

    /// Relationship not found (or soft-deleted)
    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    /// A person was proposed as their own parent
    #[error("Person {0} cannot be their own parent")]
    SelfParentage(String),

    /// The two endpoints of a proposed edge are already related
    #[error("Relationship {parent} -> {child} is not allowed: {kinship}")]
    IncestuousOffspring {
        parent: String,
        child: String,
        kinship: Kinship,
    },

    /// Traversal hit a cycle or its safety bound
    #[error("Inconsistent family graph: {0}")]
    InconsistentGraph(String),

    /// Caller gave up on the traversal
    #[error("Traversal cancelled")]
    Cancelled,

    /// Traversal ran past its deadline
    #[error("Traversal deadline exceeded")]
    DeadlineExceeded,

    /// Serialization errors (JSON/XML rendering, import files)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Blocking task panicked or was aborted
    #[error("Background task failed: {0}")]
    TaskJoin(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl FamilyTreeError {
    /// Stable snake_case tag used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            FamilyTreeError::Database(_) => "database",
            FamilyTreeError::Io(_) => "io",
            FamilyTreeError::Config(_) => "config",
            FamilyTreeError::PersonNotFound(_) => "person_not_found",
            FamilyTreeError::RelationshipNotFound(_) => "relationship_not_found",
            FamilyTreeError::SelfParentage(_) => "self_parentage",
            FamilyTreeError::IncestuousOffspring { .. } => "incestuous_offspring",
            FamilyTreeError::InconsistentGraph(_) => "inconsistent_graph",
            FamilyTreeError::Cancelled => "cancelled",
            FamilyTreeError::DeadlineExceeded => "deadline_exceeded",
            FamilyTreeError::Serialization(_) => "serialization",
            FamilyTreeError::TaskJoin(_) => "task_join",
            FamilyTreeError::InvalidInput(_) => "invalid_input",
        }
    }

    /// True for store/runtime failures that say nothing about the graph itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            FamilyTreeError::Database(_)
                | FamilyTreeError::Io(_)
                | FamilyTreeError::Serialization(_)
                | FamilyTreeError::TaskJoin(_)
        )
    }
}

impl From<serde_json::Error> for FamilyTreeError {
    fn from(err: serde_json::Error) -> Self {
        FamilyTreeError::Serialization(err.to_string())
    }
}

/// Convenient Result type using FamilyTreeError
pub type Result<T> = std::result::Result<T, FamilyTreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FamilyTreeError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: FamilyTreeError = rusqlite_err.into();
        assert!(matches!(err, FamilyTreeError::Database(_)));
        assert!(err.is_infrastructure());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FamilyTreeError = io_err.into();
        assert!(matches!(err, FamilyTreeError::Io(_)));
    }

    #[test]
    fn test_domain_errors_are_not_infrastructure() {
        let rejected = FamilyTreeError::IncestuousOffspring {
            parent: "a".to_string(),
            child: "b".to_string(),
            kinship: Kinship::MirroredEdge,
        };
        assert!(!rejected.is_infrastructure());
        assert_eq!(rejected.kind(), "incestuous_offspring");
        assert!(!FamilyTreeError::SelfParentage("x".to_string()).is_infrastructure());
        assert!(!FamilyTreeError::InconsistentGraph("cycle".to_string()).is_infrastructure());
    }
}
