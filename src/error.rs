use thiserror::Error;

use crate::model::KpId;

/// Central error type for Waypoint operations.
#[derive(Error, Debug)]
pub enum WaypointError {
    #[error("Knowledge point not found: {0}")]
    KnowledgePointNotFound(KpId),

    #[error("Graph store unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Content catalog error: {0}")]
    ContentCatalog(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Model artifact error: {0}")]
    Artifact(String),

    #[error("Feature encoding error: {0}")]
    Feature(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WaypointError {
    /// Whether this error is one a caller is expected to handle itself, as
    /// opposed to an internal failure whose detail should stay server-side.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            WaypointError::KnowledgePointNotFound(_) | WaypointError::UpstreamUnavailable(_)
        )
    }
}

/// Transport and connection failures mean the graph store is unreachable.
/// Query, schema and decoding failures are ours and stay internal.
impl From<surrealdb::Error> for WaypointError {
    fn from(err: surrealdb::Error) -> Self {
        match err {
            surrealdb::Error::Api(_) => WaypointError::UpstreamUnavailable(err.to_string()),
            _ => WaypointError::Internal(err.to_string()),
        }
    }
}

/// Convenience type alias for Waypoint results.
pub type WaypointResult<T> = Result<T, WaypointError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surreal_connection_errors_are_upstream() {
        let err = surrealdb::Error::Api(surrealdb::error::Api::ConnectionUninitialised);
        let mapped = WaypointError::from(err);
        assert!(matches!(mapped, WaypointError::UpstreamUnavailable(_)));
        assert!(mapped.is_caller_visible());
    }

    #[test]
    fn test_surreal_query_errors_are_internal() {
        let err = surrealdb::Error::Db(surrealdb::error::Db::Thrown("boom".into()));
        let mapped = WaypointError::from(err);
        assert!(matches!(mapped, WaypointError::Internal(_)));
        assert!(!mapped.is_caller_visible());
    }
}
