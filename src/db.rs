use std::sync::Arc;
use std::time::Duration;
use surrealdb::engine::any::{connect, Any};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use tracing::{info, warn};

use crate::error::{WaypointError, WaypointResult};

/// A shared SurrealDB connection holding the prerequisite graph.
///
/// Opened once at process start and shared by every request; all queries
/// issued through it by the serving path are reads.
#[derive(Clone)]
pub struct WaypointDatabase {
    db: Arc<Surreal<Any>>,
}

impl WaypointDatabase {
    /// Create a new in-memory database instance.
    pub async fn new_memory(namespace: &str, database: &str) -> WaypointResult<Self> {
        let db = connect("memory").await?;
        db.use_ns(namespace).use_db(database).await?;

        let db = Arc::new(db);
        Self::init_schema(&db).await?;

        Ok(Self { db })
    }

    /// Create a new database instance connected to a SurrealDB server.
    pub async fn new_remote(
        url: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> WaypointResult<Self> {
        let db = connect(url).await?;

        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;

        let db = Arc::new(db);
        Self::init_schema(&db).await?;

        Ok(Self { db })
    }

    /// Define tables and indexes. Idempotent.
    async fn init_schema(db: &Surreal<Any>) -> WaypointResult<()> {
        db.query(
            "DEFINE TABLE IF NOT EXISTS kp SCHEMALESS;
             DEFINE INDEX IF NOT EXISTS kp_id_unique ON kp FIELDS kp_id UNIQUE;
             DEFINE INDEX IF NOT EXISTS kp_name_unique ON kp FIELDS name UNIQUE;
             DEFINE TABLE IF NOT EXISTS prerequisite_of SCHEMALESS;
             DEFINE INDEX IF NOT EXISTS prerequisite_from ON prerequisite_of FIELDS from_kp;
             DEFINE INDEX IF NOT EXISTS prerequisite_to ON prerequisite_of FIELDS to_kp;",
        )
        .await?
        .check()?;
        Ok(())
    }

    /// Get a reference to the underlying SurrealDB instance.
    pub fn inner(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Check if the database is reachable.
    pub async fn health(&self) -> WaypointResult<bool> {
        self.db.health().await?;
        Ok(true)
    }

    /// Release this handle. The connection closes when the last clone drops.
    pub fn close(self) {
        let remaining = Arc::strong_count(&self.db) - 1;
        info!(remaining_handles = remaining, "Closing graph database handle");
    }
}

// ---------------------------------------------------------------------------
// Connection configuration
// ---------------------------------------------------------------------------

/// Database configuration options.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub endpoint: DatabaseEndpoint,
    pub namespace: String,
    pub database: String,
    pub retry: RetryPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            endpoint: DatabaseEndpoint::Memory,
            namespace: "waypoint".to_string(),
            database: "curriculum".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Database endpoint types.
#[derive(Debug, Clone)]
pub enum DatabaseEndpoint {
    /// In-memory database (for testing).
    Memory,
    /// Remote SurrealDB server.
    Remote {
        url: String,
        username: String,
        password: String,
    },
}

/// Exponential backoff applied while opening the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl DatabaseConfig {
    /// Create a new configuration for an in-memory database.
    pub fn memory() -> Self {
        Self {
            endpoint: DatabaseEndpoint::Memory,
            ..Default::default()
        }
    }

    /// Create a new configuration for a remote SurrealDB server.
    pub fn remote(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: DatabaseEndpoint::Remote {
                url: url.into(),
                username: username.into(),
                password: password.into(),
            },
            ..Default::default()
        }
    }

    /// Connect once with this configuration.
    pub async fn connect(&self) -> WaypointResult<WaypointDatabase> {
        match &self.endpoint {
            DatabaseEndpoint::Memory => {
                WaypointDatabase::new_memory(&self.namespace, &self.database).await
            }
            DatabaseEndpoint::Remote {
                url,
                username,
                password,
            } => {
                WaypointDatabase::new_remote(
                    url,
                    username,
                    password,
                    &self.namespace,
                    &self.database,
                )
                .await
            }
        }
    }

    /// Connect, retrying with exponential backoff. Exhausting the retries is
    /// reported as [`WaypointError::UpstreamUnavailable`].
    pub async fn connect_with_retry(&self) -> WaypointResult<WaypointDatabase> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.connect().await {
                Ok(db) => {
                    info!(attempt, "Connected to graph database");
                    return Ok(db);
                }
                Err(err) if attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Graph database connection failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(WaypointError::UpstreamUnavailable(format!(
                        "gave up after {attempt} attempts: {err}"
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database() {
        let db = DatabaseConfig::memory().connect().await.unwrap();
        assert!(db.health().await.unwrap());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_exhausts_retries() {
        let config = DatabaseConfig {
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
            },
            ..DatabaseConfig::remote("ws://127.0.0.1:1", "root", "root")
        };
        let err = config.connect_with_retry().await.err().unwrap();
        assert!(matches!(err, WaypointError::UpstreamUnavailable(_)));
    }
}
