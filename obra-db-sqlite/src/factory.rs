use async_trait::async_trait;

use obra_core::db::repository::{ObraRepository, RepositoryError};
use obra_core::db::{DbConfig, RepositoryFactory};
use tracing::info;

use crate::repository::SqliteRepository;

/// [`RepositoryFactory`] for SQLite.
///
/// Register this with a [`obra_core::db::RepositoryRegistry`] to make the
/// `"sqlite"` backend available:
///
/// ```rust,no_run
/// use obra_core::db::RepositoryRegistry;
/// use obra_db_sqlite::SqliteRepositoryFactory;
///
/// let mut registry = RepositoryRegistry::new();
/// registry.register(Box::new(SqliteRepositoryFactory));
/// ```
pub struct SqliteRepositoryFactory;

#[async_trait]
impl RepositoryFactory for SqliteRepositoryFactory {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    /// Open the database described by `config.connection_string`.
    ///
    /// Accepted connection-string values:
    /// * A bare file path, e.g. `"obra.db"`. The file is created if it
    ///   does not exist.
    /// * A sqlx URL such as `"sqlite:obra.db?mode=rwc"`.
    /// * `":memory:"` for an ephemeral in-memory database.
    ///
    /// Pending migrations are applied before the repository is returned.
    async fn create(
        &self,
        config: &DbConfig,
    ) -> Result<Box<dyn ObraRepository>, RepositoryError> {
        let repo = SqliteRepository::new(&config.connection_string)
            .await
            .map_err(|e| RepositoryError::Connection(format!("{e:#}")))?;
        repo.run_migrations()
            .await
            .map_err(|e| RepositoryError::Database(format!("{e:#}")))?;

        info!(database = %config.connection_string, "sqlite repository ready");
        Ok(Box::new(repo))
    }
}

#[cfg(test)]
mod tests {
    use obra_core::db::{DbConfig, RepositoryFactory, RepositoryRegistry};
    use obra_core::{RepositoryError, SettlementFilter};

    use super::SqliteRepositoryFactory;

    fn config(connection_string: &str) -> DbConfig {
        DbConfig {
            backend: "sqlite".to_string(),
            connection_string: connection_string.to_string(),
        }
    }

    #[test]
    fn backend_name_is_sqlite() {
        assert_eq!(SqliteRepositoryFactory.backend_name(), "sqlite");
    }

    /// Full round-trip: factory → SqliteRepository with an in-memory DB.
    #[tokio::test]
    async fn creates_in_memory_repository() {
        let result = SqliteRepositoryFactory.create(&config(":memory:")).await;

        let repo = match result {
            Ok(repo) => repo,
            Err(e) => panic!("failed to create in-memory repository: {e:#?}"),
        };
        let listed = repo.list_settlements(&SettlementFilter::default()).await;
        assert_eq!(listed.map(|s| s.len()), Ok(0));
    }

    #[tokio::test]
    async fn registry_dispatches_to_sqlite() {
        let mut registry = RepositoryRegistry::new();
        registry.register(Box::new(SqliteRepositoryFactory));

        assert!(registry.create(&config(":memory:")).await.is_ok());
    }

    #[tokio::test]
    async fn unreachable_path_is_connection_error() {
        let result = SqliteRepositoryFactory
            .create(&config("/nonexistent-dir/obra/obra.db"))
            .await;

        assert!(matches!(result, Err(RepositoryError::Connection(_))));
    }
}
