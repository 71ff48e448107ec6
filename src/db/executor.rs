//! Statement execution against named connections.

use std::sync::Arc;
use std::time::Instant;

use crate::db::driver::{Param, QueryOutcome, Row};
use crate::db::error::DbError;
use crate::db::registry::ConnectionRegistry;

/// Runs statements through the sessions held by a [`ConnectionRegistry`].
#[derive(Clone)]
pub struct QueryExecutor {
    registry: Arc<ConnectionRegistry>,
}

impl QueryExecutor {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Run `statement` on the connection registered as `connection`.
    ///
    /// Row-returning statements come back fully materialized, one
    /// [`ResultSet`](crate::db::ResultSet) per result set; everything else
    /// reports the affected row count.
    pub async fn execute(
        &self,
        connection: &str,
        statement: &str,
        params: &[Param],
    ) -> Result<QueryOutcome, DbError> {
        let session = self.registry.session(connection)?;

        let statement = statement.trim_start();
        if statement.trim_end().is_empty() {
            return Err(DbError::EmptyStatement);
        }

        let start = Instant::now();
        let result = session.run(statement, params).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(outcome) => tracing::debug!(
                connection = %connection,
                elapsed_ms,
                count = outcome.count(),
                "Statement executed"
            ),
            Err(e) => tracing::warn!(
                connection = %connection,
                elapsed_ms,
                error = %e,
                "Statement failed"
            ),
        }
        result
    }

    /// All rows across every result set.
    pub async fn query(
        &self,
        connection: &str,
        statement: &str,
        params: &[Param],
    ) -> Result<Vec<Row>, DbError> {
        Ok(self.execute(connection, statement, params).await?.into_rows())
    }

    /// Row count for row statements, affected rows otherwise.
    pub async fn exec(
        &self,
        connection: &str,
        statement: &str,
        params: &[Param],
    ) -> Result<u64, DbError> {
        Ok(self.execute(connection, statement, params).await?.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cell::Cell;
    use crate::db::driver::{ConnectionConfig, Driver, ResultSet, Session};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers from a fixed script and records what it ran.
    struct ScriptedSession {
        seen: Mutex<Vec<(String, Vec<Param>)>>,
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn run(&self, statement: &str, params: &[Param]) -> Result<QueryOutcome, DbError> {
            self.seen
                .lock()
                .unwrap()
                .push((statement.to_string(), params.to_vec()));
            if statement.starts_with("SELECT nothing") {
                return Ok(QueryOutcome::Rows(vec![ResultSet::new(vec!["id".into()])]));
            }
            if statement.starts_with("SELECT") {
                let mut first = ResultSet::new(vec!["id".into(), "name".into()]);
                first.rows.push(vec![Cell::from("1"), Cell::from("ada")]);
                first.rows.push(vec![Cell::from("2"), Cell::Null]);
                let mut second = ResultSet::new(vec!["total".into()]);
                second.rows.push(vec![Cell::from("2")]);
                return Ok(QueryOutcome::Rows(vec![first, second]));
            }
            if statement.starts_with("BROKEN") {
                return Err(DbError::Statement("syntax error".into()));
            }
            Ok(QueryOutcome::Affected(3))
        }

        async fn close(&self) -> Result<(), DbError> {
            Ok(())
        }
    }

    struct ScriptedDriver;

    #[async_trait]
    impl Driver for ScriptedDriver {
        async fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn Session>, DbError> {
            Ok(Arc::new(ScriptedSession {
                seen: Mutex::new(Vec::new()),
            }))
        }
    }

    async fn executor() -> QueryExecutor {
        let registry = Arc::new(ConnectionRegistry::new(Arc::new(ScriptedDriver)));
        registry
            .add_and_open(ConnectionConfig {
                name: "main".into(),
                host: "localhost".into(),
                user: "app".into(),
                password: String::new(),
                database: "app".into(),
                port: 5432,
            })
            .await
            .unwrap();
        QueryExecutor::new(registry)
    }

    #[tokio::test]
    async fn test_rows_from_every_result_set() {
        let executor = executor().await;
        let outcome = executor.execute("main", "SELECT id, name FROM users", &[]).await.unwrap();

        let QueryOutcome::Rows(sets) = &outcome else {
            panic!("expected rows, got {outcome:?}");
        };
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].column_index("name"), Some(1));
        assert_eq!(outcome.count(), 3);

        let rows = outcome.into_rows();
        assert_eq!(rows[0][0].to_i64().unwrap().value, 1);
        assert!(rows[1][1].to_text().unwrap().is_null);
        assert_eq!(rows[2][0].to_u8().unwrap().value, 2);
    }

    #[tokio::test]
    async fn test_zero_rows_is_not_an_error() {
        let executor = executor().await;
        let rows = executor.query("main", "SELECT nothing", &[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_affected_count() {
        let executor = executor().await;
        let count = executor
            .exec("main", "UPDATE users SET name = $1", &["x".into()])
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_leading_whitespace_trimmed() {
        let executor = executor().await;
        let outcome = executor.execute("main", "   SELECT id FROM users", &[]).await.unwrap();
        assert!(matches!(outcome, QueryOutcome::Rows(_)));
    }

    #[tokio::test]
    async fn test_missing_connection_and_empty_statement() {
        let executor = executor().await;
        assert!(matches!(
            executor.execute("other", "SELECT 1", &[]).await,
            Err(DbError::ConnectionNotFound(_))
        ));
        assert!(matches!(
            executor.execute("main", "   ", &[]).await,
            Err(DbError::EmptyStatement)
        ));

        executor.registry().close("main").await.unwrap();
        let err = executor.execute("main", "SELECT 1", &[]).await.unwrap_err();
        assert!(err.to_string().starts_with("connection not found"));
    }

    #[tokio::test]
    async fn test_statement_errors_propagate() {
        let executor = executor().await;
        assert!(matches!(
            executor.execute("main", "BROKEN", &[]).await,
            Err(DbError::Statement(_))
        ));
    }
}
