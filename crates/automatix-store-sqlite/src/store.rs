// automatix-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Run Log Store
// Description: The automatix_core::RunLogStore implementation: Execution,
//              NodeExecution, and DlqItem persistence plus the filtered
//              query and statistics read-path Run Observability needs.
// Purpose: Durable, idempotent-on-primary-key storage for the Workflow
//          Runtime's write path and the Run Observability read path.
// Dependencies: automatix_core, rusqlite, tokio
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use automatix_core::DlqItem;
use automatix_core::Execution;
use automatix_core::ExecutionId;
use automatix_core::ExecutionPage;
use automatix_core::ExecutionQuery;
use automatix_core::ExecutionStats;
use automatix_core::NodeExecution;
use automatix_core::NodeId;
use automatix_core::RunLogError;
use automatix_core::RunLogStore;
use automatix_core::StatsWindow;
use automatix_core::WorkflowId;
use rusqlite::params;
use rusqlite::Connection;
use rusqlite::OptionalExtension;

use crate::error::SqliteStoreError;
use crate::retention::RetentionPolicy;
use crate::schema;

/// A durable [`RunLogStore`] backed by a single `SQLite` database file.
///
/// All blocking `rusqlite` calls run inside `tokio::task::spawn_blocking`;
/// callers never block the async executor. Internally a single connection
/// guarded by a `std::sync::Mutex` serializes writes, matching `SQLite`'s
/// single-writer model; `SQLite`'s WAL mode lets this remain correct without
/// a separate read pool for the volumes this store targets.
#[derive(Clone)]
pub struct SqliteRunLogStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRunLogStore {
    /// Opens (creating if absent) a `SQLite` database at `path` and
    /// initializes its schema.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError`] if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, SqliteStoreError> {
        let conn = Connection::open(path)?;
        schema::init(&conn)?;
        Ok(Self { connection: Arc::new(Mutex::new(conn)) })
    }

    /// Opens an in-memory database, for tests and single-process demos.
    ///
    /// # Errors
    /// Returns [`SqliteStoreError`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self { connection: Arc::new(Mutex::new(conn)) })
    }

    /// Runs `f` against the shared connection on a blocking worker thread.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, RunLogError>
    where
        F: FnOnce(&Connection) -> Result<T, SqliteStoreError> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&guard)
        })
        .await
        .map_err(|err| RunLogError::from(SqliteStoreError::TaskJoin(err.to_string())))?
        .map_err(RunLogError::from)
    }

    /// Deletes per-node detail (`NodeExecution` and `DlqItem` rows) for
    /// executions that started before `policy`'s cutoff, leaving the
    /// `Execution` aggregate record intact, per the platform's retention
    /// policy.
    ///
    /// # Errors
    /// Returns [`RunLogError`] if the prune fails.
    pub async fn apply_retention(&self, policy: RetentionPolicy, now_unix_millis: i64) -> Result<u64, RunLogError> {
        let cutoff = policy.cutoff_unix_millis(now_unix_millis);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT execution_id FROM executions WHERE start_time_unix_millis < ?1",
            )?;
            let stale: Vec<String> =
                stmt.query_map(params![cutoff], |row| row.get(0))?.collect::<Result<_, _>>()?;
            let mut pruned = 0u64;
            for execution_id in &stale {
                pruned += u64::try_from(
                    conn.execute("DELETE FROM node_executions WHERE execution_id = ?1", params![execution_id])?,
                )
                .unwrap_or(0);
                conn.execute("DELETE FROM dlq_items WHERE execution_id = ?1", params![execution_id])?;
            }
            Ok(pruned)
        })
        .await
    }
}

#[async_trait]
impl RunLogStore for SqliteRunLogStore {
    async fn put_execution(&self, execution: &Execution) -> Result<(), RunLogError> {
        let execution = execution.clone();
        self.with_connection(move |conn| {
            let record_json = serde_json::to_string(&execution)
                .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
            let status = serde_json::to_value(execution.status)
                .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
            let status = status.as_str().unwrap_or_default();
            conn.execute(
                "INSERT INTO executions
                    (execution_id, workflow_id, user_id, status, start_time_unix_millis, duration_ms, record_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(execution_id) DO UPDATE SET
                    workflow_id = excluded.workflow_id,
                    user_id = excluded.user_id,
                    status = excluded.status,
                    start_time_unix_millis = excluded.start_time_unix_millis,
                    duration_ms = excluded.duration_ms,
                    record_json = excluded.record_json",
                params![
                    execution.execution_id.as_str(),
                    execution.workflow_id.as_str(),
                    execution.user_id.as_str(),
                    status,
                    execution.start_time_unix_millis,
                    execution.duration_ms,
                    record_json,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_execution(&self, id: &ExecutionId) -> Result<Execution, RunLogError> {
        let id = id.clone();
        self.with_connection(move |conn| {
            let record_json: Option<String> = conn
                .query_row(
                    "SELECT record_json FROM executions WHERE execution_id = ?1",
                    params![id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            let record_json = record_json.ok_or_else(|| SqliteStoreError::NotFound(id.to_string()))?;
            serde_json::from_str(&record_json).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))
        })
        .await
    }

    async fn query_executions(&self, query: &ExecutionQuery) -> Result<ExecutionPage, RunLogError> {
        let query = query.clone();
        self.with_connection(move |conn| query_executions_blocking(conn, &query)).await
    }

    async fn stats(&self, window: StatsWindow) -> Result<ExecutionStats, RunLogError> {
        self.with_connection(move |conn| stats_blocking(conn, window)).await
    }

    async fn put_node_execution(
        &self,
        execution_id: &ExecutionId,
        node_execution: &NodeExecution,
    ) -> Result<(), RunLogError> {
        let execution_id = execution_id.clone();
        let node_execution = node_execution.clone();
        self.with_connection(move |conn| {
            let record_json = serde_json::to_string(&node_execution)
                .map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
            conn.execute(
                "INSERT INTO node_executions (execution_id, node_id, rowid_order, record_json)
                 VALUES (
                    ?1, ?2,
                    (SELECT COALESCE(MAX(rowid_order), 0) + 1 FROM node_executions WHERE execution_id = ?1),
                    ?3
                 )
                 ON CONFLICT(execution_id, node_id) DO UPDATE SET record_json = excluded.record_json",
                params![execution_id.as_str(), node_execution.node_id.as_str(), record_json],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_node_executions(&self, execution_id: &ExecutionId) -> Result<Vec<NodeExecution>, RunLogError> {
        let execution_id = execution_id.clone();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT record_json FROM node_executions WHERE execution_id = ?1 ORDER BY rowid_order ASC",
            )?;
            let rows = stmt.query_map(params![execution_id.as_str()], |row| row.get::<_, String>(0))?;
            let mut result = Vec::new();
            for row in rows {
                let record_json = row?;
                let node_execution: NodeExecution =
                    serde_json::from_str(&record_json).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
                result.push(node_execution);
            }
            Ok(result)
        })
        .await
    }

    async fn put_dlq_item(&self, item: &DlqItem) -> Result<(), RunLogError> {
        let item = item.clone();
        self.with_connection(move |conn| {
            let record_json =
                serde_json::to_string(&item).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
            conn.execute(
                "INSERT INTO dlq_items (execution_id, node_id, record_json)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(execution_id, node_id) DO UPDATE SET record_json = excluded.record_json",
                params![item.execution_id.as_str(), item.node_id.as_str(), record_json],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_dlq(&self, workflow_id: Option<&WorkflowId>) -> Result<Vec<DlqItem>, RunLogError> {
        let workflow_id = workflow_id.cloned();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT dlq.record_json
                 FROM dlq_items dlq
                 JOIN executions e ON e.execution_id = dlq.execution_id
                 WHERE ?1 IS NULL OR e.workflow_id = ?1
                 ORDER BY dlq.execution_id, dlq.node_id",
            )?;
            let workflow_id_param = workflow_id.as_ref().map(automatix_core::WorkflowId::as_str);
            let rows = stmt.query_map(params![workflow_id_param], |row| row.get::<_, String>(0))?;
            let mut result = Vec::new();
            for row in rows {
                let record_json = row?;
                let item: DlqItem =
                    serde_json::from_str(&record_json).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
                result.push(item);
            }
            Ok(result)
        })
        .await
    }

    async fn delete_dlq_item(&self, execution_id: &ExecutionId, node_id: &NodeId) -> Result<(), RunLogError> {
        let execution_id = execution_id.clone();
        let node_id = node_id.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "DELETE FROM dlq_items WHERE execution_id = ?1 AND node_id = ?2",
                params![execution_id.as_str(), node_id.as_str()],
            )?;
            Ok(())
        })
        .await
    }
}

fn query_executions_blocking(conn: &Connection, query: &ExecutionQuery) -> Result<ExecutionPage, SqliteStoreError> {
    let status = query
        .status
        .as_ref()
        .map(|s| s.to_ascii_lowercase());
    let sort_column = match query.sort_by.as_deref() {
        Some("duration") => "duration_ms",
        _ => "start_time_unix_millis",
    };
    let sort_order = match query.sort_order.as_deref() {
        Some("asc") => "ASC",
        _ => "DESC",
    };

    let where_clause = "
        WHERE (?1 IS NULL OR execution_id = ?1)
          AND (?2 IS NULL OR workflow_id = ?2)
          AND (?3 IS NULL OR user_id = ?3)
          AND (?4 IS NULL OR status = ?4)
          AND (?5 IS NULL OR start_time_unix_millis >= ?5)
          AND (?6 IS NULL OR start_time_unix_millis <= ?6)";

    let bind_execution_id = query.execution_id.as_ref().map(automatix_core::ExecutionId::as_str);
    let bind_workflow_id = query.workflow_id.as_ref().map(automatix_core::WorkflowId::as_str);

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM executions {where_clause}"),
        params![
            bind_execution_id,
            bind_workflow_id,
            query.user_id,
            status,
            query.since_unix_millis,
            query.until_unix_millis,
        ],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT record_json FROM executions {where_clause}
         ORDER BY {sort_column} {sort_order}
         LIMIT ?7 OFFSET ?8"
    );
    let limit = if query.limit == 0 { i64::MAX } else { i64::from(query.limit) };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![
            bind_execution_id,
            bind_workflow_id,
            query.user_id,
            status,
            query.since_unix_millis,
            query.until_unix_millis,
            limit,
            query.offset,
        ],
        |row| row.get::<_, String>(0),
    )?;

    let mut items = Vec::new();
    for row in rows {
        let record_json = row?;
        let execution: Execution =
            serde_json::from_str(&record_json).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
        items.push(execution);
    }

    Ok(ExecutionPage { items, total: u64::try_from(total).unwrap_or(0) })
}

fn stats_blocking(conn: &Connection, window: StatsWindow) -> Result<ExecutionStats, SqliteStoreError> {
    let window_ms: i64 = match window {
        StatsWindow::Hour => 60 * 60 * 1000,
        StatsWindow::Day => 24 * 60 * 60 * 1000,
        StatsWindow::Week => 7 * 24 * 60 * 60 * 1000,
    };
    let now_unix_millis: i64 = conn.query_row("SELECT MAX(start_time_unix_millis) FROM executions", [], |row| {
        row.get::<_, Option<i64>>(0)
    })?
    .unwrap_or(0);
    let since = now_unix_millis - window_ms;

    let mut stmt = conn.prepare(
        "SELECT record_json FROM executions WHERE start_time_unix_millis >= ?1",
    )?;
    let rows = stmt.query_map(params![since], |row| row.get::<_, String>(0))?;

    let mut executions: Vec<Execution> = Vec::new();
    for row in rows {
        let record_json = row?;
        let execution: Execution =
            serde_json::from_str(&record_json).map_err(|err| SqliteStoreError::Corrupt(err.to_string()))?;
        executions.push(execution);
    }

    let total = executions.len() as u64;
    let succeeded = executions.iter().filter(|e| matches!(e.status, automatix_core::ExecutionStatus::Succeeded)).count() as u64;
    let failed = executions.iter().filter(|e| matches!(e.status, automatix_core::ExecutionStatus::Failed)).count() as u64;
    let partial = executions.iter().filter(|e| matches!(e.status, automatix_core::ExecutionStatus::Partial)).count() as u64;

    let mut durations: Vec<i64> = executions.iter().filter_map(|e| e.duration_ms).collect();
    durations.sort_unstable();
    let avg_duration_ms = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / durations.len() as f64
    };
    let percentile = |p: f64| -> f64 {
        if durations.is_empty() {
            return 0.0;
        }
        let rank = ((p * (durations.len() - 1) as f64).round()) as usize;
        durations[rank.min(durations.len() - 1)] as f64
    };

    let total_cost_usd: f64 = executions.iter().map(|e| e.metadata.total_cost_usd).sum();
    let llm_bearing: Vec<&Execution> =
        executions.iter().filter(|e| e.metadata.total_tokens_used > 0 || e.metadata.cache_hit_rate > 0.0).collect();
    let cache_hit_rate = if llm_bearing.is_empty() {
        0.0
    } else {
        llm_bearing.iter().map(|e| e.metadata.cache_hit_rate).sum::<f64>() / llm_bearing.len() as f64
    };

    Ok(ExecutionStats {
        total,
        succeeded,
        failed,
        partial,
        avg_duration_ms,
        p50_ms: percentile(0.50),
        p95_ms: percentile(0.95),
        p99_ms: percentile(0.99),
        total_cost_usd,
        cache_hit_rate,
    })
}

#[cfg(test)]
mod tests {
    use automatix_core::CorrelationId;
    use automatix_core::ExecutionMetadata;
    use automatix_core::ExecutionStatus;
    use automatix_core::NodeExecutionMetadata;
    use automatix_core::NodeStatus;
    use automatix_core::UserId;
    use serde_json::json;

    use super::*;

    fn sample_execution(id: &str, status: ExecutionStatus, start: i64, duration: Option<i64>) -> Execution {
        Execution {
            execution_id: ExecutionId::new(id),
            workflow_id: WorkflowId::new("wf-1"),
            user_id: UserId::new("user-1"),
            status,
            start_time_unix_millis: start,
            end_time_unix_millis: duration.map(|d| start + d),
            duration_ms: duration,
            trigger_type: "webhook".to_string(),
            trigger_data: json!({}),
            total_nodes: 1,
            completed_nodes: 1,
            failed_nodes: 0,
            final_output: Some(json!({"ok": true})),
            error: None,
            correlation_id: CorrelationId::new(id),
            metadata: ExecutionMetadata::default(),
            parent_execution_id: None,
        }
    }

    #[tokio::test]
    async fn put_and_get_execution_roundtrips() {
        let store = SqliteRunLogStore::open_in_memory().expect("open");
        let execution = sample_execution("exec-1", ExecutionStatus::Succeeded, 1000, Some(50));
        store.put_execution(&execution).await.expect("put");

        let fetched = store.get_execution(&ExecutionId::new("exec-1")).await.expect("get");
        assert_eq!(fetched.execution_id, execution.execution_id);
        assert_eq!(fetched.status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn put_execution_is_idempotent_on_primary_key() {
        let store = SqliteRunLogStore::open_in_memory().expect("open");
        let mut execution = sample_execution("exec-1", ExecutionStatus::Running, 1000, None);
        store.put_execution(&execution).await.expect("put");
        execution.status = ExecutionStatus::Succeeded;
        execution.duration_ms = Some(20);
        store.put_execution(&execution).await.expect("put again");

        let page = store
            .query_executions(&ExecutionQuery { limit: 10, ..Default::default() })
            .await
            .expect("query");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].status, ExecutionStatus::Succeeded);
    }

    #[tokio::test]
    async fn get_missing_execution_is_not_found() {
        let store = SqliteRunLogStore::open_in_memory().expect("open");
        let result = store.get_execution(&ExecutionId::new("missing")).await;
        assert!(matches!(result, Err(RunLogError::NotFound(_))));
    }

    #[tokio::test]
    async fn query_executions_filters_by_workflow_and_status() {
        let store = SqliteRunLogStore::open_in_memory().expect("open");
        store.put_execution(&sample_execution("e1", ExecutionStatus::Succeeded, 1000, Some(10))).await.expect("put");
        store.put_execution(&sample_execution("e2", ExecutionStatus::Failed, 2000, Some(20))).await.expect("put");

        let page = store
            .query_executions(&ExecutionQuery {
                status: Some("failed".to_string()),
                limit: 10,
                ..Default::default()
            })
            .await
            .expect("query");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].execution_id, ExecutionId::new("e2"));
    }

    #[tokio::test]
    async fn node_executions_are_listed_in_insertion_order() {
        let store = SqliteRunLogStore::open_in_memory().expect("open");
        let execution_id = ExecutionId::new("exec-1");

        for node_name in ["first", "second", "third"] {
            let node_execution = NodeExecution {
                node_id: NodeId::new(node_name),
                node_type: "action.sheets:append_row".to_string(),
                status: NodeStatus::Succeeded,
                start_time_unix_millis: 0,
                end_time_unix_millis: Some(1),
                duration_ms: Some(1),
                attempt: 1,
                max_attempts: 3,
                input: json!({}),
                output: Some(json!({})),
                error: None,
                correlation_id: CorrelationId::new("corr-1"),
                retry_history: Vec::new(),
                metadata: NodeExecutionMetadata::default(),
            };
            store.put_node_execution(&execution_id, &node_execution).await.expect("put node");
        }

        let nodes = store.list_node_executions(&execution_id).await.expect("list");
        let ids: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn dlq_items_round_trip_and_delete() {
        let store = SqliteRunLogStore::open_in_memory().expect("open");
        store.put_execution(&sample_execution("exec-1", ExecutionStatus::Partial, 1000, Some(5))).await.expect("put");

        let item = DlqItem {
            execution_id: ExecutionId::new("exec-1"),
            node_id: NodeId::new("n1"),
            last_error: "boom".to_string(),
            attempts: 3,
            first_failed_at_unix_millis: 1000,
            last_failed_at_unix_millis: 1100,
            retryable_after_unix_millis: None,
            payload: json!({}),
        };
        store.put_dlq_item(&item).await.expect("put dlq");

        let items = store.list_dlq(Some(&WorkflowId::new("wf-1"))).await.expect("list dlq");
        assert_eq!(items.len(), 1);

        store.delete_dlq_item(&ExecutionId::new("exec-1"), &NodeId::new("n1")).await.expect("delete");
        let items = store.list_dlq(None).await.expect("list dlq");
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn stats_computes_counts_and_percentiles() {
        let store = SqliteRunLogStore::open_in_memory().expect("open");
        store.put_execution(&sample_execution("e1", ExecutionStatus::Succeeded, 1000, Some(10))).await.expect("put");
        store.put_execution(&sample_execution("e2", ExecutionStatus::Failed, 1000, Some(20))).await.expect("put");
        store.put_execution(&sample_execution("e3", ExecutionStatus::Succeeded, 1000, Some(30))).await.expect("put");

        let stats = store.stats(StatsWindow::Day).await.expect("stats");
        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn apply_retention_prunes_node_detail_for_stale_executions() {
        let store = SqliteRunLogStore::open_in_memory().expect("open");
        store.put_execution(&sample_execution("old", ExecutionStatus::Succeeded, 0, Some(5))).await.expect("put");
        let node_execution = NodeExecution {
            node_id: NodeId::new("n1"),
            node_type: "action.sheets:append_row".to_string(),
            status: NodeStatus::Succeeded,
            start_time_unix_millis: 0,
            end_time_unix_millis: Some(1),
            duration_ms: Some(1),
            attempt: 1,
            max_attempts: 1,
            input: json!({}),
            output: Some(json!({})),
            error: None,
            correlation_id: CorrelationId::new("corr-1"),
            retry_history: Vec::new(),
            metadata: NodeExecutionMetadata::default(),
        };
        store.put_node_execution(&ExecutionId::new("old"), &node_execution).await.expect("put node");

        let policy = RetentionPolicy { full_detail_window_sec: 1 };
        store.apply_retention(policy, 10_000).await.expect("apply retention");

        let nodes = store.list_node_executions(&ExecutionId::new("old")).await.expect("list");
        assert!(nodes.is_empty());
        let execution = store.get_execution(&ExecutionId::new("old")).await.expect("execution persists");
        assert_eq!(execution.status, ExecutionStatus::Succeeded);
    }
}
