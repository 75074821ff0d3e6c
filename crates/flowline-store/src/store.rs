use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use flowline_core::error::{FlowlineError, Result};
use flowline_core::graph;
use flowline_core::traits::WorkflowStore;
use flowline_core::types::{Task, TaskSpec, Workflow, WorkflowId};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS workflows (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        description TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        workflow_id INTEGER NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        task_type TEXT NOT NULL DEFAULT 'llm',
        config TEXT,
        sort_order INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_workflow
        ON tasks(workflow_id, sort_order, id);";

/// SQLite-backed workflow store.
///
/// Each operation holds the connection for its whole unit of work; writes run
/// inside a transaction that rolls back on drop unless committed.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlowlineError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;

        let store = Self::init(conn)?;
        debug!(path = %path.display(), "SQLite store opened");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Cascading deletes need foreign keys, which SQLite enables per connection.
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn db_err(e: rusqlite::Error) -> FlowlineError {
    FlowlineError::Database(e.to_string())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(FlowlineError::Validation(
            "workflow name must not be empty".into(),
        ));
    }
    Ok(())
}

fn parse_ts(ts: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn workflow_from_row(row: &Row<'_>) -> rusqlite::Result<Workflow> {
    let created: String = row.get(3)?;
    let updated: String = row.get(4)?;
    Ok(Workflow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_ts(&created),
        updated_at: parse_ts(&updated),
        tasks: vec![],
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let created: String = row.get(7)?;
    let updated: String = row.get(8)?;
    Ok(Task {
        id: row.get(0)?,
        workflow_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        task_type: row.get(4)?,
        config: row.get(5)?,
        order: row.get(6)?,
        created_at: parse_ts(&created),
        updated_at: parse_ts(&updated),
    })
}

/// Tasks of one workflow, by `order` then insertion.
fn load_tasks(conn: &Connection, workflow_id: WorkflowId) -> Result<Vec<Task>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, workflow_id, name, description, task_type, config, sort_order,
                    created_at, updated_at
             FROM tasks
             WHERE workflow_id = ?1
             ORDER BY sort_order ASC, id ASC",
        )
        .map_err(db_err)?;

    let rows = stmt
        .query_map(params![workflow_id], task_from_row)
        .map_err(db_err)?;

    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row.map_err(db_err)?);
    }
    Ok(tasks)
}

fn load_workflow(conn: &Connection, id: WorkflowId) -> Result<Option<Workflow>> {
    let workflow = conn
        .query_row(
            "SELECT id, name, description, created_at, updated_at
             FROM workflows WHERE id = ?1",
            params![id],
            workflow_from_row,
        )
        .optional()
        .map_err(db_err)?;

    match workflow {
        Some(mut wf) => {
            wf.tasks = load_tasks(conn, id)?;
            Ok(Some(wf))
        }
        None => Ok(None),
    }
}

fn insert_tasks(
    conn: &Connection,
    workflow_id: WorkflowId,
    specs: &[TaskSpec],
    now: &str,
) -> Result<()> {
    for spec in specs {
        let config = serde_json::to_string(&spec.config)?;
        conn.execute(
            "INSERT INTO tasks (workflow_id, name, description, task_type, config, sort_order,
                                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                workflow_id,
                spec.name,
                spec.description,
                spec.task_type,
                config,
                spec.order,
                now
            ],
        )
        .map_err(db_err)?;
    }
    Ok(())
}

impl WorkflowStore for SqliteStore {
    fn get_workflow(&self, id: WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>> {
        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowlineError::Database(e.to_string()))?;
            load_workflow(&conn, id)
        })
    }

    fn list_workflows(&self, offset: usize, limit: usize) -> BoxFuture<'_, Result<Vec<Workflow>>> {
        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowlineError::Database(e.to_string()))?;

            let mut stmt = conn
                .prepare(
                    "SELECT id, name, description, created_at, updated_at
                     FROM workflows
                     ORDER BY id ASC
                     LIMIT ?1 OFFSET ?2",
                )
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![limit as i64, offset as i64], workflow_from_row)
                .map_err(db_err)?;

            let mut workflows = Vec::new();
            for row in rows {
                let mut wf = row.map_err(db_err)?;
                wf.tasks = load_tasks(&conn, wf.id)?;
                workflows.push(wf);
            }

            Ok(workflows)
        })
    }

    fn create_workflow(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<Workflow>> {
        let name = name.to_string();
        let description = description.map(String::from);

        Box::pin(async move {
            validate_name(&name)?;
            let specs = graph::derive_tasks(description.as_deref());
            let now = Utc::now().to_rfc3339();

            let mut conn = self
                .conn
                .lock()
                .map_err(|e| FlowlineError::Database(e.to_string()))?;

            let tx = conn.transaction().map_err(db_err)?;
            tx.execute(
                "INSERT INTO workflows (name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![name, description, now],
            )
            .map_err(db_err)?;
            let id = tx.last_insert_rowid();
            insert_tasks(&tx, id, &specs, &now)?;
            tx.commit().map_err(db_err)?;

            info!(workflow_id = id, tasks = specs.len(), "Workflow created");

            load_workflow(&conn, id)?
                .ok_or_else(|| FlowlineError::Database(format!("workflow {} vanished", id)))
        })
    }

    fn update_workflow(
        &self,
        id: WorkflowId,
        name: &str,
        description: Option<&str>,
    ) -> BoxFuture<'_, Result<Option<Workflow>>> {
        let name = name.to_string();
        let description = description.map(String::from);

        Box::pin(async move {
            validate_name(&name)?;
            let specs = graph::derive_tasks(description.as_deref());
            let now = Utc::now().to_rfc3339();

            let mut conn = self
                .conn
                .lock()
                .map_err(|e| FlowlineError::Database(e.to_string()))?;

            let tx = conn.transaction().map_err(db_err)?;
            let changed = tx
                .execute(
                    "UPDATE workflows SET name = ?1, description = ?2, updated_at = ?3
                     WHERE id = ?4",
                    params![name, description, now, id],
                )
                .map_err(db_err)?;

            if changed == 0 {
                debug!(workflow_id = id, "Workflow not found for update");
                return Ok(None);
            }

            // The task set is replaced wholesale, never merged.
            tx.execute("DELETE FROM tasks WHERE workflow_id = ?1", params![id])
                .map_err(db_err)?;
            insert_tasks(&tx, id, &specs, &now)?;
            tx.commit().map_err(db_err)?;

            info!(workflow_id = id, tasks = specs.len(), "Workflow updated");
            load_workflow(&conn, id)
        })
    }

    fn delete_workflow(&self, id: WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>> {
        Box::pin(async move {
            let mut conn = self
                .conn
                .lock()
                .map_err(|e| FlowlineError::Database(e.to_string()))?;

            let tx = conn.transaction().map_err(db_err)?;
            let Some(workflow) = load_workflow(&tx, id)? else {
                debug!(workflow_id = id, "Workflow not found for deletion");
                return Ok(None);
            };

            tx.execute("DELETE FROM workflows WHERE id = ?1", params![id])
                .map_err(db_err)?;
            tx.commit().map_err(db_err)?;

            info!(workflow_id = id, "Workflow deleted");
            Ok(Some(workflow))
        })
    }

    fn list_tasks(&self, workflow_id: WorkflowId) -> BoxFuture<'_, Result<Vec<Task>>> {
        Box::pin(async move {
            let conn = self
                .conn
                .lock()
                .map_err(|e| FlowlineError::Database(e.to_string()))?;
            load_tasks(&conn, workflow_id)
        })
    }
}
