//! SQLite persistence for deployments, the active pointer and the audit trail

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rpc_contract::FileEntry;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;

use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use crate::errors::EngineError;
use crate::utils::now_rfc3339;

/// One row of the `deployment` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentRecord {
    pub deploy_name: String,
    pub project_name: String,

    /// Relative to the deployments root
    pub deploy_dir: String,

    /// Relative to `deploy_dir`
    pub web_static_dir: Option<String>,

    pub manifest: Vec<FileEntry>,
    pub config_text: String,
    pub update_in_place: bool,
    pub state: DeploymentState,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DeploymentRecord {
    pub fn manifest_entry(&self, rel_path: &str) -> Option<&FileEntry> {
        self.manifest.iter().find(|e| e.rel_path == rel_path)
    }
}

/// One row of the `active_deployment` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveDeployment {
    pub project_name: String,
    pub deploy_name: String,
    pub updated_at: String,
}

/// One row of the `deployment_event` audit table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentEventRecord {
    pub id: i64,
    pub deploy_name: String,
    pub from_status: Option<String>,
    pub to_status: String,
    pub message: Option<String>,
    pub created_at: String,
}

/// Relational store behind the deployment manager
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database file and ensure the schema
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        Self::from_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, EngineError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&mut Connection) -> Result<T, EngineError>,
    {
        let mut conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut conn)
    }

    fn with_immediate_tx<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, EngineError>,
    {
        self.with_conn(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
    }

    /// Insert a new deployment (and its project on first sight)
    pub fn insert_deployment(&self, record: &DeploymentRecord) -> Result<(), EngineError> {
        let manifest_json = serde_json::to_string(&record.manifest)?;
        self.with_immediate_tx(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO project(project_name, created_at) VALUES (?1, ?2)",
                params![record.project_name, record.created_at],
            )?;
            tx.execute(
                "INSERT INTO deployment(
                    deploy_name, project_name, deploy_dir, web_static_dir, manifest_json,
                    config_text, update_in_place, status, error, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.deploy_name,
                    record.project_name,
                    record.deploy_dir,
                    record.web_static_dir,
                    manifest_json,
                    record.config_text,
                    record.update_in_place,
                    record.state.as_str(),
                    record.error,
                    record.created_at,
                    record.updated_at,
                ],
            )?;
            insert_event(tx, &record.deploy_name, None, record.state, Some("created"))?;
            Ok(())
        })
    }

    pub fn get_deployment(&self, deploy_name: &str) -> Result<Option<DeploymentRecord>, EngineError> {
        self.with_conn(|conn| {
            let record = conn
                .query_row(
                    &format!("{SELECT_DEPLOYMENT} WHERE deploy_name = ?1"),
                    params![deploy_name],
                    read_deployment_row,
                )
                .optional()?;
            record.map(DeploymentRow::into_record).transpose()
        })
    }

    /// Deployments of a project, newest first
    pub fn list_deployments(&self, project_name: &str) -> Result<Vec<DeploymentRecord>, EngineError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_DEPLOYMENT} WHERE project_name = ?1 ORDER BY created_at DESC, deploy_name DESC"
            ))?;
            let rows = stmt
                .query_map(params![project_name], read_deployment_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(DeploymentRow::into_record).collect()
        })
    }

    /// Move a deployment from `from` to `to`, recording an audit event.
    /// Returns false if the row was no longer in `from`.
    pub fn transition(
        &self,
        deploy_name: &str,
        from: DeploymentState,
        to: DeploymentState,
        error: Option<&str>,
        message: Option<&str>,
    ) -> Result<bool, EngineError> {
        self.with_immediate_tx(|tx| {
            let changed = tx.execute(
                "UPDATE deployment SET status = ?1, error = COALESCE(?2, error), updated_at = ?3
                 WHERE deploy_name = ?4 AND status = ?5",
                params![to.as_str(), error, now_rfc3339(), deploy_name, from.as_str()],
            )?;
            if changed == 0 {
                return Ok(false);
            }
            insert_event(tx, deploy_name, Some(from), to, message.or(error))?;
            Ok(true)
        })
    }

    /// Point the project's active row at `deploy_name` in one transaction:
    /// upsert the pointer, supersede the previous deployment, activate the new
    /// one. Returns the previously active deploy name. A no-op if the
    /// deployment is already the active one. Both status changes go through
    /// the deployment state machine.
    pub fn activate(
        &self,
        project_name: &str,
        deploy_name: &str,
    ) -> Result<Option<String>, EngineError> {
        self.with_immediate_tx(|tx| {
            let previous = select_active(tx, project_name)?.map(|a| a.deploy_name);
            if previous.as_deref() == Some(deploy_name) {
                return Ok(previous);
            }

            let current_state = select_state(tx, deploy_name)?;
            let activated =
                advance_state(deploy_name, current_state, DeploymentEvent::Activate, "activate")?;

            let now = now_rfc3339();
            tx.execute(
                "INSERT INTO active_deployment(project_name, deploy_name, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(project_name) DO UPDATE SET
                    deploy_name = excluded.deploy_name,
                    updated_at = excluded.updated_at",
                params![project_name, deploy_name, now],
            )?;

            if let Some(prev) = &previous {
                let prev_state = select_state(tx, prev)?;
                let next = advance_state(prev, prev_state, DeploymentEvent::Supersede, "supersede")?;
                tx.execute(
                    "UPDATE deployment SET status = ?1, updated_at = ?2 WHERE deploy_name = ?3",
                    params![next.as_str(), now, prev],
                )?;
                insert_event(
                    tx,
                    prev,
                    prev_state,
                    next,
                    Some(&format!("superseded by {deploy_name}")),
                )?;
            }

            tx.execute(
                "UPDATE deployment SET status = ?1, updated_at = ?2 WHERE deploy_name = ?3",
                params![activated.as_str(), now, deploy_name],
            )?;
            insert_event(tx, deploy_name, current_state, activated, Some("activated"))?;

            Ok(previous)
        })
    }

    pub fn get_active(&self, project_name: &str) -> Result<Option<ActiveDeployment>, EngineError> {
        self.with_conn(|conn| select_active(conn, project_name))
    }

    /// Audit trail of one deployment, oldest first
    pub fn events(&self, deploy_name: &str) -> Result<Vec<DeploymentEventRecord>, EngineError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, deploy_name, from_status, to_status, message, created_at
                 FROM deployment_event WHERE deploy_name = ?1 ORDER BY id",
            )?;
            let events = stmt
                .query_map(params![deploy_name], |row| {
                    Ok(DeploymentEventRecord {
                        id: row.get(0)?,
                        deploy_name: row.get(1)?,
                        from_status: row.get(2)?,
                        to_status: row.get(3)?,
                        message: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(events)
        })
    }
}

fn init_schema(conn: &Connection) -> Result<(), EngineError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS project (
            project_name TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS deployment (
            deploy_name TEXT PRIMARY KEY,
            project_name TEXT NOT NULL REFERENCES project(project_name),
            deploy_dir TEXT NOT NULL,
            web_static_dir TEXT,
            manifest_json TEXT NOT NULL,
            config_text TEXT NOT NULL,
            update_in_place INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            error TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS deployment_project_idx ON deployment(project_name);
        CREATE TABLE IF NOT EXISTS active_deployment (
            project_name TEXT PRIMARY KEY REFERENCES project(project_name),
            deploy_name TEXT NOT NULL REFERENCES deployment(deploy_name),
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS deployment_event (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            deploy_name TEXT NOT NULL REFERENCES deployment(deploy_name),
            from_status TEXT,
            to_status TEXT NOT NULL,
            message TEXT,
            created_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

const SELECT_DEPLOYMENT: &str = "SELECT deploy_name, project_name, deploy_dir, web_static_dir,
    manifest_json, config_text, update_in_place, status, error, created_at, updated_at
    FROM deployment";

/// Raw row before the JSON and state columns are parsed
struct DeploymentRow {
    deploy_name: String,
    project_name: String,
    deploy_dir: String,
    web_static_dir: Option<String>,
    manifest_json: String,
    config_text: String,
    update_in_place: bool,
    status: String,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl DeploymentRow {
    fn into_record(self) -> Result<DeploymentRecord, EngineError> {
        let state = self
            .status
            .parse::<DeploymentState>()
            .map_err(EngineError::Internal)?;
        Ok(DeploymentRecord {
            manifest: serde_json::from_str(&self.manifest_json)?,
            deploy_name: self.deploy_name,
            project_name: self.project_name,
            deploy_dir: self.deploy_dir,
            web_static_dir: self.web_static_dir,
            config_text: self.config_text,
            update_in_place: self.update_in_place,
            state,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn read_deployment_row(row: &Row<'_>) -> rusqlite::Result<DeploymentRow> {
    Ok(DeploymentRow {
        deploy_name: row.get(0)?,
        project_name: row.get(1)?,
        deploy_dir: row.get(2)?,
        web_static_dir: row.get(3)?,
        manifest_json: row.get(4)?,
        config_text: row.get(5)?,
        update_in_place: row.get(6)?,
        status: row.get(7)?,
        error: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn select_active(conn: &Connection, project_name: &str) -> Result<Option<ActiveDeployment>, EngineError> {
    let active = conn
        .query_row(
            "SELECT project_name, deploy_name, updated_at FROM active_deployment
             WHERE project_name = ?1",
            params![project_name],
            |row| {
                Ok(ActiveDeployment {
                    project_name: row.get(0)?,
                    deploy_name: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(active)
}

fn select_state(conn: &Connection, deploy_name: &str) -> Result<Option<DeploymentState>, EngineError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM deployment WHERE deploy_name = ?1",
            params![deploy_name],
            |row| row.get(0),
        )
        .optional()?;
    status
        .map(|s| s.parse::<DeploymentState>().map_err(EngineError::Internal))
        .transpose()
}

/// Run `event` through the state machine from a row's stored status
fn advance_state(
    deploy_name: &str,
    from: Option<DeploymentState>,
    event: DeploymentEvent,
    action: &str,
) -> Result<DeploymentState, EngineError> {
    let from = from.ok_or_else(|| EngineError::NotFound(format!("deployment {deploy_name}")))?;
    DeploymentFsm::from_state(from)
        .process(event)
        .map_err(|_| EngineError::InvalidState {
            deploy_name: deploy_name.to_string(),
            state: from.to_string(),
            action: action.to_string(),
        })
}

fn insert_event(
    conn: &Connection,
    deploy_name: &str,
    from: Option<DeploymentState>,
    to: DeploymentState,
    message: Option<&str>,
) -> Result<(), EngineError> {
    conn.execute(
        "INSERT INTO deployment_event(deploy_name, from_status, to_status, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            deploy_name,
            from.map(|s| s.as_str()),
            to.as_str(),
            message,
            now_rfc3339()
        ],
    )?;
    Ok(())
}
