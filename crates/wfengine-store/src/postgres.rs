//! PostgreSQL-backed `Store`, selected when `DATABASE_URL` is set.
//!
//! Uses runtime-checked `sqlx::query`/`query_as` (not the `query!` macro,
//! which needs a live database at compile time) and converts between row
//! structs and the domain model, mirroring the teacher's `n8n-db::storage`
//! conversion layer.

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;

use wfengine_model::credential::Credential;
use wfengine_model::edge::Edge;
use wfengine_model::execution::{ExecutionStatus, StepExecution, StepStatus, WorkflowExecution};
use wfengine_model::step::{Step, StepKind};
use wfengine_model::workflow::Workflow;

use crate::error::{StoreError, StoreResult};
use crate::Store;

fn kind_to_str(kind: StepKind) -> StoreResult<String> {
    Ok(serde_json::to_value(kind)?.as_str().expect("StepKind serializes to a string").to_string())
}

fn kind_from_str(s: &str) -> StoreResult<StepKind> {
    Ok(serde_json::from_value(serde_json::Value::String(s.to_string()))?)
}

fn status_to_str<T: serde::Serialize>(status: T) -> StoreResult<String> {
    Ok(serde_json::to_value(status)?.as_str().expect("status serializes to a string").to_string())
}

fn exec_status_from_str(s: &str) -> StoreResult<ExecutionStatus> {
    Ok(serde_json::from_value(serde_json::Value::String(s.to_string()))?)
}

fn step_status_from_str(s: &str) -> StoreResult<StepStatus> {
    Ok(serde_json::from_value(serde_json::Value::String(s.to_string()))?)
}

/// `sqlx::PgPool`-backed `Store`.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_workflow(row: &sqlx::postgres::PgRow) -> Workflow {
        Workflow {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn row_to_step(row: &sqlx::postgres::PgRow) -> StoreResult<Step> {
        Ok(Step {
            id: row.get("id"),
            workflow_id: row.get("workflow_id"),
            kind: kind_from_str(row.get("kind"))?,
            label: row.get("label"),
            position: row.get("position"),
            config: row.get::<serde_json::Value, _>("config").as_object().cloned().unwrap_or_default(),
            order: row.get("step_order"),
        })
    }

    fn row_to_edge(row: &sqlx::postgres::PgRow) -> Edge {
        Edge {
            id: row.get("id"),
            workflow_id: row.get("workflow_id"),
            source_id: row.get("source_id"),
            target_id: row.get("target_id"),
            label: row.get("label"),
        }
    }

    fn row_to_execution(row: &sqlx::postgres::PgRow) -> StoreResult<WorkflowExecution> {
        Ok(WorkflowExecution {
            id: row.get("id"),
            workflow_id: row.get("workflow_id"),
            status: exec_status_from_str(row.get("status"))?,
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            error: row.get("error"),
            outputs: serde_json::from_value(row.get("outputs"))?,
        })
    }

    fn row_to_step_execution(row: &sqlx::postgres::PgRow) -> StoreResult<StepExecution> {
        Ok(StepExecution {
            id: row.get("id"),
            workflow_execution_id: row.get("workflow_execution_id"),
            step_id: row.get("step_id"),
            status: step_status_from_str(row.get("status"))?,
            start_time: row.get("start_time"),
            end_time: row.get("end_time"),
            error: row.get("error"),
            input: row.get("input"),
            output: row.get("output"),
        })
    }

    fn row_to_credential(row: &sqlx::postgres::PgRow) -> Credential {
        Credential {
            id: row.get("id"),
            name: row.get("name"),
            kind: row.get("kind"),
            encrypted_data: row.get("encrypted_data"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_workflow(&self, id: &str) -> StoreResult<Option<Workflow>> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(Self::row_to_workflow))
    }

    async fn list_workflows(&self) -> StoreResult<Vec<Workflow>> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY updated_at DESC").fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::row_to_workflow).collect())
    }

    async fn create_workflow(&self, workflow: Workflow) -> StoreResult<Workflow> {
        sqlx::query(
            "INSERT INTO workflows (id, name, description, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(workflow)
    }

    async fn update_workflow(&self, workflow: Workflow, steps: Vec<Step>, edges: Vec<Edge>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE workflows SET name = $2, description = $3, is_active = $4, updated_at = $5 WHERE id = $1",
        )
        .bind(&workflow.id)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.is_active)
        .bind(workflow.updated_at)
        .execute(&mut *tx)
        .await?;

        // Edges first, then steps, to satisfy the foreign-key ordering (§4.6).
        sqlx::query("DELETE FROM edges WHERE workflow_id = $1").bind(&workflow.id).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM steps WHERE workflow_id = $1").bind(&workflow.id).execute(&mut *tx).await?;

        for step in &steps {
            sqlx::query(
                "INSERT INTO steps (id, workflow_id, kind, label, position, config, step_order) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(&step.id)
            .bind(&step.workflow_id)
            .bind(kind_to_str(step.kind)?)
            .bind(&step.label)
            .bind(&step.position)
            .bind(serde_json::Value::Object(step.config.clone()))
            .bind(step.order)
            .execute(&mut *tx)
            .await?;
        }

        for edge in &edges {
            sqlx::query("INSERT INTO edges (id, workflow_id, source_id, target_id, label) VALUES ($1, $2, $3, $4, $5)")
                .bind(&edge.id)
                .bind(&edge.workflow_id)
                .bind(&edge.source_id)
                .bind(&edge.target_id)
                .bind(&edge.label)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_workflow(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_steps(&self, workflow_id: &str) -> StoreResult<Vec<Step>> {
        let rows = sqlx::query("SELECT * FROM steps WHERE workflow_id = $1 ORDER BY step_order ASC, id ASC")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_step).collect()
    }

    async fn get_edges(&self, workflow_id: &str) -> StoreResult<Vec<Edge>> {
        let rows =
            sqlx::query("SELECT * FROM edges WHERE workflow_id = $1").bind(workflow_id).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::row_to_edge).collect())
    }

    async fn create_execution(&self, execution: WorkflowExecution) -> StoreResult<WorkflowExecution> {
        sqlx::query(
            "INSERT INTO workflow_executions (id, workflow_id, status, start_time, end_time, error, outputs) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&execution.id)
        .bind(&execution.workflow_id)
        .bind(status_to_str(execution.status)?)
        .bind(execution.start_time)
        .bind(execution.end_time)
        .bind(&execution.error)
        .bind(serde_json::to_value(&execution.outputs)?)
        .execute(&self.pool)
        .await?;
        Ok(execution)
    }

    async fn update_execution(&self, execution: WorkflowExecution) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE workflow_executions SET status = $2, end_time = $3, error = $4, outputs = $5 WHERE id = $1",
        )
        .bind(&execution.id)
        .bind(status_to_str(execution.status)?)
        .bind(execution.end_time)
        .bind(&execution.error)
        .bind(serde_json::to_value(&execution.outputs)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> StoreResult<Option<WorkflowExecution>> {
        let row =
            sqlx::query("SELECT * FROM workflow_executions WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_execution).transpose()
    }

    async fn list_executions(&self, workflow_id: &str) -> StoreResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query("SELECT * FROM workflow_executions WHERE workflow_id = $1 ORDER BY start_time DESC")
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_execution).collect()
    }

    async fn create_step_execution(&self, step_execution: StepExecution) -> StoreResult<StepExecution> {
        sqlx::query(
            "INSERT INTO step_executions \
             (id, workflow_execution_id, step_id, status, start_time, end_time, error, input, output) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&step_execution.id)
        .bind(&step_execution.workflow_execution_id)
        .bind(&step_execution.step_id)
        .bind(status_to_str(step_execution.status)?)
        .bind(step_execution.start_time)
        .bind(step_execution.end_time)
        .bind(&step_execution.error)
        .bind(&step_execution.input)
        .bind(&step_execution.output)
        .execute(&self.pool)
        .await?;
        Ok(step_execution)
    }

    async fn update_step_execution(&self, step_execution: StepExecution) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE step_executions SET status = $2, end_time = $3, error = $4, output = $5 WHERE id = $1",
        )
        .bind(&step_execution.id)
        .bind(status_to_str(step_execution.status)?)
        .bind(step_execution.end_time)
        .bind(&step_execution.error)
        .bind(&step_execution.output)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_credentials(&self) -> StoreResult<Vec<Credential>> {
        let rows = sqlx::query("SELECT * FROM credentials ORDER BY created_at DESC").fetch_all(&self.pool).await?;
        Ok(rows.iter().map(Self::row_to_credential).collect())
    }

    async fn create_credential(&self, credential: Credential) -> StoreResult<Credential> {
        sqlx::query("INSERT INTO credentials (id, name, kind, encrypted_data, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(&credential.id)
            .bind(&credential.name)
            .bind(&credential.kind)
            .bind(&credential.encrypted_data)
            .bind(credential.created_at)
            .execute(&self.pool)
            .await?;
        Ok(credential)
    }

    async fn delete_credential(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
