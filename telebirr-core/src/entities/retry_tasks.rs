//! Durable queue of reconciliations that failed and wait for another try.

use kanau::processor::Processor;
use sqlx::types::Json;
use telebirr_sdk::objects::admin::{RetryTaskResponse, RetryTaskStatus as SdkRetryTaskStatus};
use telebirr_sdk::objects::callback::CallbackParams;
use time::OffsetDateTime;
use uuid::Uuid;

use super::GatewayFlow;
use crate::framework::DatabaseProcessor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RetryTask {
    pub id: Uuid,
    /// The receipt whose reconciliation failed.
    pub notification_id: Option<Uuid>,
    pub flow: GatewayFlow,
    pub correlation_id: String,
    /// The verified callback parameters, replayed on every attempt.
    pub payload: Json<CallbackParams>,
    pub attempt_count: i32,
    pub next_attempt_at: OffsetDateTime,
    pub status: RetryTaskStatus,
    pub last_error: Option<String>,
    /// Set while a worker holds the task; expired leases are claimable again.
    pub leased_until: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Retry task status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `telebirr_sdk::objects::admin::RetryTaskStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "retry_task_status")]
pub enum RetryTaskStatus {
    Pending,
    Completed,
    DeadLetter,
}

impl From<RetryTaskStatus> for SdkRetryTaskStatus {
    fn from(value: RetryTaskStatus) -> Self {
        match value {
            RetryTaskStatus::Pending => SdkRetryTaskStatus::Pending,
            RetryTaskStatus::Completed => SdkRetryTaskStatus::Completed,
            RetryTaskStatus::DeadLetter => SdkRetryTaskStatus::DeadLetter,
        }
    }
}

impl From<SdkRetryTaskStatus> for RetryTaskStatus {
    fn from(value: SdkRetryTaskStatus) -> Self {
        match value {
            SdkRetryTaskStatus::Pending => RetryTaskStatus::Pending,
            SdkRetryTaskStatus::Completed => RetryTaskStatus::Completed,
            SdkRetryTaskStatus::DeadLetter => RetryTaskStatus::DeadLetter,
        }
    }
}

impl From<RetryTask> for RetryTaskResponse {
    fn from(task: RetryTask) -> Self {
        RetryTaskResponse {
            id: task.id,
            flow: task.flow.into(),
            correlation_id: task.correlation_id,
            notification_id: task.notification_id,
            attempt_count: task.attempt_count,
            status: task.status.into(),
            next_attempt_at: task.next_attempt_at.unix_timestamp(),
            last_error: task.last_error,
            created_at: task.created_at.unix_timestamp(),
            updated_at: task.updated_at.unix_timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTaskInsert {
    pub notification_id: Option<Uuid>,
    pub flow: GatewayFlow,
    pub correlation_id: String,
    pub payload: CallbackParams,
    pub next_attempt_at: OffsetDateTime,
    pub last_error: Option<String>,
}

const RETRY_TASK_COLUMNS: &str = r#"
    id, notification_id, flow, correlation_id, payload, attempt_count, next_attempt_at,
    status, last_error, leased_until, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct EnqueueRetryTask(pub RetryTaskInsert);

impl Processor<EnqueueRetryTask> for DatabaseProcessor {
    type Output = RetryTask;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:EnqueueRetryTask")]
    async fn process(&self, cmd: EnqueueRetryTask) -> Result<RetryTask, sqlx::Error> {
        let insert = cmd.0;
        let sql = format!(
            r#"
            INSERT INTO retry_tasks
                (id, notification_id, flow, correlation_id, payload, attempt_count,
                 next_attempt_at, status, last_error)
            VALUES ($1, $2, $3, $4, $5, 0, $6, 'pending', $7)
            RETURNING {RETRY_TASK_COLUMNS}
            "#
        );
        sqlx::query_as::<_, RetryTask>(&sql)
            .bind(Uuid::now_v7())
            .bind(insert.notification_id)
            .bind(insert.flow)
            .bind(insert.correlation_id)
            .bind(Json(insert.payload))
            .bind(insert.next_attempt_at)
            .bind(insert.last_error)
            .fetch_one(&self.pool)
            .await
    }
}

/// Lease up to `limit` due tasks.
///
/// Rows locked by a concurrent claim are skipped, so several workers can
/// poll the same table without handing out a task twice.
#[derive(Debug, Clone)]
pub struct ClaimDueRetryTasks {
    pub now: OffsetDateTime,
    pub limit: i64,
    pub lease_until: OffsetDateTime,
}

impl Processor<ClaimDueRetryTasks> for DatabaseProcessor {
    type Output = Vec<RetryTask>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ClaimDueRetryTasks")]
    async fn process(&self, query: ClaimDueRetryTasks) -> Result<Vec<RetryTask>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE retry_tasks
            SET leased_until = $3, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM retry_tasks
                WHERE status = 'pending'
                  AND next_attempt_at <= $1
                  AND (leased_until IS NULL OR leased_until <= $1)
                ORDER BY next_attempt_at
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {RETRY_TASK_COLUMNS}
            "#
        );
        sqlx::query_as::<_, RetryTask>(&sql)
            .bind(query.now)
            .bind(query.limit)
            .bind(query.lease_until)
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct RescheduleRetryTask {
    pub id: Uuid,
    pub attempt_count: i32,
    pub next_attempt_at: OffsetDateTime,
    pub last_error: String,
}

impl Processor<RescheduleRetryTask> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RescheduleRetryTask")]
    async fn process(&self, cmd: RescheduleRetryTask) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE retry_tasks
            SET attempt_count = $2, next_attempt_at = $3, last_error = $4,
                leased_until = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(cmd.id)
        .bind(cmd.attempt_count)
        .bind(cmd.next_attempt_at)
        .bind(cmd.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CompleteRetryTask {
    pub id: Uuid,
    pub attempt_count: i32,
}

impl Processor<CompleteRetryTask> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CompleteRetryTask")]
    async fn process(&self, cmd: CompleteRetryTask) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE retry_tasks
            SET status = 'completed', attempt_count = $2, leased_until = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(cmd.id)
        .bind(cmd.attempt_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct DeadLetterRetryTask {
    pub id: Uuid,
    pub attempt_count: i32,
    pub last_error: String,
}

impl Processor<DeadLetterRetryTask> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeadLetterRetryTask")]
    async fn process(&self, cmd: DeadLetterRetryTask) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE retry_tasks
            SET status = 'dead_letter', attempt_count = $2, last_error = $3,
                leased_until = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(cmd.id)
        .bind(cmd.attempt_count)
        .bind(cmd.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ListRetryTasks {
    pub status: Option<RetryTaskStatus>,
    pub limit: i64,
    pub offset: i64,
}

impl Processor<ListRetryTasks> for DatabaseProcessor {
    type Output = Vec<RetryTask>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListRetryTasks")]
    async fn process(&self, query: ListRetryTasks) -> Result<Vec<RetryTask>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {RETRY_TASK_COLUMNS} FROM retry_tasks
            WHERE ($1::retry_task_status IS NULL OR status = $1)
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        );
        sqlx::query_as::<_, RetryTask>(&sql)
            .bind(query.status)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
    }
}

/// Put a dead-lettered task back on the queue with a fresh attempt budget.
#[derive(Debug, Clone)]
pub struct RequeueRetryTask {
    pub id: Uuid,
    pub next_attempt_at: OffsetDateTime,
}

impl Processor<RequeueRetryTask> for DatabaseProcessor {
    type Output = Option<RetryTask>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:RequeueRetryTask")]
    async fn process(&self, cmd: RequeueRetryTask) -> Result<Option<RetryTask>, sqlx::Error> {
        let sql = format!(
            r#"
            UPDATE retry_tasks
            SET status = 'pending', attempt_count = 0, next_attempt_at = $2,
                leased_until = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'dead_letter'
            RETURNING {RETRY_TASK_COLUMNS}
            "#
        );
        sqlx::query_as::<_, RetryTask>(&sql)
            .bind(cmd.id)
            .bind(cmd.next_attempt_at)
            .fetch_optional(&self.pool)
            .await
    }
}
