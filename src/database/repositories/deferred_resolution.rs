//! SeaORM-based repository for the deferred resolution backlog
//!
//! Every status change is a conditional `UPDATE ... WHERE status = <expected>`,
//! so two workers racing for the same row cannot both win.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr,
};
use std::str::FromStr;
use std::sync::Arc;

use crate::entities::{deferred_resolutions, prelude::DeferredResolutions};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::deferred::{DeferredEntry, DeferredStatus, EnqueueOutcome, QueueStatusCounts};

/// Fields written when an attempt fails
#[derive(Debug, Clone)]
pub struct FailedAttempt {
    pub attempts: u32,
    pub status: DeferredStatus,
    pub next_attempt_at: DateTime<Utc>,
    pub error: String,
}

#[derive(Clone)]
pub struct DeferredResolutionSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl DeferredResolutionSeaOrmRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    pub async fn find(&self, normalized_name: &str) -> RepositoryResult<Option<DeferredEntry>> {
        DeferredResolutions::find_by_id(normalized_name.to_string())
            .one(&*self.connection)
            .await?
            .map(Self::model_to_domain)
            .transpose()
    }

    /// Insert a pending row due at `now`, or bump `last_seen` on an existing one
    pub async fn upsert_pending(
        &self,
        normalized_name: &str,
        raw_name: &str,
        temp_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<EnqueueOutcome> {
        if self.touch(normalized_name, now).await? {
            return Ok(EnqueueOutcome::Refreshed);
        }

        let active_model = deferred_resolutions::ActiveModel {
            normalized_name: Set(normalized_name.to_string()),
            raw_name: Set(raw_name.to_string()),
            temp_id: Set(temp_id.to_string()),
            status: Set(DeferredStatus::Pending.to_string()),
            attempts: Set(0),
            next_attempt_at: Set(now),
            last_error: Set(None),
            first_seen: Set(now),
            last_seen: Set(now),
            updated_at: Set(now),
        };

        match DeferredResolutions::insert(active_model)
            .exec_without_returning(&*self.connection)
            .await
        {
            Ok(_) => Ok(EnqueueOutcome::Inserted),
            // another writer queued the same name in between
            Err(e) if is_unique_violation(&e) => {
                self.touch(normalized_name, now).await?;
                Ok(EnqueueOutcome::Refreshed)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn touch(&self, normalized_name: &str, now: DateTime<Utc>) -> RepositoryResult<bool> {
        let outcome = DeferredResolutions::update_many()
            .col_expr(deferred_resolutions::Column::LastSeen, Expr::value(now))
            .filter(deferred_resolutions::Column::NormalizedName.eq(normalized_name))
            .exec(&*self.connection)
            .await?;
        Ok(outcome.rows_affected > 0)
    }

    /// Pending rows due at `now`, oldest schedule first
    pub async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> RepositoryResult<Vec<DeferredEntry>> {
        DeferredResolutions::find()
            .filter(deferred_resolutions::Column::Status.eq(DeferredStatus::Pending.to_string()))
            .filter(deferred_resolutions::Column::NextAttemptAt.lte(now))
            .order_by_asc(deferred_resolutions::Column::NextAttemptAt)
            .order_by_asc(deferred_resolutions::Column::NormalizedName)
            .limit(limit)
            .all(&*self.connection)
            .await?
            .into_iter()
            .map(Self::model_to_domain)
            .collect()
    }

    /// Move one row between statuses; false when the row was not in `from`
    pub async fn transition(
        &self,
        normalized_name: &str,
        from: DeferredStatus,
        to: DeferredStatus,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let outcome = DeferredResolutions::update_many()
            .col_expr(
                deferred_resolutions::Column::Status,
                Expr::value(to.to_string()),
            )
            .col_expr(deferred_resolutions::Column::UpdatedAt, Expr::value(now))
            .filter(deferred_resolutions::Column::NormalizedName.eq(normalized_name))
            .filter(deferred_resolutions::Column::Status.eq(from.to_string()))
            .exec(&*self.connection)
            .await?;
        Ok(outcome.rows_affected > 0)
    }

    /// Record a failed attempt on a `processing` row
    pub async fn record_failure(
        &self,
        normalized_name: &str,
        failure: &FailedAttempt,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let attempts = i32::try_from(failure.attempts).unwrap_or(i32::MAX);
        let outcome = DeferredResolutions::update_many()
            .col_expr(
                deferred_resolutions::Column::Status,
                Expr::value(failure.status.to_string()),
            )
            .col_expr(deferred_resolutions::Column::Attempts, Expr::value(attempts))
            .col_expr(
                deferred_resolutions::Column::NextAttemptAt,
                Expr::value(failure.next_attempt_at),
            )
            .col_expr(
                deferred_resolutions::Column::LastError,
                Expr::value(Some(failure.error.clone())),
            )
            .col_expr(deferred_resolutions::Column::UpdatedAt, Expr::value(now))
            .filter(deferred_resolutions::Column::NormalizedName.eq(normalized_name))
            .filter(
                deferred_resolutions::Column::Status.eq(DeferredStatus::Processing.to_string()),
            )
            .exec(&*self.connection)
            .await?;
        Ok(outcome.rows_affected > 0)
    }

    /// Return `processing` rows untouched since `cutoff` to `pending`
    pub async fn reset_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let outcome = DeferredResolutions::update_many()
            .col_expr(
                deferred_resolutions::Column::Status,
                Expr::value(DeferredStatus::Pending.to_string()),
            )
            .col_expr(deferred_resolutions::Column::UpdatedAt, Expr::value(now))
            .filter(
                deferred_resolutions::Column::Status.eq(DeferredStatus::Processing.to_string()),
            )
            .filter(deferred_resolutions::Column::UpdatedAt.lt(cutoff))
            .exec(&*self.connection)
            .await?;
        Ok(outcome.rows_affected)
    }

    /// Move every `failed` row back to `pending` with a fresh attempt count
    pub async fn reset_failed(&self, now: DateTime<Utc>) -> RepositoryResult<u64> {
        let outcome = DeferredResolutions::update_many()
            .col_expr(
                deferred_resolutions::Column::Status,
                Expr::value(DeferredStatus::Pending.to_string()),
            )
            .col_expr(deferred_resolutions::Column::Attempts, Expr::value(0))
            .col_expr(deferred_resolutions::Column::NextAttemptAt, Expr::value(now))
            .col_expr(deferred_resolutions::Column::UpdatedAt, Expr::value(now))
            .filter(deferred_resolutions::Column::Status.eq(DeferredStatus::Failed.to_string()))
            .exec(&*self.connection)
            .await?;
        Ok(outcome.rows_affected)
    }

    pub async fn count_by_status(&self, status: DeferredStatus) -> RepositoryResult<u64> {
        Ok(DeferredResolutions::find()
            .filter(deferred_resolutions::Column::Status.eq(status.to_string()))
            .count(&*self.connection)
            .await?)
    }

    pub async fn status_counts(&self) -> RepositoryResult<QueueStatusCounts> {
        Ok(QueueStatusCounts {
            pending: self.count_by_status(DeferredStatus::Pending).await?,
            processing: self.count_by_status(DeferredStatus::Processing).await?,
            done: self.count_by_status(DeferredStatus::Done).await?,
            failed: self.count_by_status(DeferredStatus::Failed).await?,
        })
    }

    fn model_to_domain(model: deferred_resolutions::Model) -> RepositoryResult<DeferredEntry> {
        let status = DeferredStatus::from_str(&model.status)
            .map_err(|e| RepositoryError::invalid_value("status", e.to_string()))?;
        let attempts = u32::try_from(model.attempts)
            .map_err(|e| RepositoryError::invalid_value("attempts", e.to_string()))?;

        Ok(DeferredEntry {
            normalized_name: model.normalized_name,
            raw_name: model.raw_name,
            temp_id: model.temp_id,
            status,
            attempts,
            next_attempt_at: model.next_attempt_at,
            last_error: model.last_error,
            first_seen: model.first_seen,
            last_seen: model.last_seen,
            updated_at: model.updated_at,
        })
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
