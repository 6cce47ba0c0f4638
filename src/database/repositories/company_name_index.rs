//! SeaORM-based resolution cache repository
//!
//! Writes follow one rule for every writer (resolver backflow, provider
//! write-through, queue backflow): insert if absent, otherwise overwrite only
//! when the incoming confidence is strictly higher. Upgrades are conditional
//! updates, so concurrent writers never lower a stored confidence.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, Set, SqlErr,
};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::entities::{company_name_index, prelude::CompanyNameIndex};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{CacheEntry, MatchType};
use crate::repositories::{InsertResult, ResolutionCache};

/// Keys per `IN (...)` query
const LOOKUP_CHUNK_SIZE: usize = 500;

/// SeaORM-backed `ResolutionCache`
#[derive(Clone)]
pub struct CompanyNameIndexSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl CompanyNameIndexSeaOrmRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Number of cached names
    pub async fn count(&self) -> RepositoryResult<u64> {
        Ok(CompanyNameIndex::find().count(&*self.connection).await?)
    }

    /// Insert or upgrade entries on a caller-supplied connection or transaction
    pub async fn insert_batch_in<C>(
        &self,
        conn: &C,
        entries: Vec<CacheEntry>,
    ) -> RepositoryResult<InsertResult>
    where
        C: ConnectionTrait,
    {
        let mut result = InsertResult::default();

        // collapse duplicate keys inside the batch to the most confident entry
        let mut best: HashMap<String, CacheEntry> = HashMap::with_capacity(entries.len());
        for entry in entries {
            if entry.normalized_name.is_empty() || entry.company_id.trim().is_empty() {
                continue;
            }
            match best.entry(entry.normalized_name.clone()) {
                Entry::Occupied(mut slot) => {
                    if entry.confidence > slot.get().confidence {
                        slot.insert(entry);
                    }
                    result.kept_existing += 1;
                }
                Entry::Vacant(slot) => {
                    slot.insert(entry);
                }
            }
        }

        if best.is_empty() {
            return Ok(result);
        }

        let keys: Vec<String> = best.keys().cloned().collect();
        let existing = Self::find_models(conn, &keys).await?;
        let now = Utc::now();

        for (key, entry) in best {
            if existing.contains_key(&key) {
                if Self::upgrade(conn, &entry, now).await? {
                    result.updated += 1;
                } else {
                    result.kept_existing += 1;
                }
                continue;
            }

            let active_model = company_name_index::ActiveModel {
                normalized_name: Set(key),
                company_id: Set(entry.company_id),
                match_type: Set(entry.match_type.to_string()),
                confidence: Set(entry.confidence),
                source: Set(entry.source),
                created_at: Set(now),
                updated_at: Set(now),
            };

            match CompanyNameIndex::insert(active_model)
                .exec_without_returning(conn)
                .await
            {
                Ok(_) => result.inserted += 1,
                Err(e) if is_unique_violation(&e) => result.conflicts += 1,
                Err(e) => return Err(e.into()),
            }
        }

        debug!(
            inserted = result.inserted,
            updated = result.updated,
            kept_existing = result.kept_existing,
            conflicts = result.conflicts,
            "Resolution cache batch written"
        );
        Ok(result)
    }

    /// Overwrite a stored entry only if its confidence is strictly lower
    async fn upgrade<C>(
        conn: &C,
        entry: &CacheEntry,
        now: chrono::DateTime<Utc>,
    ) -> RepositoryResult<bool>
    where
        C: ConnectionTrait,
    {
        let outcome = CompanyNameIndex::update_many()
            .col_expr(
                company_name_index::Column::CompanyId,
                Expr::value(entry.company_id.clone()),
            )
            .col_expr(
                company_name_index::Column::MatchType,
                Expr::value(entry.match_type.to_string()),
            )
            .col_expr(
                company_name_index::Column::Confidence,
                Expr::value(entry.confidence),
            )
            .col_expr(
                company_name_index::Column::Source,
                Expr::value(entry.source.clone()),
            )
            .col_expr(company_name_index::Column::UpdatedAt, Expr::value(now))
            .filter(company_name_index::Column::NormalizedName.eq(entry.normalized_name.as_str()))
            .filter(company_name_index::Column::Confidence.lt(entry.confidence))
            .exec(conn)
            .await?;
        Ok(outcome.rows_affected > 0)
    }

    async fn find_models<C>(
        conn: &C,
        keys: &[String],
    ) -> RepositoryResult<HashMap<String, company_name_index::Model>>
    where
        C: ConnectionTrait,
    {
        let mut found = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(LOOKUP_CHUNK_SIZE) {
            let models = CompanyNameIndex::find()
                .filter(company_name_index::Column::NormalizedName.is_in(chunk.iter().cloned()))
                .all(conn)
                .await?;
            for model in models {
                found.insert(model.normalized_name.clone(), model);
            }
        }
        Ok(found)
    }

    fn model_to_domain(model: company_name_index::Model) -> RepositoryResult<CacheEntry> {
        let match_type = MatchType::from_str(&model.match_type)
            .map_err(|e| RepositoryError::invalid_value("match_type", e.to_string()))?;
        Ok(CacheEntry::new(
            model.normalized_name,
            model.company_id,
            match_type,
            model.confidence,
            model.source,
        ))
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[async_trait]
impl ResolutionCache for CompanyNameIndexSeaOrmRepository {
    async fn lookup(&self, normalized_name: &str) -> RepositoryResult<Option<CacheEntry>> {
        if normalized_name.is_empty() {
            return Ok(None);
        }
        CompanyNameIndex::find_by_id(normalized_name.to_string())
            .one(&*self.connection)
            .await?
            .map(Self::model_to_domain)
            .transpose()
    }

    async fn lookup_many(
        &self,
        normalized_names: &[String],
    ) -> RepositoryResult<HashMap<String, CacheEntry>> {
        let keys: Vec<String> = normalized_names
            .iter()
            .filter(|name| !name.is_empty())
            .cloned()
            .collect();
        let models = Self::find_models(&*self.connection, &keys).await?;
        models
            .into_iter()
            .map(|(key, model)| Ok((key, Self::model_to_domain(model)?)))
            .collect()
    }

    async fn insert_batch(&self, entries: Vec<CacheEntry>) -> RepositoryResult<InsertResult> {
        self.insert_batch_in(&*self.connection, entries).await
    }
}
