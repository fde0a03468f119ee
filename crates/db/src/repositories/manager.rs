use chrono::{DateTime, Utc};
use sqlx::Row;

use frontdesk_core::domain::manager::{phone_tail, ManagerId, ManagerNumber};

use super::{parse_timestamp, ManagerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlManagerRepository {
    pool: DbPool,
}

impl SqlManagerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_manager(row: &sqlx::sqlite::SqliteRow) -> Result<ManagerNumber, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let phone: String =
        row.try_get("phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let display_name: String =
        row.try_get("display_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let can_update_overrides: i64 =
        row.try_get("can_update_overrides").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let can_answer_queries: i64 =
        row.try_get("can_answer_queries").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let can_view_bookings: i64 =
        row.try_get("can_view_bookings").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let location_id: Option<String> =
        row.try_get("location_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_active_at_str: String =
        row.try_get("last_active_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(ManagerNumber {
        id: ManagerId(id),
        org_id,
        phone,
        display_name,
        can_update_overrides: can_update_overrides != 0,
        can_answer_queries: can_answer_queries != 0,
        can_view_bookings: can_view_bookings != 0,
        location_id,
        last_active_at: parse_timestamp(&last_active_at_str)?,
    })
}

#[async_trait::async_trait]
impl ManagerRepository for SqlManagerRepository {
    async fn find_by_id(&self, id: &ManagerId) -> Result<Option<ManagerNumber>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, phone, display_name, can_update_overrides,
                    can_answer_queries, can_view_bookings, location_id, last_active_at
             FROM manager_number WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_manager(r)?)),
            None => Ok(None),
        }
    }

    async fn resolve_by_phone(
        &self,
        org_id: &str,
        phone: &str,
    ) -> Result<Option<ManagerNumber>, RepositoryError> {
        let tail = phone_tail(phone);
        if tail.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT id, org_id, phone, display_name, can_update_overrides,
                    can_answer_queries, can_view_bookings, location_id, last_active_at
             FROM manager_number
             WHERE org_id = ? AND phone_tail = ?
             ORDER BY last_active_at DESC
             LIMIT 1",
        )
        .bind(org_id)
        .bind(&tail)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_manager(r)?)),
            None => Ok(None),
        }
    }

    async fn find_for_location(
        &self,
        org_id: &str,
        location_id: &str,
    ) -> Result<Option<ManagerNumber>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, phone, display_name, can_update_overrides,
                    can_answer_queries, can_view_bookings, location_id, last_active_at
             FROM manager_number
             WHERE org_id = ? AND location_id = ?
             ORDER BY last_active_at DESC
             LIMIT 1",
        )
        .bind(org_id)
        .bind(location_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_manager(r)?)),
            None => Ok(None),
        }
    }

    async fn most_recently_active(
        &self,
        org_id: &str,
    ) -> Result<Option<ManagerNumber>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, phone, display_name, can_update_overrides,
                    can_answer_queries, can_view_bookings, location_id, last_active_at
             FROM manager_number
             WHERE org_id = ? AND can_answer_queries = 1
             ORDER BY last_active_at DESC
             LIMIT 1",
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_manager(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, manager: ManagerNumber) -> Result<(), RepositoryError> {
        let tail = phone_tail(&manager.phone);

        sqlx::query(
            "INSERT INTO manager_number (id, org_id, phone, phone_tail, display_name,
                                         can_update_overrides, can_answer_queries,
                                         can_view_bookings, location_id, last_active_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 phone = excluded.phone,
                 phone_tail = excluded.phone_tail,
                 display_name = excluded.display_name,
                 can_update_overrides = excluded.can_update_overrides,
                 can_answer_queries = excluded.can_answer_queries,
                 can_view_bookings = excluded.can_view_bookings,
                 location_id = excluded.location_id,
                 last_active_at = excluded.last_active_at",
        )
        .bind(&manager.id.0)
        .bind(&manager.org_id)
        .bind(&manager.phone)
        .bind(&tail)
        .bind(&manager.display_name)
        .bind(manager.can_update_overrides)
        .bind(manager.can_answer_queries)
        .bind(manager.can_view_bookings)
        .bind(&manager.location_id)
        .bind(manager.last_active_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_activity(
        &self,
        id: &ManagerId,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE manager_number SET last_active_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
