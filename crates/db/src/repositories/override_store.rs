use sqlx::Row;

use frontdesk_core::domain::overrides::{
    OverrideId, OverrideKind, OverridePriority, TemporaryOverride,
};

use super::{parse_timestamp, OverrideRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOverrideRepository {
    pool: DbPool,
}

impl SqlOverrideRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_override(row: &sqlx::sqlite::SqliteRow) -> Result<TemporaryOverride, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let org_id: String =
        row.try_get("org_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let kind_str: String =
        row.try_get("kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let priority_str: String =
        row.try_get("priority").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let original_text: String =
        row.try_get("original_text").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_text: String =
        row.try_get("customer_text").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let keywords_str: String =
        row.try_get("keywords").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_by: String =
        row.try_get("created_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let starts_at_str: String =
        row.try_get("starts_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at_str: String =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expire_on_reopen: i64 =
        row.try_get("expire_on_reopen").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let active: i64 =
        row.try_get("active").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let kind = OverrideKind::parse(&kind_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown override kind: {kind_str}")))?;
    let priority = OverridePriority::parse(&priority_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown override priority: {priority_str}"))
    })?;
    let keywords: Vec<String> = serde_json::from_str(&keywords_str).unwrap_or_default();

    Ok(TemporaryOverride {
        id: OverrideId(id),
        org_id,
        kind,
        priority,
        original_text,
        customer_text,
        keywords,
        created_by,
        starts_at: parse_timestamp(&starts_at_str)?,
        expires_at: parse_timestamp(&expires_at_str)?,
        expire_on_reopen: expire_on_reopen != 0,
        active: active != 0,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

const INSERT_OVERRIDE: &str = "INSERT INTO temporary_override
     (id, org_id, kind, priority, original_text, customer_text, keywords,
      created_by, starts_at, expires_at, expire_on_reopen, active, created_at)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

#[async_trait::async_trait]
impl OverrideRepository for SqlOverrideRepository {
    async fn find_by_id(
        &self,
        id: &OverrideId,
    ) -> Result<Option<TemporaryOverride>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, org_id, kind, priority, original_text, customer_text, keywords,
                    created_by, starts_at, expires_at, expire_on_reopen, active, created_at
             FROM temporary_override WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_override(r)?)),
            None => Ok(None),
        }
    }

    async fn get_active(
        &self,
        org_id: &str,
        kind: Option<OverrideKind>,
    ) -> Result<Vec<TemporaryOverride>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = if let Some(kind) = kind {
            sqlx::query(
                "SELECT id, org_id, kind, priority, original_text, customer_text, keywords,
                        created_by, starts_at, expires_at, expire_on_reopen, active, created_at
                 FROM temporary_override
                 WHERE org_id = ? AND kind = ? AND active = 1
                 ORDER BY CASE priority
                     WHEN 'urgent' THEN 3
                     WHEN 'high' THEN 2
                     WHEN 'medium' THEN 1
                     ELSE 0
                 END DESC, created_at DESC",
            )
            .bind(org_id)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, org_id, kind, priority, original_text, customer_text, keywords,
                        created_by, starts_at, expires_at, expire_on_reopen, active, created_at
                 FROM temporary_override
                 WHERE org_id = ? AND active = 1
                 ORDER BY CASE priority
                     WHEN 'urgent' THEN 3
                     WHEN 'high' THEN 2
                     WHEN 'medium' THEN 1
                     ELSE 0
                 END DESC, created_at DESC",
            )
            .bind(org_id)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(row_to_override).collect::<Result<Vec<_>, _>>()
    }

    async fn create(&self, row: TemporaryOverride) -> Result<(), RepositoryError> {
        let keywords_str = serde_json::to_string(&row.keywords)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(INSERT_OVERRIDE)
            .bind(&row.id.0)
            .bind(&row.org_id)
            .bind(row.kind.as_str())
            .bind(row.priority.as_str())
            .bind(&row.original_text)
            .bind(&row.customer_text)
            .bind(&keywords_str)
            .bind(&row.created_by)
            .bind(row.starts_at.to_rfc3339())
            .bind(row.expires_at.to_rfc3339())
            .bind(row.expire_on_reopen)
            .bind(row.active)
            .bind(row.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_replacing(
        &self,
        row: TemporaryOverride,
        deactivate_kind: Option<OverrideKind>,
    ) -> Result<(), RepositoryError> {
        let keywords_str = serde_json::to_string(&row.keywords)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        if let Some(kind) = deactivate_kind {
            sqlx::query(
                "UPDATE temporary_override SET active = 0
                 WHERE org_id = ? AND kind = ? AND active = 1",
            )
            .bind(&row.org_id)
            .bind(kind.as_str())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(INSERT_OVERRIDE)
            .bind(&row.id.0)
            .bind(&row.org_id)
            .bind(row.kind.as_str())
            .bind(row.priority.as_str())
            .bind(&row.original_text)
            .bind(&row.customer_text)
            .bind(&keywords_str)
            .bind(&row.created_by)
            .bind(row.starts_at.to_rfc3339())
            .bind(row.expires_at.to_rfc3339())
            .bind(row.expire_on_reopen)
            .bind(row.active)
            .bind(row.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn deactivate(&self, id: &OverrideId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE temporary_override SET active = 0 WHERE id = ? AND active = 1")
                .bind(&id.0)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn deactivate_kind(
        &self,
        org_id: &str,
        kind: OverrideKind,
    ) -> Result<u32, RepositoryError> {
        let result = sqlx::query(
            "UPDATE temporary_override SET active = 0
             WHERE org_id = ? AND kind = ? AND active = 1",
        )
        .bind(org_id)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as u32)
    }
}
