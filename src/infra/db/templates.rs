use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreateTemplateParams, RepoError, TemplatesRepo, UpdateTemplateParams},
    domain::entities::TemplateRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const TEMPLATE_COLUMNS: &str = "id, owner_id, name, subject, body, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    subject: String,
    body: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<TemplateRow> for TemplateRecord {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            subject: row.subject,
            body: row.body,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl TemplatesRepo for PostgresRepositories {
    async fn create_template(
        &self,
        params: CreateTemplateParams,
    ) -> Result<TemplateRecord, RepoError> {
        let sql = format!(
            "INSERT INTO templates (id, owner_id, name, subject, body) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {TEMPLATE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.owner_id)
            .bind(&params.name)
            .bind(&params.subject)
            .bind(&params.body)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_template(
        &self,
        params: UpdateTemplateParams,
    ) -> Result<TemplateRecord, RepoError> {
        let sql = format!(
            "UPDATE templates \
                SET name = $3, subject = $4, body = $5, updated_at = now() \
              WHERE id = $1 AND owner_id = $2 \
             RETURNING {TEMPLATE_COLUMNS}"
        );

        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(params.id)
            .bind(params.owner_id)
            .bind(&params.name)
            .bind(&params.subject)
            .bind(&params.body)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(Into::into).ok_or(RepoError::NotFound)
    }

    async fn delete_template(&self, owner_id: Uuid, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM templates WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn find_template(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<TemplateRecord>, RepoError> {
        let sql =
            format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = $1 AND owner_id = $2");

        let row = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_templates(&self, owner_id: Uuid) -> Result<Vec<TemplateRecord>, RepoError> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates \
              WHERE owner_id = $1 \
              ORDER BY created_at DESC, id DESC"
        );

        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(owner_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
