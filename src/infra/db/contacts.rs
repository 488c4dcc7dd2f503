use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ContactsRepo, CreateContactParams, RepoError, UpdateContactParams},
    domain::entities::ContactRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const CONTACT_COLUMNS: &str = "id, owner_id, email, first_name, last_name, company, \
     custom_fields, subscribed, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: Uuid,
    owner_id: Uuid,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    company: Option<String>,
    custom_fields: serde_json::Value,
    subscribed: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ContactRow> for ContactRecord {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            company: row.company,
            custom_fields: row.custom_fields,
            subscribed: row.subscribed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl ContactsRepo for PostgresRepositories {
    async fn create_contact(
        &self,
        params: CreateContactParams,
    ) -> Result<ContactRecord, RepoError> {
        let sql = format!(
            "INSERT INTO contacts (id, owner_id, email, first_name, last_name, company, \
                 custom_fields, subscribed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {CONTACT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(params.owner_id)
            .bind(&params.email)
            .bind(&params.first_name)
            .bind(&params.last_name)
            .bind(&params.company)
            .bind(&params.custom_fields)
            .bind(params.subscribed)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_contact(
        &self,
        params: UpdateContactParams,
    ) -> Result<ContactRecord, RepoError> {
        let sql = format!(
            "UPDATE contacts \
                SET email = $3, first_name = $4, last_name = $5, company = $6, \
                    custom_fields = $7, subscribed = $8, updated_at = now() \
              WHERE id = $1 AND owner_id = $2 \
             RETURNING {CONTACT_COLUMNS}"
        );

        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(params.id)
            .bind(params.owner_id)
            .bind(&params.email)
            .bind(&params.first_name)
            .bind(&params.last_name)
            .bind(&params.company)
            .bind(&params.custom_fields)
            .bind(params.subscribed)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(Into::into).ok_or(RepoError::NotFound)
    }

    async fn delete_contact(&self, owner_id: Uuid, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM contacts WHERE id = $1 AND owner_id = $2")
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

    async fn find_contact(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<Option<ContactRecord>, RepoError> {
        let sql =
            format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = $1 AND owner_id = $2");

        let row = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRecord>, RepoError> {
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts \
              WHERE owner_id = $1 \
              ORDER BY created_at DESC, id DESC"
        );

        let rows = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(owner_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_contacts_by_ids(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<ContactRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts \
              WHERE owner_id = $1 AND id = ANY($2) \
              ORDER BY created_at DESC, id DESC"
        );

        let rows = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(owner_id)
            .bind(ids)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_subscribed_contacts(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ContactRecord>, RepoError> {
        let sql = format!(
            "SELECT {CONTACT_COLUMNS} FROM contacts \
              WHERE owner_id = $1 AND subscribed \
              ORDER BY created_at DESC, id DESC"
        );

        let rows = sqlx::query_as::<_, ContactRow>(&sql)
            .bind(owner_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_contacts(&self, owner_id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM contacts WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        count
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}
