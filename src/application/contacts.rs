//! Owner-scoped contact management.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{
    ContactsRepo, CreateContactParams, RepoError, UpdateContactParams,
};
use crate::domain::entities::ContactRecord;

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("contact not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct ContactInput {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub custom_fields: serde_json::Value,
    pub subscribed: bool,
}

#[derive(Clone)]
pub struct ContactService {
    repo: Arc<dyn ContactsRepo>,
}

impl ContactService {
    pub fn new(repo: Arc<dyn ContactsRepo>) -> Self {
        Self { repo }
    }

    pub async fn create_contact(
        &self,
        owner_id: Uuid,
        input: ContactInput,
    ) -> Result<ContactRecord, ContactError> {
        validate_email(&input.email)?;

        let contact = self
            .repo
            .create_contact(CreateContactParams {
                owner_id,
                email: input.email,
                first_name: input.first_name,
                last_name: input.last_name,
                company: input.company,
                custom_fields: input.custom_fields,
                subscribed: input.subscribed,
            })
            .await?;

        Ok(contact)
    }

    pub async fn update_contact(
        &self,
        owner_id: Uuid,
        id: Uuid,
        input: ContactInput,
    ) -> Result<ContactRecord, ContactError> {
        validate_email(&input.email)?;

        self.repo
            .find_contact(owner_id, id)
            .await?
            .ok_or(ContactError::NotFound)?;

        let contact = self
            .repo
            .update_contact(UpdateContactParams {
                id,
                owner_id,
                email: input.email,
                first_name: input.first_name,
                last_name: input.last_name,
                company: input.company,
                custom_fields: input.custom_fields,
                subscribed: input.subscribed,
            })
            .await?;

        Ok(contact)
    }

    pub async fn delete_contact(&self, owner_id: Uuid, id: Uuid) -> Result<(), ContactError> {
        self.repo
            .find_contact(owner_id, id)
            .await?
            .ok_or(ContactError::NotFound)?;
        self.repo.delete_contact(owner_id, id).await?;
        Ok(())
    }

    pub async fn get_contact(&self, owner_id: Uuid, id: Uuid) -> Result<ContactRecord, ContactError> {
        self.repo
            .find_contact(owner_id, id)
            .await?
            .ok_or(ContactError::NotFound)
    }

    pub async fn list_contacts(&self, owner_id: Uuid) -> Result<Vec<ContactRecord>, ContactError> {
        Ok(self.repo.list_contacts(owner_id).await?)
    }
}

fn validate_email(email: &str) -> Result<(), ContactError> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Err(ContactError::ConstraintViolation("email"));
    }
    // Mailbox-level validation happens at delivery time; reject only the
    // obviously unusable here.
    if !trimmed.contains('@') || trimmed.starts_with('@') || trimmed.ends_with('@') {
        return Err(ContactError::ConstraintViolation("email"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_and_malformed_addresses() {
        assert!(validate_email("").is_err());
        assert!(validate_email("   ").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("jane@").is_err());
    }

    #[test]
    fn accepts_plausible_addresses() {
        assert!(validate_email("jane@example.com").is_ok());
        assert!(validate_email(" jane.doe+tag@mail.example ").is_ok());
    }
}
