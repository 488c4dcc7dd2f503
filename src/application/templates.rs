//! Owner-scoped template management.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{
    CreateTemplateParams, RepoError, TemplatesRepo, UpdateTemplateParams,
};
use crate::domain::entities::TemplateRecord;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("{0}")]
    ConstraintViolation(&'static str),
    #[error("template not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct TemplateInput {
    pub name: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone)]
pub struct TemplateService {
    repo: Arc<dyn TemplatesRepo>,
}

impl TemplateService {
    pub fn new(repo: Arc<dyn TemplatesRepo>) -> Self {
        Self { repo }
    }

    pub async fn create_template(
        &self,
        owner_id: Uuid,
        input: TemplateInput,
    ) -> Result<TemplateRecord, TemplateError> {
        validate(&input)?;

        let template = self
            .repo
            .create_template(CreateTemplateParams {
                owner_id,
                name: input.name,
                subject: input.subject,
                body: input.body,
            })
            .await?;

        Ok(template)
    }

    pub async fn update_template(
        &self,
        owner_id: Uuid,
        id: Uuid,
        input: TemplateInput,
    ) -> Result<TemplateRecord, TemplateError> {
        validate(&input)?;

        self.repo
            .find_template(owner_id, id)
            .await?
            .ok_or(TemplateError::NotFound)?;

        let template = self
            .repo
            .update_template(UpdateTemplateParams {
                id,
                owner_id,
                name: input.name,
                subject: input.subject,
                body: input.body,
            })
            .await?;

        Ok(template)
    }

    pub async fn delete_template(&self, owner_id: Uuid, id: Uuid) -> Result<(), TemplateError> {
        self.repo
            .find_template(owner_id, id)
            .await?
            .ok_or(TemplateError::NotFound)?;
        self.repo.delete_template(owner_id, id).await?;
        Ok(())
    }

    pub async fn get_template(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> Result<TemplateRecord, TemplateError> {
        self.repo
            .find_template(owner_id, id)
            .await?
            .ok_or(TemplateError::NotFound)
    }

    pub async fn list_templates(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<TemplateRecord>, TemplateError> {
        Ok(self.repo.list_templates(owner_id).await?)
    }
}

fn validate(input: &TemplateInput) -> Result<(), TemplateError> {
    for (value, field) in [
        (&input.name, "name"),
        (&input.subject, "subject"),
        (&input.body, "body"),
    ] {
        if value.trim().is_empty() {
            return Err(TemplateError::ConstraintViolation(field));
        }
    }
    Ok(())
}
