use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::campaigns::{CampaignError, CreateCampaignCommand};
use crate::application::contacts::{ContactError, ContactInput};
use crate::application::dashboard::DashboardError;
use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use crate::application::templates::{TemplateError, TemplateInput};
use crate::infra::http::middleware::OwnerId;

use super::error::{ApiError, codes};
use super::models::{CampaignCreateRequest, ContactRequest, TemplateRequest};
use super::state::ApiState;

/// -------- Campaigns --------

pub async fn list_campaigns(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<impl IntoResponse, ApiError> {
    let campaigns = state
        .campaigns
        .list_campaigns(owner.0)
        .await
        .map_err(campaign_to_api)?;
    Ok(Json(campaigns))
}

pub async fn create_campaign(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Json(payload): Json<CampaignCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let command = CreateCampaignCommand {
        name: payload.name,
        template_id: payload.template_id,
        contact_ids: payload.contact_ids,
        scheduled_at: payload.scheduled_at,
    };

    let campaign = state
        .campaigns
        .create_campaign(owner.0, command)
        .await
        .map_err(campaign_to_api)?;

    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn get_campaign(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = state
        .campaigns
        .get_campaign(owner.0, id)
        .await
        .map_err(campaign_to_api)?;
    Ok(Json(campaign))
}

pub async fn delete_campaign(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .campaigns
        .delete_campaign(owner.0, id)
        .await
        .map_err(campaign_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_campaign(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let accepted = state
        .campaigns
        .send_campaign(owner.0, id)
        .await
        .map_err(campaign_to_api)?;
    Ok(Json(accepted))
}

pub async fn campaign_analytics(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let analytics = state
        .campaigns
        .analytics(owner.0, id)
        .await
        .map_err(campaign_to_api)?;
    Ok(Json(analytics))
}

pub async fn list_campaign_emails(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let emails = state
        .campaigns
        .list_emails(owner.0, id)
        .await
        .map_err(campaign_to_api)?;
    Ok(Json(emails))
}

/// -------- Contacts --------

pub async fn list_contacts(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<impl IntoResponse, ApiError> {
    let contacts = state
        .contacts
        .list_contacts(owner.0)
        .await
        .map_err(contact_to_api)?;
    Ok(Json(contacts))
}

pub async fn create_contact(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Json(payload): Json<ContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state
        .contacts
        .create_contact(owner.0, contact_input(payload))
        .await
        .map_err(contact_to_api)?;
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn get_contact(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state
        .contacts
        .get_contact(owner.0, id)
        .await
        .map_err(contact_to_api)?;
    Ok(Json(contact))
}

pub async fn update_contact(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let contact = state
        .contacts
        .update_contact(owner.0, id, contact_input(payload))
        .await
        .map_err(contact_to_api)?;
    Ok(Json(contact))
}

pub async fn delete_contact(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .contacts
        .delete_contact(owner.0, id)
        .await
        .map_err(contact_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

/// -------- Templates --------

pub async fn list_templates(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<impl IntoResponse, ApiError> {
    let templates = state
        .templates
        .list_templates(owner.0)
        .await
        .map_err(template_to_api)?;
    Ok(Json(templates))
}

pub async fn create_template(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Json(payload): Json<TemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state
        .templates
        .create_template(owner.0, template_input(payload))
        .await
        .map_err(template_to_api)?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state
        .templates
        .get_template(owner.0, id)
        .await
        .map_err(template_to_api)?;
    Ok(Json(template))
}

pub async fn update_template(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TemplateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let template = state
        .templates
        .update_template(owner.0, id, template_input(payload))
        .await
        .map_err(template_to_api)?;
    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .templates
        .delete_template(owner.0, id)
        .await
        .map_err(template_to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

/// -------- Dashboard & health --------

pub async fn dashboard_stats(
    State(state): State<ApiState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .dashboard
        .stats(owner.0)
        .await
        .map_err(|DashboardError::Repo(err)| repo_to_api(err))?;
    Ok(Json(stats))
}

pub async fn healthz(State(state): State<ApiState>) -> axum::response::Response {
    match state.db.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error("infra::http::healthz", StatusCode::SERVICE_UNAVAILABLE, &err)
                .attach(&mut response);
            response
        }
    }
}

fn contact_input(payload: ContactRequest) -> ContactInput {
    ContactInput {
        email: payload.email,
        first_name: payload.first_name,
        last_name: payload.last_name,
        company: payload.company,
        custom_fields: payload.custom_fields,
        subscribed: payload.subscribed,
    }
}

fn template_input(payload: TemplateRequest) -> TemplateInput {
    TemplateInput {
        name: payload.name,
        subject: payload.subject,
        body: payload.body,
    }
}

fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::CONFLICT,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::NotFound => ApiError::not_found("resource not found"),
        RepoError::InvalidInput { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        RepoError::Persistence(msg) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(msg),
        ),
    }
}

fn campaign_to_api(err: CampaignError) -> ApiError {
    match err {
        CampaignError::ConstraintViolation(field) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid campaign",
            Some(field.to_string()),
        ),
        CampaignError::TemplateNotFound => ApiError::not_found("template not found"),
        CampaignError::CampaignNotFound => ApiError::not_found("campaign not found"),
        CampaignError::StatusConflict(status) => ApiError::status_conflict(
            "Campaign state forbids this action",
            Some(format!("campaign is {}", status.as_str())),
        ),
        CampaignError::Repo(repo) => repo_to_api(repo),
    }
}

fn contact_to_api(err: ContactError) -> ApiError {
    match err {
        ContactError::ConstraintViolation(field) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid contact",
            Some(field.to_string()),
        ),
        ContactError::NotFound => ApiError::not_found("contact not found"),
        ContactError::Repo(repo) => repo_to_api(repo),
    }
}

fn template_to_api(err: TemplateError) -> ApiError {
    match err {
        TemplateError::ConstraintViolation(field) => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid template",
            Some(field.to_string()),
        ),
        TemplateError::NotFound => ApiError::not_found("template not found"),
        TemplateError::Repo(repo) => repo_to_api(repo),
    }
}
