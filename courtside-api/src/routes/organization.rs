use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use courtside_shared::errors::{AppError, AppResult, ErrorCode};
use courtside_shared::middleware::AdminUser;
use courtside_shared::types::api::ApiResponse;

use crate::models::{NewOrganization, Organization};
use crate::routes::upload::MultipartForm;
use crate::schema::organizations;
use crate::services::upload_service;
use crate::AppState;

const ORGANIZATION_IMAGE_FOLDER: &str = "organizations/images";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, message = "organization code is required"))]
    pub organization_code: String,
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
}

fn find_organization(conn: &mut PgConnection, organization_id: Uuid) -> AppResult<Organization> {
    organizations::table
        .find(organization_id)
        .select(Organization::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::OrganizationNotFound, "Organization not found"))
}

/// POST /organization
pub async fn create_organization(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateOrganizationRequest>,
) -> AppResult<Json<ApiResponse<Organization>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let code = req.organization_code.trim().to_string();
    let email = req.email.trim().to_lowercase();
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let code_taken: i64 = organizations::table
        .filter(organizations::organization_code.eq(&code))
        .count()
        .get_result(&mut conn)?;
    if code_taken > 0 {
        return Err(AppError::new(ErrorCode::OrganizationCodeTaken, "Organization code already exists"));
    }

    let email_taken: i64 = organizations::table
        .filter(organizations::email.eq(&email))
        .count()
        .get_result(&mut conn)?;
    if email_taken > 0 {
        return Err(AppError::new(ErrorCode::OrganizationEmailTaken, "Organization email already exists"));
    }

    let organization: Organization = diesel::insert_into(organizations::table)
        .values(&NewOrganization {
            access_url: state.config.organization_link(&code),
            organization_code: code,
            name: req.name.trim().to_string(),
            email,
        })
        .returning(Organization::as_returning())
        .get_result(&mut conn)?;

    tracing::info!(organization_id = %organization.id, code = %organization.organization_code, admin_id = %admin.id, "organization created");
    Ok(Json(ApiResponse::ok_with_message(organization, "Organization created successfully")))
}

/// GET /organization/all
pub async fn list_organizations(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<Organization>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let items = organizations::table
        .order(organizations::created_at.desc())
        .select(Organization::as_select())
        .load(&mut conn)?;
    Ok(Json(ApiResponse::ok(items)))
}

/// GET /organization/details/:id
pub async fn organization_details(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(organization_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Organization>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    Ok(Json(ApiResponse::ok(find_organization(&mut conn, organization_id)?)))
}

/// PATCH /organization/track/:code
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> AppResult<Json<ApiResponse<Organization>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let now = Utc::now();

    let organization: Organization = diesel::update(
        organizations::table.filter(organizations::organization_code.eq(code.trim())),
    )
    .set((
        organizations::total_clicks.eq(organizations::total_clicks + 1),
        organizations::last_accessed.eq(Some(now)),
        organizations::updated_at.eq(now),
    ))
    .returning(Organization::as_returning())
    .get_result(&mut conn)
    .optional()?
    .ok_or_else(|| AppError::new(ErrorCode::OrganizationNotFound, "Organization not found"))?;

    tracing::debug!(code = %organization.organization_code, clicks = organization.total_clicks, "organization link tracked");
    Ok(Json(ApiResponse::ok(organization)))
}

/// PATCH /organization/update-image/:id
pub async fn update_image(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(organization_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<ApiResponse<Organization>>> {
    let mut form = MultipartForm::read(multipart).await?;
    let file = form
        .take_files("image")
        .into_iter()
        .next()
        .ok_or_else(|| AppError::bad_request("Image is required"))?;

    let previous = {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        find_organization(&mut conn, organization_id)?.image_url
    };

    let object = upload_service::store(&state.storage, ORGANIZATION_IMAGE_FOLDER, file).await?;

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let updated: Organization = diesel::update(organizations::table.find(organization_id))
        .set((
            organizations::image_url.eq(Some(&object.url)),
            organizations::updated_at.eq(Utc::now()),
        ))
        .returning(Organization::as_returning())
        .get_result(&mut conn)?;

    if let Some(old) = previous.filter(|old| *old != object.url) {
        state.storage.delete_quietly(&old).await;
    }

    tracing::info!(organization_id = %organization_id, "organization image updated");
    Ok(Json(ApiResponse::ok_with_message(updated, "Organization image updated successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_requires_code_and_valid_email() {
        let bad = CreateOrganizationRequest {
            organization_code: String::new(),
            name: "Hoops Academy".into(),
            email: "not-an-email".into(),
        };
        let errors = bad.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("organization_code"));
        assert!(fields.contains_key("email"));

        let good = CreateOrganizationRequest {
            organization_code: "HOOPS24".into(),
            name: "Hoops Academy".into(),
            email: "info@hoops.example".into(),
        };
        assert!(good.validate().is_ok());
    }
}
