use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};

use crate::error::AppError;
use crate::model::customer::{Role, Viewer};

// Identitas user diisi oleh auth gateway di depan service ini
const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLE_HEADER: &str = "x-user-role";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn viewer_from_headers(headers: &HeaderMap) -> Result<Viewer, AppError> {
    let id = header(headers, USER_ID_HEADER)
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or(AppError::Unauthorized)?;
    let role = header(headers, USER_ROLE_HEADER)
        .and_then(|raw| raw.parse::<Role>().ok())
        .ok_or(AppError::Unauthorized)?;

    Ok(Viewer { id, role })
}

#[async_trait]
impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        viewer_from_headers(&parts.headers)
    }
}

/// A viewer that must hold the admin role.
#[derive(Debug, Clone, Copy)]
pub struct Admin(pub Viewer);

#[async_trait]
impl<S> FromRequestParts<S> for Admin
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let viewer = viewer_from_headers(&parts.headers)?;
        if !viewer.is_admin() {
            return Err(AppError::Forbidden("Admin only.".to_string()));
        }
        Ok(Admin(viewer))
    }
}

/// Requires one of `roles`.
pub fn require_role(viewer: &Viewer, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&viewer.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Role not allowed.".to_string()))
    }
}
