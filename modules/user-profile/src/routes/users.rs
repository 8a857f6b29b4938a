//! Profile API routes
//!
//! Avatars travel as standard base64 strings in JSON bodies.

use crate::models::{ProfileUpdate, User};
use crate::profile::{self, ValidationError};
use crate::storage::{Storage, StorageError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub surname: String,
    /// Base64, empty when no avatar is set
    pub avatar: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            surname: user.surname,
            avatar: STANDARD.encode(&user.avatar),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub surname: String,
    #[serde(default)]
    pub avatar: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct UserErrorResponse {
    pub status: StatusCode,
    pub message: String,
}

impl From<ValidationError> for UserErrorResponse {
    fn from(e: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: e.to_string(),
        }
    }
}

impl From<StorageError> for UserErrorResponse {
    fn from(e: StorageError) -> Self {
        let status = match e {
            StorageError::UserNotFound => StatusCode::NOT_FOUND,
            _ => {
                tracing::error!(error = %e, "Profile storage error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for UserErrorResponse {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// GET /api/users/{id}
pub async fn get_user(
    State(storage): State<Arc<Storage>>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, UserErrorResponse> {
    let user = storage.get_user_by_id(id).await?;
    Ok(Json(user.into()))
}

/// PUT /api/users/{id}
///
/// Replaces name, surname and avatar. 400 when the update is invalid, 404
/// when the profile has not been created from its registration event yet.
pub async fn update_user(
    State(storage): State<Arc<Storage>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, UserErrorResponse> {
    let avatar = STANDARD
        .decode(req.avatar.as_bytes())
        .map_err(|e| ValidationError::InvalidAvatar(format!("not base64: {e}")))?;

    let update = ProfileUpdate {
        name: req.name,
        surname: req.surname,
        avatar,
    };

    if let Err(e) = profile::validate_update(&update) {
        tracing::warn!(user_id = id, error = %e, "Profile update rejected");
        return Err(e.into());
    }

    let user = storage.update_user(id, &update).await?;
    tracing::info!(user_id = id, "Profile updated");

    Ok(Json(user.into()))
}

pub fn router(storage: Arc<Storage>) -> Router {
    Router::new()
        .route("/api/users/{id}", get(get_user).put(update_user))
        .with_state(storage)
}
