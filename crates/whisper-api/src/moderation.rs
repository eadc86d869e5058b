use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use whisper_db::Database;
use whisper_db::models::{AdminRow, PromoteOutcome};
use whisper_types::api::{Claims, CreateAdminRequest, PatchVisibilityRequest};

use crate::auth::{self, AppStateInner};
use crate::error::{ApiError, ApiResult};
use crate::messages::row_to_response;

/// Any active admin may moderate content.
fn require_admin(claims: &Claims) -> ApiResult<()> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("moderator access required".into()))
    }
}

/// Moderation needs a live admin row, not just a decodable token: a
/// deactivated moderator keeps a valid JWT for up to 30 days.
pub(crate) fn load_active_admin(db: &Database, claims: &Claims) -> ApiResult<AdminRow> {
    require_admin(claims)?;
    let admin = db
        .get_admin_by_id(&claims.sub.to_string())?
        .ok_or(ApiError::Unauthorized)?;
    if !admin.active {
        return Err(ApiError::Forbidden("moderator account is deactivated".into()));
    }
    Ok(admin)
}

/// Verification grants, account deletion and admin provisioning are reserved
/// for the super admin.
fn require_super_admin(claims: &Claims) -> ApiResult<()> {
    require_admin(claims)?;
    if claims.is_super_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("super admin access required".into()))
    }
}

/// The one-way private → public transition.
pub async fn patch_visibility(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<PatchVisibilityRequest>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&claims)?;

    if !req.is_public {
        return Err(ApiError::Validation(
            "visibility cannot be revoked once granted".into(),
        ));
    }

    let db = state.clone();
    let (row, reply_count) = tokio::task::spawn_blocking(move || -> ApiResult<_> {
        load_active_admin(&db.db, &claims)?;
        match db.db.promote_message(&message_id.to_string())? {
            PromoteOutcome::Promoted => {}
            PromoteOutcome::AlreadyPublic => return Err(ApiError::AlreadyPublic),
            PromoteOutcome::NotFound => return Err(ApiError::MessageNotFound),
        }
        info!("message {} promoted to public by {}", message_id, claims.username);
        let row = db
            .db
            .get_message(&message_id.to_string())?
            .ok_or(ApiError::MessageNotFound)?;
        let counts = db.db.reply_counts_for_messages(&[row.id.clone()])?;
        let count = counts.get(&row.id).copied().unwrap_or(0);
        Ok((row, count))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(row_to_response(&row, reply_count)?))
}

pub async fn delete_message(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&claims)?;

    let db = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        load_active_admin(&db.db, &claims)?;
        if !db.db.delete_message(&message_id.to_string())? {
            return Err(ApiError::MessageNotFound);
        }
        info!("message {} deleted by {}", message_id, claims.username);
        Ok(())
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_reply(
    State(state): State<Arc<AppStateInner>>,
    Path(reply_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&claims)?;

    let db = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        load_active_admin(&db.db, &claims)?;
        if !db.db.delete_reply_subtree(&reply_id.to_string())? {
            return Err(ApiError::ReplyNotFound);
        }
        info!("reply {} (and subtree) deleted by {}", reply_id, claims.username);
        Ok(())
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify_user(
    State(state): State<Arc<AppStateInner>>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    require_super_admin(&claims)?;

    let db = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        load_active_admin(&db.db, &claims)?;
        if !db.db.set_user_verified(&user_id.to_string(), true)? {
            return Err(ApiError::UserNotFound);
        }
        info!("user {} verified by {}", user_id, claims.username);
        Ok(())
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(serde_json::json!({ "verified": true })))
}

pub async fn delete_user(
    State(state): State<Arc<AppStateInner>>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    require_super_admin(&claims)?;

    let db = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        load_active_admin(&db.db, &claims)?;
        if !db.db.delete_user(&user_id.to_string())? {
            return Err(ApiError::UserNotFound);
        }
        info!("user account {} deleted by {}", user_id, claims.username);
        Ok(())
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_admin(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAdminRequest>,
) -> ApiResult<impl IntoResponse> {
    require_super_admin(&claims)?;

    let db = state.clone();
    let (admin_id, username) = tokio::task::spawn_blocking(move || -> ApiResult<_> {
        load_active_admin(&db.db, &claims)?;

        auth::validate_credentials(&req.username, &req.password)?;
        let display_name = req.display_name.trim();
        if display_name.is_empty() {
            return Err(ApiError::Validation(
                "moderator display name must not be blank".into(),
            ));
        }

        let admin_id = Uuid::new_v4();
        let password_hash = auth::hash_password(&req.password)?;
        if !db.db.create_admin(
            &admin_id.to_string(),
            &req.username,
            &password_hash,
            display_name,
            req.role.as_str(),
        )? {
            return Err(ApiError::UsernameTaken);
        }

        info!("admin {} ({}) created by {}", req.username, req.role.as_str(), claims.username);
        Ok((admin_id, req.username))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": admin_id, "username": username })),
    ))
}

pub async fn deactivate_admin(
    State(state): State<Arc<AppStateInner>>,
    Path(admin_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    require_super_admin(&claims)?;

    let db = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<()> {
        load_active_admin(&db.db, &claims)?;
        if !db.db.set_admin_active(&admin_id.to_string(), false)? {
            return Err(ApiError::UserNotFound);
        }
        info!("admin {} deactivated by {}", admin_id, claims.username);
        Ok(())
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(serde_json::json!({ "active": false })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_types::api::ActorKind;
    use whisper_types::models::AdminRole;

    fn claims(kind: ActorKind, role: Option<AdminRole>) -> Claims {
        Claims {
            sub: Uuid::new_v4(),
            username: "t".into(),
            kind,
            role,
            exp: 0,
        }
    }

    #[test]
    fn users_cannot_moderate() {
        let user = claims(ActorKind::User, None);
        assert!(matches!(require_admin(&user), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn only_super_admin_clears_the_privilege_gate() {
        let moderator = claims(ActorKind::Admin, Some(AdminRole::Moderator));
        assert!(require_admin(&moderator).is_ok());
        assert!(matches!(
            require_super_admin(&moderator),
            Err(ApiError::Forbidden(_))
        ));

        let root = claims(ActorKind::Admin, Some(AdminRole::SuperAdmin));
        assert!(require_super_admin(&root).is_ok());
    }

    #[test]
    fn deactivated_moderator_fails_the_live_admin_check() {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4();
        db.create_admin(&id.to_string(), "luna_mod", "hash", "Luna", "moderator")
            .unwrap();

        let luna = Claims {
            sub: id,
            username: "luna_mod".into(),
            kind: ActorKind::Admin,
            role: Some(AdminRole::Moderator),
            exp: 0,
        };
        assert!(load_active_admin(&db, &luna).is_ok());

        // The token outlives the account; the row check does not.
        db.set_admin_active(&id.to_string(), false).unwrap();
        assert!(matches!(
            load_active_admin(&db, &luna),
            Err(ApiError::Forbidden(_))
        ));

        // A token whose subject was never provisioned is rejected outright.
        let ghost = Claims {
            sub: Uuid::new_v4(),
            username: "ghost".into(),
            kind: ActorKind::Admin,
            role: Some(AdminRole::Moderator),
            exp: 0,
        };
        assert!(matches!(
            load_active_admin(&db, &ghost),
            Err(ApiError::Unauthorized)
        ));
    }
}
