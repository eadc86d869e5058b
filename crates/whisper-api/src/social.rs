use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use whisper_db::Database;
use whisper_db::models::UserRow;
use whisper_types::api::{Claims, LeaderboardEntry, Metric, ProfileResponse};
use whisper_types::models::UserProfile;

use crate::auth::AppStateInner;
use crate::error::{ApiError, ApiResult};
use crate::messages::{parse_created_at, parse_uuid};

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub metric: Metric,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    10
}

pub async fn follow_user(
    State(state): State<Arc<AppStateInner>>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let follower_id = follower_from_claims(&claims)?;

    let db = state.clone();
    let created = tokio::task::spawn_blocking(move || follow_blocking(&db.db, follower_id, user_id))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(serde_json::json!({ "following": true, "created": created })))
}

fn follow_blocking(db: &Database, follower_id: Uuid, followed_id: Uuid) -> ApiResult<bool> {
    if follower_id == followed_id {
        return Err(ApiError::Validation("you cannot follow yourself".into()));
    }

    // A deleted account's still-valid token must not mint edges the
    // foreign key would reject.
    db.get_user_by_id(&follower_id.to_string())?
        .filter(|u| u.active)
        .ok_or(ApiError::Unauthorized)?;
    db.get_user_by_id(&followed_id.to_string())?
        .filter(|u| u.active)
        .ok_or(ApiError::UserNotFound)?;

    // Duplicate edges are a no-op, so retried requests are harmless.
    Ok(db.insert_follow(&follower_id.to_string(), &followed_id.to_string())?)
}

pub async fn unfollow_user(
    State(state): State<Arc<AppStateInner>>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let follower_id = follower_from_claims(&claims)?;

    let db = state.clone();
    tokio::task::spawn_blocking(move || -> ApiResult<bool> {
        Ok(db.db.delete_follow(&follower_id.to_string(), &user_id.to_string())?)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(serde_json::json!({ "following": false })))
}

/// Public profile for any actor: registered users first, then moderator
/// accounts under the same joint username namespace.
pub async fn get_profile(
    State(state): State<Arc<AppStateInner>>,
    Path(username): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let response = tokio::task::spawn_blocking(move || -> ApiResult<ProfileResponse> {
        if let Some(user) = db.db.get_user_by_username(&username)?.filter(|u| u.active) {
            let stats = db.db.stats_for_user(&user.id)?;
            return Ok(ProfileResponse {
                user: profile_from_row(&user),
                stats,
            });
        }

        let admin = db
            .db
            .get_admin_by_username(&username)?
            .filter(|a| a.active)
            .ok_or(ApiError::UserNotFound)?;
        let stats = db.db.stats_for_admin(&admin.id)?;
        Ok(ProfileResponse {
            user: UserProfile {
                id: parse_uuid(&admin.id, "id", &admin.id),
                username: admin.username.clone(),
                display_name: Some(admin.display_name.clone()),
                bio: None,
                avatar_url: None,
                verified: admin.verified,
                created_at: parse_created_at(&admin.created_at, &admin.id),
            },
            stats,
        })
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(response))
}

pub async fn leaderboard(
    State(state): State<Arc<AppStateInner>>,
    Query(query): Query<LeaderboardQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.min(100);

    let db = state.clone();
    let ranked = tokio::task::spawn_blocking(move || -> ApiResult<_> {
        Ok(db.db.leaderboard(query.metric, limit)?)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let entries: Vec<LeaderboardEntry> = ranked
        .iter()
        .enumerate()
        .map(|(i, (row, value))| LeaderboardEntry {
            rank: i + 1,
            user: profile_from_row(row),
            value: *value,
        })
        .collect();

    Ok(Json(entries))
}

/// Only registered users participate in the follow graph.
fn follower_from_claims(claims: &Claims) -> ApiResult<Uuid> {
    if claims.is_admin() {
        return Err(ApiError::Validation(
            "moderator accounts are not part of the follow graph".into(),
        ));
    }
    Ok(claims.sub)
}

pub(crate) fn profile_from_row(row: &UserRow) -> UserProfile {
    UserProfile {
        id: parse_uuid(&row.id, "id", &row.id),
        username: row.username.clone(),
        display_name: row.display_name.clone(),
        bio: row.bio.clone(),
        avatar_url: row.avatar_url.clone(),
        verified: row.verified,
        created_at: parse_created_at(&row.created_at, &row.id),
    }
}
