use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use whisper_db::Database;
use whisper_db::models::MessageRow;
use whisper_types::actor::Author;
use whisper_types::api::{Claims, CreateMessageRequest, MessageDetailResponse, MessageResponse};
use whisper_types::models::Category;

use crate::auth::AppStateInner;
use crate::error::{ApiError, ApiResult};
use crate::middleware::MaybeClaims;
use crate::replies::build_tree;

#[derive(Debug, Deserialize)]
pub struct WallQuery {
    pub category: Option<String>,
}

pub async fn create_message(
    State(state): State<Arc<AppStateInner>>,
    Extension(MaybeClaims(claims)): Extension<MaybeClaims>,
    Json(req): Json<CreateMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let row = tokio::task::spawn_blocking(move || create_message_blocking(&db.db, req, claims))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let response = row_to_response(&row, 0)?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// All validation and persistence for a new message. Runs on a blocking
/// thread; the handler above is just the axum shim around it.
pub(crate) fn create_message_blocking(
    db: &Database,
    req: CreateMessageRequest,
    claims: Option<Claims>,
) -> ApiResult<MessageRow> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation("message content must not be blank".into()));
    }
    let category = Category::parse(&req.category)
        .ok_or_else(|| ApiError::Validation(format!("unknown category \"{}\"", req.category)))?;

    // Private messages must route to a real, active moderator.
    let recipient = if req.is_public {
        None
    } else {
        let name = req
            .recipient
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ApiError::RecipientRequired)?;
        db.get_active_admin_by_display_name(name)?
            .ok_or_else(|| ApiError::UnknownRecipient(name.to_string()))?;
        Some(name.to_string())
    };

    // Attributed posts take their label from the account; the client-supplied
    // sender_name only matters for anonymous posts.
    let (user_id, admin_id, sender_name) = match &claims {
        Some(c) if c.is_admin() => {
            let admin = db
                .get_admin_by_id(&c.sub.to_string())?
                .filter(|a| a.active)
                .ok_or(ApiError::Unauthorized)?;
            (None, Some(admin.id), Some(admin.display_name))
        }
        Some(c) => {
            let user = db
                .get_user_by_id(&c.sub.to_string())?
                .filter(|u| u.active)
                .ok_or(ApiError::Unauthorized)?;
            let label = user.display_name.clone().unwrap_or(user.username);
            (Some(user.id), None, Some(label))
        }
        None => {
            let label = req
                .sender_name
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from);
            (None, None, label)
        }
    };

    let id = Uuid::new_v4().to_string();
    let row = MessageRow {
        id: id.clone(),
        category: category.as_str().to_string(),
        content,
        media_url: req.media_url,
        is_public: req.is_public,
        recipient,
        sender_name,
        user_id,
        admin_id,
        heart_count: 0,
        created_at: String::new(),
    };
    db.insert_message(&row)?;

    // Re-read so created_at reflects what the database assigned.
    db.get_message(&id)?.ok_or(ApiError::MessageNotFound)
}

pub async fn list_public(
    State(state): State<Arc<AppStateInner>>,
    Query(query): Query<WallQuery>,
) -> ApiResult<impl IntoResponse> {
    let category = match query.category.as_deref() {
        Some(raw) => Some(
            Category::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("unknown category \"{raw}\"")))?,
        ),
        None => None,
    };

    let db = state.clone();
    let (rows, counts) = tokio::task::spawn_blocking(move || -> ApiResult<_> {
        let rows = db.db.list_public_messages(category.map(|c| c.as_str()))?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let counts = db.db.reply_counts_for_messages(&ids)?;
        Ok((rows, counts))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let messages = rows
        .iter()
        .map(|row| row_to_response(row, counts.get(&row.id).copied().unwrap_or(0)))
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(messages))
}

pub async fn list_private_inbox(
    State(state): State<Arc<AppStateInner>>,
    Path(recipient): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    if !claims.is_admin() {
        return Err(ApiError::Forbidden("moderator access required".into()));
    }

    let db = state.clone();
    let (rows, counts) = tokio::task::spawn_blocking(move || -> ApiResult<_> {
        let me = crate::moderation::load_active_admin(&db.db, &claims)?;
        // Non-super admins may only open their own inbox.
        if !claims.is_super_admin() && me.display_name != recipient {
            return Err(ApiError::Forbidden(
                "private messages are scoped to their recipient".into(),
            ));
        }

        let rows = db.db.list_private_for_recipient(&recipient)?;
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let counts = db.db.reply_counts_for_messages(&ids)?;
        Ok((rows, counts))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let messages = rows
        .iter()
        .map(|row| row_to_response(row, counts.get(&row.id).copied().unwrap_or(0)))
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(messages))
}

pub async fn get_message(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(MaybeClaims(claims)): Extension<MaybeClaims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let (row, reply_rows) = tokio::task::spawn_blocking(move || -> ApiResult<_> {
        let row = db
            .db
            .get_message(&message_id.to_string())?
            .ok_or(ApiError::MessageNotFound)?;

        ensure_readable(&db.db, &row, claims.as_ref())?;

        let reply_rows = db.db.replies_for_message(&row.id)?;
        Ok((row, reply_rows))
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let message = row_to_response(&row, reply_rows.len() as i64)?;
    let replies = build_tree(&reply_rows)?;

    Ok(Json(MessageDetailResponse { message, replies }))
}

pub async fn heart_message(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(MaybeClaims(claims)): Extension<MaybeClaims>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let count = tokio::task::spawn_blocking(move || heart_blocking(&db.db, message_id, claims))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(serde_json::json!({ "heart_count": count })))
}

/// Hearts carry the same read scope as viewing, so holding a private
/// message's id is not enough to increment it or confirm it exists.
pub(crate) fn heart_blocking(
    db: &Database,
    message_id: Uuid,
    claims: Option<Claims>,
) -> ApiResult<i64> {
    let row = db
        .get_message(&message_id.to_string())?
        .ok_or(ApiError::MessageNotFound)?;
    ensure_readable(db, &row, claims.as_ref())?;
    db.heart_message(&row.id)?.ok_or(ApiError::MessageNotFound)
}

/// Two orthogonal checks evaluated together: global visibility and, while the
/// message is still private, recipient scoping.
pub(crate) fn ensure_readable(
    db: &Database,
    row: &MessageRow,
    claims: Option<&Claims>,
) -> ApiResult<()> {
    if row.is_public {
        return Ok(());
    }

    let Some(claims) = claims else {
        return Err(ApiError::MessageNotFound);
    };
    if !claims.is_admin() {
        // Private rows are invisible to non-moderators, not merely forbidden.
        return Err(ApiError::MessageNotFound);
    }

    let me = db
        .get_admin_by_id(&claims.sub.to_string())?
        .ok_or(ApiError::Unauthorized)?;
    if !me.active {
        // A deactivated moderator's still-valid token opens nothing.
        return Err(ApiError::MessageNotFound);
    }
    if claims.is_super_admin() {
        return Ok(());
    }
    if row.recipient.as_deref() == Some(me.display_name.as_str()) {
        Ok(())
    } else {
        Err(ApiError::MessageNotFound)
    }
}

pub(crate) fn row_to_response(row: &MessageRow, reply_count: i64) -> ApiResult<MessageResponse> {
    let author = Author::resolve(
        parse_optional_uuid(row.user_id.as_deref(), "user_id", &row.id),
        parse_optional_uuid(row.admin_id.as_deref(), "admin_id", &row.id),
        row.sender_name.clone(),
    )?;

    let category = Category::parse(&row.category).ok_or_else(|| {
        anyhow::anyhow!("corrupt category '{}' on message {}", row.category, row.id)
    })?;

    Ok(MessageResponse {
        id: parse_uuid(&row.id, "id", &row.id),
        category,
        content: row.content.clone(),
        media_url: row.media_url.clone(),
        is_public: row.is_public,
        recipient: row.recipient.clone(),
        sender_name: row.sender_name.clone(),
        author,
        heart_count: row.heart_count,
        reply_count,
        created_at: parse_created_at(&row.created_at, &row.id),
    })
}

pub(crate) fn parse_uuid(value: &str, field: &str, row_id: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on row '{}': {}", field, value, row_id, e);
        Uuid::default()
    })
}

pub(crate) fn parse_optional_uuid(value: Option<&str>, field: &str, row_id: &str) -> Option<Uuid> {
    value.map(|v| parse_uuid(v, field, row_id))
}

pub(crate) fn parse_created_at(value: &str, row_id: &str) -> chrono::DateTime<chrono::Utc> {
    value
        .parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on row '{}': {}", value, row_id, e);
            chrono::DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use whisper_types::api::ActorKind;
    use whisper_types::models::AdminRole;

    fn db_with_luna() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let luna_id = Uuid::new_v4();
        db.create_admin(&luna_id.to_string(), "luna_mod", "h", "Luna", "moderator")
            .unwrap();
        (db, luna_id)
    }

    fn request(content: &str, category: &str, public: bool, recipient: Option<&str>) -> CreateMessageRequest {
        CreateMessageRequest {
            content: content.into(),
            category: category.into(),
            is_public: public,
            recipient: recipient.map(Into::into),
            sender_name: None,
            media_url: None,
        }
    }

    fn admin_claims(sub: Uuid, role: AdminRole) -> Claims {
        Claims {
            sub,
            username: "mod".into(),
            kind: ActorKind::Admin,
            role: Some(role),
            exp: 0,
        }
    }

    #[test]
    fn blank_content_and_bad_category_are_rejected() {
        let (db, _) = db_with_luna();
        assert!(matches!(
            create_message_blocking(&db, request("   \n ", "advice", true, None), None),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            create_message_blocking(&db, request("hello", "poetry", true, None), None),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn private_needs_a_known_active_recipient() {
        let (db, _) = db_with_luna();

        assert!(matches!(
            create_message_blocking(&db, request("hi", "advice", false, None), None),
            Err(ApiError::RecipientRequired)
        ));
        assert!(matches!(
            create_message_blocking(&db, request("hi", "advice", false, Some("Nobody")), None),
            Err(ApiError::UnknownRecipient(_))
        ));

        let row =
            create_message_blocking(&db, request("feeling lost", "advice", false, Some("Luna")), None)
                .unwrap();
        assert!(!row.is_public);
        assert_eq!(row.recipient.as_deref(), Some("Luna"));

        // Routed to Luna's inbox, not to the public wall.
        assert_eq!(db.list_private_for_recipient("Luna").unwrap().len(), 1);
        assert!(db.list_public_messages(None).unwrap().is_empty());
    }

    #[test]
    fn attributed_posts_ignore_client_sender_name() {
        let (db, _) = db_with_luna();
        let user_id = Uuid::new_v4();
        db.create_user(&user_id.to_string(), "moth", "h", Some("Moth Dust"))
            .unwrap();

        let mut req = request("hello wall", "anything", true, None);
        req.sender_name = Some("Impostor".into());
        let claims = Claims {
            sub: user_id,
            username: "moth".into(),
            kind: ActorKind::User,
            role: None,
            exp: 0,
        };

        let row = create_message_blocking(&db, req, Some(claims)).unwrap();
        assert_eq!(row.sender_name.as_deref(), Some("Moth Dust"));
        assert_eq!(row.user_id.as_deref(), Some(user_id.to_string().as_str()));
        assert_eq!(row.admin_id, None);
    }

    #[test]
    fn anonymous_posts_keep_their_free_text_label() {
        let (db, _) = db_with_luna();
        let mut req = request("whisper", "confession", true, None);
        req.sender_name = Some("  night owl  ".into());

        let row = create_message_blocking(&db, req, None).unwrap();
        assert_eq!(row.sender_name.as_deref(), Some("night owl"));
        assert_eq!(row.user_id, None);
        assert_eq!(row.admin_id, None);
    }

    #[test]
    fn private_rows_hide_from_anonymous_and_non_recipient() {
        let (db, luna_id) = db_with_luna();
        let sol_id = Uuid::new_v4();
        db.create_admin(&sol_id.to_string(), "sol_mod", "h", "Sol", "moderator")
            .unwrap();

        let row =
            create_message_blocking(&db, request("hi", "advice", false, Some("Luna")), None).unwrap();

        // Anonymous caller: invisible.
        assert!(matches!(
            ensure_readable(&db, &row, None),
            Err(ApiError::MessageNotFound)
        ));
        // Wrong moderator: also invisible.
        let sol = admin_claims(sol_id, AdminRole::Moderator);
        assert!(matches!(
            ensure_readable(&db, &row, Some(&sol)),
            Err(ApiError::MessageNotFound)
        ));
        // The named recipient reads it.
        let luna = admin_claims(luna_id, AdminRole::Moderator);
        assert!(ensure_readable(&db, &row, Some(&luna)).is_ok());
        // So does the super admin, for any recipient.
        let root_id = Uuid::new_v4();
        db.create_admin(&root_id.to_string(), "root", "h", "Root", "super_admin")
            .unwrap();
        let root = admin_claims(root_id, AdminRole::SuperAdmin);
        assert!(ensure_readable(&db, &row, Some(&root)).is_ok());
    }

    #[test]
    fn sqlite_timestamps_parse() {
        let ts = parse_created_at("2026-01-10 09:30:00", "r1");
        assert!(ts.to_rfc3339().starts_with("2026-01-10T09:30:00"));

        // Corrupt values degrade to the epoch default instead of failing the read.
        let fallback = parse_created_at("not-a-date", "r1");
        assert_eq!(fallback, chrono::DateTime::<chrono::Utc>::default());
    }

    #[test]
    fn deactivated_recipient_loses_private_access() {
        let (db, luna_id) = db_with_luna();
        let row =
            create_message_blocking(&db, request("hi", "advice", false, Some("Luna")), None)
                .unwrap();

        let luna = admin_claims(luna_id, AdminRole::Moderator);
        assert!(ensure_readable(&db, &row, Some(&luna)).is_ok());

        // The JWT stays valid after deactivation; the row check does not.
        db.set_admin_active(&luna_id.to_string(), false).unwrap();
        assert!(matches!(
            ensure_readable(&db, &row, Some(&luna)),
            Err(ApiError::MessageNotFound)
        ));
    }

    #[test]
    fn hearts_respect_the_read_scope() {
        let (db, luna_id) = db_with_luna();
        let private =
            create_message_blocking(&db, request("hi", "advice", false, Some("Luna")), None)
                .unwrap();
        let message_id: Uuid = private.id.parse().unwrap();

        // Anonymous callers can neither increment nor confirm the row exists.
        assert!(matches!(
            heart_blocking(&db, message_id, None),
            Err(ApiError::MessageNotFound)
        ));

        let luna = admin_claims(luna_id, AdminRole::Moderator);
        assert_eq!(heart_blocking(&db, message_id, Some(luna)).unwrap(), 1);
    }
}
