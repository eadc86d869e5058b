use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use whisper_db::Database;
use whisper_db::models::ReplyRow;
use whisper_types::MAX_REPLY_DEPTH;
use whisper_types::actor::{Author, scan_mentions};
use whisper_types::api::{Claims, CreateReplyRequest, ReplyNode};

use crate::auth::AppStateInner;
use crate::error::{ApiError, ApiResult};
use crate::messages::{ensure_readable, parse_created_at, parse_optional_uuid, parse_uuid};
use crate::middleware::MaybeClaims;

pub async fn create_reply(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(MaybeClaims(claims)): Extension<MaybeClaims>,
    Json(req): Json<CreateReplyRequest>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let row = tokio::task::spawn_blocking(move || {
        create_reply_blocking(&db.db, message_id, req, claims)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let node = node_from_row(&row)?;
    Ok((StatusCode::CREATED, Json(node)))
}

pub(crate) fn create_reply_blocking(
    db: &Database,
    message_id: Uuid,
    req: CreateReplyRequest,
    claims: Option<Claims>,
) -> ApiResult<ReplyRow> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation("reply content must not be blank".into()));
    }

    let message = db
        .get_message(&message_id.to_string())?
        .ok_or(ApiError::MessageNotFound)?;

    // Replying requires the same read access as viewing: a private
    // message only takes replies from its recipient moderator.
    ensure_readable(db, &message, claims.as_ref())?;

    // Depth is parent depth + 1; a top-level reply sits at depth 1.
    let depth = match req.parent_reply_id {
        Some(parent_id) => {
            let parent = db
                .get_reply(&parent_id.to_string())?
                .filter(|p| p.message_id == message.id)
                .ok_or(ApiError::ParentNotFound)?;
            db.reply_depth(&parent.id)?
                .ok_or(ApiError::ParentNotFound)?
                + 1
        }
        None => 1,
    };
    if depth > MAX_REPLY_DEPTH {
        return Err(ApiError::MaxDepthExceeded);
    }

    let (user_id, admin_id, nickname) = match &claims {
        Some(c) if c.is_admin() => {
            let admin = db
                .get_admin_by_id(&c.sub.to_string())?
                .filter(|a| a.active)
                .ok_or(ApiError::Unauthorized)?;
            (None, Some(admin.id), admin.display_name)
        }
        Some(c) => {
            let user = db
                .get_user_by_id(&c.sub.to_string())?
                .filter(|u| u.active)
                .ok_or(ApiError::Unauthorized)?;
            let label = user.display_name.clone().unwrap_or(user.username);
            (Some(user.id), None, label)
        }
        None => {
            let label = req
                .nickname
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or("Anonymous")
                .to_string();
            (None, None, label)
        }
    };

    let row = ReplyRow {
        id: Uuid::new_v4().to_string(),
        message_id: message.id,
        parent_reply_id: req.parent_reply_id.map(|id| id.to_string()),
        content,
        nickname,
        user_id,
        admin_id,
        created_at: String::new(),
    };
    db.insert_reply(&row)?;

    db.get_reply(&row.id)?.ok_or(ApiError::ReplyNotFound)
}

/// Assemble a flat reply arena into a nested tree: one pass to bucket rows
/// under their parent, then depth-bounded recursion. Sibling order is the
/// arena order (creation time ascending).
pub fn build_tree(rows: &[ReplyRow]) -> ApiResult<Vec<ReplyNode>> {
    let mut children: HashMap<Option<&str>, Vec<&ReplyRow>> = HashMap::new();
    for row in rows {
        children
            .entry(row.parent_reply_id.as_deref())
            .or_default()
            .push(row);
    }
    attach(&children, None, 1)
}

fn attach(
    children: &HashMap<Option<&str>, Vec<&ReplyRow>>,
    parent: Option<&str>,
    depth: u32,
) -> ApiResult<Vec<ReplyNode>> {
    // The depth bound also makes cycles in a corrupted store harmless.
    if depth > MAX_REPLY_DEPTH {
        return Ok(Vec::new());
    }

    let mut nodes = Vec::new();
    for row in children.get(&parent).into_iter().flatten() {
        let mut node = node_from_row(row)?;
        node.children = attach(children, Some(row.id.as_str()), depth + 1)?;
        nodes.push(node);
    }
    Ok(nodes)
}

pub(crate) fn node_from_row(row: &ReplyRow) -> ApiResult<ReplyNode> {
    let author = Author::resolve(
        parse_optional_uuid(row.user_id.as_deref(), "user_id", &row.id),
        parse_optional_uuid(row.admin_id.as_deref(), "admin_id", &row.id),
        Some(row.nickname.clone()),
    )?;

    Ok(ReplyNode {
        id: parse_uuid(&row.id, "id", &row.id),
        message_id: parse_uuid(&row.message_id, "message_id", &row.id),
        parent_reply_id: parse_optional_uuid(row.parent_reply_id.as_deref(), "parent_reply_id", &row.id),
        content: row.content.clone(),
        nickname: row.nickname.clone(),
        author,
        mentions: scan_mentions(&row.content),
        created_at: parse_created_at(&row.created_at, &row.id),
        children: Vec::new(),
    })
}
