use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;
use tracing::error;
use whisper_types::MAX_REPLY_DEPTH;
use whisper_types::actor::ConflictingIdentity;

/// Every failure a handler can surface. All of these are deterministic for a
/// given request and store state — there is no retryable class here.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("private messages must name a recipient moderator")]
    RecipientRequired,
    #[error("message is already public")]
    AlreadyPublic,
    #[error("replies can nest at most {MAX_REPLY_DEPTH} levels deep")]
    MaxDepthExceeded,
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("message not found")]
    MessageNotFound,
    #[error("reply not found")]
    ReplyNotFound,
    #[error("parent reply not found on this message")]
    ParentNotFound,
    #[error("no active moderator named \"{0}\"")]
    UnknownRecipient(String),
    #[error("user not found")]
    UserNotFound,
    #[error("username is already taken")]
    UsernameTaken,
    #[error("content row carries two identities")]
    ConflictingIdentity,
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Stable machine-readable kind for the error body.
    fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::RecipientRequired => "recipient_required",
            Self::AlreadyPublic => "already_public",
            Self::MaxDepthExceeded => "max_depth_exceeded",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::MessageNotFound => "message_not_found",
            Self::ReplyNotFound => "reply_not_found",
            Self::ParentNotFound => "parent_not_found",
            Self::UnknownRecipient(_) => "unknown_recipient",
            Self::UserNotFound => "user_not_found",
            Self::UsernameTaken => "username_taken",
            Self::ConflictingIdentity => "conflicting_identity",
            Self::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::RecipientRequired
            | Self::AlreadyPublic
            | Self::MaxDepthExceeded => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MessageNotFound
            | Self::ReplyNotFound
            | Self::ParentNotFound
            | Self::UnknownRecipient(_)
            | Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::UsernameTaken | Self::ConflictingIdentity => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ConflictingIdentity> for ApiError {
    fn from(_: ConflictingIdentity) -> Self {
        Self::ConflictingIdentity
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("internal error: {:#}", err);
        }
        let body = serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
