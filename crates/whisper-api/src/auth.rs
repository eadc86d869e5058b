use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use whisper_db::Database;
use whisper_types::api::{ActorKind, AuthResponse, Claims, LoginRequest, RegisterRequest};
use whisper_types::models::AdminRole;

use crate::error::{ApiError, ApiResult};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    // Password hashing is CPU-bound, so the whole flow runs off the runtime.
    let response = tokio::task::spawn_blocking(move || {
        register_blocking(&state.db, &state.jwt_secret, req)
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok((StatusCode::CREATED, Json(response)))
}

fn register_blocking(
    db: &Database,
    jwt_secret: &str,
    req: RegisterRequest,
) -> ApiResult<AuthResponse> {
    validate_credentials(&req.username, &req.password)?;

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();
    let display_name = req
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    // Usernames are unique across users and admins jointly; the store
    // enforces this atomically, so a racing registration loses cleanly.
    if !db.create_user(&user_id.to_string(), &req.username, &password_hash, display_name)? {
        return Err(ApiError::UsernameTaken);
    }

    let token = create_token(jwt_secret, user_id, &req.username, ActorKind::User, None)?;

    Ok(AuthResponse {
        id: user_id,
        username: req.username,
        kind: ActorKind::User,
        role: None,
        token,
    })
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = tokio::task::spawn_blocking(move || -> ApiResult<AuthResponse> {
        let user = state
            .db
            .get_user_by_username(&req.username)?
            .ok_or(ApiError::Unauthorized)?;

        verify_password(&req.password, &user.password)?;

        if !user.active {
            return Err(ApiError::Forbidden("account is deactivated".into()));
        }

        let user_id: Uuid = user
            .id
            .parse()
            .map_err(|e| anyhow::anyhow!("corrupt user id {}: {}", user.id, e))?;

        let token =
            create_token(&state.jwt_secret, user_id, &user.username, ActorKind::User, None)?;

        Ok(AuthResponse {
            id: user_id,
            username: user.username,
            kind: ActorKind::User,
            role: None,
            token,
        })
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(response))
}

pub async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let response = tokio::task::spawn_blocking(move || -> ApiResult<AuthResponse> {
        let admin = state
            .db
            .get_admin_by_username(&req.username)?
            .ok_or(ApiError::Unauthorized)?;

        verify_password(&req.password, &admin.password)?;

        if !admin.active {
            return Err(ApiError::Forbidden("moderator account is deactivated".into()));
        }

        let admin_id: Uuid = admin
            .id
            .parse()
            .map_err(|e| anyhow::anyhow!("corrupt admin id {}: {}", admin.id, e))?;
        let role = AdminRole::parse(&admin.role).ok_or_else(|| {
            anyhow::anyhow!("corrupt role '{}' on admin {}", admin.role, admin.id)
        })?;

        let token = create_token(
            &state.jwt_secret,
            admin_id,
            &admin.username,
            ActorKind::Admin,
            Some(role),
        )?;

        Ok(AuthResponse {
            id: admin_id,
            username: admin.username,
            kind: ActorKind::Admin,
            role: Some(role),
            token,
        })
    })
    .await
    .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(response))
}

pub fn validate_credentials(username: &str, password: &str) -> ApiResult<()> {
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::Validation(
            "username must be 3-32 characters".into(),
        ));
    }
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, stored_hash: &str) -> ApiResult<()> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("corrupt password hash: {}", e))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ApiError::Unauthorized)
}

fn create_token(
    secret: &str,
    id: Uuid,
    username: &str,
    kind: ActorKind,
    role: Option<AdminRole>,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: id,
        username: username.to_string(),
        kind,
        role,
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_validation_bounds() {
        assert!(validate_credentials("ok_name", "longenough").is_ok());
        assert!(validate_credentials("ab", "longenough").is_err());
        assert!(validate_credentials("ok_name", "short").is_err());
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let hash = hash_password("whisper-pass").unwrap();
        assert!(verify_password("whisper-pass", &hash).is_ok());
        assert!(verify_password("wrong-pass", &hash).is_err());
    }

    #[test]
    fn duplicate_registration_reports_username_taken() {
        let db = Database::open_in_memory().unwrap();
        let req = |name: &str| RegisterRequest {
            username: name.into(),
            password: "longenough".into(),
            display_name: None,
        };

        assert!(register_blocking(&db, "secret", req("luna")).is_ok());
        assert!(matches!(
            register_blocking(&db, "secret", req("luna")),
            Err(ApiError::UsernameTaken)
        ));

        // Also taken when a moderator already owns the name.
        db.create_admin("a1", "sol", "hash", "Sol", "moderator").unwrap();
        assert!(matches!(
            register_blocking(&db, "secret", req("sol")),
            Err(ApiError::UsernameTaken)
        ));
    }
}
