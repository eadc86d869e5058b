use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use whisper_api::auth::{self, AppState, AppStateInner};
use whisper_api::messages;
use whisper_api::middleware::{optional_auth, require_auth};
use whisper_api::moderation;
use whisper_api::replies;
use whisper_api::social;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("WHISPER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("WHISPER_DB_PATH").unwrap_or_else(|_| "whisper.db".into());
    let host = std::env::var("WHISPER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("WHISPER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = whisper_db::Database::open(&PathBuf::from(&db_path))?;
    bootstrap_super_admin(&db)?;

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner { db, jwt_secret });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/admin/login", post(auth::admin_login))
        .route("/profiles/{username}", get(social::get_profile))
        .route("/leaderboard", get(social::leaderboard))
        .with_state(app_state.clone());

    // Anonymous posting is first-class on the wall, so these routes take an
    // optional identity instead of requiring one.
    let wall_routes = Router::new()
        .route("/messages", get(messages::list_public))
        .route("/messages", post(messages::create_message))
        .route("/messages/{message_id}", get(messages::get_message))
        .route("/messages/{message_id}/hearts", post(messages::heart_message))
        .route("/messages/{message_id}/replies", post(replies::create_reply))
        .layer(middleware::from_fn(optional_auth))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/inbox/{recipient}", get(messages::list_private_inbox))
        .route("/messages/{message_id}/visibility", patch(moderation::patch_visibility))
        .route("/messages/{message_id}", delete(moderation::delete_message))
        .route("/replies/{reply_id}", delete(moderation::delete_reply))
        .route("/users/{user_id}/verify", post(moderation::verify_user))
        .route("/users/{user_id}", delete(moderation::delete_user))
        .route("/admins", post(moderation::create_admin))
        .route("/admins/{admin_id}/deactivate", post(moderation::deactivate_admin))
        .route("/users/{user_id}/follow", post(social::follow_user))
        .route("/users/{user_id}/follow", delete(social::unfollow_user))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(wall_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Whisperwall server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the first super admin from env when none exists yet. Every other
/// admin account is provisioned through the API by this one.
fn bootstrap_super_admin(db: &whisper_db::Database) -> anyhow::Result<()> {
    if db.has_super_admin()? {
        return Ok(());
    }

    let (Ok(username), Ok(password)) = (
        std::env::var("WHISPER_ROOT_ADMIN_USERNAME"),
        std::env::var("WHISPER_ROOT_ADMIN_PASSWORD"),
    ) else {
        info!("no super admin and no WHISPER_ROOT_ADMIN_* env; skipping bootstrap");
        return Ok(());
    };
    let display_name = std::env::var("WHISPER_ROOT_ADMIN_DISPLAY_NAME")
        .unwrap_or_else(|_| username.clone());

    let hash = auth::hash_password(&password)
        .map_err(|e| anyhow::anyhow!("bootstrap password hashing failed: {}", e))?;
    if !db.create_admin(
        &Uuid::new_v4().to_string(),
        &username,
        &hash,
        &display_name,
        "super_admin",
    )? {
        anyhow::bail!("bootstrap super admin username '{}' is already taken", username);
    }

    info!("bootstrapped super admin '{}'", username);
    Ok(())
}
