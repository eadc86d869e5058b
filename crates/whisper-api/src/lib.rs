pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod moderation;
pub mod replies;
pub mod social;
