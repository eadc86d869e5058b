pub mod actor;
pub mod api;
pub mod models;

/// Maximum nesting depth of a reply chain. A reply directly on a message is
/// depth 1; replying to a depth-3 reply is rejected.
pub const MAX_REPLY_DEPTH: u32 = 3;
