use serde::{Deserialize, Serialize};

/// Minimal identity record for payments that reference an account holder.
/// Full profile management lives in another subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
}
