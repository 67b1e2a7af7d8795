use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: String,
    pub additional_info: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_verified: bool,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `jti` of the only refresh token currently accepted for this user.
    pub session_id: Option<String>,
}

impl User {
    // Helper to generate a new ID
    fn generate_id() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn new(username: String, email: String, password_hash: String, role_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: Self::generate_id(),
            username,
            email,
            password_hash,
            role_id,
            additional_info: None,
            is_active: true,
            is_superuser: false,
            is_verified: false,
            registered_at: now,
            updated_at: now,
            session_id: None,
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("role_id", &self.role_id)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

/// Public view of a user. Never carries the password hash or session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    pub role_id: String,
    pub additional_info: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub registered_at: DateTime<Utc>,
}

// Convert User to UserProfile (hiding sensitive data)
impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role_id: user.role_id,
            additional_info: user.additional_info,
            is_active: user.is_active,
            is_verified: user.is_verified,
            registered_at: user.registered_at,
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

/// Partial profile update; absent fields are left unchanged.
#[derive(Deserialize, Default)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub additional_info: Option<String>,
}

// Inputs carry plaintext passwords, keep them out of logs.
macro_rules! redacted_debug {
    ($ty:ident { $($field:ident),* }) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    $(.field(stringify!($field), &self.$field))*
                    .field("password", &"<redacted>")
                    .finish()
            }
        }
    };
}

redacted_debug!(RegisterInput { username, email });
redacted_debug!(LoginInput { username });
redacted_debug!(UpdateProfileInput { username, email, additional_info });
