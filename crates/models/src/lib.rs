pub mod role;
pub mod token;
pub mod user;

pub use role::{ADMIN_ROLE, DEFAULT_ROLE, Permission, PermissionSet, Role, RoleInput, RoleUpdate, UnknownPermission};
pub use token::{Claims, RefreshInput, TokenPair, TokenType};
pub use user::{LoginInput, RegisterInput, UpdateProfileInput, User, UserProfile};
