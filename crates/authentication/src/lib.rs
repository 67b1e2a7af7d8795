pub mod permissions;
pub mod roles;
pub mod service;

#[cfg(test)]
mod test_support;

pub use permissions::PermissionChecker;
pub use roles::RoleService;
pub use service::{AuthService, AuthServiceTrait};
