pub mod identity;
pub mod jwt;
pub mod password;

pub use identity::{IdentityAdmin, IdentityProvider, PgIdentityProvider};
pub use jwt::{AdminUser, AuthUser};
