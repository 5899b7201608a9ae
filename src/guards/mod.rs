pub mod auth;
pub mod roles;

pub use auth::AuthGuard;
pub use roles::{AdminGuard, CollectorGuard};
