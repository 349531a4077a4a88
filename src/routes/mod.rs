// Routes module - organizes the HTTP surface
// auth: caller identity and account registration
// admin: catalog, results, promotions feed and reconciliation

pub mod admin;
pub mod auth;

pub use auth::{AccountId, AdminAccess};
