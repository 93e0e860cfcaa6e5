// Library exports for circle-server
// The binary and the integration tests both build on these modules

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod mention;
pub mod password;
pub mod rate_limit;
pub mod router;
pub mod session;
pub mod state;
pub mod validation;
