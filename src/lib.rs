pub mod api;
pub mod assessment;
pub mod auth;
pub mod config;
pub mod routes;
pub mod state;
pub mod storage;
