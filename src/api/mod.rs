mod client;
pub mod dto;

pub use client::{ApiClient, ApiError};
