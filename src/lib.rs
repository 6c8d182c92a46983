pub mod cache;
pub mod config;
pub mod error;
pub mod hook;
pub mod http;
pub mod model;
pub mod types;
