pub mod api;
pub mod config;
pub mod enrich;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod storage;
