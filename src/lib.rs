pub mod api;
pub mod app;
pub mod config;
pub mod fetch_error;
pub mod fetcher;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod services;
pub mod session;
