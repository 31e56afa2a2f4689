pub mod config;
pub mod db;
pub mod error;
pub mod handler;
mod main_lib;
pub mod models;
pub mod repository;
pub mod schema;

pub use main_lib::{build_state, configure_routes, init_tracing, shutdown_signal, AppState};
