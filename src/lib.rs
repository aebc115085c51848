pub mod api;
pub mod clients;
pub mod config;
pub mod consumers;
pub mod context;
pub mod dispatcher;
pub mod logging;
pub mod models;
pub mod templates;
pub mod utils;
