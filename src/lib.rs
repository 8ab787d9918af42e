mod fetch;
mod routes;

pub mod app;
pub mod config;
pub mod history;
pub mod model_service;
pub mod ort_service;
pub mod prediction;
pub mod preprocess;
pub mod reports;
pub mod server;
pub mod telemetry;

pub use app::start_app;
