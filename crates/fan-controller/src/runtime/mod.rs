mod app;
mod config;
mod logging;
mod settings;

pub use app::run_from_args;
