//! OPP server wiring: configuration and the assembled service graph.

pub mod app;
pub mod config;

pub use app::App;
pub use config::ServerConfig;
