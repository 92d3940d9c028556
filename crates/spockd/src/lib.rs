pub mod api;
pub mod config;
pub mod engine;
mod integrations;

pub use config::format_diagnostics;
pub use config::Config;
pub use config::ConfigError;
pub use config::Diagnostic;
pub use config::LogLevel;
pub use engine::Engine;
pub use engine::EngineError;
pub use engine::Instance;
pub use engine::StatusSnapshot;
pub use integrations::spock::PollError;
