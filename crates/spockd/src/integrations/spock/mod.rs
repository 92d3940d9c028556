//! Clients for the Spock cloud: the status API and the telemetry sink.

mod client;
mod telemetry;

pub use client::PollError;
pub use client::StatusClient;
pub use client::StatusSource;
pub use telemetry::PowerReading;
pub use telemetry::TelemetryClient;
pub use telemetry::TelemetryError;

#[cfg(test)]
pub use client::MockStatusSource;
