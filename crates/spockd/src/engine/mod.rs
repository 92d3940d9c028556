mod dispatch;
mod engine;
mod host;
mod instance;
mod reconcile;
mod status;
mod telemetry;

pub use dispatch::dispatch;
pub use dispatch::DispatchFailure;
pub use dispatch::DispatchReport;
pub use dispatch::IssuedCommand;
pub use engine::Engine;
pub use engine::EngineError;
pub use host::host_from_config;
pub use host::Host;
pub use host::HostContext;
pub use host::HostError;
pub use host::HostFactoryResult;
pub use host::LiveState;
pub use host::Target;
pub use host::REGISTRY as HOST_REGISTRY;
pub use instance::Instance;
pub use instance::TickOutcome;
pub use reconcile::plan;
pub use reconcile::ActionPlan;
pub use reconcile::GroupPlan;
pub use reconcile::PlanIssue;
pub use status::sensor_icon;
pub use status::DesiredAction;
pub use status::RemoteStatus;
pub use status::StatusSnapshot;

#[cfg(test)]
pub use host::MockHost;
