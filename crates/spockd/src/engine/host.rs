use std::sync::Arc;

use async_trait::async_trait;
use linkme::distributed_slice;

use crate::config::Config;

/// Desired on/off state of a group of entities
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Target {
    On,
    Off,
}

impl Target {
    /// Name of the host service that drives an entity to this state
    pub fn service(self) -> &'static str {
        match self {
            Target::On => "turn_on",
            Target::Off => "turn_off",
        }
    }
}

/// Current state of an entity as reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveState {
    On,
    Off,
    /// `unknown`, `unavailable` or anything else the host reports
    Other(String),
}

impl LiveState {
    pub fn from_raw(raw: &str) -> Self {
        match raw {
            "on" => LiveState::On,
            "off" => LiveState::Off,
            other => LiveState::Other(other.to_string()),
        }
    }

    /// True only when the entity is exactly in the target state
    pub fn matches(&self, target: Target) -> bool {
        matches!(
            (self, target),
            (LiveState::On, Target::On) | (LiveState::Off, Target::Off)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("host rejected credentials")]
    Auth,

    #[error("host returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("host transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The system owning the controlled entities
///
/// Reads live entity states and submits grouped on/off commands. Exactly one
/// host is active per process; every instance shares it.
#[async_trait]
pub trait Host: Send + Sync {
    /// Get the name/identifier of this host backend
    fn name(&self) -> &str;

    /// Read the raw state of an entity, `None` when the host does not know it
    async fn get_state(&self, entity_id: &str) -> Result<Option<String>, HostError>;

    /// Drive every listed entity to `target` with a single command
    async fn set_state(&self, entity_ids: &[String], target: Target) -> Result<(), HostError>;
}

/// Result type for host factory functions
pub type HostFactoryResult = anyhow::Result<Option<Arc<dyn Host>>>;

pub struct HostContext<'a> {
    pub config: &'a Config,
}

#[distributed_slice]
pub static REGISTRY: [fn(&HostContext) -> HostFactoryResult];

/// Build the host backend from configuration
///
/// Registered factories are tried in turn and the first one that accepts the
/// configuration wins.
pub fn host_from_config(config: &Config) -> anyhow::Result<Arc<dyn Host>> {
    let ctx = HostContext { config };
    for constr in REGISTRY {
        if let Some(host) = constr(&ctx)? {
            tracing::info!("Using host backend '{}'", host.name());
            return Ok(host);
        }
    }

    anyhow::bail!("no host backend available; was spockd built without any host feature?")
}

/// In-memory host for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockHost {
    pub states: std::sync::Mutex<std::collections::HashMap<String, String>>,
    pub commands: std::sync::Mutex<Vec<(Vec<String>, Target)>>,
    pub fail_commands: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_states(states: &[(&str, &str)]) -> Self {
        let host = Self::new();
        for (entity_id, state) in states {
            host.set(entity_id, state);
        }
        host
    }

    pub fn set(&self, entity_id: &str, state: &str) {
        self.states
            .lock()
            .unwrap()
            .insert(entity_id.to_string(), state.to_string());
    }

    pub fn commands(&self) -> Vec<(Vec<String>, Target)> {
        self.commands.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Host for MockHost {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_state(&self, entity_id: &str) -> Result<Option<String>, HostError> {
        Ok(self.states.lock().unwrap().get(entity_id).cloned())
    }

    async fn set_state(&self, entity_ids: &[String], target: Target) -> Result<(), HostError> {
        self.commands
            .lock()
            .unwrap()
            .push((entity_ids.to_vec(), target));

        if self.fail_commands.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(HostError::Api {
                status: 500,
                message: "mock failure".to_string(),
            });
        }

        // Commands take effect immediately so the next tick sees them
        let mut states = self.states.lock().unwrap();
        for entity_id in entity_ids {
            states.insert(entity_id.clone(), target.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_state_matching() {
        assert!(LiveState::from_raw("on").matches(Target::On));
        assert!(LiveState::from_raw("off").matches(Target::Off));
        assert!(!LiveState::from_raw("on").matches(Target::Off));

        for raw in ["unknown", "unavailable", "ON", ""] {
            let state = LiveState::from_raw(raw);
            assert!(!state.matches(Target::On), "{}", raw);
            assert!(!state.matches(Target::Off), "{}", raw);
        }
    }

    #[test]
    fn test_target_names() {
        assert_eq!(Target::On.to_string(), "on");
        assert_eq!(Target::Off.service(), "turn_off");
        let name: &'static str = Target::On.into();
        assert_eq!(name, "on");
    }
}
