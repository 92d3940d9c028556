use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::host::Host;
use super::instance::Instance;
use super::status::RemoteStatus;
use super::telemetry;
use crate::config::{Config, InstanceConfig};
use crate::integrations::spock::{PollError, StatusClient, StatusSource, TelemetryClient};

/// Delay before an instance's first scheduled tick
const STARTUP_DELAY: Duration = Duration::from_secs(2);

/// Builds the status source for an instance configuration
pub type SourceFactory =
    Box<dyn Fn(&InstanceConfig) -> reqwest::Result<Arc<dyn StatusSource>> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("instance '{0}' is already running")]
    AlreadyRunning(String),

    #[error("unknown instance '{0}'")]
    UnknownInstance(String),

    #[error("instance '{name}': status API rejected the token")]
    TokenRejected {
        name: String,
        #[source]
        source: PollError,
    },

    #[error("instance '{name}': failed to build HTTP client")]
    Client {
        name: String,
        #[source]
        source: reqwest::Error,
    },
}

struct RunningInstance {
    instance: Arc<Instance>,
    ticker: JoinHandle<()>,
    telemetry: Option<JoinHandle<()>>,
}

impl RunningInstance {
    fn stop(self) {
        self.instance.close();
        self.ticker.abort();
        if let Some(telemetry) = self.telemetry {
            telemetry.abort();
        }
    }
}

/// spockd engine
///
/// Owns every running instance together with its ticker and telemetry tasks.
/// Instances share only the host; each one polls and reconciles on its own.
pub struct Engine {
    host: Arc<dyn Host>,
    instances: BTreeMap<String, RunningInstance>,
    source_factory: SourceFactory,
    startup_delay: Duration,
}

impl Engine {
    /// Create a new Engine talking to the status API over HTTP
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self {
            host,
            instances: BTreeMap::new(),
            source_factory: Box::new(|config: &InstanceConfig| {
                Ok(Arc::new(StatusClient::new(config)?) as Arc<dyn StatusSource>)
            }),
            startup_delay: STARTUP_DELAY,
        }
    }

    /// Replace how status sources are built
    pub fn with_source_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&InstanceConfig) -> reqwest::Result<Arc<dyn StatusSource>> + Send + Sync + 'static,
    {
        self.source_factory = Box::new(factory);
        self
    }

    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    fn build_source(
        &self,
        name: &str,
        config: &InstanceConfig,
    ) -> Result<Arc<dyn StatusSource>, EngineError> {
        (self.source_factory)(config).map_err(|source| EngineError::Client {
            name: name.to_string(),
            source,
        })
    }

    /// Poll once so a rejected token fails setup
    ///
    /// Any other failure is handed back and retried on the normal cadence.
    async fn validate_token(
        name: &str,
        source: &dyn StatusSource,
    ) -> Result<Result<RemoteStatus, PollError>, EngineError> {
        match source.poll().await {
            Err(e) if e.is_auth() => Err(EngineError::TokenRejected {
                name: name.to_string(),
                source: e,
            }),
            result => Ok(result),
        }
    }

    fn launch(
        &self,
        name: &str,
        config: InstanceConfig,
        source: Arc<dyn StatusSource>,
        initial: Option<Result<RemoteStatus, PollError>>,
    ) -> Result<RunningInstance, EngineError> {
        let telemetry_client = match (&config.telemetry, &config.target_id) {
            (Some(telemetry), Some(target_id)) => Some(
                TelemetryClient::new(telemetry, target_id, config.request_timeout).map_err(
                    |source| EngineError::Client {
                        name: name.to_string(),
                        source,
                    },
                )?,
            ),
            _ => None,
        };

        let instance = Arc::new(Instance::new(name, config, source, Arc::clone(&self.host)));
        if let Some(result) = &initial {
            instance.record_poll(result);
        }

        let ticker = instance.spawn_ticker(self.startup_delay);

        let telemetry = telemetry_client.and_then(|client| {
            let telemetry = instance.config().telemetry.as_ref()?;
            Some(telemetry::spawn(
                name.to_string(),
                Arc::clone(&self.host),
                client,
                telemetry.sensors.clone(),
                telemetry.interval,
                self.startup_delay,
            ))
        });

        Ok(RunningInstance {
            instance,
            ticker,
            telemetry,
        })
    }

    /// Set up an instance and start its tasks
    pub async fn start_instance(
        &mut self,
        name: &str,
        config: InstanceConfig,
    ) -> Result<(), EngineError> {
        if self.instances.contains_key(name) {
            return Err(EngineError::AlreadyRunning(name.to_string()));
        }

        let source = self.build_source(name, &config)?;
        let initial = Self::validate_token(name, source.as_ref()).await?;
        let running = self.launch(name, config, source, Some(initial))?;

        info!("[{}] Instance started", name);
        self.instances.insert(name.to_string(), running);
        Ok(())
    }

    /// Replace an instance's configuration
    ///
    /// The token is re-validated only when it changed. On any error the old
    /// instance keeps running untouched. The replacement starts with actions
    /// enabled.
    pub async fn reconfigure(
        &mut self,
        name: &str,
        config: InstanceConfig,
    ) -> Result<(), EngineError> {
        let current = self
            .instances
            .get(name)
            .ok_or_else(|| EngineError::UnknownInstance(name.to_string()))?;
        let token_changed = current.instance.config().api_token != config.api_token;

        let source = self.build_source(name, &config)?;
        let initial = if token_changed {
            debug!("[{}] Token changed, validating", name);
            Some(Self::validate_token(name, source.as_ref()).await?)
        } else {
            None
        };
        let running = self.launch(name, config, source, initial)?;

        if let Some(old) = self.instances.insert(name.to_string(), running) {
            old.stop();
        }
        info!("[{}] Instance reconfigured", name);
        Ok(())
    }

    /// Stop an instance immediately
    pub fn teardown(&mut self, name: &str) -> Result<(), EngineError> {
        let running = self
            .instances
            .remove(name)
            .ok_or_else(|| EngineError::UnknownInstance(name.to_string()))?;
        running.stop();
        info!("[{}] Instance stopped", name);
        Ok(())
    }

    /// Stop every instance
    pub fn shutdown(&mut self) {
        info!("Engine shutting down");
        for (_, running) in std::mem::take(&mut self.instances) {
            running.stop();
        }
    }

    /// Bring running instances in line with `config`
    ///
    /// Added instances are started, changed ones reconfigured and removed ones
    /// torn down. Failures are collected so one bad instance does not block
    /// the others.
    pub async fn apply_config(&mut self, config: &Config) -> Vec<EngineError> {
        let mut errors = Vec::new();

        let removed: Vec<String> = self
            .instances
            .keys()
            .filter(|name| !config.instances.contains_key(*name))
            .cloned()
            .collect();
        for name in removed {
            if let Err(e) = self.teardown(&name) {
                errors.push(e);
            }
        }

        for (name, instance_config) in &config.instances {
            let unchanged = self
                .instances
                .get(name)
                .map(|running| running.instance.config() == instance_config);
            let result = match unchanged {
                None => self.start_instance(name, instance_config.clone()).await,
                Some(false) => self.reconfigure(name, instance_config.clone()).await,
                Some(true) => Ok(()),
            };

            if let Err(e) = result {
                error!("{}", e);
                errors.push(e);
            }
        }

        errors
    }

    pub fn instance(&self, name: &str) -> Option<Arc<Instance>> {
        self.instances
            .get(name)
            .map(|running| Arc::clone(&running.instance))
    }

    /// Running instances in name order
    pub fn instances(&self) -> impl Iterator<Item = &Arc<Instance>> {
        self.instances.values().map(|running| &running.instance)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        for running in self.instances.values() {
            running.instance.close();
            running.ticker.abort();
            if let Some(telemetry) = &running.telemetry {
                telemetry.abort();
            }
        }
    }
}
