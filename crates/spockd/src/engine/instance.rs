use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::dispatch::{dispatch, DispatchReport};
use super::host::{Host, LiveState};
use super::reconcile::{self, ActionPlan};
use super::status::{DesiredAction, RemoteStatus, StatusSnapshot};
use crate::config::InstanceConfig;
use crate::integrations::spock::{PollError, StatusSource};

/// What a single tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// The instance was torn down; nothing was applied
    Closed,
    PollFailed(PollError),
    /// Polled, but actions are switched off
    Disabled,
    Reconciled {
        plan: ActionPlan,
        report: DispatchReport,
    },
}

/// One configured account/site and everything its ticks need
pub struct Instance {
    name: String,
    config: Arc<InstanceConfig>,
    source: Arc<dyn StatusSource>,
    host: Arc<dyn Host>,

    /// RunEnabled switch
    actions_enabled: AtomicBool,

    closed: AtomicBool,

    /// Display snapshot (readers load the Arc, the ticker stores a new one)
    status: ArcSwap<StatusSnapshot>,
}

impl Instance {
    pub fn new(
        name: impl Into<String>,
        config: InstanceConfig,
        source: Arc<dyn StatusSource>,
        host: Arc<dyn Host>,
    ) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            source,
            host,
            actions_enabled: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            status: ArcSwap::new(Arc::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn actions_enabled(&self) -> bool {
        self.actions_enabled.load(Ordering::SeqCst)
    }

    pub fn set_actions_enabled(&self, enabled: bool) {
        let previous = self.actions_enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(
                "[{}] Actions {}",
                self.name,
                if enabled { "enabled" } else { "disabled" }
            );
        }
    }

    /// Mark the instance torn down; in-flight ticks stop at their next check
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get a snapshot of the current status.
    pub fn snapshot(&self) -> Arc<StatusSnapshot> {
        self.status.load_full()
    }

    fn update_status(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        let mut status = StatusSnapshot::clone(&self.status.load());
        f(&mut status);
        self.status.store(Arc::new(status));
    }

    /// Fold a poll result into the display snapshot and log failures by kind
    pub(crate) fn record_poll(&self, result: &Result<RemoteStatus, PollError>) {
        match result {
            Ok(status) => {
                debug!("[{}] Polled status: {:?}", self.name, status);
                self.update_status(|s| {
                    s.last_status = Some(status.clone());
                    s.stale = false;
                    s.last_error = None;
                    s.auth_failed = false;
                });
            }
            Err(e) => {
                match e {
                    PollError::Auth { .. } => {
                        warn!("[{}] {}; check the configured api_token", self.name, e)
                    }
                    PollError::Format { reason, payload } => error!(
                        "[{}] Malformed status response ({}): {}",
                        self.name, reason, payload
                    ),
                    PollError::Http { .. } | PollError::Network(_) => {
                        warn!("[{}] Poll failed: {}", self.name, e)
                    }
                }
                self.update_status(|s| {
                    s.stale = true;
                    s.last_error = Some(e.to_string());
                    s.auth_failed = e.is_auth();
                    s.failed_polls += 1;
                });
            }
        }
    }

    /// Run one poll, reconcile and dispatch cycle
    pub async fn tick(&self) -> TickOutcome {
        if self.is_closed() {
            return TickOutcome::Closed;
        }

        let actions_enabled = self.actions_enabled();
        let config = Arc::clone(&self.config);
        self.update_status(|s| s.ticks += 1);

        let result = self.source.poll().await;
        if self.is_closed() {
            return TickOutcome::Closed;
        }

        self.record_poll(&result);
        let status = match result {
            Ok(status) => status,
            Err(e) => return TickOutcome::PollFailed(e),
        };

        if !actions_enabled {
            debug!("[{}] Actions disabled, skipping reconciliation", self.name);
            return TickOutcome::Disabled;
        }

        let mut live = HashMap::new();
        for (group, entity_ids) in &config.groups {
            // Groups without a usable action never read their entities
            if status
                .token(group)
                .and_then(DesiredAction::from_token)
                .is_none()
            {
                continue;
            }

            for entity_id in entity_ids {
                match self.host.get_state(entity_id).await {
                    Ok(Some(raw)) => {
                        live.insert(entity_id.clone(), LiveState::from_raw(&raw));
                    }
                    Ok(None) => {}
                    Err(e) => warn!(
                        "[{}] Failed to read state of '{}': {}",
                        self.name, entity_id, e
                    ),
                }

                if self.is_closed() {
                    return TickOutcome::Closed;
                }
            }
        }

        let plan = reconcile::plan(&status, &config.groups, |id| live.get(id).cloned());
        for issue in &plan.issues {
            warn!("[{}] {}", self.name, issue);
        }

        if plan.is_empty() {
            debug!("[{}] All groups already in line", self.name);
        }

        let report = dispatch(&plan, self.host.as_ref()).await;
        let issued = report.issued.len() as u64;
        let failed = report.failures.len() as u64;
        if issued + failed > 0 {
            self.update_status(|s| {
                s.commands_issued += issued;
                s.failed_commands += failed;
            });
        }

        TickOutcome::Reconciled { plan, report }
    }

    /// Drive ticks on the configured cadence until the instance is closed
    ///
    /// The first tick fires after `first_delay`. Ticks never overlap and
    /// missed ticks are skipped rather than bursted.
    pub fn spawn_ticker(self: &Arc<Self>, first_delay: Duration) -> JoinHandle<()> {
        let instance = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval_at(Instant::now() + first_delay, instance.config.scan_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(
                "[{}] Polling every {:?}",
                instance.name, instance.config.scan_interval
            );

            loop {
                interval.tick().await;
                if let TickOutcome::Closed = instance.tick().await {
                    break;
                }
            }

            debug!("[{}] Ticker stopped", instance.name);
        })
    }
}
