use tracing::{debug, info, warn};

use super::host::{Host, HostError, Target};
use super::reconcile::ActionPlan;

/// A grouped command the host accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCommand {
    pub group: String,
    pub target: Target,
    pub entities: Vec<String>,
}

/// A grouped command the host refused or never received
#[derive(Debug)]
pub struct DispatchFailure {
    pub group: String,
    pub target: Target,
    pub entities: Vec<String>,
    pub error: HostError,
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub issued: Vec<IssuedCommand>,
    pub failures: Vec<DispatchFailure>,

    /// Groups already in their desired state
    pub unchanged: Vec<String>,
}

/// Submit one grouped command per group with pending entities
///
/// Failures are recorded in the report and never retried here; the next poll
/// detects whatever is still out of line.
pub async fn dispatch(plan: &ActionPlan, host: &dyn Host) -> DispatchReport {
    let mut report = DispatchReport::default();

    for (group, group_plan) in &plan.groups {
        if group_plan.entities.is_empty() {
            debug!("Group '{}' already {}, nothing to do", group, group_plan.target);
            report.unchanged.push(group.clone());
            continue;
        }

        match host.set_state(&group_plan.entities, group_plan.target).await {
            Ok(()) => {
                info!(
                    "Group '{}': {} {:?}",
                    group,
                    group_plan.target.service(),
                    group_plan.entities
                );
                report.issued.push(IssuedCommand {
                    group: group.clone(),
                    target: group_plan.target,
                    entities: group_plan.entities.clone(),
                });
            }
            Err(e) => {
                warn!(
                    "Group '{}': {} {:?} failed: {}",
                    group,
                    group_plan.target.service(),
                    group_plan.entities,
                    e
                );
                report.failures.push(DispatchFailure {
                    group: group.clone(),
                    target: group_plan.target,
                    entities: group_plan.entities.clone(),
                    error: e,
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::host::MockHost;
    use crate::engine::reconcile::GroupPlan;
    use std::sync::atomic::Ordering;

    fn plan(groups: &[(&str, Target, &[&str])]) -> ActionPlan {
        ActionPlan {
            groups: groups
                .iter()
                .map(|(name, target, ids)| {
                    (
                        name.to_string(),
                        GroupPlan {
                            target: *target,
                            entities: ids.iter().map(|s| s.to_string()).collect(),
                        },
                    )
                })
                .collect(),
            issues: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_one_command_per_non_empty_group() {
        let host = MockHost::new();
        let plan = plan(&[("green", Target::On, &["a"]), ("yellow", Target::Off, &[])]);

        let report = dispatch(&plan, &host).await;

        assert_eq!(host.commands(), vec![(vec!["a".to_string()], Target::On)]);
        assert_eq!(report.issued.len(), 1);
        assert_eq!(report.unchanged, vec!["yellow".to_string()]);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_group_carries_all_entities() {
        let host = MockHost::new();
        let plan = plan(&[("green", Target::On, &["a", "b"]), ("yellow", Target::Off, &["c"])]);

        dispatch(&plan, &host).await;

        assert_eq!(
            host.commands(),
            vec![
                (vec!["a".to_string(), "b".to_string()], Target::On),
                (vec!["c".to_string()], Target::Off),
            ]
        );
    }

    #[tokio::test]
    async fn test_failures_are_recorded_not_propagated() {
        let host = MockHost::new();
        host.fail_commands.store(true, Ordering::SeqCst);
        let plan = plan(&[("green", Target::On, &["a"]), ("yellow", Target::Off, &["b"])]);

        let report = dispatch(&plan, &host).await;

        // Every group is still attempted exactly once
        assert_eq!(host.commands().len(), 2);
        assert!(report.issued.is_empty());
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            report.failures[0].error,
            HostError::Api { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_plan_issues_nothing() {
        let host = MockHost::new();
        let report = dispatch(&ActionPlan::default(), &host).await;
        assert!(host.commands().is_empty());
        assert!(report.issued.is_empty());
        assert!(report.failures.is_empty());
    }
}
