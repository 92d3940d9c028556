use std::collections::BTreeMap;

use tracing::debug;

use super::host::{LiveState, Target};
use super::status::{DesiredAction, RemoteStatus};
use crate::config::GroupConfig;

/// Entities of one group that must be driven to `target`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    pub target: Target,
    pub entities: Vec<String>,
}

/// Non-fatal problem found while planning
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanIssue {
    #[error("group '{group}' has unknown action '{token}'")]
    UnknownAction { group: String, token: String },

    #[error("entity '{entity_id}' in group '{group}' not found")]
    EntityNotFound { group: String, entity_id: String },
}

/// Commands needed this tick, keyed by group name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan {
    pub groups: BTreeMap<String, GroupPlan>,
    pub issues: Vec<PlanIssue>,
}

impl ActionPlan {
    /// True when no group needs a command
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(|g| g.entities.is_empty())
    }

    /// Every entity that will receive a command
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.groups
            .values()
            .flat_map(|g| g.entities.iter().map(String::as_str))
    }
}

/// Compute which entities deviate from the desired state
///
/// Only groups present in both `status` and `groups` are considered. Groups
/// with an unrecognized token are left out of the plan entirely, while
/// entities the lookup cannot find are skipped one by one.
pub fn plan<F>(status: &RemoteStatus, groups: &GroupConfig, lookup: F) -> ActionPlan
where
    F: Fn(&str) -> Option<LiveState>,
{
    let mut plan = ActionPlan::default();

    for (group, entity_ids) in groups {
        let Some(token) = status.token(group) else {
            continue;
        };

        let Some(action) = DesiredAction::from_token(token) else {
            plan.issues.push(PlanIssue::UnknownAction {
                group: group.clone(),
                token: token.to_string(),
            });
            continue;
        };

        if entity_ids.is_empty() {
            debug!("Group '{}' has no entities, skipping", group);
            continue;
        }

        let target = action.target();
        let mut entities = Vec::new();
        for entity_id in entity_ids {
            match lookup(entity_id) {
                Some(state) if state.matches(target) => {}
                Some(_) => entities.push(entity_id.clone()),
                None => plan.issues.push(PlanIssue::EntityNotFound {
                    group: group.clone(),
                    entity_id: entity_id.clone(),
                }),
            }
        }

        plan.groups
            .insert(group.clone(), GroupPlan { target, entities });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn groups(spec: &[(&str, &[&str])]) -> GroupConfig {
        spec.iter()
            .map(|(name, ids)| (name.to_string(), ids.iter().map(|s| s.to_string()).collect()))
            .collect()
    }

    fn live(states: &[(&str, &str)]) -> HashMap<String, LiveState> {
        states
            .iter()
            .map(|(id, raw)| (id.to_string(), LiveState::from_raw(raw)))
            .collect()
    }

    fn lookup(states: &HashMap<String, LiveState>) -> impl Fn(&str) -> Option<LiveState> + '_ {
        move |id: &str| states.get(id).cloned()
    }

    fn entities<'a>(plan: &'a ActionPlan, group: &str) -> Vec<&'a str> {
        plan.groups[group].entities.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_basic_scenario() {
        let status: RemoteStatus = [("green", "start"), ("yellow", "stop")].into_iter().collect();
        let groups = groups(&[("green", &["a", "b"]), ("yellow", &["c"])]);
        let states = live(&[("a", "off"), ("b", "on"), ("c", "off")]);

        let plan = plan(&status, &groups, lookup(&states));

        assert_eq!(plan.groups["green"].target, Target::On);
        assert_eq!(entities(&plan, "green"), vec!["a"]);
        assert_eq!(plan.groups["yellow"].target, Target::Off);
        assert!(entities(&plan, "yellow").is_empty());
        assert!(plan.issues.is_empty());
    }

    #[test]
    fn test_second_plan_is_empty() {
        let status: RemoteStatus = [("green", "start"), ("yellow", "stop")].into_iter().collect();
        let groups = groups(&[("green", &["a", "b"]), ("yellow", &["c", "d"])]);
        let mut states = live(&[("a", "off"), ("b", "unavailable"), ("c", "on"), ("d", "unknown")]);

        let first = plan(&status, &groups, lookup(&states));
        assert_eq!(entities(&first, "green"), vec!["a", "b"]);
        assert_eq!(entities(&first, "yellow"), vec!["c", "d"]);

        for group in first.groups.values() {
            let applied = match group.target {
                Target::On => LiveState::On,
                Target::Off => LiveState::Off,
            };
            for id in &group.entities {
                states.insert(id.clone(), applied.clone());
            }
        }

        let second = plan(&status, &groups, lookup(&states));
        assert!(second.is_empty());
        assert_eq!(second.entities().count(), 0);
    }

    #[test]
    fn test_missing_entity_does_not_block_others() {
        let status: RemoteStatus = [("green", "start")].into_iter().collect();
        let groups = groups(&[("green", &["a", "ghost", "c"])]);
        let states = live(&[("a", "off"), ("c", "off")]);

        let plan = plan(&status, &groups, lookup(&states));

        assert_eq!(entities(&plan, "green"), vec!["a", "c"]);
        assert_eq!(
            plan.issues,
            vec![PlanIssue::EntityNotFound {
                group: "green".to_string(),
                entity_id: "ghost".to_string(),
            }]
        );
    }

    #[test]
    fn test_unknown_action_skips_only_that_group() {
        let status: RemoteStatus = [("green", "pause"), ("yellow", "stop")].into_iter().collect();
        let groups = groups(&[("green", &["a"]), ("yellow", &["b"])]);
        let states = live(&[("a", "off"), ("b", "on")]);

        let plan = plan(&status, &groups, lookup(&states));

        assert!(!plan.groups.contains_key("green"));
        assert_eq!(entities(&plan, "yellow"), vec!["b"]);
        assert_eq!(
            plan.issues,
            vec![PlanIssue::UnknownAction {
                group: "green".to_string(),
                token: "pause".to_string(),
            }]
        );
    }

    #[test]
    fn test_empty_or_absent_groups_plan_nothing() {
        let status: RemoteStatus = [("green", "start"), ("yellow", "stop")].into_iter().collect();
        let states = live(&[("a", "off")]);

        let empty = plan(&status, &groups(&[("green", &[]), ("yellow", &[])]), lookup(&states));
        assert!(empty.is_empty());
        assert!(empty.groups.is_empty());

        let absent = plan(&status, &GroupConfig::new(), lookup(&states));
        assert!(absent.is_empty());
        assert!(absent.issues.is_empty());
    }

    #[test]
    fn test_groups_missing_from_status_are_ignored() {
        let status: RemoteStatus = [("green", "start")].into_iter().collect();
        let groups = groups(&[("green", &["a"]), ("yellow", &["b"])]);
        let states = live(&[("a", "off"), ("b", "on")]);

        let plan = plan(&status, &groups, lookup(&states));
        assert_eq!(plan.groups.keys().collect::<Vec<_>>(), vec!["green"]);
    }

    #[test]
    fn test_disjoint_groups_never_share_entities() {
        let tokens = ["start", "stop"];
        let raw_states = ["on", "off", "unknown"];
        let groups = groups(&[("green", &["a", "b", "c"]), ("yellow", &["d", "e"])]);

        for green in tokens {
            for yellow in tokens {
                for raw in raw_states {
                    let status: RemoteStatus =
                        [("green", green), ("yellow", yellow)].into_iter().collect();
                    let states =
                        live(&[("a", raw), ("b", "on"), ("c", "off"), ("d", raw), ("e", "on")]);

                    let plan = plan(&status, &groups, lookup(&states));
                    let mut seen = std::collections::HashSet::new();
                    for id in plan.entities() {
                        assert!(seen.insert(id), "{} planned twice", id);
                    }
                }
            }
        }
    }
}
