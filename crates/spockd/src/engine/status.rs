use std::collections::BTreeMap;
use std::str::FromStr;

use super::host::Target;

/// Action requested by the remote status source for a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DesiredAction {
    Start,
    Stop,
}

impl DesiredAction {
    /// Parse a raw token; anything other than `start`/`stop` is `None`
    pub fn from_token(token: &str) -> Option<Self> {
        DesiredAction::from_str(token).ok()
    }

    pub fn target(self) -> Target {
        match self {
            DesiredAction::Start => Target::On,
            DesiredAction::Stop => Target::Off,
        }
    }
}

/// Group name -> raw desired action token from one successful poll
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStatus(BTreeMap<String, String>);

impl RemoteStatus {
    /// Validate a response body against the configured groups
    ///
    /// The body must be a JSON object holding a string for every name in
    /// `required_groups`. Extra keys are kept. Returns the reason on failure.
    pub fn parse<'a, I>(body: &str, required_groups: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| format!("invalid JSON: {}", e))?;

        let object = value
            .as_object()
            .ok_or_else(|| "response is not a JSON object".to_string())?;

        for group in required_groups {
            match object.get(group) {
                Some(serde_json::Value::String(_)) => {}
                Some(other) => {
                    return Err(format!(
                        "value for group '{}' is not a string: {}",
                        group, other
                    ));
                }
                None => return Err(format!("missing group '{}'", group)),
            }
        }

        // Non-string extras are kept in their JSON rendering
        let groups = object
            .iter()
            .map(|(key, value)| {
                let token = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), token)
            })
            .collect();

        Ok(RemoteStatus(groups))
    }

    pub fn token(&self, group: &str) -> Option<&str> {
        self.0.get(group).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RemoteStatus {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        RemoteStatus(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Icon shown next to a group's status sensor
pub fn sensor_icon(token: Option<&str>) -> &'static str {
    match token.and_then(DesiredAction::from_token) {
        Some(DesiredAction::Start) => "mdi:power-plug",
        Some(DesiredAction::Stop) => "mdi:power-plug-off",
        None => "mdi:help-rhombus-outline",
    }
}

/// Display-only view of an instance's polling history
#[derive(Debug, Clone, Default)]
pub struct StatusSnapshot {
    /// Last successfully polled status, kept across failed polls
    pub last_status: Option<RemoteStatus>,

    /// Set when the most recent poll failed
    pub stale: bool,

    pub last_error: Option<String>,

    /// Set while the status source rejects the configured token
    pub auth_failed: bool,

    pub ticks: u64,
    pub failed_polls: u64,
    pub commands_issued: u64,
    pub failed_commands: u64,
}
