//! Remote commands
//!
//! Each command knows the topic it is published on and how its payload is
//! encoded. Publishing goes through [`CommandPublisher`], implemented by the
//! broker client.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::history::HistoryRequest;
use super::LiveError;

// ============================================================================
// Publisher seam
// ============================================================================

/// Outgoing side of the broker connection.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), LiveError>;
}

// ============================================================================
// Command values
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineMode {
    Idle,
    Active,
    Brew,
    Steam,
}

impl MachineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineMode::Idle => "idle",
            MachineMode::Active => "active",
            MachineMode::Brew => "brew",
            MachineMode::Steam => "steam",
        }
    }
}

impl FromStr for MachineMode {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(MachineMode::Idle),
            "active" => Ok(MachineMode::Active),
            "brew" => Ok(MachineMode::Brew),
            "steam" => Ok(MachineMode::Steam),
            other => Err(LiveError::InvalidPayload(format!("unknown mode '{other}'"))),
        }
    }
}

impl fmt::Display for MachineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control strategy run by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMethod {
    None,
    Threshold,
    Pid,
    Mpc,
}

impl ControlMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMethod::None => "none",
            ControlMethod::Threshold => "threshold",
            ControlMethod::Pid => "pid",
            ControlMethod::Mpc => "mpc",
        }
    }
}

impl FromStr for ControlMethod {
    type Err = LiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ControlMethod::None),
            "threshold" => Ok(ControlMethod::Threshold),
            "pid" => Ok(ControlMethod::Pid),
            "mpc" => Ok(ControlMethod::Mpc),
            other => Err(LiveError::InvalidPayload(format!("unknown control method '{other}'"))),
        }
    }
}

impl fmt::Display for ControlMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// RemoteCommand
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    SetMode(MachineMode),
    SetControlMethod(ControlMethod),
    /// Setpoint in whole degrees Celsius
    SetTargetTemperature(i32),
    /// Manual heater duty cycle in [0, 1]
    SetBoilerLevel(f64),
    RequestHistory(HistoryRequest),
}

impl RemoteCommand {
    pub fn topic(&self, prefix: &str) -> String {
        let suffix = match self {
            RemoteCommand::SetMode(_) => "mode/set",
            RemoteCommand::SetControlMethod(_) => "control_method/set",
            RemoteCommand::SetTargetTemperature(_) => "temperature/target/set",
            RemoteCommand::SetBoilerLevel(_) => "boiler_level/set",
            RemoteCommand::RequestHistory(_) => "temperature/history/command",
        };
        format!("{prefix}/{suffix}")
    }

    pub fn payload(&self) -> Result<String, LiveError> {
        Ok(match self {
            RemoteCommand::SetMode(mode) => mode.to_string(),
            RemoteCommand::SetControlMethod(method) => method.to_string(),
            RemoteCommand::SetTargetTemperature(t) => t.to_string(),
            RemoteCommand::SetBoilerLevel(level) => {
                if !(0.0..=1.0).contains(level) {
                    return Err(LiveError::InvalidPayload(format!(
                        "boiler level {level} outside [0, 1]"
                    )));
                }
                level.to_string()
            }
            RemoteCommand::RequestHistory(request) => serde_json::to_string(request)?,
        })
    }

    /// Encode and publish in one go.
    pub async fn send<P>(&self, publisher: &P, prefix: &str) -> Result<(), LiveError>
    where
        P: CommandPublisher + ?Sized,
    {
        let payload = self.payload()?;
        let topic = self.topic(prefix);
        tracing::debug!(topic = %topic, payload = %payload, "Publishing command");
        publisher.publish(&topic, payload).await
    }
}
