/*!
 * Device state snapshot.
 *
 * The coordinator's current best-known picture of the physical device.
 * Mutated only by the response parser output and by connection lifecycle
 * transitions; everyone else reads snapshots.
 */
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use avlink_core::types::Value;

/// Current state of a bidirectional device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    /// Power state: "on", "off" or "unknown"
    pub power: String,
    /// Current input selection
    pub current_input: String,
    /// For matrices: which output is selected
    pub current_output: String,
    /// Volume, -1 means unknown
    pub volume: i64,
    /// Mute state
    pub mute: bool,
    /// Connection status
    pub connected: bool,
    /// Most recent decoded reply line
    pub last_response: String,
    /// State keys not covered by the fixed fields
    pub custom_states: HashMap<String, String>,
    /// When any field last changed
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            power: "unknown".to_string(),
            current_input: String::new(),
            current_output: String::new(),
            volume: -1,
            mute: false,
            connected: false,
            last_response: String::new(),
            custom_states: HashMap::new(),
            last_updated: None,
        }
    }
}

impl DeviceState {
    /// Create a fresh, unknown state
    pub fn new() -> Self {
        Self::default()
    }

    /// Update a state value by key and stamp `last_updated`
    ///
    /// Known keys land in the fixed fields (with parsing for `volume` and
    /// `mute`); everything else goes into `custom_states`. Returns the
    /// typed value delivered to state listeners.
    pub fn update(&mut self, key: &str, value: &str) -> Value {
        let notified = match key {
            "power" => {
                self.power = value.to_string();
                Value::String(self.power.clone())
            }
            "current_input" => {
                self.current_input = value.to_string();
                Value::String(self.current_input.clone())
            }
            "current_output" => {
                self.current_output = value.to_string();
                Value::String(self.current_output.clone())
            }
            "volume" => {
                // Keep the previous value when the device sends garbage
                self.volume = value.trim().parse().unwrap_or(self.volume);
                Value::Integer(self.volume)
            }
            "mute" => {
                self.mute = matches!(
                    value.trim().to_ascii_lowercase().as_str(),
                    "1" | "on" | "true" | "yes"
                );
                Value::Bool(self.mute)
            }
            "last_response" => {
                self.last_response = value.to_string();
                Value::String(self.last_response.clone())
            }
            _ => {
                self.custom_states
                    .insert(key.to_string(), value.to_string());
                Value::String(value.to_string())
            }
        };
        self.last_updated = Some(Utc::now());
        notified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unknown() {
        let state = DeviceState::new();
        assert_eq!(state.power, "unknown");
        assert_eq!(state.volume, -1);
        assert!(!state.connected);
        assert!(state.last_updated.is_none());
    }

    #[test]
    fn test_update_fixed_fields() {
        let mut state = DeviceState::new();

        assert_eq!(state.update("power", "on"), Value::String("on".into()));
        assert_eq!(state.power, "on");

        assert_eq!(state.update("volume", "42"), Value::Integer(42));
        assert_eq!(state.volume, 42);

        assert_eq!(state.update("mute", "ON"), Value::Bool(true));
        assert!(state.mute);

        assert_eq!(state.update("mute", "off"), Value::Bool(false));
        assert!(!state.mute);

        assert!(state.last_updated.is_some());
    }

    #[test]
    fn test_update_bad_volume_keeps_previous() {
        let mut state = DeviceState::new();
        state.update("volume", "35");
        state.update("volume", "garbage");
        assert_eq!(state.volume, 35);
    }

    #[test]
    fn test_update_custom_key() {
        let mut state = DeviceState::new();
        state.update("output_3_status", "2");
        assert_eq!(
            state.custom_states.get("output_3_status").map(String::as_str),
            Some("2")
        );
    }
}
