/*!
 * Response parser.
 *
 * Compiles the descriptor's response patterns once and evaluates every
 * inbound reply line against all of them: global patterns first, then
 * each command's patterns in registration order. All commands' patterns
 * are checked against every line, not just the command last sent, since
 * devices push unsolicited status lines.
 */
use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use crate::descriptor::{DeviceDescriptor, ResponsePattern};

/// A response pattern compiled for matching
#[derive(Debug)]
struct CompiledPattern {
    regex: Regex,
    state_key: String,
    value_group: usize,
    value_map: HashMap<String, String>,
}

/// Matches inbound reply lines against the device's response patterns
#[derive(Debug, Default)]
pub struct ResponseParser {
    patterns: Vec<CompiledPattern>,
}

impl ResponseParser {
    /// Compile all patterns of a descriptor, global patterns first
    ///
    /// Invalid or empty patterns are logged and skipped; they never make
    /// the parser unusable.
    pub fn from_descriptor(descriptor: &DeviceDescriptor) -> Self {
        let mut parser = Self::default();

        for pattern in &descriptor.global_response_patterns {
            parser.register(pattern);
        }
        for command in &descriptor.commands {
            for pattern in &command.response_patterns {
                parser.register(pattern);
            }
        }

        parser
    }

    fn register(&mut self, pattern: &ResponsePattern) {
        if pattern.pattern.is_empty() {
            return;
        }

        match RegexBuilder::new(&pattern.pattern)
            .case_insensitive(true)
            .build()
        {
            Ok(regex) => self.patterns.push(CompiledPattern {
                regex,
                state_key: pattern.state_key.clone(),
                value_group: pattern.value_group,
                value_map: pattern.value_map.clone(),
            }),
            Err(err) => {
                warn!("Invalid response pattern '{}': {}", pattern.pattern, err);
            }
        }
    }

    /// Number of usable compiled patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether no pattern compiled
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Evaluate a reply line against every pattern
    ///
    /// Returns all `(state_key, value)` extractions in pattern
    /// registration order; multiple patterns may match the same line.
    pub fn parse(&self, line: &str) -> Vec<(String, String)> {
        let mut updates = Vec::new();

        for pattern in &self.patterns {
            let Some(captures) = pattern.regex.captures(line) else {
                continue;
            };

            let Some(group) = captures.get(pattern.value_group) else {
                warn!(
                    "Pattern '{}' matched but group {} not found",
                    pattern.regex.as_str(),
                    pattern.value_group
                );
                continue;
            };

            let raw = group.as_str();
            let value = pattern
                .value_map
                .get(raw)
                .cloned()
                .unwrap_or_else(|| raw.to_string());

            debug!(
                "Pattern matched: {} = {} (from {})",
                pattern.state_key, value, line
            );
            updates.push((pattern.state_key.clone(), value));
        }

        updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Command, DeviceDescriptor, NetworkConfig, TransportConfig};

    fn descriptor_with(
        global: Vec<ResponsePattern>,
        commands: Vec<Command>,
    ) -> DeviceDescriptor {
        let mut descriptor = DeviceDescriptor::new(
            "test-device".into(),
            "Test Device",
            TransportConfig::Tcp(NetworkConfig {
                host: "localhost".to_string(),
                port: 8000,
                timeout_secs: 5.0,
                persistent_connection: true,
                reconnect_interval_secs: 30.0,
            }),
        );
        descriptor.global_response_patterns = global;
        for command in commands {
            descriptor.add_command(command);
        }
        descriptor
    }

    fn power_pattern() -> ResponsePattern {
        ResponsePattern {
            pattern: "PW(ON|STANDBY)".to_string(),
            state_key: "power".to_string(),
            value_group: 1,
            value_map: [
                ("ON".to_string(), "on".to_string()),
                ("STANDBY".to_string(), "off".to_string()),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn test_value_map_applied() {
        let parser = ResponseParser::from_descriptor(&descriptor_with(vec![power_pattern()], vec![]));
        assert_eq!(
            parser.parse("PWON"),
            vec![("power".to_string(), "on".to_string())]
        );
        assert_eq!(
            parser.parse("PWSTANDBY"),
            vec![("power".to_string(), "off".to_string())]
        );
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let parser = ResponseParser::from_descriptor(&descriptor_with(vec![power_pattern()], vec![]));
        let updates = parser.parse("pwon");
        // The captured token keeps the reply's case; "on" is not a map
        // key, so it passes through untouched
        assert_eq!(updates, vec![("power".to_string(), "on".to_string())]);
    }

    #[test]
    fn test_unmapped_value_passes_through() {
        let pattern = ResponsePattern {
            pattern: r"MV(\d+)".to_string(),
            state_key: "volume".to_string(),
            value_group: 1,
            value_map: HashMap::new(),
        };
        let parser = ResponseParser::from_descriptor(&descriptor_with(vec![pattern], vec![]));
        assert_eq!(
            parser.parse("MV45"),
            vec![("volume".to_string(), "45".to_string())]
        );
    }

    #[test]
    fn test_invalid_pattern_does_not_block_others() {
        let broken = ResponsePattern {
            pattern: "PW((".to_string(),
            state_key: "power".to_string(),
            value_group: 1,
            value_map: HashMap::new(),
        };
        let parser =
            ResponseParser::from_descriptor(&descriptor_with(vec![broken, power_pattern()], vec![]));
        assert_eq!(parser.len(), 1);
        assert_eq!(
            parser.parse("PWON"),
            vec![("power".to_string(), "on".to_string())]
        );
    }

    #[test]
    fn test_out_of_range_group_skipped() {
        let pattern = ResponsePattern {
            pattern: "PW(ON|STANDBY)".to_string(),
            state_key: "power".to_string(),
            value_group: 5,
            value_map: HashMap::new(),
        };
        let parser = ResponseParser::from_descriptor(&descriptor_with(vec![pattern], vec![]));
        assert!(parser.parse("PWON").is_empty());
    }

    #[test]
    fn test_command_patterns_evaluated_for_every_line() {
        // The pattern belongs to a query command, but an unsolicited
        // status line must still be parsed.
        let command = Command::new("query_power", "Query Power", "PW?")
            .as_query()
            .with_pattern(power_pattern());
        let parser = ResponseParser::from_descriptor(&descriptor_with(vec![], vec![command]));
        assert_eq!(
            parser.parse("PWSTANDBY"),
            vec![("power".to_string(), "off".to_string())]
        );
    }

    #[test]
    fn test_multiple_matches_in_registration_order() {
        let global = ResponsePattern {
            pattern: "(ON)".to_string(),
            state_key: "seen".to_string(),
            value_group: 1,
            value_map: HashMap::new(),
        };
        let command = Command::new("q", "Q", "PW?").with_pattern(power_pattern());
        let parser = ResponseParser::from_descriptor(&descriptor_with(vec![global], vec![command]));

        let updates = parser.parse("PWON");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].0, "seen"); // global first
        assert_eq!(updates[1], ("power".to_string(), "on".to_string()));
    }

    #[test]
    fn test_empty_pattern_skipped() {
        let empty = ResponsePattern::default();
        let parser = ResponseParser::from_descriptor(&descriptor_with(vec![empty], vec![]));
        assert!(parser.is_empty());
    }
}
