/*!
 * Device descriptor model.
 *
 * A descriptor is the immutable-per-session description of one controlled
 * device: identity, transport configuration, named commands, response
 * patterns and matrix I/O topology. Descriptors are created and edited by
 * the persistence collaborator and loaded once at coordinator
 * construction; only the matrix I/O lists may be replaced afterwards.
 */
use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use avlink_core::types::Id;

/// The transport a device is reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// TCP socket
    Tcp,
    /// UDP datagrams
    Udp,
    /// Local serial port
    SerialDirect,
    /// Serial relayed through a companion board's HTTP API
    SerialBridge,
}

/// The wire format of a command payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommandFormat {
    /// UTF-8 text
    #[default]
    Text,
    /// Whitespace-separated hex byte pairs, e.g. "A5 01 FF"
    Hex,
}

/// Line ending appended to an encoded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    /// No terminator
    #[default]
    None,
    /// Carriage return
    Cr,
    /// Line feed
    Lf,
    /// Carriage return + line feed
    CrLf,
    /// Literal "!" terminator, used by some matrix protocols
    Exclamation,
}

impl LineEnding {
    /// The byte sequence for this line ending
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineEnding::None => b"",
            LineEnding::Cr => b"\r",
            LineEnding::Lf => b"\n",
            LineEnding::CrLf => b"\r\n",
            LineEnding::Exclamation => b"!",
        }
    }
}

/// Configuration for TCP/UDP communication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Device hostname or address
    pub host: String,
    /// Device port
    #[serde(default = "default_network_port")]
    pub port: u16,
    /// Connect timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Keep the connection open and listen for pushed data
    #[serde(default = "default_true")]
    pub persistent_connection: bool,
    /// Seconds between reconnect attempts
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_interval_secs: f64,
}

/// Configuration for a local serial port
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port path, e.g. "/dev/ttyUSB0"
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (5-8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Parity: "N", "E" or "O"
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Flow control: "none", "rtscts" or "xonxoff"
    #[serde(default = "default_flow_control")]
    pub flow_control: String,
    /// Open timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Seconds between reconnect attempts
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_interval_secs: f64,
}

/// Configuration for serial relayed through a companion board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Board identifier
    pub board_id: Id,
    /// Base URL of the board's HTTP API, e.g. "http://10.0.0.40"
    pub base_url: String,
    /// UART number on the board
    #[serde(default = "default_uart")]
    pub uart: u8,
    /// Baud rate of the bridged UART
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// GPIO pin for RX
    #[serde(default = "default_rx_pin")]
    pub rx_pin: u8,
    /// GPIO pin for TX
    #[serde(default = "default_tx_pin")]
    pub tx_pin: u8,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Seconds between reconnect attempts
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_interval_secs: f64,
}

fn default_network_port() -> u16 {
    8000
}

fn default_timeout_secs() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

fn default_reconnect_secs() -> f64 {
    30.0
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

fn default_parity() -> String {
    "N".to_string()
}

fn default_flow_control() -> String {
    "none".to_string()
}

fn default_uart() -> u8 {
    1
}

fn default_rx_pin() -> u8 {
    9
}

fn default_tx_pin() -> u8 {
    10
}

/// Transport configuration, tagged by kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum TransportConfig {
    /// TCP socket
    Tcp(NetworkConfig),
    /// UDP datagrams
    Udp(NetworkConfig),
    /// Local serial port
    SerialDirect(SerialConfig),
    /// Serial via companion board HTTP API
    SerialBridge(BridgeConfig),
}

impl TransportConfig {
    /// The transport kind of this configuration
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportConfig::Tcp(_) => TransportKind::Tcp,
            TransportConfig::Udp(_) => TransportKind::Udp,
            TransportConfig::SerialDirect(_) => TransportKind::SerialDirect,
            TransportConfig::SerialBridge(_) => TransportKind::SerialBridge,
        }
    }

    /// Connect/request timeout
    pub fn timeout(&self) -> Duration {
        let secs = match self {
            TransportConfig::Tcp(c) | TransportConfig::Udp(c) => c.timeout_secs,
            TransportConfig::SerialDirect(c) => c.timeout_secs,
            TransportConfig::SerialBridge(c) => c.timeout_secs,
        };
        Duration::from_secs_f64(secs)
    }

    /// Pause between reconnect attempts
    pub fn reconnect_interval(&self) -> Duration {
        let secs = match self {
            TransportConfig::Tcp(c) | TransportConfig::Udp(c) => c.reconnect_interval_secs,
            TransportConfig::SerialDirect(c) => c.reconnect_interval_secs,
            TransportConfig::SerialBridge(c) => c.reconnect_interval_secs,
        };
        Duration::from_secs_f64(secs)
    }
}

/// Pattern to extract a named state value from device reply text
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponsePattern {
    /// Regex to match, e.g. `PW(ON|STANDBY)`
    #[serde(default)]
    pub pattern: String,
    /// The state field this pattern updates, e.g. "power"
    #[serde(default)]
    pub state_key: String,
    /// Which capture group contains the value (1-based)
    #[serde(default = "default_value_group")]
    pub value_group: usize,
    /// Map raw device tokens to canonical values, e.g. "STANDBY" -> "off"
    #[serde(default)]
    pub value_map: HashMap<String, String>,
}

fn default_value_group() -> usize {
    1
}

/// A single named command of a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Stable command id, e.g. "power_on"
    pub command_id: String,
    /// Display name
    pub name: String,
    /// Payload format
    #[serde(default)]
    pub format: CommandFormat,
    /// The payload, e.g. "s power 1" or "A5 01 02"
    #[serde(default)]
    pub payload: String,
    /// Terminator appended to the payload
    #[serde(default)]
    pub line_ending: LineEnding,
    /// Offered as a selectable input value
    #[serde(default)]
    pub is_input_option: bool,
    /// The input value this command selects, e.g. "1" or "HDMI1"
    #[serde(default)]
    pub input_value: String,
    /// Expects a meaningful reply
    #[serde(default)]
    pub is_query: bool,
    /// If > 0, automatically reissue this query every `poll_interval` seconds
    #[serde(default)]
    pub poll_interval: f64,
    /// Patterns scoped to this command
    #[serde(default)]
    pub response_patterns: Vec<ResponsePattern>,
}

impl Command {
    /// Create a named text command with no terminator
    pub fn new<S: Into<String>>(command_id: S, name: S, payload: S) -> Self {
        Self {
            command_id: command_id.into(),
            name: name.into(),
            format: CommandFormat::Text,
            payload: payload.into(),
            line_ending: LineEnding::None,
            is_input_option: false,
            input_value: String::new(),
            is_query: false,
            poll_interval: 0.0,
            response_patterns: Vec::new(),
        }
    }

    /// Create an ad-hoc command for a raw send
    ///
    /// Raw sends take the exact encoding path of stored commands.
    pub fn raw<S: Into<String>>(payload: S, format: CommandFormat, line_ending: LineEnding) -> Self {
        Self {
            command_id: "_raw".to_string(),
            name: "Raw Command".to_string(),
            format,
            payload: payload.into(),
            line_ending,
            is_input_option: false,
            input_value: String::new(),
            is_query: false,
            poll_interval: 0.0,
            response_patterns: Vec::new(),
        }
    }

    /// Set the line ending
    pub fn with_line_ending(mut self, line_ending: LineEnding) -> Self {
        self.line_ending = line_ending;
        self
    }

    /// Set the payload format
    pub fn with_format(mut self, format: CommandFormat) -> Self {
        self.format = format;
        self
    }

    /// Mark as a status query
    pub fn as_query(mut self) -> Self {
        self.is_query = true;
        self
    }

    /// Set the automatic poll interval in seconds
    pub fn with_poll_interval(mut self, secs: f64) -> Self {
        self.poll_interval = secs;
        self
    }

    /// Attach a response pattern
    pub fn with_pattern(mut self, pattern: ResponsePattern) -> Self {
        self.response_patterns.push(pattern);
        self
    }
}

/// Configuration for a matrix input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixInput {
    /// 1-based input index
    pub index: u32,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Linked source device (streamer, console, ...)
    #[serde(default)]
    pub device_id: Option<Id>,
}

/// Configuration for a matrix output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixOutput {
    /// 1-based output index
    pub index: u32,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Linked display device (TV, projector, ...)
    #[serde(default)]
    pub device_id: Option<Id>,
}

/// The full description of one controlled device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Unique device id
    pub device_id: Id,
    /// Display name
    pub name: String,
    /// Device type tag, e.g. "tv", "hdmi_matrix", "receiver"
    #[serde(default)]
    pub device_type: String,
    /// Physical location, e.g. "Bar Area"
    #[serde(default)]
    pub location: String,
    /// Transport configuration
    pub transport: TransportConfig,
    /// The device's commands, in registration order; ids are unique
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Patterns evaluated against every inbound line
    #[serde(default)]
    pub global_response_patterns: Vec<ResponsePattern>,
    /// Matrix inputs (hdmi_matrix devices)
    #[serde(default)]
    pub matrix_inputs: Vec<MatrixInput>,
    /// Matrix outputs (hdmi_matrix devices)
    #[serde(default)]
    pub matrix_outputs: Vec<MatrixOutput>,
}

impl DeviceDescriptor {
    /// Create a descriptor with no commands
    pub fn new<S: Into<String>>(device_id: Id, name: S, transport: TransportConfig) -> Self {
        Self {
            device_id,
            name: name.into(),
            device_type: String::new(),
            location: String::new(),
            transport,
            commands: Vec::new(),
            global_response_patterns: Vec::new(),
            matrix_inputs: Vec::new(),
            matrix_outputs: Vec::new(),
        }
    }

    /// The transport kind of this device
    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Add a command; replaces any existing command with the same id
    pub fn add_command(&mut self, command: Command) {
        if let Some(existing) = self
            .commands
            .iter_mut()
            .find(|c| c.command_id == command.command_id)
        {
            *existing = command;
        } else {
            self.commands.push(command);
        }
    }

    /// Look up a command by id
    pub fn command(&self, command_id: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.command_id == command_id)
    }

    /// Commands offered as input options (for selectors)
    pub fn input_options(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(|c| c.is_input_option)
    }

    /// Commands that are status queries
    pub fn query_commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(|c| c.is_query)
    }
}
