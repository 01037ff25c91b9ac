use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::Level;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Frame size limit, written as a byte count or with a K/M suffix ("64K", "16M")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FrameSizeInput", into = "String")]
pub struct FrameSize(usize);

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameSizeInput {
    Bytes(u64),
    Text(String),
}

impl FrameSize {
    pub fn as_bytes(&self) -> usize {
        self.0
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        FrameSize(rtc_protocol::DEFAULT_MAX_MESSAGE_SIZE)
    }
}

impl FromStr for FrameSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, shift) = match s.chars().last() {
            Some('K' | 'k') => (&s[..s.len() - 1], 10),
            Some('M' | 'm') => (&s[..s.len() - 1], 20),
            _ => (s, 0),
        };
        let count: usize = digits
            .trim()
            .parse()
            .map_err(|e| format!("invalid frame size '{}': {}", s, e))?;
        count
            .checked_mul(1 << shift)
            .map(FrameSize)
            .ok_or_else(|| format!("frame size '{}' overflows", s))
    }
}

impl TryFrom<FrameSizeInput> for FrameSize {
    type Error = String;

    fn try_from(input: FrameSizeInput) -> Result<Self, Self::Error> {
        match input {
            FrameSizeInput::Bytes(bytes) => usize::try_from(bytes)
                .map(FrameSize)
                .map_err(|_| format!("frame size {} too large", bytes)),
            FrameSizeInput::Text(text) => text.parse(),
        }
    }
}

impl From<FrameSize> for String {
    fn from(size: FrameSize) -> String {
        size.to_string()
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MIB: usize = 1 << 20;
        const KIB: usize = 1 << 10;
        match self.0 {
            0 => write!(f, "0"),
            n if n % MIB == 0 => write!(f, "{}M", n / MIB),
            n if n % KIB == 0 => write!(f, "{}K", n / KIB),
            n => write!(f, "{}", n),
        }
    }
}

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// IP address the method channel listens on
    #[serde(default = "default_local_ip")]
    pub local_ip: String,

    /// Port of the method channel (1024..=65535)
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// Logging level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Largest accepted or emitted channel frame
    #[serde(default)]
    pub max_frame_size: FrameSize,

    /// Version string reported by `getSdkVersion`
    #[serde(default = "default_sdk_version")]
    pub sdk_version: String,

    /// View ids backed by headless surfaces, registered at start-up
    #[serde(default)]
    pub headless_views: Vec<i64>,
}

fn default_local_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_local_port() -> u16 {
    7878
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sdk_version() -> String {
    rtc_bridge::engine::loopback::DEFAULT_SDK_VERSION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            local_port: default_local_port(),
            log_level: default_log_level(),
            max_frame_size: FrameSize::default(),
            sdk_version: default_sdk_version(),
            headless_views: Vec::new(),
        }
    }
}

impl Config {
    /// Load and validate a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Parse and validate JSON config text
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.local_port < 1024 {
            return Err(ConfigError::Invalid(format!(
                "local_port {} is below 1024",
                self.local_port
            )));
        }

        if self.local_ip.parse::<std::net::IpAddr>().is_err() {
            return Err(ConfigError::Invalid(format!(
                "local_ip '{}' is not an IP address",
                self.local_ip
            )));
        }

        if rtc_log::parse_level(&self.log_level).is_none() {
            return Err(ConfigError::Invalid(format!(
                "log_level '{}' must be one of trace, debug, info, warn, error",
                self.log_level
            )));
        }

        // A frame must at least hold its own length prefix
        if self.max_frame_size.as_bytes() < 4 {
            return Err(ConfigError::Invalid(format!(
                "max_frame_size {} is too small",
                self.max_frame_size
            )));
        }

        Ok(())
    }

    /// Parsed log level; `validate` guarantees the name is known
    pub fn level(&self) -> Level {
        rtc_log::parse_level(&self.log_level).unwrap_or(Level::INFO)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.local_ip, self.local_port)
    }
}
