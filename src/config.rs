use std::{fmt, fs, path::Path, str::FromStr, thread, time::Duration};

use log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::GpioError;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    #[serde(rename = "in")]
    Input,
    /// Output, initially driven low.
    #[serde(rename = "out")]
    Output,
    /// Output, initially driven high without a glitch.
    #[serde(rename = "high")]
    OutputHigh,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "in",
            Direction::Output => "out",
            Direction::OutputHigh => "high",
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Direction::Input)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Direction::Input),
            "out" => Ok(Direction::Output),
            "high" => Ok(Direction::OutputHigh),
            other => Err(GpioError::InvalidDirection(format!(
                "'{other}', must be one of in, out, high"
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeDetect {
    None,
    Rising,
    Falling,
    Both,
}

impl Default for EdgeDetect {
    fn default() -> Self {
        EdgeDetect::None
    }
}

impl EdgeDetect {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeDetect::None => "none",
            EdgeDetect::Rising => "rising",
            EdgeDetect::Falling => "falling",
            EdgeDetect::Both => "both",
        }
    }
}

impl fmt::Display for EdgeDetect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeDetect {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(EdgeDetect::None),
            "rising" => Ok(EdgeDetect::Rising),
            "falling" => Ok(EdgeDetect::Falling),
            "both" => Ok(EdgeDetect::Both),
            other => Err(GpioError::InvalidEdge(format!(
                "'{other}', must be one of rising, falling, both, none"
            ))),
        }
    }
}

/// Bounded retry for the window between `export` and the kernel/udev
/// finishing the permissions of the new `gpioN` nodes.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_ms: 100,
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Runs `op`, retrying only while it fails with permission denied.
    /// Any other failure, or the last permission failure, is returned as is.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, GpioError>
    where
        F: FnMut() -> Result<T, GpioError>,
    {
        let mut retries = 0;
        loop {
            match op() {
                Err(e) if e.is_permission_denied() && retries < self.max_retries => {
                    retries += 1;
                    warn!(
                        "Permission on {label} not ready yet, retrying ({retries}/{})...",
                        self.max_retries
                    );
                    thread::sleep(self.delay());
                }
                result => return result,
            }
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PinConfig {
    pub name: String,
    pub direction: Direction,
    #[serde(default)]
    pub edge: EdgeDetect,
    #[serde(default)]
    pub active_low: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub sysfs_root: Option<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub max_events: Option<usize>,
    pub gpios: FxHashMap<u32, PinConfig>,
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, GpioError> {
        let contents = fs::read_to_string(&path)
            .map_err(|e| GpioError::Config(format!("Failed to read config: {e}")))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, GpioError> {
        let config: Self = serde_json::from_str(contents)
            .map_err(|e| GpioError::Config(format!("Invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), GpioError> {
        for (pin, cfg) in &self.gpios {
            if cfg.edge != EdgeDetect::None && !cfg.direction.is_input() {
                return Err(GpioError::Config(format!(
                    "GPIO {pin} ({}): edge detection requires direction 'in'",
                    cfg.name
                )));
            }
        }
        Ok(())
    }

    pub fn sysfs_root(&self) -> &str {
        self.sysfs_root.as_deref().unwrap_or(DEFAULT_SYSFS_ROOT)
    }

    /// Pin numbers in ascending order.
    pub fn pin_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.gpios.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
