//! Configuration data model

use mpx_input_core::{AxisMode, MOTION_HISTORY_SIZE};

/// Root configuration structure
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    /// Screens, left to right. Empty means a single default screen.
    pub screens: Vec<ScreenConfig>,
    /// Masters and slaves in declaration order.
    pub devices: Vec<DeviceConfig>,
}

/// Global settings
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
    /// Ring capacity for devices without their own `history-size`.
    pub motion_history_size: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            motion_history_size: MOTION_HISTORY_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenConfig {
    pub width: i32,
    pub height: i32,
}

/// Which top-level node declared a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    MasterPointer,
    MasterKeyboard,
    Slave,
}

/// A declared device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub name: String,
    pub id: u16,
    pub kind: DeviceKind,
    /// Master id a slave is attached to; floating when absent.
    pub attach: Option<u16>,
    /// Valuator class mode.
    pub mode: AxisMode,
    pub history_size: Option<usize>,
    pub axes: Vec<AxisConfig>,
    /// Number of buttons; no button class when absent.
    pub buttons: Option<usize>,
    /// Row-major 3x3 matrix.
    pub transform: Option<[f64; 9]>,
    pub accel: Option<AccelConfig>,
    pub keys: Option<KeysConfig>,
    pub enabled: bool,
}

impl DeviceConfig {
    pub fn new(name: impl Into<String>, id: u16, kind: DeviceKind) -> Self {
        Self {
            name: name.into(),
            id,
            kind,
            attach: None,
            mode: AxisMode::Relative,
            history_size: None,
            axes: Vec::new(),
            buttons: None,
            transform: None,
            accel: None,
            keys: None,
            enabled: true,
        }
    }

    /// Keyboards attach to master keyboards, everything else to master
    /// pointers.
    pub fn is_key_only(&self) -> bool {
        self.keys.is_some() && self.axes.is_empty() && self.buttons.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisConfig {
    pub min: i32,
    pub max: i32,
    pub resolution: i32,
    pub label: u32,
    /// Per-axis mode; the device's mode when absent.
    pub mode: Option<AxisMode>,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: -1,
            resolution: 1,
            label: 0,
            mode: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelConfig {
    pub threshold: i32,
    pub numerator: i32,
    pub denominator: i32,
}

impl Default for AccelConfig {
    fn default() -> Self {
        Self {
            threshold: 4,
            numerator: 2,
            denominator: 1,
        }
    }
}

/// Key class and keyboard feedback settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysConfig {
    pub min: u8,
    pub max: u8,
    pub autorepeat: bool,
    /// Keys allowed to auto-repeat; every key when `None`.
    pub repeat: Option<Vec<u8>>,
    pub modifiers: Vec<u8>,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            min: mpx_input_core::MIN_KEYCODE as u8,
            max: mpx_input_core::MAX_KEYCODE as u8,
            autorepeat: true,
            repeat: None,
            modifiers: Vec::new(),
        }
    }
}
