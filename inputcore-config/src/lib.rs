//! Settings source for the input core.
//!
//! The document is KDL. Everything is optional; a missing block or property
//! takes the default listed on the field.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use miette::{Context, IntoDiagnostic};
use tracing::debug;

pub const DEFAULT_REPEAT_DELAY: u16 = 400;
pub const DEFAULT_REPEAT_INTERVAL: u16 = 80;
pub const DEFAULT_DOUBLE_CLICK_TIME: u16 = 250;
pub const DEFAULT_DOUBLE_CLICK_DISTANCE: u16 = 5;

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[knuffel(child, default)]
    pub keyboard: Keyboard,
    #[knuffel(child, default)]
    pub pointer: Pointer,
}

/// Keyboard settings, used for key repeat when the compositor does not
/// advertise its own repeat parameters.
#[derive(knuffel::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    /// Delay before the first repeat, in milliseconds.
    #[knuffel(child, unwrap(argument), default = DEFAULT_REPEAT_DELAY)]
    pub repeat_delay: u16,
    /// Interval between repeats, in milliseconds.
    #[knuffel(child, unwrap(argument), default = DEFAULT_REPEAT_INTERVAL)]
    pub repeat_interval: u16,
    #[knuffel(child)]
    pub disable_repeat: bool,
}

impl Default for Keyboard {
    fn default() -> Self {
        Self {
            repeat_delay: DEFAULT_REPEAT_DELAY,
            repeat_interval: DEFAULT_REPEAT_INTERVAL,
            disable_repeat: false,
        }
    }
}

impl Keyboard {
    pub fn repeat(&self) -> bool {
        !self.disable_repeat
    }

    pub fn repeat_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.repeat_delay))
    }

    pub fn repeat_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.repeat_interval))
    }
}

#[derive(knuffel::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    /// Maximum time between presses of a double click, in milliseconds.
    ///
    /// A triple click gets twice this long, counted from the first press.
    #[knuffel(child, unwrap(argument), default = DEFAULT_DOUBLE_CLICK_TIME)]
    pub double_click_time: u16,
    /// Maximum distance in logical pixels, on each axis, between the presses.
    #[knuffel(child, unwrap(argument), default = DEFAULT_DOUBLE_CLICK_DISTANCE)]
    pub double_click_distance: u16,
}

impl Default for Pointer {
    fn default() -> Self {
        Self {
            double_click_time: DEFAULT_DOUBLE_CLICK_TIME,
            double_click_distance: DEFAULT_DOUBLE_CLICK_DISTANCE,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> miette::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .with_context(|| format!("error reading {path:?}"))?;

        let filename = path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("config.kdl");
        let config = Self::parse(filename, &contents).context("error parsing")?;
        debug!("loaded config from {path:?}");
        Ok(config)
    }

    pub fn parse(filename: &str, text: &str) -> Result<Self, knuffel::Error> {
        knuffel::parse(filename, text)
    }
}
