//! Input core of a multi-backend windowing layer.
//!
//! The crate keeps the device hierarchy (master and slave devices, seats and
//! tablet tools), arbitrates grabs per device with serial-ordered grab stacks
//! and translates X11/XInput2 and Wayland input traffic into one normalized
//! [`event::Event`] model. Window management, keymaps and cursors are external
//! collaborators reached through the traits in [`window`], [`keymap`] and
//! [`cursor`].

pub mod backend;
pub mod cursor;
pub mod device;
pub mod device_manager;
pub mod display;
pub mod error;
pub mod error_trap;
pub mod event;
pub mod keymap;
pub mod seat;
pub mod selection;
pub mod signals;
pub mod utils;
pub mod window;

#[cfg(test)]
mod tests;

use std::path::Path;

use anyhow::Context;
pub use inputcore_config::Config;
use tracing::debug;

/// Loads the settings file, or returns the default settings when there is none.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        debug!("no config path given, using defaults");
        return Ok(Config::default());
    };

    // miette::Report is not Sync, so keep only its rendered message.
    Config::load(path)
        .map_err(|err| anyhow::anyhow!("{err:?}"))
        .with_context(|| format!("error loading config from {path:?}"))
}
