//! Click Capture
//!
//! A Windows system tray utility that captures the active window while the
//! left and right mouse buttons are held down together. The image goes to the
//! clipboard or to a timestamped PNG, depending on the mode picked in the
//! tray menu.

// Hide console window on Windows
#![windows_subsystem = "windows"]
// The tray host and the Win32 collaborators only exist on Windows
#![cfg_attr(not(windows), allow(dead_code))]

mod capture;
mod config;
mod dispatcher;
mod geometry;
mod input;
mod logging;
mod mode;
mod output;
mod paths;
#[cfg(windows)]
mod tray;

use anyhow::Result;
use tracing::warn;

use crate::config::AppConfig;

fn main() -> Result<()> {
    let (config, config_error) = match config::load_config(&paths::get_config_path()) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    logging::init_logging(&paths::get_logs_dir(), &config.log_level)?;
    logging::install_panic_hook();

    if let Some(e) = config_error {
        warn!("{}. Using defaults.", e);
    }

    run(&config)
}

#[cfg(windows)]
fn run(config: &AppConfig) -> Result<()> {
    tray::run(config).inspect_err(|e| tracing::error!("Fatal: {:#}", e))
}

#[cfg(not(windows))]
fn run(_config: &AppConfig) -> Result<()> {
    Err(anyhow::anyhow!("Click Capture only runs on Windows"))
}
