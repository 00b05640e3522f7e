// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! svcmgrd — demonstration host binary for the launcher core.
//!
//! Loads configuration, sets up logging, constructs a `Dispatcher` wired to
//! the demo adapters and file-backed storage, applies a one-shot goal state
//! if one is configured, then shuts down cleanly. There is no listener and
//! no event loop: this binary exists to demonstrate construction-time
//! dependency injection (`spec.md` §9) end to end, not to be a long-running
//! service in its own right.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;

use svcmgr_daemon::config::Config;
use svcmgr_daemon::logging::setup_logging;
use svcmgr_daemon::{apply_configured_goal_state, build_dispatcher};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "/etc/svcmgr/svcmgrd.toml";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match std::env::args().nth(1).as_deref() {
        Some("--version" | "-V") => {
            println!("svcmgrd {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--help" | "-h") => {
            print_help();
            return Ok(());
        }
        Some(arg) if arg.starts_with('-') => {
            eprintln!("error: unexpected argument '{arg}'");
            eprintln!("Usage: svcmgrd [config-path] [--help | --version]");
            std::process::exit(1);
        }
        _ => {}
    }

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = Config::load(&config_path)?;
    let _log_guard = setup_logging(&config.log_path)?;

    info!(state_dir = %config.state_dir.display(), "starting svcmgrd");

    let dispatcher = match build_dispatcher(&config) {
        Ok(d) => d,
        Err(e) => {
            error!(error = %e, "failed to construct dispatcher");
            return Err(e.into());
        }
    };

    if let Err(e) = apply_configured_goal_state(&dispatcher, &config) {
        error!(error = %e, "failed to apply configured goal state");
        dispatcher.shutdown();
        return Err(e.into());
    }

    info!("reconcile complete, shutting down");
    dispatcher.shutdown();
    Ok(())
}

fn print_help() {
    println!("svcmgrd {}", env!("CARGO_PKG_VERSION"));
    println!("Demonstration host binary for the service-manager launcher core.");
    println!();
    println!("USAGE:");
    println!("    svcmgrd [config-path]");
    println!();
    println!("Reads a TOML config (default: {DEFAULT_CONFIG_PATH}), constructs a");
    println!("Dispatcher wired to demo adapters and file-backed storage, applies");
    println!("any configured goal-state file once, then exits.");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -V, --version    Print version information");
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
