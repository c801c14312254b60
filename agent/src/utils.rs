//! Utility functions

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::lifecycle::LifecycleState;
use crate::storage::settings::Settings;
use crate::targets::TargetRegistry;

/// Version information for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

fn check_line(ok: bool, label: &str, detail: impl std::fmt::Display) {
    let mark = if ok { "ok".green() } else { "!!".red() };
    println!("  [{}] {:<14} {}", mark, label, detail);
}

/// Print a per-target health check. Returns false when any check failed.
pub async fn run_diagnostic(settings: &Settings) -> bool {
    println!("{}", "Updater agent diagnostic".bold());

    if let Err(e) = settings.validate() {
        println!("{} {}", "Settings invalid:".red().bold(), e);
        return false;
    }

    let registry = match TargetRegistry::from_settings(settings, &settings.control.to_options()) {
        Ok(registry) => registry,
        Err(e) => {
            println!("{} {}", "Unable to load targets:".red().bold(), e);
            return false;
        }
    };

    if registry.is_empty() {
        println!("{}", "No targets configured".yellow());
        return true;
    }

    let mut healthy = true;
    for target in registry.iter() {
        println!();
        println!("{} ({})", target.name.cyan().bold(), target.kind);

        let content_ok = target.content_dir.is_dir();
        check_line(content_ok, "content dir", target.content_dir.display());
        healthy &= content_ok;

        match &target.backup_dir {
            Some(dir) => {
                // Created on first backup when missing
                let ok = dir.is_dir() || dir.parent().is_some_and(|p| p.is_dir());
                check_line(ok, "backup dir", dir.display());
                healthy &= ok;
            }
            None => check_line(true, "backup dir", "disabled".dimmed()),
        }

        let exclusions = target.exclusions.iter().collect::<Vec<_>>().join(", ");
        check_line(true, "exclusions", exclusions);

        let state = target.controller.state().await;
        let known = state != LifecycleState::Unknown;
        check_line(known, "state", state);
        healthy &= known;
    }

    healthy
}
