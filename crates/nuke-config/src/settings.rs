//! Settings file parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Settings file picked up from the working directory when none is given.
pub const DEFAULT_SETTINGS_FILE: &str = "nuke.kdl";

/// Settings for a teardown run. Unset fields fall back to the caller's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub project: Option<String>,
    pub timeout: Option<Duration>,
    pub poll_interval: Option<Duration>,
    pub dry_run: Option<bool>,
    /// Zones to tear down; discovered from the project when empty.
    pub zones: Vec<String>,
    /// Regions to tear down; discovered from the project when empty.
    pub regions: Vec<String>,
    /// Resource kinds to leave untouched.
    pub exclude: Vec<String>,
}

impl Settings {
    /// Layer `overrides` on top of `self`. Set fields and non-empty lists win.
    pub fn merge(self, overrides: Settings) -> Settings {
        Settings {
            project: overrides.project.or(self.project),
            timeout: overrides.timeout.or(self.timeout),
            poll_interval: overrides.poll_interval.or(self.poll_interval),
            dry_run: overrides.dry_run.or(self.dry_run),
            zones: prefer(overrides.zones, self.zones),
            regions: prefer(overrides.regions, self.regions),
            exclude: prefer(overrides.exclude, self.exclude),
        }
    }

    /// Check the values that are set for consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(project) = &self.project {
            if project.trim().is_empty() {
                return Err(invalid("project", "must not be empty"));
            }
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(invalid("timeout", "must be positive"));
        }
        if self.poll_interval.is_some_and(|p| p.is_zero()) {
            return Err(invalid("poll-interval", "must be positive"));
        }
        if let (Some(timeout), Some(poll_interval)) = (self.timeout, self.poll_interval) {
            if poll_interval > timeout {
                return Err(invalid(
                    "poll-interval",
                    &format!(
                        "{}s is longer than the timeout of {}s",
                        poll_interval.as_secs(),
                        timeout.as_secs()
                    ),
                ));
            }
        }
        Ok(())
    }
}

fn prefer(first: Vec<String>, second: Vec<String>) -> Vec<String> {
    if first.is_empty() { second } else { first }
}

/// Parse settings from KDL text.
pub fn parse_settings(kdl: &str) -> ConfigResult<Settings> {
    let doc: KdlDocument = kdl.parse()?;
    let mut settings = Settings::default();

    for node in doc.nodes() {
        let name = node.name().value();
        match name {
            "project" => {
                let project = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField(name.to_string()))?;
                set_once(&mut settings.project, project, name)?;
            }
            "timeout" => {
                set_once(&mut settings.timeout, get_seconds_arg(node)?, name)?;
            }
            "poll-interval" => {
                set_once(&mut settings.poll_interval, get_seconds_arg(node)?, name)?;
            }
            "dry-run" => {
                // a bare `dry-run` node turns it on
                let dry_run = match node.entries().iter().find(|e| e.name().is_none()) {
                    None => true,
                    Some(entry) => entry
                        .value()
                        .as_bool()
                        .ok_or_else(|| invalid(name, "expected #true or #false"))?,
                };
                set_once(&mut settings.dry_run, dry_run, name)?;
            }
            "zones" => settings.zones.extend(get_all_string_args(node)),
            "regions" => settings.regions.extend(get_all_string_args(node)),
            "exclude" => settings.exclude.extend(get_all_string_args(node)),
            _ => return Err(ConfigError::UnknownSetting(name.to_string())),
        }
    }

    settings.validate()?;
    Ok(settings)
}

/// Read and parse a settings file.
pub fn load_settings(path: &Path) -> ConfigResult<Settings> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = parse_settings(&text)?;
    debug!(path = %path.display(), ?settings, "Loaded settings file");
    Ok(settings)
}

fn set_once<T>(slot: &mut Option<T>, value: T, name: &str) -> ConfigResult<()> {
    if slot.is_some() {
        return Err(ConfigError::Duplicate(name.to_string()));
    }
    *slot = Some(value);
    Ok(())
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn get_seconds_arg(node: &KdlNode) -> ConfigResult<Duration> {
    let name = node.name().value();
    let value = node
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .ok_or_else(|| ConfigError::MissingField(name.to_string()))?
        .value();

    let seconds = value
        .as_integer()
        .ok_or_else(|| invalid(name, "expected a whole number of seconds"))?;
    let seconds = u64::try_from(seconds).map_err(|_| invalid(name, "must not be negative"))?;
    Ok(Duration::from_secs(seconds))
}
