//! CLI command implementations.

pub mod nuke;

use anyhow::{Context, Result};
use nuke_config::{DEFAULT_SETTINGS_FILE, Settings, load_settings as load_file};
use nuke_core::Registry;
use nuke_gcp::{AccessToken, GcpClient, register_all};
use std::path::Path;

/// Settings from `path`, or from `nuke.kdl` in the working directory if it exists.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => load_file(path)
            .with_context(|| format!("Failed to load settings file: {}", path.display())),
        None => {
            let default = Path::new(DEFAULT_SETTINGS_FILE);
            if default.exists() {
                load_file(default).with_context(|| {
                    format!("Failed to load settings file: {}", default.display())
                })
            } else {
                Ok(Settings::default())
            }
        }
    }
}

/// Every resource kind minus `exclude`, validated.
pub fn build_registry(client: GcpClient, exclude: &[String]) -> Result<Registry> {
    let mut registry = Registry::new();
    register_all(&mut registry, client).context("Failed to register resource kinds")?;

    for kind in exclude {
        if registry.deregister(kind).is_none() {
            anyhow::bail!("Cannot exclude unknown resource kind: {}", kind);
        }
    }

    registry
        .validate()
        .context("Invalid resource kind dependencies")?;
    Ok(registry)
}

pub fn list_kinds(exclude: &[String]) -> Result<()> {
    // listing kinds never calls the API
    let registry = build_registry(GcpClient::new(AccessToken::new("")), exclude)?;

    for (kind, dependencies) in registry.dependency_graph() {
        if dependencies.is_empty() {
            println!("{}", kind);
        } else {
            println!("{} (after {})", kind, dependencies.join(", "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GcpClient {
        GcpClient::new(AccessToken::new("t"))
    }

    #[test]
    fn test_build_registry_with_exclusions() {
        let registry = build_registry(client(), &["PubSubTopics".to_string()]).unwrap();
        assert!(!registry.contains("PubSubTopics"));
        assert!(registry.contains("ComputeNetworks"));
    }

    #[test]
    fn test_excluding_unknown_kind_fails() {
        let err = build_registry(client(), &["Nope".to_string()]).err().unwrap();
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn test_excluding_a_dependency_fails_validation() {
        assert!(build_registry(client(), &["ComputeSubnetworks".to_string()]).is_err());
    }

    #[test]
    fn test_missing_explicit_settings_file_fails() {
        assert!(load_settings(Some(Path::new("/nonexistent/nuke.kdl"))).is_err());
    }
}
