//! KDL settings parsing for gcp-nuke.
//!
//! Settings files hold defaults for a teardown run (project, timing, dry run,
//! zones and regions, excluded kinds). Command-line flags take precedence.

pub mod error;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use settings::{DEFAULT_SETTINGS_FILE, Settings, load_settings, parse_settings};
