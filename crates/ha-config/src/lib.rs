//! Configuration for the household apps
//!
//! The apps read a single `apps.yaml` from the config directory. It names the
//! persons of the household with their sensors and notification channels,
//! the house-level entities, the mode switches and the reminders. The file
//! is loaded once at startup and never changes afterwards.
//!
//! The YAML loader understands three custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use ha_config::AppsConfig;
//!
//! let config = AppsConfig::load("/config")?;
//! for (name, person) in &config.persons {
//!     println!("{name} is tracked by {}", person.keys);
//! }
//! ```

mod apps;
mod error;
mod loader;
mod reminder;
mod secrets;

pub use apps::{AppsConfig, ConstraintsConfig, HouseConfig, PersonConfig, APPS_FILE};
pub use error::{ConfigError, ConfigResult};
pub use loader::{load_yaml, load_yaml_string, YamlLoader};
pub use reminder::{NotificationSettings, ReminderConfig, RepeatRule, RepeatUnit};
pub use secrets::Secrets;

pub use serde_yaml::Value;
