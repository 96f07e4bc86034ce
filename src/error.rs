//! Error types for configuration, templates and the host/port inventory
//!
//! Everything in here is fatal to starting a monitoring run. Errors that
//! happen while a run is active (probe failures, dead workers) never surface
//! as these types; they are contained by the actors.

use std::fmt;
use std::path::PathBuf;

/// Errors raised while validating the configuration file
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read
    Io { path: PathBuf, source: std::io::Error },

    /// The file is not valid YAML for the expected schema
    Parse { path: PathBuf, message: String },

    /// `teams.start` is greater than `teams.end`
    InvalidTeamRange { start: u32, end: u32 },

    /// The reference team lies outside the team range
    ReferenceTeamOutOfRange { team: u32, start: u32, end: u32 },

    /// A duration was zero, negative or not finite
    InvalidDuration { field: &'static str, value: f64 },

    /// The host pattern does not carry exactly one placeholder
    Template(TemplateError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "invalid config file {}: {}", path.display(), message)
            }
            ConfigError::InvalidTeamRange { start, end } => {
                write!(f, "invalid team range: start {start} is greater than end {end}")
            }
            ConfigError::ReferenceTeamOutOfRange { team, start, end } => {
                write!(f, "reference team {team} is outside the team range [{start}, {end}]")
            }
            ConfigError::InvalidDuration { field, value } => {
                write!(
                    f,
                    "invalid duration for `{field}`: {value} (expected 0 < seconds <= one year)"
                )
            }
            ConfigError::Template(err) => write!(f, "invalid host pattern: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Template(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TemplateError> for ConfigError {
    fn from(err: TemplateError) -> Self {
        ConfigError::Template(err)
    }
}

/// Errors raised while building or inverting host templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template has no placeholder token
    MissingPlaceholder { template: String, token: String },

    /// The template has the placeholder token more than once
    RepeatedPlaceholder { template: String, token: String },

    /// A concrete host could not be mapped back onto the pattern
    NotInvertible { host: String, pattern: String, team: u32 },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::MissingPlaceholder { template, token } => {
                write!(f, "template '{template}' does not contain placeholder '{token}'")
            }
            TemplateError::RepeatedPlaceholder { template, token } => {
                write!(f, "template '{template}' contains placeholder '{token}' more than once")
            }
            TemplateError::NotInvertible { host, pattern, team } => write!(
                f,
                "host '{host}' does not match pattern '{pattern}' for reference team {team}"
            ),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Errors raised while loading or writing the host/port inventory
#[derive(Debug)]
pub enum InventoryError {
    /// File access failed
    Io { path: PathBuf, source: std::io::Error },

    /// The ports file is not a JSON object of port lists
    Parse { path: PathBuf, message: String },

    /// A key of the ports file is not a valid template
    Template(TemplateError),

    /// A template has no candidate ports
    EmptyPortSet { template: String },

    /// There is nothing to monitor
    Empty { path: PathBuf },
}

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            InventoryError::Parse { path, message } => {
                write!(f, "invalid ports file {}: {}", path.display(), message)
            }
            InventoryError::Template(err) => write!(f, "invalid inventory entry: {err}"),
            InventoryError::EmptyPortSet { template } => {
                write!(f, "template '{template}' has an empty port list")
            }
            InventoryError::Empty { path } => {
                write!(f, "no host templates found in {}", path.display())
            }
        }
    }
}

impl std::error::Error for InventoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InventoryError::Io { source, .. } => Some(source),
            InventoryError::Template(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TemplateError> for InventoryError {
    fn from(err: TemplateError) -> Self {
        InventoryError::Template(err)
    }
}
