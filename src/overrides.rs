//! License override supplied by the process environment.
//!
//! When present, the override takes precedence over any persisted license.
//! It is consulted once, at startup.

use std::env;

/// Supplies an override license string.
pub trait OverrideSource: Send + Sync {
    /// The override value; `None` when unset or blank.
    fn license_override(&self) -> Option<String>;
}

/// Reads the override from a named environment variable.
#[derive(Debug, Clone)]
pub struct EnvOverride {
    var: String,
}

impl EnvOverride {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl OverrideSource for EnvOverride {
    fn license_override(&self) -> Option<String> {
        env::var(&self.var)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

/// Fixed override, or none. Handy when the value comes from somewhere other
/// than the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticOverride(pub Option<String>);

impl OverrideSource for StaticOverride {
    fn license_override(&self) -> Option<String> {
        self.0.clone().filter(|value| !value.trim().is_empty())
    }
}
