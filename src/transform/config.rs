//! Stage definition
//!
//! `ForceConfig` is deserialized from the JSON transform definition. Unknown keys are
//! rejected; every numeric parameter is checked by [`ForceConfig::validate`].

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::layout::force::{
    DEFAULT_ALPHA, DEFAULT_CHARGE, DEFAULT_FRICTION, DEFAULT_GRAVITY, DEFAULT_LINK_DISTANCE,
    DEFAULT_LINK_STRENGTH, DEFAULT_THETA,
};
use crate::registry::LinkResolution;
use crate::value_objects::{OutputFields, Scalar};

/// Transform type accepted in the `type` key
pub const TRANSFORM_TYPE: &str = "force";

/// Configuration of one force layout stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ForceConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Canvas `[width, height]`
    #[serde(default = "default_size")]
    pub size: [f64; 2],

    /// Clamp output coordinates into the canvas
    #[serde(default = "default_true")]
    pub bound: bool,

    /// Name of the link data source (required)
    #[serde(default)]
    pub links: Option<String>,

    #[serde(default = "default_link_strength")]
    pub link_strength: Scalar,

    #[serde(default = "default_link_distance")]
    pub link_distance: Scalar,

    #[serde(default = "default_charge")]
    pub charge: Scalar,

    /// Unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_distance: Option<Scalar>,

    #[serde(default = "default_friction")]
    pub friction: f64,

    #[serde(default = "default_theta")]
    pub theta: f64,

    #[serde(default = "default_gravity")]
    pub gravity: f64,

    /// Temperature set on (re)configuration and on drag start
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Ticks per invocation in batch mode
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    #[serde(default)]
    pub interactive: bool,

    /// Name of the data source listing pinned node ids under `id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<String>,

    /// Name of the signal carrying the active node descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,

    #[serde(default)]
    pub output: OutputFields,

    #[serde(default)]
    pub link_resolution: LinkResolution,

    /// Seed for placement and jitter; random when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Period of the interactive driver
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_size() -> [f64; 2] {
    [500.0, 500.0]
}

fn default_true() -> bool {
    true
}

fn default_link_strength() -> Scalar {
    Scalar::Value(DEFAULT_LINK_STRENGTH)
}

fn default_link_distance() -> Scalar {
    Scalar::Value(DEFAULT_LINK_DISTANCE)
}

fn default_charge() -> Scalar {
    Scalar::Value(DEFAULT_CHARGE)
}

fn default_friction() -> f64 {
    DEFAULT_FRICTION
}

fn default_theta() -> f64 {
    DEFAULT_THETA
}

fn default_gravity() -> f64 {
    DEFAULT_GRAVITY
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_iterations() -> usize {
    500
}

fn default_tick_interval_ms() -> u64 {
    16
}

impl ForceConfig {
    /// Defaults with the given link data source
    pub fn new(links: impl Into<String>) -> Self {
        Self {
            kind: None,
            size: default_size(),
            bound: true,
            links: Some(links.into()),
            link_strength: default_link_strength(),
            link_distance: default_link_distance(),
            charge: default_charge(),
            charge_distance: None,
            friction: DEFAULT_FRICTION,
            theta: DEFAULT_THETA,
            gravity: DEFAULT_GRAVITY,
            alpha: DEFAULT_ALPHA,
            iterations: default_iterations(),
            interactive: false,
            fixed: None,
            active: None,
            output: OutputFields::default(),
            link_resolution: LinkResolution::default(),
            seed: None,
            tick_interval_ms: default_tick_interval_ms(),
        }
    }

    /// Parse and validate a JSON transform definition
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: ForceConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Name of the link data source
    pub fn links_source(&self) -> Result<&str, ConfigError> {
        match self.links.as_deref() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(ConfigError::MissingLinks),
        }
    }

    /// Effective charge distance
    pub fn charge_distance(&self) -> Scalar {
        self.charge_distance
            .clone()
            .unwrap_or(Scalar::Value(f64::INFINITY))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(kind) = self.kind.as_deref() {
            if kind != TRANSFORM_TYPE {
                return Err(ConfigError::UnsupportedType(kind.to_string()));
            }
        }
        self.links_source()?;

        if self.size.iter().any(|side| !side.is_finite() || *side < 0.0) {
            return Err(invalid("size", "dimensions must be finite and non-negative"));
        }
        if !(0.0..=1.0).contains(&self.friction) {
            return Err(invalid("friction", "must lie in [0, 1]"));
        }
        if !self.theta.is_finite() || self.theta < 0.0 {
            return Err(invalid("theta", "must be finite and non-negative"));
        }
        if !self.gravity.is_finite() {
            return Err(invalid("gravity", "must be finite"));
        }
        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(invalid("alpha", "must be finite and non-negative"));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tickIntervalMs", "must be positive"));
        }

        check_scalar("linkStrength", &self.link_strength)?;
        check_scalar("linkDistance", &self.link_distance)?;
        check_scalar("charge", &self.charge)?;
        if let Some(distance) = &self.charge_distance {
            check_scalar("chargeDistance", distance)?;
            if distance.as_constant().is_some_and(|d| d < 0.0) {
                return Err(invalid("chargeDistance", "must be non-negative"));
            }
        }

        let output = self.output.all();
        if output.iter().any(|name| name.is_empty()) {
            return Err(invalid("output", "field names must not be empty"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

fn check_scalar(name: &'static str, scalar: &Scalar) -> Result<(), ConfigError> {
    match scalar {
        Scalar::Value(value) if !value.is_finite() => Err(invalid(name, "must be finite")),
        Scalar::Field(field) if field.is_empty() => {
            Err(invalid(name, "field name must not be empty"))
        }
        _ => Ok(()),
    }
}
