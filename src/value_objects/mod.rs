//! Layout value objects
//!
//! Value objects are immutable types that are compared by value rather than identity:
//! record identities, planar vectors, record-derived scalar parameters, the active node
//! descriptor and the names of the fields the layout writes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

use crate::components::Record;
use crate::errors::ConfigError;

/// Stable identity of a record flowing through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(u64);

impl RecordId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RecordId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A point or displacement in layout space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn distance(&self, other: Vec2) -> f64 {
        (*self - other).length()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, other: Self) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

/// A simulation parameter that is either a constant or read from a record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// The same value for every node or link
    Value(f64),
    /// Name of a numeric field on each node or link record
    Field(String),
}

impl Scalar {
    /// Evaluate the parameter for one record.
    ///
    /// A field that is missing or not numeric falls back to `fallback`.
    pub fn resolve(&self, record: &Record, fallback: f64) -> f64 {
        match self {
            Scalar::Value(value) => *value,
            Scalar::Field(name) => record.get_f64(name).unwrap_or_else(|| {
                tracing::debug!(
                    record = %record.id(),
                    field = %name,
                    fallback,
                    "non-numeric parameter field"
                );
                fallback
            }),
        }
    }

    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Scalar::Value(value) => Some(*value),
            Scalar::Field(_) => None,
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Value(value)
    }
}

impl From<&str> for Scalar {
    fn from(field: &str) -> Self {
        Scalar::Field(field.to_string())
    }
}

/// The node currently under direct manipulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveNode {
    /// Identity of the dragged node record
    pub id: RecordId,
    pub x: f64,
    pub y: f64,
    /// `true` for a drag move, `false` for hover or selection
    #[serde(default)]
    pub update: bool,
}

impl ActiveNode {
    pub fn new(id: RecordId, x: f64, y: f64, update: bool) -> Self {
        Self { id, x, y, update }
    }

    /// Read the descriptor from a signal value; `null` means no active node
    pub fn from_signal(value: &serde_json::Value) -> Result<Option<Self>, ConfigError> {
        if value.is_null() {
            return Ok(None);
        }
        let active: ActiveNode = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::MalformedActive(e.to_string()))?;
        if !active.x.is_finite() || !active.y.is_finite() {
            return Err(ConfigError::MalformedActive(format!(
                "non-finite coordinates ({}, {})",
                active.x, active.y
            )));
        }
        Ok(Some(active))
    }

    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Whether this descriptor moves the node rather than just selecting it
    pub fn is_drag(&self) -> bool {
        self.update
    }
}

/// Names of the record fields written by the layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputFields {
    pub x: String,
    pub y: String,
    pub source: String,
    pub target: String,
}

impl Default for OutputFields {
    fn default() -> Self {
        Self {
            x: "layout_x".to_string(),
            y: "layout_y".to_string(),
            source: "_source".to_string(),
            target: "_target".to_string(),
        }
    }
}

impl OutputFields {
    pub fn all(&self) -> [&str; 4] {
        [&self.x, &self.y, &self.source, &self.target]
    }
}
