//! Structured cinematography instructions.
//!
//! A [`ShotParameterRecord`] is what the fine-tuned model emits for one
//! natural-language shot description. Path, constraint and modifier kinds are
//! closed sets: any `type` tag outside them fails to decode.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError, Violation};

/// Placeholder target resolved by the host plugin to the current selection.
pub const SELECTED_TARGET: &str = "$SELECTED";

/// Intensity used when a modifier omits one.
pub const DEFAULT_MODIFIER_INTENSITY: f64 = 0.3;

/// One structured cinematography instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotParameterRecord {
    /// Human-readable label.
    pub shot_name: String,

    /// Shot length in seconds.
    pub duration: f64,

    /// Camera motion.
    pub path: CameraPath,

    /// Camera aim behaviour.
    pub constraint: AimConstraint,

    /// Ordered motion modifiers layered on top of the path.
    #[serde(default)]
    pub modifiers: Vec<Modifier>,

    /// Optional lens setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lens: Option<Lens>,
}

/// Scalar or animated height above the target, in scene units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Height {
    Range { start: f64, end: f64 },
    Fixed(f64),
}

impl Height {
    pub fn start(&self) -> f64 {
        match self {
            Height::Range { start, .. } => *start,
            Height::Fixed(h) => *h,
        }
    }

    pub fn end(&self) -> f64 {
        match self {
            Height::Range { end, .. } => *end,
            Height::Fixed(h) => *h,
        }
    }

    fn check(&self, field: &str, out: &mut Vec<Violation>) {
        if !self.start().is_finite() || !self.end().is_finite() {
            out.push(Violation::new(field, "must be finite"));
        }
    }
}

/// Camera motion, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraPath {
    /// Circle around the target.
    Orbit {
        radius: f64,
        /// Swept angle in degrees.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        angle: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<Height>,
    },
    /// Push in (positive) or pull out (negative) along the view axis.
    Dolly { distance: f64 },
    /// Vertical rise or descent.
    Crane {
        height: Height,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        radius: Option<f64>,
    },
    /// Track a moving target at a fixed offset.
    Follow {
        offset: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<Height>,
    },
    /// Lateral slide across the target.
    Linear {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        radius: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distance: Option<f64>,
    },
}

impl CameraPath {
    /// Wire tag of this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            CameraPath::Orbit { .. } => "orbit",
            CameraPath::Dolly { .. } => "dolly",
            CameraPath::Crane { .. } => "crane",
            CameraPath::Follow { .. } => "follow",
            CameraPath::Linear { .. } => "linear",
        }
    }

    /// Every tag accepted on the wire.
    pub const TAGS: [&'static str; 5] = ["orbit", "dolly", "crane", "follow", "linear"];

    fn check(&self, out: &mut Vec<Violation>) {
        match self {
            CameraPath::Orbit {
                radius,
                angle,
                height,
            } => {
                check_positive("path.radius", *radius, out);
                if let Some(angle) = angle {
                    check_finite("path.angle", *angle, out);
                }
                if let Some(height) = height {
                    height.check("path.height", out);
                }
            }
            CameraPath::Dolly { distance } => {
                check_finite("path.distance", *distance, out);
                if *distance == 0.0 {
                    out.push(Violation::new("path.distance", "must be non-zero"));
                }
            }
            CameraPath::Crane { height, radius } => {
                height.check("path.height", out);
                if let Some(radius) = radius {
                    check_positive("path.radius", *radius, out);
                }
            }
            CameraPath::Follow { offset, height } => {
                check_positive("path.offset", *offset, out);
                if let Some(height) = height {
                    height.check("path.height", out);
                }
            }
            CameraPath::Linear { radius, distance } => {
                if let Some(radius) = radius {
                    check_positive("path.radius", *radius, out);
                }
                if let Some(distance) = distance {
                    check_positive("path.distance", *distance, out);
                }
            }
        }
    }
}

/// Camera aim behaviour, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AimConstraint {
    /// Keep the target framed.
    LookAt {
        #[serde(default = "default_target")]
        target: String,
    },
    /// Keep the initial orientation.
    Fixed,
}

impl AimConstraint {
    pub fn look_at_selection() -> Self {
        AimConstraint::LookAt {
            target: SELECTED_TARGET.to_string(),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            AimConstraint::LookAt { .. } => "look_at",
            AimConstraint::Fixed => "fixed",
        }
    }
}

fn default_target() -> String {
    SELECTED_TARGET.to_string()
}

/// Motion modifier, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Modifier {
    /// Low-frequency operator wobble.
    Handheld {
        #[serde(default = "default_intensity")]
        intensity: f64,
    },
    /// High-frequency shake.
    Shake {
        #[serde(default = "default_intensity")]
        intensity: f64,
    },
}

impl Modifier {
    pub fn tag(&self) -> &'static str {
        match self {
            Modifier::Handheld { .. } => "handheld",
            Modifier::Shake { .. } => "shake",
        }
    }

    pub fn intensity(&self) -> f64 {
        match self {
            Modifier::Handheld { intensity } | Modifier::Shake { intensity } => *intensity,
        }
    }
}

fn default_intensity() -> f64 {
    DEFAULT_MODIFIER_INTENSITY
}

/// Focal length in millimetres, fixed or animated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FocalLength {
    Range { start: f64, end: f64 },
    Fixed(f64),
}

/// Lens settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lens {
    pub focal_length: FocalLength,
}

impl Lens {
    pub fn fixed(focal_length: f64) -> Self {
        Self {
            focal_length: FocalLength::Fixed(focal_length),
        }
    }
}

impl ShotParameterRecord {
    /// Decode a record from a JSON value, then validate it.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let record: ShotParameterRecord = serde_json::from_value(value)?;
        record.validate()?;
        Ok(record)
    }

    /// Check value constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        if self.shot_name.trim().is_empty() {
            violations.push(Violation::new("shot_name", "must not be empty"));
        }
        check_positive("duration", self.duration, &mut violations);
        self.path.check(&mut violations);

        if let AimConstraint::LookAt { target } = &self.constraint {
            if target.trim().is_empty() {
                violations.push(Violation::new("constraint.target", "must not be empty"));
            }
        }

        for (i, modifier) in self.modifiers.iter().enumerate() {
            let intensity = modifier.intensity();
            if !(0.0..=1.0).contains(&intensity) {
                violations.push(Violation::new(
                    format!("modifiers[{i}].intensity"),
                    format!("must be within [0, 1], got {intensity}"),
                ));
            }
        }

        if let Some(lens) = &self.lens {
            match lens.focal_length {
                FocalLength::Fixed(f) => check_positive("lens.focal_length", f, &mut violations),
                FocalLength::Range { start, end } => {
                    check_positive("lens.focal_length.start", start, &mut violations);
                    check_positive("lens.focal_length.end", end, &mut violations);
                }
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(violations))
        }
    }

    /// Whether a modifier with the given wire tag is present.
    pub fn has_modifier(&self, tag: &str) -> bool {
        self.modifiers.iter().any(|m| m.tag() == tag)
    }
}

fn check_finite(field: &str, value: f64, out: &mut Vec<Violation>) {
    if !value.is_finite() {
        out.push(Violation::new(field, "must be finite"));
    }
}

fn check_positive(field: &str, value: f64, out: &mut Vec<Violation>) {
    if !value.is_finite() || value <= 0.0 {
        out.push(Violation::new(field, format!("must be positive, got {value}")));
    }
}
