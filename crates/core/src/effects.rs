//! Effect parameters tuned per job: background colour, blur and lighting.
//!
//! Ranges are validated here so that every caller (registry edits, CLI
//! flags) rejects the same inputs with the same messages.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Ranges
// ---------------------------------------------------------------------------

/// Upper bound for [`blur_radius`](crate::job::JobRecord::blur_radius), in percent.
pub const MAX_BLUR_RADIUS: u8 = 100;

/// Upper bound for the stored lighting strength, in percent.
pub const MAX_LIGHTING_STRENGTH: u8 = 100;

// ---------------------------------------------------------------------------
// Colour
// ---------------------------------------------------------------------------

/// An RGB triple; each channel is a full `0..=255` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build a colour from untyped integers, rejecting channels outside `0..=255`.
    pub fn try_from_channels(r: i64, g: i64, b: i64) -> Result<Self, CoreError> {
        let channel = |name: &str, v: i64| -> Result<u8, CoreError> {
            u8::try_from(v).map_err(|_| {
                CoreError::Validation(format!("Colour channel {name} must be in 0..=255, got {v}"))
            })
        };
        Ok(Self::new(channel("r", r)?, channel("g", g)?, channel("b", b)?))
    }

    /// Parse `"R,G,B"` (whitespace around components is ignored).
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(CoreError::Validation(format!(
                "Colour must be written as R,G,B, got '{s}'"
            )));
        }
        let mut values = [0i64; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| {
                CoreError::Validation(format!("Colour component '{part}' is not an integer"))
            })?;
        }
        Self::try_from_channels(values[0], values[1], values[2])
    }
}

impl Default for Rgb {
    /// Chroma green, the background every new job starts with.
    fn default() -> Self {
        Self::new(0, 255, 0)
    }
}

/// Named colours offered by the background picker.
pub const PRESET_COLORS: &[(&str, Rgb)] = &[
    ("green", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("white", Rgb::new(255, 255, 255)),
    ("black", Rgb::new(0, 0, 0)),
];

/// Look up a preset colour by case-insensitive name.
pub fn preset_color(name: &str) -> Result<Rgb, CoreError> {
    PRESET_COLORS
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
        .map(|(_, rgb)| *rgb)
        .ok_or_else(|| {
            let names: Vec<&str> = PRESET_COLORS.iter().map(|(n, _)| *n).collect();
            CoreError::Validation(format!(
                "Unknown preset colour '{name}'. Must be one of: {}",
                names.join(", ")
            ))
        })
}

// ---------------------------------------------------------------------------
// Background choice
// ---------------------------------------------------------------------------

/// Which background source was set last and therefore takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundChoice {
    #[default]
    Color,
    Image,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a blur radius percentage.
pub fn validate_blur_radius(value: i64) -> Result<u8, CoreError> {
    validate_percent("blur_radius", value, MAX_BLUR_RADIUS)
}

/// Validate a lighting strength percentage (stored scale, not the wire scale).
pub fn validate_lighting_strength(value: i64) -> Result<u8, CoreError> {
    validate_percent("lighting_strength", value, MAX_LIGHTING_STRENGTH)
}

/// Map a stored lighting percentage onto the `0.0..=1.0` scale the service expects.
pub fn normalized_lighting(percent: u8) -> f64 {
    f64::from(percent.min(MAX_LIGHTING_STRENGTH)) / 100.0
}

fn validate_percent(field: &str, value: i64, max: u8) -> Result<u8, CoreError> {
    if (0..=i64::from(max)).contains(&value) {
        Ok(value as u8)
    } else {
        Err(CoreError::Validation(format!(
            "{field} must be in 0..={max}, got {value}"
        )))
    }
}
