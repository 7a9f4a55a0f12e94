use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::VizError;

/// Straight-alpha RGBA color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    /// Dark backdrop used for motion trails.
    pub const TRAIL: Color = Color::rgb(15, 19, 34);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        Self {
            a: alpha.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Parses `#rgb`, `#rrggbb` and `#rrggbbaa` strings; the leading `#` is
    /// optional.
    pub fn from_hex(value: &str) -> crate::Result<Self> {
        let digits = value.trim().trim_start_matches('#');
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(VizError::InvalidColor(value.to_string()));
        }
        let expanded: String = match digits.len() {
            3 => digits.chars().flat_map(|c| [c, c]).chain("ff".chars()).collect(),
            6 => format!("{digits}ff"),
            8 => digits.to_string(),
            _ => return Err(VizError::InvalidColor(value.to_string())),
        };
        let packed = u32::from_str_radix(&expanded, 16)
            .map_err(|_| VizError::InvalidColor(value.to_string()))?;

        Ok(Self {
            r: ((packed >> 24) & 0xff) as u8,
            g: ((packed >> 16) & 0xff) as u8,
            b: ((packed >> 8) & 0xff) as u8,
            a: (packed & 0xff) as f32 / 255.0,
        })
    }

    /// Channel-wise linear interpolation, rounded per channel.
    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: self.a + (other.a - self.a) * t,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a < 1.0 {
            write!(f, "{:02x}", (self.a.clamp(0.0, 1.0) * 255.0).round() as u8)?;
        }
        Ok(())
    }
}

impl FromStr for Color {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for Color {
    type Error = VizError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Color> for String {
    fn from(value: Color) -> Self {
        value.to_string()
    }
}

/// How a shape is filled or stroked.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Paint {
    Solid { color: Color },
    /// Diagonal gradient spanning the whole surface, top-left to bottom-right.
    Diagonal { from: Color, to: Color },
    /// Gradient spanning the surface from top to bottom.
    Vertical { from: Color, to: Color },
}

impl Paint {
    pub fn solid(color: Color) -> Self {
        Paint::Solid { color }
    }
}
