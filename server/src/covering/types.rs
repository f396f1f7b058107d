//! Covering specification types and validation

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while validating a covering request
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CoveringError {
    #[error("texture mode requires a texture reference")]
    MissingTexture,

    #[error("generated mode requires a pattern kind")]
    MissingPattern,

    #[error("texture mode does not accept a pattern kind")]
    UnexpectedPattern,

    #[error("generated mode does not accept a texture reference")]
    UnexpectedTexture,

    #[error("Invalid color '{0}': expected #RRGGBB")]
    InvalidColor(String),

    #[error("Invalid texture reference: {0}")]
    InvalidTexture(String),
}

/// Which kind of covering the caller asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoveringMode {
    Texture,
    Generated,
}

impl CoveringMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoveringMode::Texture => "texture",
            CoveringMode::Generated => "generated",
        }
    }
}

/// Procedurally rasterized pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Evenly spaced horizontal slats
    Horizontal,
    /// Evenly spaced vertical slats
    Vertical,
    /// Plain roller shade with a head rail
    Roller,
    /// Folded roman pleats
    Roman,
    /// Texture-free flat fill
    Flat,
}

impl PatternKind {
    pub const ALL: [Self; 5] = [
        Self::Horizontal,
        Self::Vertical,
        Self::Roller,
        Self::Roman,
        Self::Flat,
    ];
}

/// Surface material applied on top of a generated pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Material {
    #[default]
    Fabric,
    Wood,
    Metal,
    Plastic,
}

impl Material {
    pub const ALL: [Self; 4] = [Self::Fabric, Self::Wood, Self::Metal, Self::Plastic];
}

/// Normalized RGB color, each channel in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
    /// Parse a `#RRGGBB` hex string
    pub fn from_hex(s: &str) -> Result<Self, CoveringError> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(CoveringError::InvalidColor(s.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map(|v| v as f32 / 255.0)
                .map_err(|_| CoveringError::InvalidColor(s.to_string()))
        };
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }

    /// Channels scaled to 8-bit
    pub fn to_u8(self) -> [u8; 3] {
        self.0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

/// Validated covering: exactly one of texture or pattern, by construction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Covering {
    Texture { reference: String },
    Generated { pattern: PatternKind, material: Material },
}

/// A validated covering specification
///
/// Field order is part of the fingerprint; do not reorder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoveringSpec {
    pub covering: Covering,
    pub color: Rgb,
}

impl CoveringSpec {
    pub fn mode(&self) -> CoveringMode {
        match self.covering {
            Covering::Texture { .. } => CoveringMode::Texture,
            Covering::Generated { .. } => CoveringMode::Generated,
        }
    }
}

/// Covering specification as supplied by the caller, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoveringRequest {
    pub mode: CoveringMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<Material>,
    pub color: String,
}

impl CoveringRequest {
    /// Generated-mode request
    pub fn generated(pattern: PatternKind, material: Material, color: &str) -> Self {
        Self {
            mode: CoveringMode::Generated,
            texture: None,
            pattern: Some(pattern),
            material: Some(material),
            color: color.to_string(),
        }
    }

    /// Texture-mode request
    pub fn texture(reference: &str, color: &str) -> Self {
        Self {
            mode: CoveringMode::Texture,
            texture: Some(reference.to_string()),
            pattern: None,
            material: None,
            color: color.to_string(),
        }
    }
}

impl TryFrom<CoveringRequest> for CoveringSpec {
    type Error = CoveringError;

    fn try_from(req: CoveringRequest) -> Result<Self, Self::Error> {
        let color = Rgb::from_hex(&req.color)?;
        let texture = req.texture.filter(|t| !t.trim().is_empty());

        let covering = match req.mode {
            CoveringMode::Texture => {
                if req.pattern.is_some() {
                    return Err(CoveringError::UnexpectedPattern);
                }
                let reference = texture.ok_or(CoveringError::MissingTexture)?;
                validate_texture_reference(&reference)?;
                Covering::Texture { reference }
            }
            CoveringMode::Generated => {
                if texture.is_some() {
                    return Err(CoveringError::UnexpectedTexture);
                }
                let pattern = req.pattern.ok_or(CoveringError::MissingPattern)?;
                Covering::Generated {
                    pattern,
                    material: req.material.unwrap_or_default(),
                }
            }
        };

        Ok(Self { covering, color })
    }
}

/// Texture references are bare file names inside the texture library
fn validate_texture_reference(reference: &str) -> Result<(), CoveringError> {
    let ok = reference
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !reference.starts_with('.')
        && !reference.contains("..");
    if ok {
        Ok(())
    } else {
        Err(CoveringError::InvalidTexture(reference.to_string()))
    }
}
