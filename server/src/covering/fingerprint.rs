//! Stable request fingerprints
//!
//! A fingerprint addresses both cache entries and storage keys. It is a SHA-256
//! over the image identifier and the canonical JSON form of the covering, so
//! every field (color included) participates.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::types::CoveringSpec;

/// Hex-encoded SHA-256 fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a (source image, covering) pair
    pub fn for_try_on(image_id: &str, spec: &CoveringSpec) -> Self {
        // Serializing a plain struct of enums and floats cannot fail
        let canonical = serde_json::to_vec(spec).unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(image_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(&canonical);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex characters, used in storage keys
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covering::{CoveringRequest, Material, PatternKind};

    fn spec(pattern: PatternKind, material: Material, color: &str) -> CoveringSpec {
        CoveringSpec::try_from(CoveringRequest::generated(pattern, material, color)).unwrap()
    }

    #[test]
    fn test_identical_requests_share_fingerprint() {
        let a = spec(PatternKind::Horizontal, Material::Wood, "#808080");
        let b = spec(PatternKind::Horizontal, Material::Wood, "#808080");
        assert_eq!(
            Fingerprint::for_try_on("img-1", &a),
            Fingerprint::for_try_on("img-1", &b)
        );
    }

    #[test]
    fn test_every_field_changes_fingerprint() {
        let base = spec(PatternKind::Horizontal, Material::Wood, "#808080");
        let fp = Fingerprint::for_try_on("img-1", &base);

        let variants = [
            Fingerprint::for_try_on("img-2", &base),
            Fingerprint::for_try_on(
                "img-1",
                &spec(PatternKind::Vertical, Material::Wood, "#808080"),
            ),
            Fingerprint::for_try_on(
                "img-1",
                &spec(PatternKind::Horizontal, Material::Metal, "#808080"),
            ),
            Fingerprint::for_try_on(
                "img-1",
                &spec(PatternKind::Horizontal, Material::Wood, "#808081"),
            ),
        ];

        for other in variants {
            assert_ne!(fp, other);
        }
    }

    #[test]
    fn test_texture_and_generated_differ() {
        let texture =
            CoveringSpec::try_from(CoveringRequest::texture("flat", "#808080")).unwrap();
        let generated = spec(PatternKind::Flat, Material::Fabric, "#808080");
        assert_ne!(
            Fingerprint::for_try_on("img", &texture),
            Fingerprint::for_try_on("img", &generated)
        );
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = Fingerprint::for_try_on("img", &spec(PatternKind::Roman, Material::Fabric, "#000000"));
        assert_eq!(fp.as_str().len(), 64);
        assert_eq!(fp.short().len(), 16);
        assert!(fp.as_str().starts_with(fp.short()));
    }
}
