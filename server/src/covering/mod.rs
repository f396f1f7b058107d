//! Covering specifications
//!
//! A covering is either a texture bitmap from the library or a procedurally
//! generated pattern, plus a color. Requests arrive as `CoveringRequest` and are
//! validated into `CoveringSpec` before any work is scheduled.

mod fingerprint;
mod types;

pub use fingerprint::Fingerprint;
pub use types::{
    Covering, CoveringError, CoveringMode, CoveringRequest, CoveringSpec, Material, PatternKind,
    Rgb,
};
