//! Deterministic hashing for traffic gating and variant bucketing
//!
//! The mapping is frozen: changing it would silently rebucket every user
//! in every running experiment. Any port to another language must
//! reproduce it exactly.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Map a string to a uniform float in [0, 1).
///
/// Algorithm (frozen): SHA-256 of the UTF-8 bytes, first 8 bytes of the
/// digest interpreted as a big-endian u64, top 53 bits divided by 2^53.
/// The 53-bit truncation keeps the quotient exactly representable as an
/// f64, so the result is identical on every platform.
pub fn unit_hash(input: &str) -> f64 {
    let digest = Sha256::digest(input.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    (u64::from_be_bytes(prefix) >> 11) as f64 / (1u64 << 53) as f64
}

/// Hash used for the traffic-allocation gate.
///
/// Keyed on the user alone so a user's inclusion is independent across
/// experiments.
pub fn traffic_hash(user_id: &str) -> f64 {
    unit_hash(user_id)
}

/// Hash used for variant bucketing within one experiment.
///
/// The ":variant" suffix decorrelates bucketing from the traffic gate,
/// so users just past the gate are not all funneled into early variants.
pub fn bucket_hash(user_id: &str, experiment_id: &Uuid) -> f64 {
    unit_hash(&format!("{}:{}:variant", user_id, experiment_id))
}
