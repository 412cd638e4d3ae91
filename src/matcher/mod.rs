//! A minimal, correct implementation of the `MatcherLib` capability that
//! spec.md treats as an external, opaque engine (spec §6.3). Spec.md's
//! Non-goals exclude a production-grade, performance-tuned rolling-checksum
//! matcher; this module exists so the orchestration core in `src/core` has
//! something real to drive and so the six end-to-end scenarios in spec §8
//! are exercisable in tests.
pub mod control;
pub mod rolling;
pub mod session;

pub use control::{BlockChecksum, ControlDocument};
pub use session::{BlockState, MatchSession, Receiver};

use sha2::{Digest, Sha256};

/// Truncated SHA-256, standing in for zsync's original MD4 strong checksum
/// (see DESIGN.md — MD4 has no well-maintained crate in this ecosystem,
/// SHA-256 is the strong-hash crate the rest of the example pack reaches
/// for instead).
pub fn strong_checksum(data: &[u8], n: usize) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest[..n.min(digest.len())].to_vec()
}
