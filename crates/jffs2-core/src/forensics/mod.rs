/// Forensic integrity helpers for reconstructed artifacts
pub mod verification;

pub use verification::{
    calculate_hash, snapshot_digest, verify_snapshot, HashAlgorithm, HashManifest, SnapshotHash,
    VerificationStatus,
};
