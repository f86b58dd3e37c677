/// Hash-based verification of reconstructed snapshots
///
/// Each snapshot can be fingerprinted so that exported artifacts can later
/// be checked against the reconstruction that produced them.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::recovery::history::{FileHistory, FileSnapshot};

/// Supported hash algorithms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    MD5,
    SHA1,
    SHA256,
    SHA512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MD5 => "MD5",
            Self::SHA1 => "SHA1",
            Self::SHA256 => "SHA256",
            Self::SHA512 => "SHA512",
        }
    }
}

/// Calculate a lowercase hex digest of `data`
pub fn calculate_hash(data: &[u8], algorithm: HashAlgorithm) -> String {
    match algorithm {
        HashAlgorithm::MD5 => format!("{:x}", md5::compute(data)),
        HashAlgorithm::SHA1 => {
            let mut hasher = sha1::Sha1::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::SHA256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
        HashAlgorithm::SHA512 => {
            let mut hasher = Sha512::new();
            hasher.update(data);
            format!("{:x}", hasher.finalize())
        }
    }
}

/// Fingerprint of one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHash {
    pub inode: u32,
    pub serial: u32,
    pub size: u64,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerificationStatus {
    Verified,
    Corrupted,
}

/// Fingerprints of every snapshot of one inode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashManifest {
    pub algorithm: HashAlgorithm,
    pub artifact: String,
    pub entries: Vec<SnapshotHash>,
    pub generated_at: chrono::DateTime<chrono::Utc>,
}

impl HashManifest {
    pub fn from_history(history: &FileHistory, algorithm: HashAlgorithm) -> Self {
        let entries = history
            .snapshots
            .iter()
            .map(|snapshot| SnapshotHash {
                inode: history.inode,
                serial: snapshot.serial,
                size: snapshot.data.len() as u64,
                hash: calculate_hash(&snapshot.data, algorithm),
            })
            .collect();

        Self {
            algorithm,
            artifact: history.artifact_name(),
            entries,
            generated_at: chrono::Utc::now(),
        }
    }

    pub fn entry(&self, serial: u32) -> Option<&SnapshotHash> {
        self.entries.iter().find(|e| e.serial == serial)
    }

    /// Check `data` against the recorded fingerprint of snapshot `serial`
    pub fn verify(&self, serial: u32, data: &[u8]) -> Option<VerificationStatus> {
        let entry = self.entry(serial)?;
        Some(verify_snapshot(data, &entry.hash, self.algorithm))
    }
}

/// Compare `data` against an expected hex digest (case-insensitive)
pub fn verify_snapshot(data: &[u8], expected: &str, algorithm: HashAlgorithm) -> VerificationStatus {
    if calculate_hash(data, algorithm).eq_ignore_ascii_case(expected) {
        VerificationStatus::Verified
    } else {
        VerificationStatus::Corrupted
    }
}

/// SHA-256 fingerprint of a snapshot
pub fn snapshot_digest(snapshot: &FileSnapshot) -> String {
    calculate_hash(&snapshot.data, HashAlgorithm::SHA256)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            calculate_hash(b"", HashAlgorithm::MD5),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
        assert_eq!(
            calculate_hash(b"abc", HashAlgorithm::SHA1),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            calculate_hash(b"abc", HashAlgorithm::SHA256),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(calculate_hash(b"abc", HashAlgorithm::SHA512).len(), 128);
    }

    #[test]
    fn test_manifest_and_verification() {
        let history = FileHistory {
            inode: 2,
            names: vec!["a.txt".to_string()],
            snapshots: vec![
                FileSnapshot {
                    serial: 0,
                    version: Some(1),
                    data: b"hello".to_vec(),
                },
                FileSnapshot {
                    serial: 1,
                    version: Some(2),
                    data: b"world".to_vec(),
                },
            ],
            log: Vec::new(),
        };

        let manifest = HashManifest::from_history(&history, HashAlgorithm::SHA256);
        assert_eq!(manifest.artifact, "ino_2_a.txt");
        assert_eq!(manifest.entries.len(), 2);
        assert_eq!(manifest.entries[1].size, 5);
        assert_eq!(manifest.entries[0].hash, snapshot_digest(&history.snapshots[0]));

        assert_eq!(manifest.verify(0, b"hello"), Some(VerificationStatus::Verified));
        assert_eq!(manifest.verify(1, b"hello"), Some(VerificationStatus::Corrupted));
        assert_eq!(manifest.verify(5, b"hello"), None);

        let upper = manifest.entries[0].hash.to_uppercase();
        assert_eq!(
            verify_snapshot(b"hello", &upper, HashAlgorithm::SHA256),
            VerificationStatus::Verified
        );
    }
}
