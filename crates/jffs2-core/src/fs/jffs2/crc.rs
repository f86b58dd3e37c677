/// Node header checksum
///
/// JFFS2 checksums are CRC-32 (IEEE polynomial, reflected) seeded with 0
/// and without the final inversion, i.e. the kernel's `crc32(0, buf, len)`.
/// The header checksum covers the 8 bytes preceding the `hdr_crc` field.
use serde::{Deserialize, Serialize};

/// Header bytes covered by `hdr_crc`
pub const HEADER_CRC_SPAN: usize = 8;

/// Header checksum policy applied by the scanner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderCheck {
    /// Accept every header whose magic matches
    #[default]
    Skip,
    /// Reject headers whose stored CRC does not match the computed one
    Verify,
}

/// Outcome of a header check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcVerdict {
    Accepted,
    Mismatch { stored: u32, computed: u32 },
}

impl HeaderCheck {
    /// Check `header` (at least [`HEADER_CRC_SPAN`] bytes) against `stored`
    pub fn check(&self, header: &[u8], stored: u32) -> CrcVerdict {
        match self {
            HeaderCheck::Skip => CrcVerdict::Accepted,
            HeaderCheck::Verify => {
                let span = &header[..HEADER_CRC_SPAN.min(header.len())];
                let computed = jffs2_crc32(span);
                if computed == stored {
                    CrcVerdict::Accepted
                } else {
                    CrcVerdict::Mismatch { stored, computed }
                }
            }
        }
    }
}

/// CRC-32 as JFFS2 computes it
pub fn jffs2_crc32(data: &[u8]) -> u32 {
    // crc32fast pre- and post-inverts; seeding with !0 cancels the pre-inversion
    let mut hasher = crc32fast::Hasher::new_with_initial(0xFFFF_FFFF);
    hasher.update(data);
    !hasher.finalize()
}
