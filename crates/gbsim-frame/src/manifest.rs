use bytes::Bytes;

use crate::error::{FrameError, Result};

/// Manifest header: size (2) + version major (1) + version minor (1).
pub const MANIFEST_HEADER_SIZE: usize = 4;

/// Leading header of a module manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestHeader {
    /// Total manifest size including this header.
    pub size: u16,
    pub version_major: u8,
    pub version_minor: u8,
}

impl ManifestHeader {
    /// Parse and sanity-check the header of `blob`.
    pub fn parse(blob: &[u8]) -> Result<Self> {
        if blob.len() < MANIFEST_HEADER_SIZE {
            return Err(FrameError::InvalidManifest(format!(
                "header needs {MANIFEST_HEADER_SIZE} bytes, got {}",
                blob.len()
            )));
        }

        let header = Self {
            size: u16::from_le_bytes([blob[0], blob[1]]),
            version_major: blob[2],
            version_minor: blob[3],
        };

        let size = header.size as usize;
        if size < MANIFEST_HEADER_SIZE {
            return Err(FrameError::InvalidManifest(format!(
                "declared size {size} is smaller than its header"
            )));
        }
        if size > blob.len() {
            return Err(FrameError::InvalidManifest(format!(
                "declared size {size} exceeds {} available bytes",
                blob.len()
            )));
        }

        Ok(header)
    }
}

/// A module manifest, relayed verbatim in hotplug events.
///
/// The contents beyond the size header are opaque to the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    header: ManifestHeader,
    bytes: Bytes,
}

impl Manifest {
    /// Validate `blob` and keep exactly the declared number of bytes.
    pub fn from_bytes(blob: impl Into<Bytes>) -> Result<Self> {
        let blob = blob.into();
        let header = ManifestHeader::parse(&blob)?;
        let bytes = blob.slice(..header.size as usize);
        Ok(Self { header, bytes })
    }

    pub fn header(&self) -> &ManifestHeader {
        &self.header
    }

    /// Declared manifest size.
    pub fn size(&self) -> usize {
        self.header.size as usize
    }

    /// Raw manifest bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_size_and_version() {
        let blob = [0x06, 0x00, 0x00, 0x01, 0x10, 0x20];
        let header = ManifestHeader::parse(&blob).unwrap();
        assert_eq!(header.size, 6);
        assert_eq!(header.version_major, 0);
        assert_eq!(header.version_minor, 1);
    }

    #[test]
    fn trailing_bytes_are_dropped() {
        let manifest = Manifest::from_bytes(vec![0x05, 0x00, 0x00, 0x01, 0xAA, 0xFF, 0xFF]).unwrap();
        assert_eq!(manifest.size(), 5);
        assert_eq!(manifest.bytes().as_ref(), &[0x05, 0x00, 0x00, 0x01, 0xAA]);
    }

    #[test]
    fn rejects_size_beyond_blob() {
        let err = Manifest::from_bytes(vec![0x20, 0x00, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidManifest(_)));
    }

    #[test]
    fn rejects_size_below_header() {
        let err = ManifestHeader::parse(&[0x02, 0x00, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidManifest(_)));
    }

    #[test]
    fn rejects_short_blob() {
        assert!(ManifestHeader::parse(&[0x04, 0x00]).is_err());
    }
}
