//! Fixed-width, blank-padded location encoding
//!
//! Filespace locations are stored in a constant-size buffer: the path bytes,
//! right-padded with blanks, with a NUL terminator in the last byte. The
//! width is a compatibility constant shared by the directory cache and the
//! persisted records.
//!
//! ```text
//! +----------------------+------------------+------+
//! | path bytes (len)     | ' ' * (W-1-len)  | \0   |
//! +----------------------+------------------+------+
//! ```

use crate::error::{Error, Result};
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Encoded width in bytes, terminator included
pub const LOCATION_WIDTH: usize = 1024;

/// Longest path that fits in an encoded location
pub const MAX_LOCATION_LEN: usize = LOCATION_WIDTH - 1;

const BLANK: u8 = b' ';

/// A location encoded into its fixed-width, blank-padded form
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BlankPaddedLocation([u8; LOCATION_WIDTH]);

impl BlankPaddedLocation {
    /// All blanks followed by the terminator
    #[must_use]
    pub const fn blank() -> Self {
        let mut buf = [BLANK; LOCATION_WIDTH];
        buf[MAX_LOCATION_LEN] = 0;
        Self(buf)
    }

    /// Encode an optional path
    ///
    /// An absent path encodes as all blanks. A path longer than
    /// [`MAX_LOCATION_LEN`] bytes is rejected and nothing is produced.
    pub fn encode(path: Option<&str>) -> Result<Self> {
        let bytes = path.map(str::as_bytes).unwrap_or_default();
        if bytes.len() > MAX_LOCATION_LEN {
            return Err(Error::InvalidInput {
                value: path.unwrap_or_default().to_string(),
                limit: MAX_LOCATION_LEN,
            });
        }

        let mut encoded = Self::blank();
        encoded.0[..bytes.len()].copy_from_slice(bytes);
        Ok(encoded)
    }

    /// Build from a raw buffer read back from storage
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        let buf: [u8; LOCATION_WIDTH] = raw.try_into().map_err(|_| {
            Error::Deserialization(format!(
                "encoded location must be {LOCATION_WIDTH} bytes, got {}",
                raw.len()
            ))
        })?;
        if buf[MAX_LOCATION_LEN] != 0 {
            return Err(Error::Deserialization(
                "encoded location is not NUL terminated".into(),
            ));
        }
        Ok(Self(buf))
    }

    /// Recover the logical path, trailing blanks removed
    #[must_use]
    pub fn decode(&self) -> String {
        let payload = &self.0[..MAX_LOCATION_LEN];
        let end = payload
            .iter()
            .rposition(|&b| b != BLANK)
            .map_or(0, |pos| pos + 1);
        String::from_utf8_lossy(&payload[..end]).into_owned()
    }

    /// True when no path is stored
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0[..MAX_LOCATION_LEN].iter().all(|&b| b == BLANK)
    }

    /// The raw encoded buffer
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; LOCATION_WIDTH] {
        &self.0
    }
}

impl Default for BlankPaddedLocation {
    fn default() -> Self {
        Self::blank()
    }
}

impl fmt::Debug for BlankPaddedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlankPaddedLocation({:?})", self.decode())
    }
}

impl fmt::Display for BlankPaddedLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.decode())
    }
}

impl Serialize for BlankPaddedLocation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

struct LocationVisitor;

impl<'de> Visitor<'de> for LocationVisitor {
    type Value = BlankPaddedLocation;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a {LOCATION_WIDTH}-byte blank padded location")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Self::Value, E> {
        BlankPaddedLocation::from_raw(v).map_err(E::custom)
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> std::result::Result<Self::Value, E> {
        self.visit_bytes(&v)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut raw = Vec::with_capacity(LOCATION_WIDTH);
        while let Some(byte) = seq.next_element::<u8>()? {
            raw.push(byte);
        }
        self.visit_bytes(&raw)
    }
}

impl<'de> Deserialize<'de> for BlankPaddedLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_bytes(LocationVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_absent_is_blank() {
        let loc = BlankPaddedLocation::encode(None).unwrap();
        assert!(loc.is_blank());
        assert_eq!(loc.decode(), "");
        assert_eq!(loc.as_bytes()[MAX_LOCATION_LEN], 0);
        assert!(loc.as_bytes()[..MAX_LOCATION_LEN].iter().all(|&b| b == b' '));
        assert_eq!(loc, BlankPaddedLocation::default());
    }

    #[test]
    fn test_encode_pads_and_terminates() {
        let loc = BlankPaddedLocation::encode(Some("/data/fs1")).unwrap();
        let bytes = loc.as_bytes();
        assert_eq!(&bytes[..9], b"/data/fs1");
        assert!(bytes[9..MAX_LOCATION_LEN].iter().all(|&b| b == b' '));
        assert_eq!(bytes[MAX_LOCATION_LEN], 0);
        assert_eq!(loc.decode(), "/data/fs1");
        assert_eq!(loc.to_string(), "/data/fs1");
    }

    #[test]
    fn test_roundtrip_boundary_lengths() {
        for len in [0, 1, 2, MAX_LOCATION_LEN - 1, MAX_LOCATION_LEN] {
            let path = "p".repeat(len);
            let loc = BlankPaddedLocation::encode(Some(&path)).unwrap();
            assert_eq!(loc.decode(), path, "length {len}");
        }
    }

    #[test]
    fn test_roundtrip_multibyte_path() {
        let path = "/données/σ/文件";
        let loc = BlankPaddedLocation::encode(Some(path)).unwrap();
        assert_eq!(loc.decode(), path);
    }

    #[test]
    fn test_rejects_too_long() {
        for len in [LOCATION_WIDTH, LOCATION_WIDTH + 1, 4096] {
            let path = "x".repeat(len);
            let err = BlankPaddedLocation::encode(Some(&path)).unwrap_err();
            match err {
                Error::InvalidInput { value, limit } => {
                    assert_eq!(value, path);
                    assert_eq!(limit, MAX_LOCATION_LEN);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_from_raw_validation() {
        assert!(BlankPaddedLocation::from_raw(&[b' '; 10]).is_err());

        let mut unterminated = [b' '; LOCATION_WIDTH];
        unterminated[0] = b'/';
        assert!(BlankPaddedLocation::from_raw(&unterminated).is_err());

        let good = BlankPaddedLocation::encode(Some("/x")).unwrap();
        assert_eq!(BlankPaddedLocation::from_raw(good.as_bytes()).unwrap(), good);
    }

    #[test]
    fn test_serde_bincode() {
        let loc = BlankPaddedLocation::encode(Some("/fs/primary")).unwrap();
        let bytes = bincode::serialize(&loc).unwrap();
        let parsed: BlankPaddedLocation = bincode::deserialize(&bytes).unwrap();
        assert_eq!(parsed, loc);
    }

    #[test]
    fn test_serde_json_seq() {
        let loc = BlankPaddedLocation::encode(Some("/fs/mirror")).unwrap();
        let json = serde_json::to_string(&loc).unwrap();
        let parsed: BlankPaddedLocation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.decode(), "/fs/mirror");

        assert!(serde_json::from_str::<BlankPaddedLocation>("[32, 32]").is_err());
    }
}
