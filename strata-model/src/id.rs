use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strata_hash::{Algorithm, Context};
use thiserror::Error;

pub const OBJECT_ID_LENGTH: usize = 20;

/// A 20-byte git-style object identifier.
///
/// Identifies contents, directories and snapshots alike; the object
/// kind is carried by the manifest header that was hashed, not by the
/// identifier itself.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct ObjectId([u8; OBJECT_ID_LENGTH]);

#[derive(Error, Debug, PartialEq, Eq, Clone)]
#[error("invalid object id '{0}'")]
pub struct FromHexError(String);

impl ObjectId {
    pub const fn new(bytes: [u8; OBJECT_ID_LENGTH]) -> Self {
        ObjectId(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, FromHexError> {
        let mut bytes = [0u8; OBJECT_ID_LENGTH];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| FromHexError(s.to_owned()))?;
        Ok(ObjectId(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LENGTH] {
        &self.0
    }
}

impl From<[u8; OBJECT_ID_LENGTH]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LENGTH]) -> Self {
        ObjectId(bytes)
    }
}

impl TryFrom<&[u8]> for ObjectId {
    type Error = FromHexError;
    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; OBJECT_ID_LENGTH] = bytes
            .try_into()
            .map_err(|_| FromHexError(hex::encode(bytes)))?;
        Ok(ObjectId(arr))
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = FromHexError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ObjectId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Computes the git-style identifier of a typed object manifest:
/// `sha1("{object_type} {payload_len}\0" + payload)`.
pub fn git_object_id(object_type: &str, payload: &[u8]) -> ObjectId {
    let mut ctx = Context::new(Algorithm::Sha1);
    ctx.update(object_type.as_bytes());
    ctx.update(b" ");
    ctx.update(payload.len().to_string().as_bytes());
    ctx.update(b"\0");
    ctx.update(payload);
    let hash = ctx.finish();
    ObjectId::try_from(hash.digest_bytes()).expect("sha1 digest is 20 bytes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_blob_matches_git() {
        // the well-known id of git's empty blob
        assert_eq!(
            git_object_id("blob", b"").to_hex(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
    }

    #[test]
    fn hex_roundtrip() {
        let id = ObjectId::from_hex("3b18e512dba79e4c8300dd08aeb37f8e728b8dad").unwrap();
        assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
        assert!(ObjectId::from_hex("zz").is_err());
    }
}
