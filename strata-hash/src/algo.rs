use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::{Context, Hash};

const MD5_SIZE: usize = 128 / 8;
const SHA1_SIZE: usize = 160 / 8;
const SHA256_SIZE: usize = 256 / 8;
const SHA512_SIZE: usize = 512 / 8;

/// A digest algorithm.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Display, Default)]
pub enum Algorithm {
    #[display("md5")]
    Md5,
    #[display("sha1")]
    Sha1,
    #[default]
    #[display("sha256")]
    Sha256,
    #[display("sha512")]
    Sha512,
}

impl Algorithm {
    /// The largest supported algorithm size in bytes.
    pub(crate) const LARGEST: Algorithm = Algorithm::Sha512;

    /// Returns the size in bytes of this hash.
    #[inline]
    pub const fn size(&self) -> usize {
        match &self {
            Algorithm::Md5 => MD5_SIZE,
            Algorithm::Sha1 => SHA1_SIZE,
            Algorithm::Sha256 => SHA256_SIZE,
            Algorithm::Sha512 => SHA512_SIZE,
        }
    }

    /// Returns the digest of `data` using this algorithm.
    ///
    /// ```
    /// # use strata_hash::Algorithm;
    /// let hash = Algorithm::Sha256.digest("abc");
    ///
    /// assert_eq!(
    ///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad",
    ///     hash.to_hex(),
    /// );
    /// ```
    pub fn digest<B: AsRef<[u8]>>(&self, data: B) -> Hash {
        let mut ctx = Context::new(*self);
        ctx.update(data);
        ctx.finish()
    }
}

#[derive(Error, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
#[error("unsupported digest algorithm '{0}'")]
pub struct UnknownAlgorithm(pub(super) String);

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sha256") {
            Ok(Algorithm::Sha256)
        } else if s.eq_ignore_ascii_case("sha512") {
            Ok(Algorithm::Sha512)
        } else if s.eq_ignore_ascii_case("sha1") {
            Ok(Algorithm::Sha1)
        } else if s.eq_ignore_ascii_case("md5") {
            Ok(Algorithm::Md5)
        } else {
            Err(UnknownAlgorithm(s.to_owned()))
        }
    }
}

impl Serialize for Algorithm {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Algorithm {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
