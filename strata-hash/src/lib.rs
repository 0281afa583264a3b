//! Digest computation for Strata.
//!
//! Provides the [`Algorithm`] and [`Hash`] types used throughout the
//! archive, an incremental [`Context`] for init-update-finish hashing,
//! and a [`MultiContext`] that feeds one byte stream to several
//! algorithms in a single pass (the NAR serializer relies on this).

use std::collections::BTreeMap;
use std::fmt as sfmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::Digest as _;
use thiserror::Error;

mod algo;

pub use algo::{Algorithm, UnknownAlgorithm};

const LARGEST_ALGORITHM: Algorithm = Algorithm::LARGEST;

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
#[error("hash has wrong length {length} != {} for hash type '{algorithm}'", algorithm.size())]
pub struct InvalidHashError {
    algorithm: Algorithm,
    length: usize,
}

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ParseHashError {
    #[error("invalid hex digest '{0}'")]
    InvalidHex(String),
    #[error(transparent)]
    InvalidLength(#[from] InvalidHashError),
}

/// A digest value tagged with its algorithm.
///
/// The buffer is sized for the largest supported algorithm; only the
/// first `algorithm.size()` bytes are meaningful and exposed.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct Hash {
    algorithm: Algorithm,
    data: [u8; LARGEST_ALGORITHM.size()],
}

impl Hash {
    pub const fn new(algorithm: Algorithm, hash: &[u8]) -> Hash {
        let mut data = [0u8; LARGEST_ALGORITHM.size()];
        let mut i = 0;
        while i < algorithm.size() {
            data[i] = hash[i];
            i += 1;
        }
        Hash { algorithm, data }
    }

    pub fn from_slice(algorithm: Algorithm, hash: &[u8]) -> Result<Hash, InvalidHashError> {
        if hash.len() != algorithm.size() {
            return Err(InvalidHashError {
                algorithm,
                length: hash.len(),
            });
        }
        Ok(Hash::new(algorithm, hash))
    }

    /// Parses a lowercase or uppercase hex digest of `algorithm`.
    pub fn from_hex(algorithm: Algorithm, hex: &str) -> Result<Hash, ParseHashError> {
        let raw = data_encoding::HEXLOWER_PERMISSIVE
            .decode(hex.as_bytes())
            .map_err(|_| ParseHashError::InvalidHex(hex.to_owned()))?;
        Ok(Hash::from_slice(algorithm, &raw)?)
    }

    #[inline]
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    #[inline]
    pub fn digest_bytes(&self) -> &[u8] {
        &self.data[0..(self.algorithm.size())]
    }

    /// Lowercase hexadecimal rendering.
    pub fn to_hex(&self) -> String {
        data_encoding::HEXLOWER.encode(self.digest_bytes())
    }

    /// RFC 4648 base32, lowercase, without padding.
    pub fn to_base32(&self) -> String {
        data_encoding::BASE32_NOPAD
            .encode(self.digest_bytes())
            .to_ascii_lowercase()
    }

    /// Standard padded base64.
    pub fn to_base64(&self) -> String {
        data_encoding::BASE64.encode(self.digest_bytes())
    }
}

impl std::ops::Deref for Hash {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        self.digest_bytes()
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        self.digest_bytes()
    }
}

impl sfmt::Debug for Hash {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl sfmt::Display for Hash {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        write!(f, "{}:{}", self.algorithm, self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}:{}", self.algorithm, self.to_hex()))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de;

        let s = String::deserialize(deserializer)?;
        let (algo, hex) = s
            .split_once(':')
            .ok_or_else(|| de::Error::custom(format!("expected 'algo:hex', got '{s}'")))?;
        let algorithm: Algorithm = algo.parse().map_err(de::Error::custom)?;
        Hash::from_hex(algorithm, hex).map_err(de::Error::custom)
    }
}

enum InnerContext {
    Md5(md5::Context),
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
}

impl Clone for InnerContext {
    fn clone(&self) -> Self {
        match self {
            InnerContext::Md5(ctx) => InnerContext::Md5(ctx.clone()),
            InnerContext::Sha1(ctx) => InnerContext::Sha1(ctx.clone()),
            InnerContext::Sha256(ctx) => InnerContext::Sha256(ctx.clone()),
            InnerContext::Sha512(ctx) => InnerContext::Sha512(ctx.clone()),
        }
    }
}

/// A context for multi-step (Init-Update-Finish) digest calculation.
///
/// ```
/// use strata_hash as hash;
///
/// let one_shot = hash::Algorithm::Sha256.digest("hello, world");
///
/// let mut ctx = hash::Context::new(hash::Algorithm::Sha256);
/// ctx.update("hello");
/// ctx.update(", ");
/// ctx.update("world");
/// let multi_step = ctx.finish();
///
/// assert_eq!(one_shot, multi_step);
/// ```
#[derive(Clone)]
pub struct Context(Algorithm, InnerContext);

impl Context {
    /// Constructs a new context with `algorithm`.
    pub fn new(algorithm: Algorithm) -> Self {
        let inner = match algorithm {
            Algorithm::Md5 => InnerContext::Md5(md5::Context::new()),
            Algorithm::Sha1 => InnerContext::Sha1(sha1::Sha1::new()),
            Algorithm::Sha256 => InnerContext::Sha256(sha2::Sha256::new()),
            Algorithm::Sha512 => InnerContext::Sha512(sha2::Sha512::new()),
        };
        Context(algorithm, inner)
    }

    /// Updates the digest with `data`. May be called zero or more times
    /// before `finish`.
    pub fn update<D: AsRef<[u8]>>(&mut self, data: D) {
        let data = data.as_ref();
        match &mut self.1 {
            InnerContext::Md5(ctx) => ctx.consume(data),
            InnerContext::Sha1(ctx) => ctx.update(data),
            InnerContext::Sha256(ctx) => ctx.update(data),
            InnerContext::Sha512(ctx) => ctx.update(data),
        }
    }

    /// Finalizes the digest calculation and returns the [`Hash`] value.
    /// Consumes the context to prevent misuse.
    pub fn finish(self) -> Hash {
        match self.1 {
            InnerContext::Md5(ctx) => Hash::new(self.0, ctx.finalize().as_ref()),
            InnerContext::Sha1(ctx) => Hash::new(self.0, &ctx.finalize()),
            InnerContext::Sha256(ctx) => Hash::new(self.0, &ctx.finalize()),
            InnerContext::Sha512(ctx) => Hash::new(self.0, &ctx.finalize()),
        }
    }

    /// The algorithm that this context is using.
    pub fn algorithm(&self) -> Algorithm {
        self.0
    }
}

impl sfmt::Debug for Context {
    fn fmt(&self, f: &mut sfmt::Formatter<'_>) -> sfmt::Result {
        f.debug_tuple("Context").field(&self.0).finish()
    }
}

/// Feeds one byte stream to several digest algorithms in a single pass.
///
/// ```
/// use strata_hash as hash;
///
/// let mut multi = hash::MultiContext::new(&[hash::Algorithm::Sha1, hash::Algorithm::Sha256]);
/// multi.update("abc");
/// let digests = multi.finish();
///
/// assert_eq!(digests[&hash::Algorithm::Sha1], hash::Algorithm::Sha1.digest("abc"));
/// assert_eq!(digests[&hash::Algorithm::Sha256], hash::Algorithm::Sha256.digest("abc"));
/// ```
#[derive(Clone, Debug)]
pub struct MultiContext {
    contexts: Vec<Context>,
}

impl MultiContext {
    /// Constructs contexts for each algorithm in `algorithms`, keeping
    /// one context per distinct algorithm.
    pub fn new(algorithms: &[Algorithm]) -> Self {
        let mut contexts: Vec<Context> = Vec::with_capacity(algorithms.len());
        for algorithm in algorithms {
            if !contexts.iter().any(|c| c.algorithm() == *algorithm) {
                contexts.push(Context::new(*algorithm));
            }
        }
        MultiContext { contexts }
    }

    pub fn update<D: AsRef<[u8]>>(&mut self, data: D) {
        let data = data.as_ref();
        for ctx in &mut self.contexts {
            ctx.update(data);
        }
    }

    /// Finalizes all contexts, keyed by algorithm.
    pub fn finish(self) -> BTreeMap<Algorithm, Hash> {
        self.contexts
            .into_iter()
            .map(|ctx| (ctx.algorithm(), ctx.finish()))
            .collect()
    }

    pub fn algorithms(&self) -> impl Iterator<Item = Algorithm> + '_ {
        self.contexts.iter().map(|c| c.algorithm())
    }
}
