//! NAR (Nix ARchive) serialization for Strata.
//!
//! Produces the byte-for-byte deterministic encoding of a filesystem
//! entity (regular file, symlink or directory tree) defined by the NAR
//! format, and computes one or more cryptographic digests over that
//! encoding without ever materializing it: every token is fed straight
//! into the digest contexts.
//!
//! The encoding is order-independent with respect to on-disk layout
//! (directory entries are visited in ascending byte order of name) and
//! independent of any archive/compression format the tree travelled
//! in, which is what makes it usable for structural checksum
//! verification.
//!
//! ```no_run
//! use strata_hash::Algorithm;
//! use strata_nar::NarSerializer;
//!
//! let digests = NarSerializer::new(&[Algorithm::Sha256])
//!     .serialize("some/unpacked/tree".as_ref())?;
//! println!("{}", digests.hex(Algorithm::Sha256).unwrap());
//! # Ok::<(), strata_nar::NarError>(())
//! ```

mod serializer;

pub use serializer::{NarDigests, NarError, NarSerializer, VcsExclusion, VcsKind};
