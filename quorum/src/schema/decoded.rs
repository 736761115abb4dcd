// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provides [`Decoded`], a wrapper that holds both the serialized form of a
//! field and its decoded bytes. Keeping the original string around makes
//! round-trips lossless, which matters because signatures are calculated over
//! the serialized form.

use crate::schema::error::{self, Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use snafu::ResultExt;
use std::cmp::Ordering;
use std::convert::TryFrom;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;

/// A scheme that can decode a string field into bytes.
pub trait Decode {
    /// Decode a string into bytes.
    fn decode(s: &str) -> Result<Vec<u8>>;
}

/// A scheme that can produce the canonical string form for raw bytes.
pub trait Encode {
    /// Encode bytes into a string.
    fn encode(b: &[u8]) -> String;
}

/// Lower-case hexadecimal encoding, used for key IDs, signatures, digests,
/// and ed25519 public keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hex;

impl Decode for Hex {
    fn decode(s: &str) -> Result<Vec<u8>> {
        hex::decode(s).context(error::HexDecodeSnafu)
    }
}

impl Encode for Hex {
    fn encode(b: &[u8]) -> String {
        hex::encode(b)
    }
}

/// PEM-encoded `SubjectPublicKeyInfo`, used for RSA and ECDSA public keys.
/// The decoded bytes are the contents of the inner `subjectPublicKey` bit
/// string: PKCS#1 for RSA, the SEC1 point for ECDSA. Values of this encoding
/// are only ever created by parsing, so there is no `Encode` implementation;
/// serialization always replays the original PEM text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pem;

impl Decode for Pem {
    fn decode(s: &str) -> Result<Vec<u8>> {
        let pem = pem::parse(s).map_err(|e| Error::PemDecode {
            reason: e.to_string(),
        })?;
        let spki = pkcs8::spki::SubjectPublicKeyInfoRef::try_from(pem.contents()).map_err(|e| {
            Error::PemDecode {
                reason: e.to_string(),
            }
        })?;
        Ok(spki.subject_public_key.raw_bytes().to_vec())
    }
}

/// A field that was decoded from a string during deserialization. `Deref`s to
/// the decoded bytes; serializes back to the exact original string.
#[derive(Clone)]
pub struct Decoded<T> {
    bytes: Vec<u8>,
    original: String,
    spooky: PhantomData<T>,
}

impl<T> Decoded<T> {
    /// The original string this value was deserialized from.
    pub fn original(&self) -> &str {
        &self.original
    }
}

impl<T: Decode> Decoded<T> {
    /// Parse a string in this value's encoding.
    pub fn from_str(s: &str) -> Result<Self> {
        Ok(Self {
            bytes: T::decode(s)?,
            original: s.to_owned(),
            spooky: PhantomData,
        })
    }
}

impl<T: Encode> Decoded<T> {
    /// Wrap already-decoded bytes, producing the canonical string form.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let original = T::encode(&bytes);
        Self {
            bytes,
            original,
            spooky: PhantomData,
        }
    }
}

impl From<Vec<u8>> for Decoded<Hex> {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl<T> AsRef<[u8]> for Decoded<T> {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<T> Deref for Decoded<T> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl<T> fmt::Debug for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.original.fmt(f)
    }
}

impl<T> fmt::Display for Decoded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.original.fmt(f)
    }
}

// Equality and hashing are over the decoded bytes, so that differences in
// string representation (e.g. upper/lower case hex) do not matter.
impl<T> PartialEq for Decoded<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<T> Eq for Decoded<T> {}

impl<T> PartialOrd for Decoded<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Decoded<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

impl<T> Hash for Decoded<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl<'de, T: Decode> Deserialize<'de> for Decoded<T> {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let original = String::deserialize(deserializer)?;
        Ok(Self {
            bytes: T::decode(&original).map_err(serde::de::Error::custom)?,
            original,
            spooky: PhantomData,
        })
    }
}

impl<T> Serialize for Decoded<T> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::{Decoded, Hex};

    #[test]
    fn hex_round_trip() {
        let d: Decoded<Hex> = serde_json::from_str("\"8f153b00\"").unwrap();
        assert_eq!(d.as_ref(), &[0x8f, 0x15, 0x3b, 0x00]);
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"8f153b00\"");
    }

    #[test]
    fn case_insensitive_equality() {
        let a: Decoded<Hex> = serde_json::from_str("\"ABCD\"").unwrap();
        let b: Decoded<Hex> = serde_json::from_str("\"abcd\"").unwrap();
        assert_eq!(a, b);
        // but each keeps its own original form
        assert_eq!(a.original(), "ABCD");
        assert_eq!(b.original(), "abcd");
    }

    #[test]
    fn invalid_hex_is_rejected() {
        assert!(serde_json::from_str::<Decoded<Hex>>("\"zz\"").is_err());
    }
}
