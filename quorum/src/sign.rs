// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provides the `Sign` trait which abstracts over the method of producing a
//! signature. In-process signing is ed25519 only; RSA and ECDSA keys belong
//! to hardware tokens and cloud KMS services, whose backends implement this
//! trait out of tree.

use crate::error::{self, Result};
use crate::schema::key::Key;
use aws_lc_rs::rand::SecureRandom;
use aws_lc_rs::signature::{Ed25519KeyPair, KeyPair};
use snafu::OptionExt;
use std::collections::HashMap;

/// This trait must be implemented for each type of key with which you will
/// sign things.
pub trait Sign: Send + Sync {
    /// Returns the decoded key along with its scheme and other metadata
    fn tuf_key(&self) -> Key;

    /// Signs the supplied message
    fn sign(
        &self,
        msg: &[u8],
        rng: &dyn SecureRandom,
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync + 'static>>;
}

/// Implements the Sign trait for ED25519
impl Sign for Ed25519KeyPair {
    fn tuf_key(&self) -> Key {
        use crate::schema::key::{Ed25519Key, Ed25519Scheme};

        Key::Ed25519 {
            keyval: Ed25519Key {
                public: self.public_key().as_ref().to_vec().into(),
                _extra: HashMap::new(),
            },
            scheme: Ed25519Scheme::Ed25519,
            _extra: HashMap::new(),
        }
    }

    fn sign(
        &self,
        msg: &[u8],
        _rng: &dyn SecureRandom,
    ) -> std::result::Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync + 'static>> {
        let signature = self.sign(msg);
        Ok(signature.as_ref().to_vec())
    }
}

/// Parses a supplied keypair and if it is recognized, returns an object that
/// implements the Sign trait. Accepted formats: ed25519 pkcs8 DER, and the
/// same wrapped in a `PRIVATE KEY` PEM block.
pub fn parse_keypair(key: &[u8]) -> Result<impl Sign> {
    let der;
    let contents = if key.starts_with(b"-----") {
        let pem = std::str::from_utf8(key)
            .ok()
            .and_then(|text| pem::parse(text).ok())
            .context(error::KeyUnrecognizedSnafu)?;
        der = pem.contents().to_vec();
        &der
    } else {
        key
    };

    Ed25519KeyPair::from_pkcs8(contents)
        .ok()
        .context(error::KeyUnrecognizedSnafu)
}

/// Generate a fresh ed25519 keypair, returning the pkcs8 document bytes.
/// Used by drivers and tests that provision `envvar:` signers.
pub fn generate_ed25519_pkcs8(rng: &dyn SecureRandom) -> Result<Vec<u8>> {
    let document = Ed25519KeyPair::generate_pkcs8(rng)
        .ok()
        .context(error::KeyGenerationSnafu)?;
    Ok(document.as_ref().to_vec())
}

#[cfg(test)]
mod tests {
    use super::{generate_ed25519_pkcs8, parse_keypair, Sign};
    use aws_lc_rs::rand::SystemRandom;

    #[test]
    fn parse_sign_verify() {
        let rng = SystemRandom::new();
        let pkcs8 = generate_ed25519_pkcs8(&rng).unwrap();
        let keypair = parse_keypair(&pkcs8).unwrap();

        let msg = b"the quick brown fox";
        let sig = keypair.sign(msg, &rng).unwrap();
        let key = keypair.tuf_key();
        assert!(key.verify(msg, &sig));
        assert!(!key.verify(b"a different message", &sig));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_keypair(b"not a key").is_err());
    }
}
