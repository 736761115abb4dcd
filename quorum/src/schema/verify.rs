// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signature and threshold verification over canonical payloads.

use crate::schema::error::{self, Result};
use crate::schema::key::Key;
use crate::schema::{Payload, Signed};
use aws_lc_rs::signature::{
    UnparsedPublicKey, ECDSA_P256_SHA256_ASN1, ED25519, RSA_PSS_2048_8192_SHA256,
};
use snafu::ensure;
use std::collections::HashSet;

impl Key {
    /// Verify `sig` over `msg` with this public key. Returns `false` for any
    /// failure, including malformed key material. Sigstore identities carry
    /// no key material; their bundles are verified by the sigstore backend,
    /// never in-process.
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        let alg: &dyn aws_lc_rs::signature::VerificationAlgorithm = match self {
            Key::Ed25519 { .. } => &ED25519,
            Key::Ecdsa { .. } => &ECDSA_P256_SHA256_ASN1,
            Key::Rsa { .. } => &RSA_PSS_2048_8192_SHA256,
            Key::SigstoreOidc { .. } => return false,
        };
        UnparsedPublicKey::new(alg, self.public_bytes())
            .verify(msg, sig)
            .is_ok()
    }
}

/// Verifies that `envelope` carries at least `threshold` valid signatures
/// from distinct keys that `delegator` declares for `role`, over the
/// canonical form of the signed payload.
///
/// Signatures from keys the delegator does not list are ignored, as are
/// empty placeholder signatures. A delegation check is all-or-nothing; for
/// root, callers run this twice, once under the previous root and once under
/// the new root itself.
pub fn verify_role(delegator: &Payload, role: &str, envelope: &Signed<Payload>) -> Result<()> {
    let (keyids, threshold) = delegator.delegation(role)?;
    let canonical = envelope.signed.canonical_form()?;

    let mut valid = HashSet::new();
    for signature in &envelope.signatures {
        if signature.sig.is_empty() || !keyids.contains(&signature.keyid) {
            continue;
        }
        let key = match delegator.get_key(&signature.keyid) {
            Some(key) => key,
            None => continue,
        };
        if key.verify(&canonical, &signature.sig) {
            valid.insert(&signature.keyid);
        }
    }

    ensure!(
        valid.len() as u64 >= threshold,
        error::ThresholdNotMetSnafu {
            role,
            valid: valid.len() as u64,
            threshold,
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::verify_role;
    use crate::schema::decoded::Decoded;
    use crate::schema::key::Key;
    use crate::schema::{Payload, Root, Signature, Signed, SPEC_VERSION};
    use aws_lc_rs::rand::SystemRandom;
    use aws_lc_rs::signature::{Ed25519KeyPair, KeyPair};
    use chrono::{TimeZone, Utc};

    fn test_key() -> (Ed25519KeyPair, Key) {
        let rng = SystemRandom::new();
        let document = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let pair = Ed25519KeyPair::from_pkcs8(document.as_ref()).unwrap();
        let public = hex::encode(pair.public_key().as_ref());
        let key = serde_json::from_value(serde_json::json!({
            "keytype": "ed25519",
            "scheme": "ed25519",
            "keyval": { "public": public },
        }))
        .unwrap();
        (pair, key)
    }

    fn signed_root(threshold: u64, signers: &[(&Ed25519KeyPair, &Key)]) -> Signed<Payload> {
        let mut root = Root::new(
            SPEC_VERSION.to_string(),
            1,
            Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
        );
        for (_, key) in signers {
            root.add_key((*key).clone(), crate::schema::RoleType::Root)
                .unwrap();
        }
        root.roles
            .get_mut(&crate::schema::RoleType::Root)
            .unwrap()
            .threshold = threshold;

        let payload = Payload::Root(root);
        let canonical = payload.canonical_form().unwrap();
        let signatures = signers
            .iter()
            .map(|(pair, key)| Signature {
                keyid: key.key_id().unwrap(),
                sig: Decoded::from(pair.sign(&canonical).as_ref().to_vec()),
            })
            .collect();
        Signed {
            signed: payload,
            signatures,
        }
    }

    #[test]
    fn threshold_of_one_verifies() {
        let (pair, key) = test_key();
        let envelope = signed_root(1, &[(&pair, &key)]);
        verify_role(&envelope.signed, "root", &envelope).unwrap();
    }

    #[test]
    fn tampered_payload_fails() {
        let (pair, key) = test_key();
        let mut envelope = signed_root(1, &[(&pair, &key)]);
        envelope.signed.set_version(2);
        assert!(verify_role(&envelope.signed.clone(), "root", &envelope).is_err());
    }

    #[test]
    fn threshold_counts_distinct_keys() {
        let (pair_a, key_a) = test_key();
        let (pair_b, key_b) = test_key();
        let envelope = signed_root(2, &[(&pair_a, &key_a), (&pair_b, &key_b)]);
        verify_role(&envelope.signed, "root", &envelope).unwrap();

        // removing either signature drops below threshold
        for keep in 0..2 {
            let mut partial = envelope.clone();
            partial.signatures = vec![envelope.signatures[keep].clone()];
            assert!(verify_role(&partial.signed.clone(), "root", &partial).is_err());
        }
    }

    #[test]
    fn placeholder_signatures_do_not_count() {
        let (pair, key) = test_key();
        let mut envelope = signed_root(1, &[(&pair, &key)]);
        let keyid = key.key_id().unwrap();
        envelope.signatures = vec![Signature {
            keyid,
            sig: Decoded::from(Vec::new()),
        }];
        assert!(verify_role(&envelope.signed.clone(), "root", &envelope).is_err());
    }
}
