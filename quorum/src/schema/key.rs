// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key descriptors as they appear in root metadata and targets delegations.

use crate::schema::decoded::{Decoded, Hex, Pem};
use crate::schema::error::{self, Result};
use aws_lc_rs::digest::{digest, SHA256};
use olpc_cjson::CanonicalFormatter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::ResultExt;
use std::collections::HashMap;

/// Identity string bound to an offline key, e.g. `@alice`. Used to present
/// "who signed" and "who is missing".
pub const KEYOWNER_FIELD: &str = "x-keyowner";

/// Signer URI for an online key, e.g. `gcpkms:<id>` or `envvar:<NAME>`.
pub const ONLINE_URI_FIELD: &str = "x-online-uri";

/// A public key descriptor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "keytype")]
pub enum Key {
    /// An RSA key.
    #[serde(rename = "rsa")]
    Rsa {
        /// The RSA key.
        keyval: RsaKey,
        /// Denotes the key's signature scheme.
        scheme: RsaScheme,
        /// Any additional fields, including `x-keyowner` and `x-online-uri`.
        #[serde(flatten)]
        _extra: HashMap<String, Value>,
    },
    /// An ed25519 key.
    #[serde(rename = "ed25519")]
    Ed25519 {
        /// The ed25519 key.
        keyval: Ed25519Key,
        /// Denotes the key's signature scheme.
        scheme: Ed25519Scheme,
        /// Any additional fields, including `x-keyowner` and `x-online-uri`.
        #[serde(flatten)]
        _extra: HashMap<String, Value>,
    },
    /// An ECDSA key.
    #[serde(rename = "ecdsa-sha2-nistp256", alias = "ecdsa")]
    Ecdsa {
        /// The ECDSA key.
        keyval: EcdsaKey,
        /// Denotes the key's signature scheme.
        scheme: EcdsaScheme,
        /// Any additional fields, including `x-keyowner` and `x-online-uri`.
        #[serde(flatten)]
        _extra: HashMap<String, Value>,
    },
    /// A federated OIDC identity rather than a literal public key. The
    /// identity and issuer gate which ephemeral signing certificates are
    /// acceptable; actual verification happens in the sigstore backend.
    #[serde(rename = "sigstore-oidc")]
    SigstoreOidc {
        /// The identity and issuer.
        keyval: SigstoreKey,
        /// Denotes the key's signature scheme.
        scheme: SigstoreScheme,
        /// Any additional fields, including `x-keyowner` and `x-online-uri`.
        #[serde(flatten)]
        _extra: HashMap<String, Value>,
    },
}

/// Used to identify the RSA signature scheme in use.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum RsaScheme {
    /// `rsassa-pss-sha256`: RSA Probabilistic signature scheme with appendix.
    #[serde(rename = "rsassa-pss-sha256")]
    RsassaPssSha256,
}

/// Represents the public part of an RSA key.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RsaKey {
    /// The public key, PEM `SubjectPublicKeyInfo`.
    pub public: Decoded<Pem>,

    /// Any additional fields found during deserialization; these are
    /// preserved so round-trips stay byte-exact.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

/// Used to identify the ed25519 signature scheme in use.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum Ed25519Scheme {
    /// `ed25519`: Ed25519 signature scheme.
    #[serde(rename = "ed25519")]
    Ed25519,
}

/// Represents the public part of an ed25519 key.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Ed25519Key {
    /// The public key, hex-encoded.
    pub public: Decoded<Hex>,

    /// Any additional fields found during deserialization; these are
    /// preserved so round-trips stay byte-exact.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

/// Used to identify the ECDSA signature scheme in use.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum EcdsaScheme {
    /// `ecdsa-sha2-nistp256`: ECDSA on the NIST P-256 curve with SHA-256.
    #[serde(rename = "ecdsa-sha2-nistp256")]
    EcdsaSha2Nistp256,
}

/// Represents the public part of an ECDSA key.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EcdsaKey {
    /// The public key, PEM `SubjectPublicKeyInfo`.
    pub public: Decoded<Pem>,

    /// Any additional fields found during deserialization; these are
    /// preserved so round-trips stay byte-exact.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

/// The scheme of a sigstore identity key.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub enum SigstoreScheme {
    /// Ephemeral certificates issued by Fulcio.
    Fulcio,
}

/// The "public part" of a sigstore identity key.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SigstoreKey {
    /// The OIDC identity (e.g. an email address).
    pub identity: String,

    /// The OIDC issuer (e.g. `https://accounts.google.com`).
    pub issuer: String,

    /// Any additional fields found during deserialization; these are
    /// preserved so round-trips stay byte-exact.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

/// The `{keytype, scheme, keyval}` triple a key ID is calculated over.
/// Key-level custom fields such as `x-keyowner` are deliberately excluded:
/// they are bound to a key after its ID has been established, and must not
/// change it.
#[derive(Serialize)]
struct Fingerprint<'a> {
    keytype: &'a str,
    scheme: &'a str,
    keyval: Value,
}

impl Key {
    /// Calculate the key ID: the SHA-256 digest of the canonical JSON form of
    /// the key descriptor, key-level custom fields excluded.
    pub fn key_id(&self) -> Result<Decoded<Hex>> {
        let keyval = match self {
            Key::Rsa { keyval, .. } => serde_json::to_value(keyval),
            Key::Ed25519 { keyval, .. } => serde_json::to_value(keyval),
            Key::Ecdsa { keyval, .. } => serde_json::to_value(keyval),
            Key::SigstoreOidc { keyval, .. } => serde_json::to_value(keyval),
        }
        .context(error::JsonSerializationSnafu { what: "key" })?;
        let fingerprint = Fingerprint {
            keytype: self.keytype(),
            scheme: self.scheme(),
            keyval,
        };
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter::new());
        fingerprint
            .serialize(&mut ser)
            .context(error::JsonSerializationSnafu { what: "key" })?;
        Ok(Decoded::from(digest(&SHA256, &buf).as_ref().to_vec()))
    }

    /// The serialized `keytype` field.
    pub fn keytype(&self) -> &'static str {
        match self {
            Key::Rsa { .. } => "rsa",
            Key::Ed25519 { .. } => "ed25519",
            Key::Ecdsa { .. } => "ecdsa-sha2-nistp256",
            Key::SigstoreOidc { .. } => "sigstore-oidc",
        }
    }

    /// The serialized `scheme` field.
    pub fn scheme(&self) -> &'static str {
        match self {
            Key::Rsa { .. } => "rsassa-pss-sha256",
            Key::Ed25519 { .. } => "ed25519",
            Key::Ecdsa { .. } => "ecdsa-sha2-nistp256",
            Key::SigstoreOidc { .. } => "Fulcio",
        }
    }

    /// The raw public key bytes. Sigstore identities carry no key material;
    /// they yield an empty slice and never verify in-process.
    pub fn public_bytes(&self) -> &[u8] {
        match self {
            Key::Rsa { keyval, .. } => &keyval.public,
            Key::Ed25519 { keyval, .. } => &keyval.public,
            Key::Ecdsa { keyval, .. } => &keyval.public,
            Key::SigstoreOidc { .. } => &[],
        }
    }

    fn extra(&self) -> &HashMap<String, Value> {
        match self {
            Key::Rsa { _extra, .. }
            | Key::Ed25519 { _extra, .. }
            | Key::Ecdsa { _extra, .. }
            | Key::SigstoreOidc { _extra, .. } => _extra,
        }
    }

    fn extra_mut(&mut self) -> &mut HashMap<String, Value> {
        match self {
            Key::Rsa { _extra, .. }
            | Key::Ed25519 { _extra, .. }
            | Key::Ecdsa { _extra, .. }
            | Key::SigstoreOidc { _extra, .. } => _extra,
        }
    }

    /// The identity this key belongs to, from the `x-keyowner` field.
    pub fn keyowner(&self) -> Option<&str> {
        self.extra().get(KEYOWNER_FIELD).and_then(Value::as_str)
    }

    /// Bind this key to a signer identity.
    pub fn set_keyowner(&mut self, owner: &str) {
        self.extra_mut()
            .insert(KEYOWNER_FIELD.to_string(), Value::from(owner));
    }

    /// The signer URI for an online key, from the `x-online-uri` field.
    pub fn online_uri(&self) -> Option<&str> {
        self.extra().get(ONLINE_URI_FIELD).and_then(Value::as_str)
    }

    /// Record the signer URI automation should use with this key.
    pub fn set_online_uri(&mut self, uri: &str) {
        self.extra_mut()
            .insert(ONLINE_URI_FIELD.to_string(), Value::from(uri));
    }
}

#[cfg(test)]
mod tests {
    use super::Key;

    const ED25519_KEY: &str = r#"{
        "keytype": "ed25519",
        "scheme": "ed25519",
        "keyval": {
            "public": "edcd0a32a07dce33f7c7873aaffbff36d20ea30787574ead335eefd337e4dacd"
        }
    }"#;

    const SIGSTORE_KEY: &str = r#"{
        "keytype": "sigstore-oidc",
        "scheme": "Fulcio",
        "keyval": {
            "identity": "alice@example.com",
            "issuer": "https://accounts.example.com"
        }
    }"#;

    #[test]
    fn key_id_ignores_custom_fields() {
        let bare: Key = serde_json::from_str(ED25519_KEY).unwrap();
        let mut owned = bare.clone();
        owned.set_keyowner("@alice");
        owned.set_online_uri("envvar:K1");
        assert_ne!(bare, owned);
        assert_eq!(bare.key_id().unwrap(), owned.key_id().unwrap());
    }

    #[test]
    fn custom_fields_round_trip() {
        let mut key: Key = serde_json::from_str(ED25519_KEY).unwrap();
        key.set_keyowner("@alice");
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json["x-keyowner"], "@alice");
        let back: Key = serde_json::from_value(json).unwrap();
        assert_eq!(back.keyowner(), Some("@alice"));
        assert_eq!(back, key);
    }

    #[test]
    fn sigstore_identities_parse_but_never_verify_locally() {
        let key: Key = serde_json::from_str(SIGSTORE_KEY).unwrap();
        assert_eq!(key.keytype(), "sigstore-oidc");
        assert_eq!(key.scheme(), "Fulcio");
        key.key_id().unwrap();
        assert!(!key.verify(b"message", b"signature"));
    }
}
