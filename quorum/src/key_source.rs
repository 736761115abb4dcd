// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provides an abstraction over the source of a signing key, and the URI
//! grammar by which keys name their signer. Online keys carry an
//! `x-online-uri` field such as `gcpkms:<id>` or `envvar:<NAME>`; offline
//! hardware keys use `hsm:`; federated identities use `sigstore:`.
//!
//! The crate ships the `envvar:` source (and a plain file source for signer
//! tooling). Hardware-token, cloud-KMS and OIDC backends live out of tree
//! and register constructors for their schemes on a [`SignerRegistry`].

use crate::error::{self, Result};
use crate::sign::{parse_keypair, Sign};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use snafu::ResultExt;
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;

/// This trait should be implemented for each source of signing keys. Examples
/// of sources include: files, environment variables, hardware tokens, cloud
/// key services.
pub trait KeySource: Debug + Send + Sync {
    /// Returns an object that implements the `Sign` trait
    fn as_sign(
        &self,
    ) -> std::result::Result<Box<dyn Sign>, Box<dyn std::error::Error + Send + Sync + 'static>>;
}

/// Provides secrets (HSM PINs, passphrases) to signer backends that need
/// them. The engine itself never prompts; drivers inject an implementation.
pub trait SecretProvider {
    /// Produce the named secret for signing `role`.
    fn secret(
        &self,
        name: &str,
        role: &str,
    ) -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync + 'static>>;
}

/// A `SecretProvider` that always returns the same string. Intended for
/// tests and non-interactive automation.
#[derive(Debug, Clone)]
pub struct StaticSecret(pub String);

impl SecretProvider for StaticSecret {
    fn secret(
        &self,
        _name: &str,
        _role: &str,
    ) -> std::result::Result<String, Box<dyn std::error::Error + Send + Sync + 'static>> {
        Ok(self.0.clone())
    }
}

/// Points to a local key using a filesystem path.
#[derive(Debug)]
pub struct LocalKeySource {
    /// The path to a local ed25519 key file in pkcs8 DER or PEM format.
    pub path: PathBuf,
}

/// Implements the `KeySource` trait for a `LocalKeySource` (file)
impl KeySource for LocalKeySource {
    fn as_sign(
        &self,
    ) -> std::result::Result<Box<dyn Sign>, Box<dyn std::error::Error + Send + Sync + 'static>>
    {
        let data = std::fs::read(&self.path).context(error::FileReadSnafu { path: &self.path })?;
        Ok(Box::new(parse_keypair(&data)?))
    }
}

/// Reads a base64-encoded pkcs8 ed25519 key from an environment variable.
/// This is the signer automation and tests use (`envvar:<NAME>`).
#[derive(Debug)]
pub struct EnvVarKeySource {
    /// The name of the environment variable holding the key.
    pub name: String,
}

impl KeySource for EnvVarKeySource {
    fn as_sign(
        &self,
    ) -> std::result::Result<Box<dyn Sign>, Box<dyn std::error::Error + Send + Sync + 'static>>
    {
        let value = std::env::var(&self.name).context(error::EnvVarSnafu { name: &self.name })?;
        let der = STANDARD
            .decode(value.trim())
            .context(error::KeyBase64Snafu { name: &self.name })?;
        Ok(Box::new(parse_keypair(&der)?))
    }
}

/// A parsed signer URI. The scheme decides which backend produces the
/// signer; everything after the scheme is backend-specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerUri {
    /// `hsm:` — a PKCS#11 hardware token. The PIN comes from the injected
    /// [`SecretProvider`].
    Hsm,
    /// `gcpkms:<resource>` — a Google Cloud KMS asymmetric key.
    GcpKms {
        /// The full KMS resource name.
        resource: String,
    },
    /// `azurekv:<vault>/<key>` — an Azure Key Vault key.
    AzureKeyVault {
        /// The vault name.
        vault: String,
        /// The key name within the vault.
        key: String,
    },
    /// `sigstore:` with optional `?ambient=<bool>` — OIDC-backed ephemeral
    /// certificate signing.
    Sigstore {
        /// Whether ambient credentials may be used instead of an
        /// interactive flow.
        ambient: bool,
    },
    /// `envvar:<NAME>` — an ed25519 key in an environment variable.
    EnvVar {
        /// The environment variable name.
        name: String,
    },
}

impl SignerUri {
    /// Parse a signer URI. Unknown schemes are rejected with
    /// `UnknownKeyScheme`.
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once(':')
            .ok_or_else(|| error::UnknownKeySchemeSnafu { uri }.build())?;
        match scheme {
            "hsm" => Ok(SignerUri::Hsm),
            "gcpkms" => Ok(SignerUri::GcpKms {
                resource: rest.to_string(),
            }),
            "azurekv" => match rest.split_once('/') {
                Some((vault, key)) if !vault.is_empty() && !key.is_empty() => {
                    Ok(SignerUri::AzureKeyVault {
                        vault: vault.to_string(),
                        key: key.to_string(),
                    })
                }
                _ => error::UnknownKeySchemeSnafu { uri }.fail(),
            },
            "sigstore" => {
                let ambient = match rest.strip_prefix("?ambient=") {
                    Some(value) => value == "true",
                    None => true,
                };
                Ok(SignerUri::Sigstore { ambient })
            }
            "envvar" => Ok(SignerUri::EnvVar {
                name: rest.to_string(),
            }),
            _ => error::UnknownKeySchemeSnafu { uri }.fail(),
        }
    }

    /// The URI scheme, the key into the [`SignerRegistry`].
    pub fn scheme(&self) -> &'static str {
        match self {
            SignerUri::Hsm => "hsm",
            SignerUri::GcpKms { .. } => "gcpkms",
            SignerUri::AzureKeyVault { .. } => "azurekv",
            SignerUri::Sigstore { .. } => "sigstore",
            SignerUri::EnvVar { .. } => "envvar",
        }
    }
}

/// A constructor that turns a parsed signer URI into a key source.
pub type SourceConstructor =
    Box<dyn Fn(&SignerUri) -> std::result::Result<Box<dyn KeySource>, Box<dyn std::error::Error + Send + Sync + 'static>> + Send + Sync>;

/// The capability table from signer-URI scheme to key-source constructor.
///
/// `envvar` is always registered. External backends (PKCS#11, GCP KMS,
/// Azure Key Vault, sigstore) register their constructors here; asking for
/// a scheme with no registered constructor is `UnknownKeyScheme`.
pub struct SignerRegistry {
    constructors: HashMap<&'static str, SourceConstructor>,
}

impl Debug for SignerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerRegistry")
            .field("schemes", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for SignerRegistry {
    fn default() -> Self {
        let mut registry = SignerRegistry {
            constructors: HashMap::new(),
        };
        registry.register("envvar", |uri| match uri {
            SignerUri::EnvVar { name } => Ok(Box::new(EnvVarKeySource { name: name.clone() })),
            _ => Err("not an envvar: uri".into()),
        });
        registry
    }
}

impl SignerRegistry {
    /// Register a constructor for `scheme`, replacing any existing one.
    pub fn register<F>(&mut self, scheme: &'static str, constructor: F)
    where
        F: Fn(
                &SignerUri,
            ) -> std::result::Result<
                Box<dyn KeySource>,
                Box<dyn std::error::Error + Send + Sync + 'static>,
            > + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(scheme, Box::new(constructor));
    }

    /// Produce the key source for a signer URI.
    pub fn source_for(&self, uri: &str) -> Result<Box<dyn KeySource>> {
        let parsed = SignerUri::parse(uri)?;
        let constructor = self
            .constructors
            .get(parsed.scheme())
            .ok_or_else(|| error::UnknownKeySchemeSnafu { uri }.build())?;
        constructor(&parsed).context(error::SignerBackendSnafu { uri })
    }
}

#[cfg(test)]
mod tests {
    use super::{SignerRegistry, SignerUri};
    use crate::error::Error;

    #[test]
    fn uri_grammar() {
        assert_eq!(SignerUri::parse("hsm:").unwrap(), SignerUri::Hsm);
        assert_eq!(
            SignerUri::parse("gcpkms:projects/p/locations/l/keyRings/r/cryptoKeys/k/cryptoKeyVersions/1")
                .unwrap()
                .scheme(),
            "gcpkms"
        );
        assert_eq!(
            SignerUri::parse("azurekv:myvault/mykey").unwrap(),
            SignerUri::AzureKeyVault {
                vault: "myvault".to_string(),
                key: "mykey".to_string(),
            }
        );
        assert_eq!(
            SignerUri::parse("sigstore:?ambient=false").unwrap(),
            SignerUri::Sigstore { ambient: false }
        );
        assert_eq!(
            SignerUri::parse("sigstore:").unwrap(),
            SignerUri::Sigstore { ambient: true }
        );
        assert_eq!(
            SignerUri::parse("envvar:QUORUM_KEY").unwrap(),
            SignerUri::EnvVar {
                name: "QUORUM_KEY".to_string(),
            }
        );
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        for uri in &["pgp:deadbeef", "no-colon-here", "azurekv:missing-key"] {
            match SignerUri::parse(uri) {
                Err(Error::UnknownKeyScheme { .. }) => {}
                other => panic!("expected UnknownKeyScheme for {}, got {:?}", uri, other.map(|_| ())),
            }
        }
    }

    #[test]
    fn registry_rejects_unregistered_scheme() {
        let registry = SignerRegistry::default();
        // hsm: parses, but no backend is linked in
        match registry.source_for("hsm:") {
            Err(Error::UnknownKeyScheme { .. }) => {}
            other => panic!("expected UnknownKeyScheme, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn registry_dispatches_to_registered_backend() {
        let registry = SignerRegistry::default();
        assert!(registry.source_for("envvar:SOME_KEY").is_ok());
    }

    #[test]
    fn backend_failures_surface_as_signer_backend_errors() {
        use super::{SecretProvider, StaticSecret};
        use std::sync::Arc;

        // The shape an external PKCS#11 backend takes: its constructor
        // captures the injected secret provider for PIN prompting.
        let secrets = Arc::new(StaticSecret("123456".to_string()));
        let provider = Arc::clone(&secrets);
        let mut registry = SignerRegistry::default();
        registry.register("hsm", move |_uri| {
            let pin = provider.secret("PIN", "root")?;
            assert_eq!(pin, "123456");
            Err("no hardware token present".into())
        });

        match registry.source_for("hsm:") {
            Err(Error::SignerBackend { uri, .. }) => assert_eq!(uri, "hsm:"),
            other => panic!("expected SignerBackend, got {:?}", other.map(|_| ())),
        }
    }
}
