// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contains the error type for this library.

#![allow(clippy::default_trait_access)]

use chrono::{DateTime, Utc};
use snafu::{Backtrace, Snafu};
use std::path::PathBuf;

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for this library.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum Error {
    /// A metadata file could not be parsed, or could not be brought to
    /// canonical form.
    #[snafu(display("Metadata in '{}' is not valid: {}", path.display(), source))]
    BadCanonicalForm {
        path: PathBuf,
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to run {}: {}", command_str, source))]
    CommandExec {
        command_str: String,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Command {} failed with {}", command_str, status))]
    CommandStatus {
        command_str: String,
        status: std::process::ExitStatus,
        backtrace: Backtrace,
    },

    #[snafu(display("Command {} output is not valid UTF-8: {}", command_str, source))]
    CommandUtf8 {
        command_str: String,
        source: std::string::FromUtf8Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to create directory '{}': {}", path.display(), source))]
    DirCreate {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Environment variable '{}' is not usable: {}", name, source))]
    EnvVar {
        name: String,
        source: std::env::VarError,
        backtrace: Backtrace,
    },

    /// A role's expiry is beyond what its `x-expiry-period` allows.
    #[snafu(display(
        "Role '{}' expires {} but its expiry period only allows {}",
        role,
        expires,
        limit
    ))]
    ExpiryTooFar {
        role: String,
        expires: DateTime<Utc>,
        limit: DateTime<Utc>,
    },

    #[snafu(display("Failed to copy {} to {}: {}", src.display(), dst.display(), source))]
    FileCopy {
        src: PathBuf,
        dst: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to parse {}: {}", path.display(), source))]
    FileParseJson {
        path: PathBuf,
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to serialize JSON for {}: {}", path.display(), source))]
    FileWriteJson {
        path: PathBuf,
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to move {} into place: {}", path.display(), source))]
    FilePersist {
        path: PathBuf,
        source: tempfile::PersistError,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to read {}: {}", path.display(), source))]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to create temporary file in {}: {}", path.display(), source))]
    FileTempCreate {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to write to {}: {}", path.display(), source))]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// A delegated role's metadata is inconsistent with its delegator's
    /// declaration.
    #[snafu(display("Invalid delegation for role '{}': {}", role, reason))]
    InvalidDelegation { role: String, reason: String },

    #[snafu(display("Key in environment variable '{}' is not valid base64: {}", name, source))]
    KeyBase64 {
        name: String,
        source: base64::DecodeError,
        backtrace: Backtrace,
    },

    #[snafu(display("Failed to generate a signing key"))]
    KeyGeneration { backtrace: Backtrace },

    #[snafu(display("Unrecognized or unsupported private key format"))]
    KeyUnrecognized { backtrace: Backtrace },

    /// An online key has no `x-online-uri`, so automation cannot sign with
    /// it.
    #[snafu(display("Online key {} has no x-online-uri", keyid))]
    MissingOnlineUri { keyid: String },

    /// `sign` was called by a user who holds no key for the role.
    #[snafu(display("User '{}' holds no signing key for role '{}'", user, role))]
    NotASigner { user: String, role: String },

    /// Online metadata may only be changed by automation, never inside a
    /// signing event.
    #[snafu(display("Unexpected change to online role '{}' in signing event", role))]
    OnlineRoleChanged { role: String },

    /// Expired metadata reached a publish attempt.
    #[snafu(display("Role '{}' expired at {}", role, expires))]
    RoleExpired {
        role: String,
        expires: DateTime<Utc>,
    },

    /// A role file that is required does not exist and cannot be created.
    #[snafu(display("Role '{}' does not exist in the repository", role))]
    RoleMissing { role: String },

    #[snafu(display("Unexpected file '{}' in root history", path.display()))]
    RootHistoryName { path: PathBuf },

    /// A schema-level failure: serialization, key validation, signature or
    /// threshold verification.
    #[snafu(display("{}", source))]
    Schema {
        #[snafu(backtrace)]
        source: crate::schema::Error,
    },

    /// A signer backend reported a failure (HSM unplugged, OIDC denied, KMS
    /// unauthenticated, missing environment variable).
    #[snafu(display("Signer backend for '{}' failed: {}", uri, source))]
    SignerBackend {
        uri: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// No signer is registered for a key's URI scheme.
    #[snafu(display("No signer registered for URI '{}'", uri))]
    UnknownKeyScheme { uri: String, backtrace: Backtrace },

    /// A freshly produced signature failed verification against its own
    /// public key.
    #[snafu(display("Signature by key {} on role '{}' does not verify", keyid, role))]
    UnverifiedSignature { role: String, keyid: String },

    /// A proposed role version does not advance the baseline version.
    #[snafu(display(
        "Role '{}' version {} does not advance baseline version {}",
        role,
        version,
        baseline
    ))]
    VersionRegressed {
        role: String,
        version: u64,
        baseline: u64,
    },

    #[snafu(display("Failed walking directory '{}': {}", directory.display(), source))]
    WalkDir {
        directory: PathBuf,
        source: walkdir::Error,
        backtrace: Backtrace,
    },
}

impl From<crate::schema::Error> for Error {
    fn from(source: crate::schema::Error) -> Self {
        Error::Schema { source }
    }
}
