// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the schema module.

use snafu::{Backtrace, Snafu};
use std::path::PathBuf;

/// Alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for metadata schema operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// A duplicate key ID was present in a key map.
    #[snafu(display("Duplicate key ID: {}", keyid))]
    DuplicateKeyId {
        /// The duplicate key ID, hex-encoded.
        keyid: String,
    },

    /// Unable to open a file.
    #[snafu(display("Failed to open '{}': {}", path.display(), source))]
    FileOpen {
        /// The file that could not be opened.
        path: PathBuf,
        /// The source error.
        source: std::io::Error,
        /// The backtrace.
        backtrace: Backtrace,
    },

    /// Unable to read a file.
    #[snafu(display("Failed to read '{}': {}", path.display(), source))]
    FileRead {
        /// The file that could not be read.
        path: PathBuf,
        /// The source error.
        source: std::io::Error,
        /// The backtrace.
        backtrace: Backtrace,
    },

    /// A hex string could not be decoded.
    #[snafu(display("Invalid hex string: {}", source))]
    HexDecode {
        /// The source error.
        source: hex::FromHexError,
        /// The backtrace.
        backtrace: Backtrace,
    },

    /// A key ID in a key map did not match the key contents.
    #[snafu(display("Invalid key ID {}: calculated {}", keyid, calculated))]
    InvalidKeyId {
        /// The key ID as stated in the metadata.
        keyid: String,
        /// The key ID calculated from the key contents.
        calculated: String,
    },

    /// Failed to serialize a value to JSON.
    #[snafu(display("Failed to serialize {} to JSON: {}", what, source))]
    JsonSerialization {
        /// What was being serialized.
        what: String,
        /// The source error.
        source: serde_json::Error,
        /// The backtrace.
        backtrace: Backtrace,
    },

    /// A role name was not found among a delegator's delegations.
    #[snafu(display("Role '{}' is not delegated here", name))]
    RoleNotFound {
        /// The role that was looked up.
        name: String,
    },

    /// A payload was not the expected variant.
    #[snafu(display("Expected {} metadata, found {}", expected, found))]
    RoleTypeMismatch {
        /// The variant the caller asked for.
        expected: String,
        /// The variant actually present.
        found: String,
    },

    /// A targets payload has no delegations block.
    #[snafu(display("Targets metadata has no delegations"))]
    NoDelegations {
        /// The backtrace.
        backtrace: Backtrace,
    },

    /// A path given as a target was not a regular file.
    #[snafu(display("Target path '{}' is not a file", path.display()))]
    TargetNotAFile {
        /// The path that was not a file.
        path: PathBuf,
        /// The backtrace.
        backtrace: Backtrace,
    },

    /// A PEM-encoded public key could not be parsed.
    #[snafu(display("Invalid PEM public key: {}", reason))]
    PemDecode {
        /// Why the key was rejected.
        reason: String,
    },

    /// Fewer valid signatures than the delegator's threshold.
    #[snafu(display(
        "Role '{}' has {} valid signature(s), threshold is {}",
        role,
        valid,
        threshold
    ))]
    ThresholdNotMet {
        /// The role being verified.
        role: String,
        /// How many signatures verified.
        valid: u64,
        /// The required signature count.
        threshold: u64,
    },

    /// A target path falls outside every path pattern of its role.
    #[snafu(display("Target path '{}' does not match the delegation patterns of '{}'", child, role))]
    UnmatchedPath {
        /// The offending target path.
        child: String,
        /// The delegated role claiming the path.
        role: String,
    },
}
