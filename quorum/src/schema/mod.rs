// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(clippy::used_underscore_binding)]

//! Provides the schema objects for TUF repository metadata, extended with the
//! custom fields this system layers on top: signer identities
//! (`x-keyowner`), online signer URIs (`x-online-uri`), and per-role expiry
//! and signing periods (`x-expiry-period`, `x-signing-period`).

mod de;
pub mod decoded;
mod error;
mod iter;
pub mod key;
mod verify;

pub use crate::schema::error::{Error, Result};
pub use crate::schema::verify::verify_role;

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::error::RoleTypeMismatchSnafu;
use crate::schema::iter::KeysIter;
use crate::schema::key::Key;
use aws_lc_rs::digest::{digest, Context, SHA256};
use chrono::{DateTime, Utc};
use globset::Glob;
use olpc_cjson::CanonicalFormatter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_plain::{forward_display_to_serde, forward_from_str_to_serde};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// The version of the TUF specification the metadata follows.
pub const SPEC_VERSION: &str = "1.0.0";

/// The type of metadata role.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum RoleType {
    /// The root role delegates trust to specific keys trusted for all other top-level roles used in
    /// the system.
    Root,
    /// The snapshot role signs a metadata file that provides information about the latest version
    /// of all targets metadata on the repository (the top-level targets role and all delegated
    /// roles).
    Snapshot,
    /// The targets role's signature indicates which target files are trusted by clients.
    Targets,
    /// The timestamp role is used to prevent an adversary from replaying an out-of-date signed
    /// metadata file whose signature has not yet expired.
    Timestamp,
}

forward_display_to_serde!(RoleType);
forward_from_str_to_serde!(RoleType);

/// The four top-level role names, in the order they are delegated by root.
pub const TOP_LEVEL_ROLES: [&str; 4] = ["root", "targets", "snapshot", "timestamp"];

/// The names of the two online roles, written unattended by automation.
pub const ONLINE_ROLES: [&str; 2] = ["snapshot", "timestamp"];

/// Returns true for `snapshot` and `timestamp`.
pub fn is_online_role(role: &str) -> bool {
    ONLINE_ROLES.contains(&role)
}

/// The name of the role whose keys and threshold authorize `role`. The
/// delegation graph is fixed and two levels deep: root delegates the
/// top-level roles, targets delegates everything else.
pub fn delegator_of(role: &str) -> &'static str {
    if TOP_LEVEL_ROLES.contains(&role) {
        "root"
    } else {
        "targets"
    }
}

/// Common trait implemented by all roles.
pub trait Role: Serialize {
    /// The type of role this object represents.
    const TYPE: RoleType;

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    fn expires(&self) -> DateTime<Utc>;

    /// The metadata version. Versions are strictly increasing across signing
    /// events; `0` is an internal sentinel for a role that has never been
    /// closed.
    fn version(&self) -> u64;

    /// A deterministic JSON serialization used when calculating the digest of a metadata object.
    /// [More info on canonical JSON](http://wiki.laptop.org/go/Canonical_JSON)
    fn canonical_form(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
        self.serialize(&mut ser)
            .context(error::JsonSerializationSnafu { what: "role" })?;
        Ok(data)
    }
}

/// A signed metadata object.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Signed<T> {
    /// A list of signatures and their key IDs.
    pub signatures: Vec<Signature>,
    /// The role that is signed.
    pub signed: T,
}

/// A signature and the key ID that made it. An empty `sig` is a placeholder:
/// a signature from that key is expected but has not been produced yet.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Signature {
    /// The key ID (listed in the delegating metadata) that made this signature.
    pub keyid: Decoded<Hex>,
    /// A hex-encoded signature of the canonical JSON form of a role.
    pub sig: Decoded<Hex>,
}

impl<T> Signed<T> {
    /// The signature made by `keyid`, if one is present and non-empty.
    pub fn signature(&self, keyid: &Decoded<Hex>) -> Option<&Signature> {
        self.signatures
            .iter()
            .find(|sig| &sig.keyid == keyid && !sig.sig.is_empty())
    }

    /// Replace any signature (or placeholder) from `keyid` with `sig`.
    pub fn replace_signature(&mut self, sig: Signature) {
        self.signatures.retain(|s| s.keyid != sig.keyid);
        self.signatures.push(sig);
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The root.json file is signed by the root role's keys. It indicates which keys are authorized
/// for all top-level roles, including the root role itself. A new root is valid only if it is
/// signed to the threshold of both the previous root and itself.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "root")]
pub struct Root {
    /// A string that contains the version number of the TUF specification. Its format follows the
    /// Semantic Versioning 2.0.0 (semver) specification.
    pub spec_version: String,

    /// A boolean indicating whether the repository supports consistent snapshots. This repository
    /// publishes consistent snapshots, so this is always `true` in practice.
    pub consistent_snapshot: bool,

    /// The metadata version.
    pub version: u64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// The maximum expiry horizon for this role, in days.
    #[serde(rename = "x-expiry-period", skip_serializing_if = "Option::is_none", default)]
    pub expiry_period: Option<u32>,

    /// How many days before expiry a resign is required.
    #[serde(rename = "x-signing-period", skip_serializing_if = "Option::is_none", default)]
    pub signing_period: Option<u32>,

    /// The KEYID must be correct for the specified KEY. Clients MUST calculate each KEYID to verify
    /// this is correct for the associated key.
    #[serde(deserialize_with = "de::deserialize_keys")]
    pub keys: HashMap<Decoded<Hex>, Key>,

    /// A list of roles, the keys associated with each role, and the threshold of signatures used
    /// for each role.
    pub roles: HashMap<RoleType, RoleKeys>,

    /// Extra arguments found during deserialization.
    ///
    /// We must store these to correctly verify signatures for this object.
    ///
    /// If you're instantiating this struct, you should make this `HashMap::empty()`.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

/// Represents the key IDs used for a role and the threshold of signatures required to validate
/// it. For the online roles, the expiry and signing periods also live here, because `snapshot`
/// and `timestamp` metadata is regenerated from scratch by automation and root is the only
/// offline-controlled place to configure them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoleKeys {
    /// The key IDs used for the role.
    pub keyids: Vec<Decoded<Hex>>,

    /// The threshold of signatures required to validate the role.
    pub threshold: u64,

    /// The maximum expiry horizon for the role, in days.
    #[serde(rename = "x-expiry-period", skip_serializing_if = "Option::is_none", default)]
    pub expiry_period: Option<u32>,

    /// How far before expiry a resign is required, in days.
    #[serde(rename = "x-signing-period", skip_serializing_if = "Option::is_none", default)]
    pub signing_period: Option<u32>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl RoleKeys {
    /// A bare entry with no keys and a threshold of one.
    pub fn empty() -> Self {
        RoleKeys {
            keyids: Vec::new(),
            threshold: 1,
            expiry_period: None,
            signing_period: None,
            _extra: HashMap::new(),
        }
    }
}

impl Root {
    /// Create an empty `Root` with all four top-level roles initialized.
    pub fn new(spec_version: String, version: u64, expires: DateTime<Utc>) -> Self {
        let mut roles = HashMap::new();
        for role in &[
            RoleType::Root,
            RoleType::Targets,
            RoleType::Snapshot,
            RoleType::Timestamp,
        ] {
            roles.insert(*role, RoleKeys::empty());
        }
        Root {
            spec_version,
            consistent_snapshot: true,
            version,
            expires,
            expiry_period: None,
            signing_period: None,
            keys: HashMap::new(),
            roles,
            _extra: HashMap::new(),
        }
    }

    /// An iterator over the keys for a given role.
    pub fn keys(&self, role: RoleType) -> impl Iterator<Item = (&Decoded<Hex>, &Key)> {
        KeysIter {
            keyids_iter: match self.roles.get(&role) {
                Some(role_keys) => role_keys.keyids.iter(),
                None => [].iter(),
            },
            keys: &self.keys,
        }
    }

    /// Add `key` as an authorized key of `role`, returning its key ID. The
    /// key map entry is shared if the key already exists.
    pub fn add_key(&mut self, key: Key, role: RoleType) -> Result<Decoded<Hex>> {
        let keyid = key.key_id()?;
        self.keys.entry(keyid.clone()).or_insert(key);
        let role_keys = self.roles.entry(role).or_insert_with(RoleKeys::empty);
        if !role_keys.keyids.contains(&keyid) {
            role_keys.keyids.push(keyid.clone());
        }
        Ok(keyid)
    }

    /// Remove `keyid` from `role`. The key descriptor itself is dropped once
    /// no role references it.
    pub fn revoke_key(&mut self, keyid: &Decoded<Hex>, role: RoleType) {
        if let Some(role_keys) = self.roles.get_mut(&role) {
            role_keys.keyids.retain(|k| k != keyid);
        }
        if !self.roles.values().any(|r| r.keyids.contains(keyid)) {
            self.keys.remove(keyid);
        }
    }
}

impl Role for Root {
    const TYPE: RoleType = RoleType::Root;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The snapshot.json file is signed by the snapshot role. It lists the version numbers of the
/// top-level targets metadata and all delegated targets metadata.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "snapshot")]
pub struct Snapshot {
    /// A string that contains the version number of the TUF specification.
    pub spec_version: String,

    /// The metadata version.
    pub version: u64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// The maximum expiry horizon for this role, in days.
    #[serde(rename = "x-expiry-period", skip_serializing_if = "Option::is_none", default)]
    pub expiry_period: Option<u32>,

    /// How many days before expiry a resign is required.
    #[serde(rename = "x-signing-period", skip_serializing_if = "Option::is_none", default)]
    pub signing_period: Option<u32>,

    /// A mapping from metadata filename (`targets.json`, `<role>.json`) to
    /// a description of its current version.
    pub meta: HashMap<String, MetaFile>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

/// Describes one metadata file in `snapshot.json` or `timestamp.json`. Only
/// the version is required; hashes and lengths are optional per the TUF
/// specification and this repository does not record them.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct MetaFile {
    /// The integer length in bytes of the metadata file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,

    /// Hashes of the metadata file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Hashes>,

    /// The version of the metadata file.
    pub version: u64,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl MetaFile {
    /// A version-only entry.
    pub fn new(version: u64) -> Self {
        MetaFile {
            length: None,
            hashes: None,
            version,
            _extra: HashMap::new(),
        }
    }
}

/// Represents a hash dictionary in metadata.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Hashes {
    /// The SHA 256 digest of a file.
    pub sha256: Decoded<Hex>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Snapshot {
    /// Create a new `Snapshot` object.
    pub fn new(spec_version: String, version: u64, expires: DateTime<Utc>) -> Self {
        Snapshot {
            spec_version,
            version,
            expires,
            expiry_period: None,
            signing_period: None,
            meta: HashMap::new(),
            _extra: HashMap::new(),
        }
    }
}

impl Role for Snapshot {
    const TYPE: RoleType = RoleType::Snapshot;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// Represents a `targets.json` file, for both the top-level targets role and
/// delegated targets roles (which share the payload shape).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "targets")]
pub struct Targets {
    /// A string that contains the version number of the TUF specification.
    pub spec_version: String,

    /// The metadata version.
    pub version: u64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// The maximum expiry horizon for this role, in days.
    #[serde(rename = "x-expiry-period", skip_serializing_if = "Option::is_none", default)]
    pub expiry_period: Option<u32>,

    /// How many days before expiry a resign is required.
    #[serde(rename = "x-signing-period", skip_serializing_if = "Option::is_none", default)]
    pub signing_period: Option<u32>,

    /// Each key of the TARGETS object is a target path relative to the
    /// repository's targets directory.
    pub targets: HashMap<String, Target>,

    /// Delegations describes subsets of the targets for which responsibility is delegated to
    /// another role. Only the top-level targets role may carry delegations; the graph is one
    /// level deep.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegations: Option<Delegations>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

/// A single target file description.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Target {
    /// The integer length in bytes of the target file.
    pub length: u64,

    /// The hashes of the target file.
    pub hashes: Hashes,

    /// Opaque application data for the file at this path.
    #[serde(default)]
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub custom: HashMap<String, Value>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

impl Target {
    /// Given a path, returns a Target struct
    pub fn from_path<P>(path: P) -> Result<Target>
    where
        P: AsRef<Path>,
    {
        // Ensure the given path is a file
        let path = path.as_ref();
        if !path.is_file() {
            return error::TargetNotAFileSnafu { path }.fail();
        }

        // Get the sha256 and length of the target
        let mut file = File::open(path).context(error::FileOpenSnafu { path })?;
        let mut digest = Context::new(&SHA256);
        let mut buf = [0; 8 * 1024];
        let mut length = 0;
        loop {
            match file.read(&mut buf).context(error::FileReadSnafu { path })? {
                0 => break,
                n => {
                    digest.update(&buf[..n]);
                    length += n as u64;
                }
            }
        }

        Ok(Target {
            length,
            hashes: Hashes {
                sha256: Decoded::from(digest.finish().as_ref().to_vec()),
                _extra: HashMap::new(),
            },
            custom: HashMap::new(),
            _extra: HashMap::new(),
        })
    }
}

impl Targets {
    /// Create a new `Targets` object.
    pub fn new(spec_version: String, version: u64, expires: DateTime<Utc>) -> Self {
        Targets {
            spec_version,
            version,
            expires,
            expiry_period: None,
            signing_period: None,
            targets: HashMap::new(),
            delegations: Some(Delegations::new()),
            _extra: HashMap::new(),
        }
    }

    /// Given the name of a delegated role, return its descriptor.
    pub fn delegated_role(&self, name: &str) -> Result<&DelegatedRole> {
        self.delegations
            .as_ref()
            .and_then(|delegations| delegations.role(name))
            .context(error::RoleNotFoundSnafu { name })
    }

    /// Given the name of a delegated role, return its descriptor mutably.
    pub fn delegated_role_mut(&mut self, name: &str) -> Result<&mut DelegatedRole> {
        self.delegations
            .as_mut()
            .and_then(|delegations| delegations.roles.iter_mut().find(|role| role.name == name))
            .context(error::RoleNotFoundSnafu { name })
    }

    /// The names of all delegated roles.
    pub fn role_names(&self) -> Vec<&String> {
        match &self.delegations {
            Some(delegations) => delegations.roles.iter().map(|role| &role.name).collect(),
            None => Vec::new(),
        }
    }

    /// Add `key` as an authorized key of the delegated role `name`,
    /// returning its key ID.
    pub fn add_key(&mut self, key: Key, name: &str) -> Result<Decoded<Hex>> {
        let keyid = key.key_id()?;
        let delegations = self
            .delegations
            .as_mut()
            .context(error::NoDelegationsSnafu)?;
        delegations.keys.entry(keyid.clone()).or_insert(key);
        let role = delegations
            .roles
            .iter_mut()
            .find(|role| role.name == name)
            .context(error::RoleNotFoundSnafu { name })?;
        if !role.keyids.contains(&keyid) {
            role.keyids.push(keyid.clone());
        }
        Ok(keyid)
    }

    /// Create an empty delegation entry for `name` if none exists. New roles
    /// claim the `<name>/*` subtree by default and are terminating: the
    /// delegation graph is one level deep.
    pub fn ensure_delegated_role(&mut self, name: &str) -> &mut DelegatedRole {
        let delegations = self.delegations.get_or_insert_with(Delegations::new);
        if let Some(index) = delegations.roles.iter().position(|role| role.name == name) {
            return &mut delegations.roles[index];
        }
        delegations.roles.push(DelegatedRole {
            name: name.to_string(),
            keyids: Vec::new(),
            threshold: 1,
            paths: PathSet::Paths(vec![format!("{}/*", name)]),
            terminating: true,
            _extra: HashMap::new(),
        });
        let index = delegations.roles.len() - 1;
        &mut delegations.roles[index]
    }

    /// Remove `keyid` from the delegated role `name`. The key descriptor is
    /// dropped once no delegated role references it.
    pub fn revoke_key(&mut self, keyid: &Decoded<Hex>, name: &str) -> Result<()> {
        let delegations = self
            .delegations
            .as_mut()
            .context(error::NoDelegationsSnafu)?;
        let role = delegations
            .roles
            .iter_mut()
            .find(|role| role.name == name)
            .context(error::RoleNotFoundSnafu { name })?;
        role.keyids.retain(|k| k != keyid);
        if !delegations.roles.iter().any(|r| r.keyids.contains(keyid)) {
            delegations.keys.remove(keyid);
        }
        Ok(())
    }
}

impl Role for Targets {
    const TYPE: RoleType = RoleType::Targets;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Delegations are found in a `targets.json` file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Delegations {
    /// Lists the public keys to verify signatures of delegated targets roles. Revocation and
    /// replacement of delegated targets roles keys is done by changing the keys in this field in
    /// the delegating role's metadata.
    #[serde(deserialize_with = "de::deserialize_keys")]
    pub keys: HashMap<Decoded<Hex>, Key>,

    /// The list of delegated roles.
    pub roles: Vec<DelegatedRole>,
}

/// Each role delegated in a targets file is considered a delegated role
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct DelegatedRole {
    /// The name of the delegated role. For example, "projects".
    pub name: String,

    /// The key IDs used by this role.
    pub keyids: Vec<Decoded<Hex>>,

    /// The threshold of signatures required to validate the role.
    pub threshold: u64,

    /// The paths governed by this role.
    #[serde(flatten)]
    pub paths: PathSet,

    /// Indicates whether subsequent delegations should be considered. This
    /// repository's delegations are one level deep, so roles are always
    /// terminating.
    pub terminating: bool,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    pub _extra: HashMap<String, Value>,
}

/// Specifies the target paths that a delegated role controls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum PathSet {
    /// The "paths" list describes paths that the role is trusted to provide. A path pattern can
    /// include shell-style wildcards and supports the Unix filename pattern matching convention.
    #[serde(rename = "paths")]
    Paths(Vec<String>),

    /// The "path_hash_prefixes" list is used to succinctly describe a set of target paths. Each
    /// hex digest describes the set of target paths whose SHA-256 path digest starts with that
    /// prefix.
    #[serde(rename = "path_hash_prefixes")]
    PathHashPrefixes(Vec<String>),
}

impl PathSet {
    /// Given a target string determines if paths match
    pub fn matched_target(&self, target: &str) -> bool {
        match self {
            Self::Paths(paths) => paths
                .iter()
                .any(|path| Self::matched_path(path, target)),
            Self::PathHashPrefixes(prefixes) => prefixes
                .iter()
                .any(|prefix| Self::matched_prefix(prefix, target)),
        }
    }

    /// Given a path hash prefix and a target path determines if target is delegated by prefix
    fn matched_prefix(prefix: &str, target: &str) -> bool {
        let hash = hex::encode(digest(&SHA256, target.as_bytes()).as_ref());
        hash.starts_with(prefix)
    }

    /// Given a shell style wildcard path determines if target matches the path
    fn matched_path(wildcardpath: &str, target: &str) -> bool {
        let glob = if let Ok(glob) = Glob::new(wildcardpath) {
            glob.compile_matcher()
        } else {
            return false;
        };
        glob.is_match(target)
    }

    /// Returns a Vec representation of the `PathSet`
    pub fn vec(&self) -> &Vec<String> {
        match self {
            PathSet::Paths(x) | PathSet::PathHashPrefixes(x) => x,
        }
    }
}

impl Delegations {
    /// Creates a new Delegations with no keys or roles
    pub fn new() -> Self {
        Delegations {
            keys: HashMap::new(),
            roles: Vec::new(),
        }
    }

    /// Determines if target passes pathset specific matching
    pub fn target_is_delegated(&self, target: &str) -> bool {
        self.roles
            .iter()
            .any(|role| role.paths.matched_target(target))
    }

    /// Returns given role if its a child of struct
    pub fn role(&self, role_name: &str) -> Option<&DelegatedRole> {
        self.roles.iter().find(|role| role.name == role_name)
    }
}

impl Default for Delegations {
    fn default() -> Self {
        Self::new()
    }
}

impl DelegatedRole {
    /// Verifies that every target path claimed by a delegated targets payload
    /// falls inside this role's path patterns.
    pub fn verify_target_paths(&self, targets: &Targets) -> Result<()> {
        for path in targets.targets.keys() {
            ensure!(
                self.paths.matched_target(path),
                error::UnmatchedPathSnafu {
                    child: path.clone(),
                    role: self.name.clone(),
                }
            );
        }
        Ok(())
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// Represents a `timestamp.json` file. The timestamp file is frequently resigned to limit the
/// amount of time a client can be kept unaware of interference with obtaining updates. Its meta
/// carries exactly one entry, for `snapshot.json`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
#[serde(rename = "timestamp")]
pub struct Timestamp {
    /// A string that contains the version number of the TUF specification.
    pub spec_version: String,

    /// The metadata version.
    pub version: u64,

    /// Determines when metadata should be considered expired and no longer trusted by clients.
    pub expires: DateTime<Utc>,

    /// The maximum expiry horizon for this role, in days.
    #[serde(rename = "x-expiry-period", skip_serializing_if = "Option::is_none", default)]
    pub expiry_period: Option<u32>,

    /// How many days before expiry a resign is required.
    #[serde(rename = "x-signing-period", skip_serializing_if = "Option::is_none", default)]
    pub signing_period: Option<u32>,

    /// The description of the current snapshot.json.
    pub meta: HashMap<String, MetaFile>,

    /// Extra arguments found during deserialization.
    #[serde(flatten)]
    #[serde(deserialize_with = "de::extra_skip_type")]
    pub _extra: HashMap<String, Value>,
}

impl Timestamp {
    /// Creates a new `Timestamp` object.
    pub fn new(spec_version: String, version: u64, expires: DateTime<Utc>) -> Self {
        Timestamp {
            spec_version,
            version,
            expires,
            expiry_period: None,
            signing_period: None,
            meta: HashMap::new(),
            _extra: HashMap::new(),
        }
    }
}

impl Role for Timestamp {
    const TYPE: RoleType = RoleType::Timestamp;

    fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=   =^..^=

/// The sum of the four signed payload shapes. Delegated targets roles use the
/// [`Targets`] variant. Every "which kind of payload is this?" question is an
/// exhaustive match over this type.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Payload {
    /// A root payload.
    Root(Root),
    /// A targets or delegated-targets payload.
    Targets(Targets),
    /// A snapshot payload.
    Snapshot(Snapshot),
    /// A timestamp payload.
    Timestamp(Timestamp),
}

/// A full metadata envelope: signatures plus one of the payload variants.
pub type Metadata = Signed<Payload>;

impl Payload {
    /// The `_type` tag of this payload.
    pub fn tag(&self) -> &'static str {
        match self {
            Payload::Root(_) => "root",
            Payload::Targets(_) => "targets",
            Payload::Snapshot(_) => "snapshot",
            Payload::Timestamp(_) => "timestamp",
        }
    }

    /// The metadata version.
    pub fn version(&self) -> u64 {
        match self {
            Payload::Root(role) => role.version,
            Payload::Targets(role) => role.version,
            Payload::Snapshot(role) => role.version,
            Payload::Timestamp(role) => role.version,
        }
    }

    /// Set the metadata version.
    pub fn set_version(&mut self, version: u64) {
        match self {
            Payload::Root(role) => role.version = version,
            Payload::Targets(role) => role.version = version,
            Payload::Snapshot(role) => role.version = version,
            Payload::Timestamp(role) => role.version = version,
        }
    }

    /// The expiry timestamp.
    pub fn expires(&self) -> DateTime<Utc> {
        match self {
            Payload::Root(role) => role.expires,
            Payload::Targets(role) => role.expires,
            Payload::Snapshot(role) => role.expires,
            Payload::Timestamp(role) => role.expires,
        }
    }

    /// Set the expiry timestamp.
    pub fn set_expires(&mut self, expires: DateTime<Utc>) {
        match self {
            Payload::Root(role) => role.expires = expires,
            Payload::Targets(role) => role.expires = expires,
            Payload::Snapshot(role) => role.expires = expires,
            Payload::Timestamp(role) => role.expires = expires,
        }
    }

    /// The role's `x-expiry-period`, if configured.
    pub fn expiry_period(&self) -> Option<u32> {
        match self {
            Payload::Root(role) => role.expiry_period,
            Payload::Targets(role) => role.expiry_period,
            Payload::Snapshot(role) => role.expiry_period,
            Payload::Timestamp(role) => role.expiry_period,
        }
    }

    /// Set the role's `x-expiry-period`.
    pub fn set_expiry_period(&mut self, days: u32) {
        let slot = match self {
            Payload::Root(role) => &mut role.expiry_period,
            Payload::Targets(role) => &mut role.expiry_period,
            Payload::Snapshot(role) => &mut role.expiry_period,
            Payload::Timestamp(role) => &mut role.expiry_period,
        };
        *slot = Some(days);
    }

    /// The role's `x-signing-period`. A configured value of `0` means "use
    /// the default" and is reported as absent.
    pub fn signing_period(&self) -> Option<u32> {
        let period = match self {
            Payload::Root(role) => role.signing_period,
            Payload::Targets(role) => role.signing_period,
            Payload::Snapshot(role) => role.signing_period,
            Payload::Timestamp(role) => role.signing_period,
        };
        period.filter(|days| *days != 0)
    }

    /// Set the role's `x-signing-period`.
    pub fn set_signing_period(&mut self, days: u32) {
        let slot = match self {
            Payload::Root(role) => &mut role.signing_period,
            Payload::Targets(role) => &mut role.signing_period,
            Payload::Snapshot(role) => &mut role.signing_period,
            Payload::Timestamp(role) => &mut role.signing_period,
        };
        *slot = Some(days);
    }

    /// A deterministic JSON serialization used when calculating and verifying
    /// signatures over this payload.
    pub fn canonical_form(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut ser = serde_json::Serializer::with_formatter(&mut data, CanonicalFormatter::new());
        self.serialize(&mut ser)
            .context(error::JsonSerializationSnafu { what: "role" })?;
        Ok(data)
    }

    /// Borrow this payload as root metadata.
    pub fn as_root(&self) -> Result<&Root> {
        match self {
            Payload::Root(role) => Ok(role),
            other => RoleTypeMismatchSnafu {
                expected: "root",
                found: other.tag(),
            }
            .fail(),
        }
    }

    /// Borrow this payload as root metadata, mutably.
    pub fn as_root_mut(&mut self) -> Result<&mut Root> {
        match self {
            Payload::Root(role) => Ok(role),
            other => RoleTypeMismatchSnafu {
                expected: "root",
                found: other.tag(),
            }
            .fail(),
        }
    }

    /// Borrow this payload as targets metadata.
    pub fn as_targets(&self) -> Result<&Targets> {
        match self {
            Payload::Targets(role) => Ok(role),
            other => RoleTypeMismatchSnafu {
                expected: "targets",
                found: other.tag(),
            }
            .fail(),
        }
    }

    /// Borrow this payload as targets metadata, mutably.
    pub fn as_targets_mut(&mut self) -> Result<&mut Targets> {
        match self {
            Payload::Targets(role) => Ok(role),
            other => RoleTypeMismatchSnafu {
                expected: "targets",
                found: other.tag(),
            }
            .fail(),
        }
    }

    /// Borrow this payload as snapshot metadata.
    pub fn as_snapshot(&self) -> Result<&Snapshot> {
        match self {
            Payload::Snapshot(role) => Ok(role),
            other => RoleTypeMismatchSnafu {
                expected: "snapshot",
                found: other.tag(),
            }
            .fail(),
        }
    }

    /// Borrow this payload as snapshot metadata, mutably.
    pub fn as_snapshot_mut(&mut self) -> Result<&mut Snapshot> {
        match self {
            Payload::Snapshot(role) => Ok(role),
            other => RoleTypeMismatchSnafu {
                expected: "snapshot",
                found: other.tag(),
            }
            .fail(),
        }
    }

    /// Borrow this payload as timestamp metadata.
    pub fn as_timestamp(&self) -> Result<&Timestamp> {
        match self {
            Payload::Timestamp(role) => Ok(role),
            other => RoleTypeMismatchSnafu {
                expected: "timestamp",
                found: other.tag(),
            }
            .fail(),
        }
    }

    /// Borrow this payload as timestamp metadata, mutably.
    pub fn as_timestamp_mut(&mut self) -> Result<&mut Timestamp> {
        match self {
            Payload::Timestamp(role) => Ok(role),
            other => RoleTypeMismatchSnafu {
                expected: "timestamp",
                found: other.tag(),
            }
            .fail(),
        }
    }

    /// The key IDs and threshold this payload declares for its delegation
    /// named `role`. Fails if this payload does not delegate `role`.
    pub fn delegation(&self, role: &str) -> Result<(&[Decoded<Hex>], u64)> {
        match self {
            Payload::Root(root) => {
                let role_type: RoleType = role
                    .parse()
                    .ok()
                    .context(error::RoleNotFoundSnafu { name: role })?;
                let role_keys = root
                    .roles
                    .get(&role_type)
                    .context(error::RoleNotFoundSnafu { name: role })?;
                Ok((&role_keys.keyids, role_keys.threshold))
            }
            Payload::Targets(targets) => {
                let delegated = targets.delegated_role(role)?;
                Ok((&delegated.keyids, delegated.threshold))
            }
            other => error::RoleNotFoundSnafu { name: other.tag() }.fail(),
        }
    }

    /// Look up a key descriptor declared by this payload.
    pub fn get_key(&self, keyid: &Decoded<Hex>) -> Option<&Key> {
        match self {
            Payload::Root(root) => root.keys.get(keyid),
            Payload::Targets(targets) => targets
                .delegations
                .as_ref()
                .and_then(|delegations| delegations.keys.get(keyid)),
            Payload::Snapshot(_) | Payload::Timestamp(_) => None,
        }
    }

    /// The keys this payload declares for its delegation named `role`, in
    /// declaration order.
    pub fn keys_for_role(&self, role: &str) -> Result<Vec<(&Decoded<Hex>, &Key)>> {
        let (keyids, _) = self.delegation(role)?;
        Ok(keyids
            .iter()
            .filter_map(|keyid| self.get_key(keyid).map(|key| (keyid, key)))
            .collect())
    }

    /// Add `key` as an authorized key of this payload's delegation named
    /// `role`, returning its key ID.
    pub fn add_key(&mut self, key: Key, role: &str) -> Result<Decoded<Hex>> {
        match self {
            Payload::Root(root) => {
                let role_type: RoleType = role
                    .parse()
                    .ok()
                    .context(error::RoleNotFoundSnafu { name: role })?;
                root.add_key(key, role_type)
            }
            Payload::Targets(targets) => targets.add_key(key, role),
            other => error::RoleNotFoundSnafu { name: other.tag() }.fail(),
        }
    }

    /// Remove `keyid` from this payload's delegation named `role`.
    pub fn revoke_key(&mut self, keyid: &Decoded<Hex>, role: &str) -> Result<()> {
        match self {
            Payload::Root(root) => {
                let role_type: RoleType = role
                    .parse()
                    .ok()
                    .context(error::RoleNotFoundSnafu { name: role })?;
                root.revoke_key(keyid, role_type);
                Ok(())
            }
            Payload::Targets(targets) => targets.revoke_key(keyid, role),
            other => error::RoleNotFoundSnafu { name: other.tag() }.fail(),
        }
    }

    /// Set the signature threshold of this payload's delegation named
    /// `role`.
    pub fn set_threshold(&mut self, role: &str, threshold: u64) -> Result<()> {
        match self {
            Payload::Root(root) => {
                let role_type: RoleType = role
                    .parse()
                    .ok()
                    .context(error::RoleNotFoundSnafu { name: role })?;
                root.roles
                    .get_mut(&role_type)
                    .context(error::RoleNotFoundSnafu { name: role })?
                    .threshold = threshold;
                Ok(())
            }
            Payload::Targets(targets) => {
                targets.delegated_role_mut(role)?.threshold = threshold;
                Ok(())
            }
            other => error::RoleNotFoundSnafu { name: other.tag() }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{delegator_of, is_online_role, Payload, RoleType};

    #[test]
    fn delegator_table() {
        assert_eq!(delegator_of("root"), "root");
        assert_eq!(delegator_of("targets"), "root");
        assert_eq!(delegator_of("snapshot"), "root");
        assert_eq!(delegator_of("timestamp"), "root");
        assert_eq!(delegator_of("anything-else"), "targets");
    }

    #[test]
    fn online_roles() {
        assert!(is_online_role("snapshot"));
        assert!(is_online_role("timestamp"));
        assert!(!is_online_role("root"));
        assert!(!is_online_role("my-project"));
    }

    #[test]
    fn role_type_strings() {
        assert_eq!("root".parse::<RoleType>().unwrap(), RoleType::Root);
        assert_eq!(RoleType::Timestamp.to_string(), "timestamp");
        assert!("my-project".parse::<RoleType>().is_err());
    }

    #[test]
    fn payload_dispatches_on_type_tag() {
        let json = r#"{
            "_type": "timestamp",
            "spec_version": "1.0.0",
            "version": 4,
            "expires": "2030-01-01T00:00:00Z",
            "meta": { "snapshot.json": { "version": 7 } }
        }"#;
        let payload: Payload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.tag(), "timestamp");
        assert_eq!(payload.version(), 4);
        assert_eq!(
            payload.as_timestamp().unwrap().meta["snapshot.json"].version,
            7
        );
        assert!(payload.as_root().is_err());
    }

    #[test]
    fn unrecognized_fields_round_trip() {
        let json = serde_json::json!({
            "signatures": [],
            "signed": {
                "_type": "targets",
                "spec_version": "1.0.0",
                "version": 3,
                "expires": "2030-01-01T00:00:00Z",
                "x-expiry-period": 90,
                "targets": {
                    "demo/app.bin": {
                        "length": 7,
                        "hashes": { "sha256": "aa", "blake2b": "bb" },
                        "x-release-channel": "stable"
                    }
                },
                "x-something-new": { "nested": [1, 2, 3] }
            }
        });
        let md: super::Metadata = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(serde_json::to_value(&md).unwrap(), json);

        // and the canonical form is stable across a round-trip
        let first = md.signed.canonical_form().unwrap();
        let reparsed: super::Metadata =
            serde_json::from_value(serde_json::to_value(&md).unwrap()).unwrap();
        assert_eq!(reparsed.signed.canonical_form().unwrap(), first);
    }

    #[test]
    fn canonical_form_orders_keys() {
        let json = serde_json::json!({
            "_type": "timestamp",
            "version": 1,
            "spec_version": "1.0.0",
            "expires": "2030-01-01T00:00:00Z",
            "meta": { "snapshot.json": { "version": 1 } }
        });
        let payload: Payload = serde_json::from_value(json).unwrap();
        let canonical = String::from_utf8(payload.canonical_form().unwrap()).unwrap();
        let type_pos = canonical.find("\"_type\"").unwrap();
        let expires_pos = canonical.find("\"expires\"").unwrap();
        let version_pos = canonical.find("\"version\"").unwrap();
        assert!(type_pos < expires_pos && expires_pos < version_pos);
        assert!(!canonical.contains('\n'));
    }

    #[test]
    fn signing_period_zero_means_default() {
        let json = r#"{
            "_type": "targets",
            "spec_version": "1.0.0",
            "version": 1,
            "expires": "2030-01-01T00:00:00Z",
            "x-signing-period": 0,
            "targets": {}
        }"#;
        let payload: Payload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.signing_period(), None);
    }
}
