// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The signing-event engine: computes per-role signing status against the
//! known-good baseline, drives the invite → accept → sign transitions, and
//! reconciles targets metadata with the files on disk.
//!
//! A signing event is a branch-scoped proposal. The engine reads the
//! proposed metadata through a [`RepositoryStore`], compares it against the
//! baseline the branch forked from, and reports structured
//! [`SigningStatus`] records; rendering them is the driver's concern.

mod editor;
mod scope;

pub use self::editor::{OfflineConfig, OnlineConfig};
pub use self::scope::EditScope;
pub(crate) use self::scope::DEFAULT_EXPIRY_DAYS;

use crate::clock::Clock;
use crate::error::{self, Result};
use crate::key_source::KeySource;
use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use crate::schema::{delegator_of, is_online_role, verify_role, Payload, Signature, Target};
use crate::state::SigningEventState;
use crate::store::RepositoryStore;
use aws_lc_rs::rand::SystemRandom;
use chrono::Duration;
use log::{debug, info, warn};
use snafu::{ensure, ResultExt};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use walkdir::WalkDir;

/// The signing status of one role within a signing event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SigningStatus {
    /// Identities invited to delegations of this role that do not hold keys
    /// yet.
    pub invites: BTreeSet<String>,
    /// Identities whose keys verify on the current payload.
    pub signed: BTreeSet<String>,
    /// Identities whose keys are expected but do not verify.
    pub missing: BTreeSet<String>,
    /// Required signature count, from the role's delegator.
    pub threshold: u64,
    /// Whether the delegation check passes and the version/expiry
    /// invariants hold. For root this includes the previous root's view.
    pub valid: bool,
    /// Diagnostic for the first failed check when `valid` is false.
    pub message: Option<String>,
}

/// A coarse summary of what the current user should do next. Recomputed on
/// every open; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerState {
    /// No repository exists here yet.
    Uninitialized,
    /// The user has open invitations to accept.
    Invited,
    /// Target files on disk differ from the targets metadata.
    TargetsChanged,
    /// A changed role is waiting for the user's signature.
    SignatureNeeded,
    /// Nothing to do.
    NoAction,
}

/// A single difference between targets metadata and the files on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetChange {
    /// A file exists on disk but not in the metadata.
    Added(String),
    /// A file's length or hash differs from the metadata.
    Modified(String),
    /// The metadata lists a target with no file on disk.
    Removed(String),
}

/// The engine for one signing event: a store, the current user, and the
/// user's locally available signing keys.
#[derive(Debug)]
pub struct SigningEvent<'a> {
    store: &'a RepositoryStore,
    clock: &'a dyn Clock,
    user: String,
    keys: Vec<Box<dyn KeySource>>,
    state: SigningEventState,
}

impl<'a> SigningEvent<'a> {
    /// Open the signing event in `store` as `user`, with the user's local
    /// signing keys.
    pub fn open(
        store: &'a RepositoryStore,
        clock: &'a dyn Clock,
        user: &str,
        keys: Vec<Box<dyn KeySource>>,
    ) -> Result<Self> {
        let state = store.load_event_state()?;
        Ok(SigningEvent {
            store,
            clock,
            user: user.to_string(),
            keys,
            state,
        })
    }

    /// The current user.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The pending invitations of this signing event.
    pub fn state(&self) -> &SigningEventState {
        &self.state
    }

    /// Begin an edit of `role`. See [`EditScope`] for the commit contract.
    pub fn edit(&self, role: &str) -> Result<EditScope<'_>> {
        EditScope::begin(self.store, self.clock, &self.user, &self.keys, &self.state, role)
    }

    /// The roles whose serialized metadata differs from the baseline,
    /// top-level roles first. A difference in an online role is an error:
    /// signing events must never touch `snapshot` or `timestamp`.
    pub fn changed_roles(&self) -> Result<Vec<String>> {
        let mut changed = Vec::new();
        for role in self.store.roles()? {
            if !self.store.differs_from_baseline(&role)? {
                continue;
            }
            if is_online_role(&role) {
                ensure!(
                    self.store.baseline_version(&role)? == 0,
                    error::OnlineRoleChangedSnafu { role }
                );
                continue;
            }
            changed.push(role);
        }
        for toplevel in &["targets", "root"] {
            if let Some(index) = changed.iter().position(|role| role == toplevel) {
                let role = changed.remove(index);
                changed.insert(0, role);
            }
        }
        Ok(changed)
    }

    /// Compute the signing status of `role`. Validity findings (threshold,
    /// version, expiry, delegation problems) never error; they come back as
    /// `valid == false` with a diagnostic message.
    pub fn status(&self, role: &str) -> Result<SigningStatus> {
        ensure!(!is_online_role(role), error::OnlineRoleChangedSnafu { role });

        let md = self.store.open(role)?;
        let baseline = self.store.open_baseline(role)?;
        let now = self.clock.now();

        let mut status = SigningStatus {
            valid: true,
            ..SigningStatus::default()
        };
        let mut fail = |status: &mut SigningStatus, message: String| {
            status.valid = false;
            status.message.get_or_insert(message);
        };

        // Version and expiry invariants.
        if let Some(prev) = &baseline {
            if md.signed.version() <= prev.signed.version() {
                fail(
                    &mut status,
                    error::VersionRegressedSnafu {
                        role,
                        version: md.signed.version(),
                        baseline: prev.signed.version(),
                    }
                    .build()
                    .to_string(),
                );
            }
        }
        if let Some(days) = md.signed.expiry_period() {
            let limit = now + Duration::days(i64::from(days));
            if md.signed.expires() > limit {
                fail(
                    &mut status,
                    error::ExpiryTooFarSnafu {
                        role,
                        expires: md.signed.expires(),
                        limit,
                    }
                    .build()
                    .to_string(),
                );
            }
        }

        // Open invitations to delegations of this role.
        for name in contained_delegations(role, &md.signed) {
            status.invites.extend(self.state.invitees_of(&name));
        }

        // Delegated-targets payloads must stay inside their declared paths
        // and must not delegate further.
        if delegator_of(role) == "targets" {
            self.check_delegation_shape(role, &md.signed, &mut status, &mut fail)?;
        }

        // Count signatures under every applicable delegator. A new root
        // must satisfy the previous root as well as itself.
        let mut delegators: Vec<Payload> = Vec::new();
        if role == "root" {
            if let Some(prev) = &baseline {
                delegators.push(prev.signed.clone());
            }
            delegators.push(md.signed.clone());
        } else {
            delegators.push(self.store.open(delegator_of(role))?.signed);
        }

        let canonical = md.signed.canonical_form()?;
        for delegator in &delegators {
            let keys = match delegator.keys_for_role(role) {
                Ok(keys) => keys,
                Err(e) => {
                    fail(&mut status, e.to_string());
                    continue;
                }
            };
            for (keyid, key) in keys {
                let owner = key
                    .keyowner()
                    .map(str::to_string)
                    .unwrap_or_else(|| keyid.to_string());
                match md.signature(keyid) {
                    Some(signature) if key.verify(&canonical, &signature.sig) => {
                        status.signed.insert(owner);
                    }
                    _ => {
                        status.missing.insert(owner);
                    }
                }
            }
            if let Ok((_, threshold)) = delegator.delegation(role) {
                status.threshold = threshold;
            }
            if let Err(e) = verify_role(delegator, role, &md) {
                fail(&mut status, e.to_string());
            }
        }

        Ok(status)
    }

    fn check_delegation_shape(
        &self,
        role: &str,
        payload: &Payload,
        status: &mut SigningStatus,
        fail: &mut dyn FnMut(&mut SigningStatus, String),
    ) -> Result<()> {
        let delegator = self.store.open("targets")?;
        let targets = match payload.as_targets() {
            Ok(targets) => targets,
            Err(e) => {
                fail(status, e.to_string());
                return Ok(());
            }
        };
        if targets
            .delegations
            .as_ref()
            .map_or(false, |delegations| !delegations.roles.is_empty())
        {
            fail(
                status,
                error::InvalidDelegationSnafu {
                    role,
                    reason: "delegated targets must not delegate further",
                }
                .build()
                .to_string(),
            );
        }
        match delegator.signed.as_targets()?.delegated_role(role) {
            Ok(delegated) => {
                if let Err(e) = delegated.verify_target_paths(targets) {
                    fail(
                        status,
                        error::InvalidDelegationSnafu {
                            role,
                            reason: e.to_string(),
                        }
                        .build()
                        .to_string(),
                    );
                }
            }
            Err(e) => fail(
                status,
                error::InvalidDelegationSnafu {
                    role,
                    reason: e.to_string(),
                }
                .build()
                .to_string(),
            ),
        }
        Ok(())
    }

    /// The changed roles still waiting for a signature from the current
    /// user.
    pub fn unsigned_roles(&self) -> Result<Vec<String>> {
        let mut unsigned = Vec::new();
        for role in self.changed_roles()? {
            let status = self.status(&role)?;
            if status.missing.contains(&self.user) {
                unsigned.push(role);
            }
        }
        Ok(unsigned)
    }

    /// Summarize what the current user should do next.
    pub fn signer_state(&self) -> Result<SignerState> {
        if !self.store.exists("root") {
            return Ok(SignerState::Uninitialized);
        }
        if !self.state.invited_roles(&self.user).is_empty() {
            return Ok(SignerState::Invited);
        }
        if self.target_changes()?.values().any(|c| !c.is_empty()) {
            return Ok(SignerState::TargetsChanged);
        }
        if !self.unsigned_roles()?.is_empty() {
            return Ok(SignerState::SignatureNeeded);
        }
        Ok(SignerState::NoAction)
    }

    /// Accept the invitation of `identity` to `role`: bind the supplied key
    /// to the identity, add it to the role's delegator, and drop the
    /// invitation. Other changed roles the identity now holds keys for show
    /// up in [`unsigned_roles`](Self::unsigned_roles) afterwards.
    pub fn accept_invitation(&mut self, role: &str, identity: &str, key: Key) -> Result<()> {
        let mut key = key;
        key.set_keyowner(identity);

        self.state.retract(identity, role);

        let delegator_name = delegator_of(role);
        let mut scope = self.edit(delegator_name)?;
        if let Payload::Targets(targets) = scope.signed_mut() {
            targets.ensure_delegated_role(role);
        }
        scope.signed_mut().add_key(key, role)?;
        let version = scope.commit()?;
        info!(
            "accepted invitation of {} to '{}'; {} is now version {}",
            identity, role, delegator_name, version
        );

        self.store.save_event_state(&self.state)
    }

    /// Sign `role` with the current user's key, replacing the placeholder
    /// signature. The version is not bumped; signing is not an edit. Fails
    /// with `NotASigner` when the user holds no key for the role.
    pub fn sign(&self, role: &str) -> Result<()> {
        ensure!(!is_online_role(role), error::OnlineRoleChangedSnafu { role });

        let mut md = self.store.open(role)?;
        let canonical = md.signed.canonical_form()?;

        let mut delegators: Vec<Payload> = Vec::new();
        if role == "root" {
            if let Some(prev) = self.store.open_baseline("root")? {
                delegators.push(prev.signed);
            }
            delegators.push(md.signed.clone());
        } else {
            delegators.push(self.store.open(delegator_of(role))?.signed);
        }

        let mut seen: HashSet<Decoded<Hex>> = HashSet::new();
        let mut signed_any = false;
        for delegator in &delegators {
            let keys = match delegator.keys_for_role(role) {
                Ok(keys) => keys,
                Err(_) => continue,
            };
            for (keyid, key) in keys {
                if key.keyowner() != Some(self.user.as_str()) || !seen.insert(keyid.clone()) {
                    continue;
                }
                if let Some(sig) = local_signature(&self.keys, keyid, &canonical) {
                    md.replace_signature(Signature {
                        keyid: keyid.clone(),
                        sig: Decoded::from(sig),
                    });
                    signed_any = true;
                }
            }
        }
        ensure!(
            signed_any,
            error::NotASignerSnafu {
                user: self.user.clone(),
                role,
            }
        );
        self.store.write(role, &md)
    }

    /// Compare the targets files on disk with the targets metadata, without
    /// changing anything. Files are assigned to the first delegated role
    /// whose path patterns match, and to the top-level targets role
    /// otherwise.
    pub fn target_changes(&self) -> Result<BTreeMap<String, Vec<TargetChange>>> {
        let (found, roles) = self.scan_targets()?;
        let mut changes: BTreeMap<String, Vec<TargetChange>> = BTreeMap::new();

        for role in &roles {
            let empty = BTreeMap::new();
            let files = found.get(role).unwrap_or(&empty);
            let current = self.current_targets(role)?;
            let mut role_changes = Vec::new();

            for (path, target) in files {
                match current.get(path) {
                    None => role_changes.push(TargetChange::Added(path.clone())),
                    Some(existing)
                        if existing.length != target.length
                            || existing.hashes.sha256 != target.hashes.sha256 =>
                    {
                        role_changes.push(TargetChange::Modified(path.clone()));
                    }
                    Some(_) => {}
                }
            }
            for path in current.keys() {
                if !files.contains_key(path) {
                    role_changes.push(TargetChange::Removed(path.clone()));
                }
            }
            if !role_changes.is_empty() {
                changes.insert(role.clone(), role_changes);
            }
        }
        Ok(changes)
    }

    /// Reconcile targets metadata with the files on disk, one edit per role
    /// with differences. Returns the applied changes.
    pub fn update_targets(&mut self) -> Result<BTreeMap<String, Vec<TargetChange>>> {
        let changes = self.target_changes()?;
        let (mut found, _) = self.scan_targets()?;

        for (role, role_changes) in &changes {
            let files = found.remove(role).unwrap_or_default();
            let mut scope = self.edit(role)?;
            {
                let targets = scope.signed_mut().as_targets_mut()?;
                for change in role_changes {
                    match change {
                        TargetChange::Added(path) | TargetChange::Modified(path) => {
                            if let Some(target) = files.get(path) {
                                targets.targets.insert(path.clone(), target.clone());
                            }
                        }
                        TargetChange::Removed(path) => {
                            targets.targets.remove(path);
                        }
                    }
                }
            }
            let version = scope.commit()?;
            info!(
                "updated targets of '{}' ({} changes), now version {}",
                role,
                role_changes.len(),
                version
            );
        }
        Ok(changes)
    }

    /// Walk the targets tree and hash every file, grouped by owning role.
    #[allow(clippy::type_complexity)]
    fn scan_targets(&self) -> Result<(BTreeMap<String, BTreeMap<String, Target>>, Vec<String>)> {
        let targets_md = self.store.open("targets")?;
        let targets = targets_md.signed.as_targets()?;
        let mut roles: Vec<String> = vec!["targets".to_string()];
        roles.extend(targets.role_names().into_iter().cloned());

        let mut found: BTreeMap<String, BTreeMap<String, Target>> = BTreeMap::new();
        let targets_dir = self.store.targets_dir();
        if !targets_dir.is_dir() {
            return Ok((found, roles));
        }

        for entry in WalkDir::new(&targets_dir).follow_links(true) {
            let entry = entry.context(error::WalkDirSnafu {
                directory: &targets_dir,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&targets_dir)
                .unwrap_or(entry.path());
            let path = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let owner = roles
                .iter()
                .skip(1)
                .find(|name| {
                    targets
                        .delegated_role(name.as_str())
                        .map(|role| role.paths.matched_target(&path))
                        .unwrap_or(false)
                })
                .cloned()
                .unwrap_or_else(|| "targets".to_string());

            debug!("found target '{}' owned by '{}'", path, owner);
            let target = Target::from_path(entry.path())?;
            found.entry(owner).or_default().insert(path, target);
        }
        Ok((found, roles))
    }

    /// The targets map currently recorded in `role`'s metadata; empty when
    /// the role file does not exist yet.
    fn current_targets(&self, role: &str) -> Result<BTreeMap<String, Target>> {
        if !self.store.exists(role) {
            return Ok(BTreeMap::new());
        }
        let md = self.store.open(role)?;
        Ok(md
            .signed
            .as_targets()?
            .targets
            .iter()
            .map(|(path, target)| (path.clone(), target.clone()))
            .collect())
    }
}

/// The delegation names a role's payload contains: root carries the
/// delegations for `root` and `targets` (the offline top-level roles), the
/// top-level targets role carries its delegated roles, and everything else
/// carries none.
pub(crate) fn contained_delegations(role: &str, payload: &Payload) -> Vec<String> {
    match payload {
        Payload::Root(_) => vec!["root".to_string(), "targets".to_string()],
        Payload::Targets(targets) if role == "targets" => {
            targets.role_names().into_iter().cloned().collect()
        }
        _ => Vec::new(),
    }
}

/// Sign `canonical` with whichever local key source matches `keyid`.
/// Key-source failures are logged and skipped; local signing during a
/// commit is opportunistic.
pub(crate) fn local_signature(
    keys: &[Box<dyn KeySource>],
    keyid: &Decoded<Hex>,
    canonical: &[u8],
) -> Option<Vec<u8>> {
    let rng = SystemRandom::new();
    for source in keys {
        let signer = match source.as_sign() {
            Ok(signer) => signer,
            Err(e) => {
                warn!("skipping signing key source {:?}: {}", source, e);
                continue;
            }
        };
        let key = signer.tuf_key();
        match key.key_id() {
            Ok(id) if &id == keyid => {}
            _ => continue,
        }
        match signer.sign(canonical, &rng) {
            Ok(sig) => {
                if key.verify(canonical, &sig) {
                    return Some(sig);
                }
                warn!("signature by local key {} failed self-verification", keyid);
            }
            Err(e) => warn!("local signing with {} failed: {}", keyid, e),
        }
    }
    None
}
