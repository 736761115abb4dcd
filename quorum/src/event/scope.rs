// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The edit transaction a signing event mutates metadata through: begin
//! reads the current payload, the caller applies changes, and commit stamps
//! the version and expiry, resets signatures, signs with whatever local
//! keys the current user holds, and persists atomically. Dropping the scope
//! (or calling [`EditScope::abort`]) writes nothing.

use crate::clock::Clock;
use crate::error::Result;
use crate::event::{contained_delegations, local_signature};
use crate::key_source::KeySource;
use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use crate::schema::{delegator_of, Metadata, Payload, Signature};
use crate::state::SigningEventState;
use crate::store::{expiry_after_days, RepositoryStore};
use log::debug;

/// Expiry horizon applied when a role has no `x-expiry-period` yet; the
/// offline editor normally sets one before the first commit.
pub(crate) const DEFAULT_EXPIRY_DAYS: u32 = 365;

/// An in-flight edit of one role's payload.
///
/// The commit contract guarantees at most one version bump per signing
/// event: the committed version is always `baseline + 1`, no matter how
/// many scopes are opened on the role within the event. While invitations
/// are open for delegations of the edited role, the bump and the user's own
/// signature are both withheld, because the payload is not yet the one
/// signers should commit to.
#[derive(Debug)]
pub struct EditScope<'a> {
    store: &'a RepositoryStore,
    clock: &'a dyn Clock,
    user: &'a str,
    keys: &'a [Box<dyn KeySource>],
    role: String,
    md: Metadata,
    original: Payload,
    baseline_version: u64,
    invites_open: bool,
}

impl<'a> EditScope<'a> {
    pub(crate) fn begin(
        store: &'a RepositoryStore,
        clock: &'a dyn Clock,
        user: &'a str,
        keys: &'a [Box<dyn KeySource>],
        state: &SigningEventState,
        role: &str,
    ) -> Result<Self> {
        let md = store.open_or_init(role)?;
        let baseline_version = store.baseline_version(role)?;
        let contained = contained_delegations(role, &md.signed);
        let invites_open = state.any_invites_for(contained.iter().map(String::as_str));
        Ok(EditScope {
            store,
            clock,
            user,
            keys,
            role: role.to_string(),
            original: md.signed.clone(),
            md,
            baseline_version,
            invites_open,
        })
    }

    /// The role being edited.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// The payload under edit.
    pub fn signed(&self) -> &Payload {
        &self.md.signed
    }

    /// The payload under edit, mutably.
    pub fn signed_mut(&mut self) -> &mut Payload {
        &mut self.md.signed
    }

    /// Whether the payload differs from what was read at `begin`. Version,
    /// expiry and signatures are not considered; they are recomputed on
    /// commit anyway.
    pub fn changed(&self) -> bool {
        self.md.signed != self.original
    }

    /// Abandon the edit: nothing is written and no version is bumped.
    pub fn abort(self) {
        debug!("aborting edit of '{}'", self.role);
    }

    /// Commit the edit and return the version that was written.
    pub fn commit(mut self) -> Result<u64> {
        let version = if self.invites_open {
            // The delegator diff is not complete until invitations resolve;
            // hold the version where it is.
            self.md.signed.version().max(1)
        } else {
            self.baseline_version + 1
        };
        self.md.signed.set_version(version);

        let days = self
            .md
            .signed
            .expiry_period()
            .unwrap_or(DEFAULT_EXPIRY_DAYS);
        self.md.signed.set_expires(expiry_after_days(self.clock, days));

        // Reset signatures: one placeholder per expected key, then fill in
        // whatever the current user can sign locally.
        let expected = self.expected_keys()?;
        self.md.signatures.clear();
        for (keyid, _) in &expected {
            self.md.signatures.push(Signature {
                keyid: keyid.clone(),
                sig: Decoded::from(Vec::new()),
            });
        }

        if !self.invites_open {
            let canonical = self.md.signed.canonical_form()?;
            for (keyid, key) in &expected {
                if key.keyowner() != Some(self.user) {
                    continue;
                }
                if let Some(sig) = local_signature(self.keys, keyid, &canonical) {
                    self.md.replace_signature(Signature {
                        keyid: keyid.clone(),
                        sig: Decoded::from(sig),
                    });
                }
            }
        }

        self.store.write(&self.role, &self.md)?;
        debug!("committed '{}' version {}", self.role, version);
        Ok(version)
    }

    /// The keys whose signatures the committed envelope should carry. For
    /// root this is the union of the baseline root's and the new root's
    /// `root` keys, since both delegators must accept the new payload.
    fn expected_keys(&self) -> Result<Vec<(Decoded<Hex>, Key)>> {
        let mut expected: Vec<(Decoded<Hex>, Key)> = Vec::new();
        let mut push = |keyid: &Decoded<Hex>, key: &Key| {
            if !expected.iter().any(|(id, _)| id == keyid) {
                expected.push((keyid.clone(), key.clone()));
            }
        };

        if self.role == "root" {
            if let Some(baseline) = self.store.open_baseline("root")? {
                for (keyid, key) in baseline.signed.keys_for_role("root")? {
                    push(keyid, key);
                }
            }
            for (keyid, key) in self.md.signed.keys_for_role("root")? {
                push(keyid, key);
            }
        } else {
            let delegator = self.store.open(delegator_of(&self.role))?;
            for (keyid, key) in delegator.signed.keys_for_role(&self.role)? {
                push(keyid, key);
            }
        }
        Ok(expected)
    }
}
