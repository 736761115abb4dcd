// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The unattended side of the repository: expiry-driven resigning of the
//! online roles, snapshot generation after merges, and the timestamp
//! pointer. Runs from scheduled automation against the main branch.
//!
//! Online roles are signed at write time with every configured online
//! signer, resolved from each key's `x-online-uri`. A write that cannot
//! meet the role's threshold is fatal; no file is emitted.

use crate::clock::Clock;
use crate::error::{self, Result};
use crate::key_source::SignerRegistry;
use crate::schema::{
    delegator_of, is_online_role, verify_role, MetaFile, Metadata, RoleType, Signature,
};
use crate::schema::decoded::Decoded;
use crate::store::{expiry_after_days, RepositoryStore};
use aws_lc_rs::rand::SystemRandom;
use chrono::Duration;
use log::{debug, info};
use snafu::{ensure, OptionExt, ResultExt};
use std::collections::HashMap;

/// When a role has no usable `x-signing-period`, online roles are resigned
/// within this fixed window before expiry. Thirteen hours gives a few retry
/// opportunities to automation that runs every few hours.
const ONLINE_SIGNING_WINDOW_HOURS: i64 = 13;

/// The automation-facing repository: snapshot/timestamp maintenance and
/// expiry-driven version bumps.
#[derive(Debug)]
pub struct OnlineRepository<'a> {
    store: &'a RepositoryStore,
    registry: &'a SignerRegistry,
    clock: &'a dyn Clock,
}

impl<'a> OnlineRepository<'a> {
    /// An online repository over `store`, signing through `registry`.
    pub fn new(
        store: &'a RepositoryStore,
        registry: &'a SignerRegistry,
        clock: &'a dyn Clock,
    ) -> Self {
        OnlineRepository {
            store,
            registry,
            clock,
        }
    }

    /// The store this repository operates on.
    pub fn store(&self) -> &RepositoryStore {
        self.store
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock
    }

    /// How long before expiry `role` must be resigned.
    fn signing_window(&self, role: &str, md: &Metadata) -> Result<Duration> {
        if is_online_role(role) {
            let root_md = self.store.open("root")?;
            let root = root_md.signed.as_root()?;
            let role_type = online_role_type(role);
            let configured = root
                .roles
                .get(&role_type)
                .and_then(|entry| entry.signing_period)
                .filter(|days| *days != 0);
            Ok(match configured {
                Some(days) => Duration::days(i64::from(days)),
                None => Duration::hours(ONLINE_SIGNING_WINDOW_HOURS),
            })
        } else {
            let days = match md.signed.signing_period() {
                Some(days) => days,
                None => self.expiry_days(role, md)? / 2,
            };
            Ok(Duration::days(i64::from(days)))
        }
    }

    /// The expiry horizon for `role`, in days.
    pub(crate) fn expiry_days(&self, role: &str, md: &Metadata) -> Result<u32> {
        if is_online_role(role) {
            let root_md = self.store.open("root")?;
            let root = root_md.signed.as_root()?;
            let role_type = online_role_type(role);
            if let Some(days) = root
                .roles
                .get(&role_type)
                .and_then(|entry| entry.expiry_period)
            {
                return Ok(days);
            }
        }
        Ok(md
            .signed
            .expiry_period()
            .unwrap_or(crate::event::DEFAULT_EXPIRY_DAYS))
    }

    /// Create a new version of `role` if it is inside its signing window,
    /// returning the new version; `None` when no resign is due yet.
    ///
    /// Online roles are bumped and fully re-signed. Offline roles are
    /// bumped with placeholder signatures only: automation holds no
    /// offline keys, and the unsigned bump is what opens a signing event
    /// for the humans who do.
    pub fn bump_if_expiring(&self, role: &str) -> Result<Option<u64>> {
        let md = self.store.open(role)?;
        let window = self.signing_window(role, &md)?;
        if self.clock.now() + window < md.signed.expires() {
            debug!(
                "{} expires {}, outside its signing window; nothing to do",
                role,
                md.signed.expires()
            );
            return Ok(None);
        }

        let version = if is_online_role(role) {
            self.close_online(role, md)?
        } else {
            self.close_offline(role, md)?
        };
        info!("bumped expiring '{}' to version {}", role, version);
        Ok(Some(version))
    }

    /// Rebuild the snapshot from the current targets metadata versions.
    /// Returns `(true, meta)` when a new snapshot was written, `(false,
    /// None)` when nothing changed. Call [`timestamp`](Self::timestamp)
    /// afterwards to refresh the pointer.
    pub fn snapshot(&self) -> Result<(bool, Option<MetaFile>)> {
        let mut snapshot_md = self.store.open("snapshot")?;
        let new_meta = self.targets_meta()?;
        {
            let snapshot = snapshot_md.signed.as_snapshot_mut()?;
            let unchanged = snapshot.meta.len() == new_meta.len()
                && new_meta.iter().all(|(filename, meta)| {
                    snapshot.meta.get(filename).map(|m| m.version) == Some(meta.version)
                });
            if unchanged {
                debug!("snapshot already describes current metadata");
                return Ok((false, None));
            }
            snapshot.meta = new_meta;
        }
        let version = self.close_online("snapshot", snapshot_md)?;
        info!("snapshot updated to version {}", version);
        Ok((true, Some(MetaFile::new(version))))
    }

    /// Write a new timestamp pointing at the current snapshot version.
    pub fn timestamp(&self) -> Result<MetaFile> {
        let snapshot_version = self.store.open("snapshot")?.signed.version();
        let mut md = self.store.open("timestamp")?;
        {
            let timestamp = md.signed.as_timestamp_mut()?;
            timestamp.meta.clear();
            timestamp
                .meta
                .insert("snapshot.json".to_string(), MetaFile::new(snapshot_version));
        }
        let version = self.close_online("timestamp", md)?;
        info!("timestamp updated to version {}", version);
        Ok(MetaFile::new(version))
    }

    /// `filename -> version` for every non-snapshot/timestamp metadata
    /// file: the top-level targets role and each delegated role.
    fn targets_meta(&self) -> Result<HashMap<String, MetaFile>> {
        let targets_md = self.store.open("targets")?;
        let mut meta = HashMap::new();
        meta.insert(
            "targets.json".to_string(),
            MetaFile::new(targets_md.signed.version()),
        );
        for name in targets_md.signed.as_targets()?.role_names() {
            let role_md = self.store.open(name)?;
            meta.insert(
                format!("{}.json", name),
                MetaFile::new(role_md.signed.version()),
            );
        }
        Ok(meta)
    }

    /// Bump, re-sign with every online signer, verify to threshold, and
    /// persist. Partial signatures never reach disk.
    fn close_online(&self, role: &str, mut md: Metadata) -> Result<u64> {
        let version = md.signed.version() + 1;
        md.signed.set_version(version);
        let days = self.expiry_days(role, &md)?;
        md.signed
            .set_expires(expiry_after_days(self.clock, days));

        let root_md = self.store.open("root")?;
        let root = root_md.signed.as_root()?;
        let role_type = online_role_type(role);
        let canonical = md.signed.canonical_form()?;
        let rng = SystemRandom::new();

        md.signatures.clear();
        for (keyid, key) in root.keys(role_type) {
            let uri = key.online_uri().context(error::MissingOnlineUriSnafu {
                keyid: keyid.to_string(),
            })?;
            let source = self.registry.source_for(uri)?;
            let signer = source
                .as_sign()
                .context(error::SignerBackendSnafu { uri })?;
            let sig = signer
                .sign(&canonical, &rng)
                .context(error::SignerBackendSnafu { uri })?;
            ensure!(
                key.verify(&canonical, &sig),
                error::UnverifiedSignatureSnafu {
                    role,
                    keyid: keyid.to_string(),
                }
            );
            md.signatures.push(Signature {
                keyid: keyid.clone(),
                sig: Decoded::from(sig),
            });
        }

        // The threshold check is what makes a partial write impossible.
        verify_role(&root_md.signed, role, &md)?;
        self.store.write(role, &md)?;
        Ok(version)
    }

    /// Bump an offline role to trigger a signing event: new version, fresh
    /// expiry, placeholder signatures for every expected key.
    fn close_offline(&self, role: &str, mut md: Metadata) -> Result<u64> {
        let version = md.signed.version() + 1;
        md.signed.set_version(version);
        let days = self.expiry_days(role, &md)?;
        md.signed
            .set_expires(expiry_after_days(self.clock, days));

        let delegator = if role == "root" {
            md.signed.clone()
        } else {
            self.store.open(delegator_of(role))?.signed
        };
        md.signatures.clear();
        for (keyid, _) in delegator.keys_for_role(role)? {
            md.signatures.push(Signature {
                keyid: keyid.clone(),
                sig: Decoded::from(Vec::new()),
            });
        }
        self.store.write(role, &md)?;
        Ok(version)
    }
}

/// Maps an online role name to its `RoleType`. Callers guard with
/// [`is_online_role`] first.
fn online_role_type(role: &str) -> RoleType {
    match role {
        "snapshot" => RoleType::Snapshot,
        _ => RoleType::Timestamp,
    }
}
