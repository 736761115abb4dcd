// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured configuration edits for offline roles and the online role
//! pair. These are the only mutations a signing event applies to
//! delegations: who signs a role, with what threshold, and on what expiry
//! schedule.

use crate::error::{self, Result};
use crate::event::scope::DEFAULT_EXPIRY_DAYS;
use crate::event::SigningEvent;
use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use crate::schema::{delegator_of, is_online_role, Payload, RoleType};
use log::info;
use snafu::ensure;

/// Configuration of an offline role (`root`, `targets`, or a delegated
/// role): its signers, threshold, and expiry schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineConfig {
    /// The identities expected to sign the role.
    pub signers: Vec<String>,
    /// How many of the signers must sign.
    pub threshold: u64,
    /// Days from signing until the metadata expires.
    pub expiry_period: u32,
    /// Days before expiry at which a resign is requested.
    pub signing_period: u32,
}

impl OfflineConfig {
    /// A single-signer configuration with default periods.
    pub fn new(signer: &str) -> Self {
        OfflineConfig {
            signers: vec![signer.to_string()],
            threshold: 1,
            expiry_period: DEFAULT_EXPIRY_DAYS,
            signing_period: DEFAULT_EXPIRY_DAYS / 2,
        }
    }
}

/// Configuration of the online roles. Every listed key signs both
/// `timestamp` and `snapshot`; the periods land on root's role entries
/// because the online payloads are regenerated from scratch by automation.
#[derive(Debug, Clone, PartialEq)]
pub struct OnlineConfig {
    /// The online keys; each must carry an `x-online-uri`.
    pub keys: Vec<Key>,
    /// Days from signing until timestamp expires.
    pub timestamp_expiry: u32,
    /// Days before expiry at which timestamp is resigned. `None` uses the
    /// online default window.
    pub timestamp_signing: Option<u32>,
    /// Days from signing until snapshot expires.
    pub snapshot_expiry: u32,
    /// Days before expiry at which snapshot is resigned. `None` uses the
    /// online default window.
    pub snapshot_signing: Option<u32>,
}

impl SigningEvent<'_> {
    /// Read the signer configuration of an offline role. Invited signers
    /// count as signers even though they hold no key yet.
    pub fn get_role_config(&self, role: &str) -> Result<OfflineConfig> {
        ensure!(
            !is_online_role(role),
            error::OnlineRoleChangedSnafu { role }
        );
        let md = self.store.open(role)?;
        let delegator = if role == "root" {
            md.signed.clone()
        } else {
            self.store.open(delegator_of(role))?.signed
        };

        let (_, threshold) = delegator.delegation(role)?;
        let mut signers: Vec<String> = self.state.invitees_of(role).into_iter().collect();
        for (_, key) in delegator.keys_for_role(role)? {
            if let Some(owner) = key.keyowner() {
                if !signers.iter().any(|signer| signer == owner) {
                    signers.push(owner.to_string());
                }
            }
        }

        let expiry_period = md.signed.expiry_period().unwrap_or(DEFAULT_EXPIRY_DAYS);
        let signing_period = md.signed.signing_period().unwrap_or(expiry_period / 2);
        Ok(OfflineConfig {
            signers,
            threshold,
            expiry_period,
            signing_period,
        })
    }

    /// Apply a signer configuration to an offline role.
    ///
    /// Signers without a key in the delegator are invited rather than
    /// added; their invitation is recorded in the signing-event state. If
    /// the current user is one of the keyless signers and supplied
    /// `signing_key`, the key is bound to the user and added directly. Key
    /// and threshold changes go through an edit of the delegator; expiry
    /// and signing periods through an edit of the role itself. Either edit
    /// aborts when it would change nothing.
    pub fn set_role_config(
        &mut self,
        role: &str,
        config: &OfflineConfig,
        signing_key: Option<Key>,
    ) -> Result<()> {
        ensure!(
            !is_online_role(role),
            error::OnlineRoleChangedSnafu { role }
        );
        let delegator_name = delegator_of(role);

        // Refresh the invitations for this role: everyone configured but
        // keyless is invited, except the current user when they brought a
        // key along.
        self.state.retract_role(role);
        let delegator = self.store.open_or_init(delegator_name)?;
        let mut bind_user_key = None;
        for signer in &config.signers {
            let has_key = delegator
                .signed
                .keys_for_role(role)
                .map(|keys| {
                    keys.iter()
                        .any(|(_, key)| key.keyowner() == Some(signer.as_str()))
                })
                .unwrap_or(false);
            if has_key {
                continue;
            }
            if signer == &self.user {
                if let Some(key) = signing_key.clone() {
                    bind_user_key = Some(key);
                    continue;
                }
            }
            self.state.invite(signer, role);
        }

        // Reshape the delegation itself.
        let mut scope = self.edit(delegator_name)?;
        if let Payload::Targets(targets) = scope.signed_mut() {
            if delegator_name == "targets" {
                targets.ensure_delegated_role(role);
            }
        }

        let current: Vec<(Decoded<Hex>, Option<String>)> = scope
            .signed()
            .keys_for_role(role)?
            .into_iter()
            .map(|(keyid, key)| (keyid.clone(), key.keyowner().map(str::to_string)))
            .collect();
        for (keyid, owner) in current {
            let retained = owner
                .as_deref()
                .map_or(false, |owner| config.signers.iter().any(|s| s == owner));
            if !retained {
                scope.signed_mut().revoke_key(&keyid, role)?;
            }
        }
        if let Some(mut key) = bind_user_key {
            key.set_keyowner(&self.user);
            scope.signed_mut().add_key(key, role)?;
        }
        scope.signed_mut().set_threshold(role, config.threshold)?;

        if scope.changed() {
            let version = scope.commit()?;
            info!(
                "reconfigured '{}' in '{}', now version {}",
                role, delegator_name, version
            );
        } else {
            scope.abort();
        }

        // The role's own expiry schedule.
        let mut scope = self.edit(role)?;
        scope.signed_mut().set_expiry_period(config.expiry_period);
        scope.signed_mut().set_signing_period(config.signing_period);
        if scope.changed() {
            scope.commit()?;
        } else {
            scope.abort();
        }

        self.store.save_event_state(&self.state)
    }

    /// Read the online-role configuration from root.
    pub fn get_online_config(&self) -> Result<OnlineConfig> {
        let root_md = self.store.open("root")?;
        let root = root_md.signed.as_root()?;

        let keys = root
            .keys(RoleType::Timestamp)
            .map(|(_, key)| key.clone())
            .collect();
        let timestamp = root
            .roles
            .get(&RoleType::Timestamp)
            .cloned()
            .unwrap_or_else(crate::schema::RoleKeys::empty);
        let snapshot = root
            .roles
            .get(&RoleType::Snapshot)
            .cloned()
            .unwrap_or_else(crate::schema::RoleKeys::empty);

        Ok(OnlineConfig {
            keys,
            timestamp_expiry: timestamp.expiry_period.unwrap_or(1),
            timestamp_signing: timestamp.signing_period.filter(|days| *days != 0),
            snapshot_expiry: snapshot.expiry_period.unwrap_or(1),
            snapshot_signing: snapshot.signing_period.filter(|days| *days != 0),
        })
    }

    /// Apply an online-role configuration to root. All listed keys are
    /// authorized for both `timestamp` and `snapshot`; keys no longer
    /// listed are revoked from both.
    pub fn set_online_config(&mut self, config: &OnlineConfig) -> Result<()> {
        let mut new_keyids = Vec::new();
        for key in &config.keys {
            ensure!(
                key.online_uri().is_some(),
                error::MissingOnlineUriSnafu {
                    keyid: key.key_id()?.to_string(),
                }
            );
            new_keyids.push(key.key_id()?);
        }

        let mut scope = self.edit("root")?;
        {
            let root = scope.signed_mut().as_root_mut()?;
            for role in &[RoleType::Timestamp, RoleType::Snapshot] {
                let current: Vec<Decoded<Hex>> = root
                    .roles
                    .get(role)
                    .map(|role_keys| role_keys.keyids.clone())
                    .unwrap_or_default();
                for keyid in current {
                    if !new_keyids.contains(&keyid) {
                        root.revoke_key(&keyid, *role);
                    }
                }
                for key in &config.keys {
                    root.add_key(key.clone(), *role)?;
                }
            }

            let timestamp = root
                .roles
                .entry(RoleType::Timestamp)
                .or_insert_with(crate::schema::RoleKeys::empty);
            timestamp.expiry_period = Some(config.timestamp_expiry);
            timestamp.signing_period = config.timestamp_signing;
            let snapshot = root
                .roles
                .entry(RoleType::Snapshot)
                .or_insert_with(crate::schema::RoleKeys::empty);
            snapshot.expiry_period = Some(config.snapshot_expiry);
            snapshot.signing_period = config.snapshot_signing;
        }

        if scope.changed() {
            let version = scope.commit()?;
            info!("reconfigured online roles, root is now version {}", version);
        } else {
            scope.abort();
        }
        Ok(())
    }

    /// Initialize a repository from an empty metadata directory: configure
    /// root and targets signers, then the online keys. The caller supplies
    /// their signing key when they appear among the configured signers.
    pub fn bootstrap(
        &mut self,
        root_config: &OfflineConfig,
        targets_config: &OfflineConfig,
        online_config: &OnlineConfig,
        signing_key: Option<Key>,
    ) -> Result<()> {
        info!("initializing repository as {}", self.user);
        self.set_role_config("root", root_config, signing_key.clone())?;
        self.set_role_config("targets", targets_config, signing_key)?;
        self.set_online_config(online_config)
    }
}
