// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Unattended maintenance of the online roles: snapshot generation,
//! timestamp refresh, and expiry-driven resigning.


use chrono::Duration;
use quorum::key_source::SignerRegistry;
use quorum::schema::{verify_role, MetaFile};
use quorum::{FixedClock, OnlineRepository, RepositoryStore};
use tempfile::TempDir;
use test_utils::{bootstrap_repo, repo_dirs, test_clock};

fn online_repo<'a>(
    store: &'a RepositoryStore,
    registry: &'a SignerRegistry,
    clock: &'a FixedClock,
) -> OnlineRepository<'a> {
    OnlineRepository::new(store, registry, clock)
}

#[test]
fn snapshot_and_timestamp_generation() {
    let dir = TempDir::new().unwrap();
    let (metadata, _) = repo_dirs(&dir);
    let store = RepositoryStore::new(&metadata);
    bootstrap_repo(&store, "@a", "OLG_KA", "OLG_K1");

    let registry = SignerRegistry::default();
    let clock = test_clock();
    let online = online_repo(&store, &registry, &clock);

    // First run: snapshot springs into existence at version 1.
    let (changed, meta) = online.snapshot().unwrap();
    assert!(changed);
    assert_eq!(meta.unwrap().version, 1);
    online.timestamp().unwrap();

    let root = store.open("root").unwrap();
    let snapshot = store.open("snapshot").unwrap();
    let timestamp = store.open("timestamp").unwrap();
    verify_role(&root.signed, "snapshot", &snapshot).unwrap();
    verify_role(&root.signed, "timestamp", &timestamp).unwrap();

    // Snapshot consistency: the meta lists exactly the on-disk targets
    // metadata at its current version.
    let snapshot_payload = snapshot.signed.as_snapshot().unwrap();
    assert_eq!(
        snapshot_payload.meta,
        maplit::hashmap! {
            "targets.json".to_string() => MetaFile::new(
                store.open("targets").unwrap().signed.version(),
            ),
        }
    );
    assert_eq!(
        timestamp.signed.as_timestamp().unwrap().meta["snapshot.json"].version,
        snapshot.signed.version()
    );

    // Second run without any metadata change: nothing to do.
    let (changed, meta) = online.snapshot().unwrap();
    assert!(!changed);
    assert!(meta.is_none());
    assert_eq!(store.open("snapshot").unwrap().signed.version(), 1);
}

/// Scenario: timestamp expires in six hours; the default online signing
/// window is thirteen, so a bump is due. Right after the bump, nothing is.
#[test]
fn bump_if_expiring_timestamp() {
    let dir = TempDir::new().unwrap();
    let (metadata, _) = repo_dirs(&dir);
    let store = RepositoryStore::new(&metadata);
    bootstrap_repo(&store, "@a", "OLB_KA", "OLB_K1");

    let registry = SignerRegistry::default();
    let clock = test_clock();
    let online = online_repo(&store, &registry, &clock);
    online.snapshot().unwrap();
    online.timestamp().unwrap();
    let expires = store.open("timestamp").unwrap().signed.expires();

    // Six hours before expiry, inside the 13-hour window.
    let later = FixedClock(expires - Duration::hours(6));
    let online = online_repo(&store, &registry, &later);
    let bumped = online.bump_if_expiring("timestamp").unwrap();
    assert_eq!(bumped, Some(2));

    let root = store.open("root").unwrap();
    let timestamp = store.open("timestamp").unwrap();
    assert_eq!(timestamp.signed.version(), 2);
    verify_role(&root.signed, "timestamp", &timestamp).unwrap();

    // Immediately afterwards the new expiry is a day out; no bump.
    assert_eq!(online.bump_if_expiring("timestamp").unwrap(), None);
    assert_eq!(store.open("timestamp").unwrap().signed.version(), 2);
}

/// An online write that cannot reach its threshold must not leave a file
/// behind.
#[test]
fn underthresholded_online_write_is_fatal() {
    let dir = TempDir::new().unwrap();
    let (metadata, _) = repo_dirs(&dir);
    let store = RepositoryStore::new(&metadata);
    bootstrap_repo(&store, "@a", "OLF_KA", "OLF_K1");

    let registry = SignerRegistry::default();
    let clock = test_clock();
    let online = online_repo(&store, &registry, &clock);
    online.snapshot().unwrap();
    online.timestamp().unwrap();
    let before = store.open("timestamp").unwrap();

    // Take the signing key away from the backend.
    let saved = std::env::var("OLF_K1").unwrap();
    std::env::remove_var("OLF_K1");
    let expires = before.signed.expires();
    let later = FixedClock(expires - Duration::hours(6));
    let online = online_repo(&store, &registry, &later);
    assert!(online.bump_if_expiring("timestamp").is_err());

    // The on-disk file is untouched.
    let after = store.open("timestamp").unwrap();
    assert_eq!(after, before);

    std::env::set_var("OLF_K1", saved);
}
