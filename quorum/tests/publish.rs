// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Publishing the consistent-snapshot distribution tree.


use quorum::key_source::SignerRegistry;
use quorum::{OnlineRepository, RepositoryStore, SigningEvent};
use tempfile::TempDir;
use test_utils::{bootstrap_repo, repo_dirs, snapshot_as_baseline, sources, test_clock};

#[test]
fn publish_emits_versioned_tree() {
    let dir = TempDir::new().unwrap();
    let (metadata, targets_dir) = repo_dirs(&dir);
    let store = RepositoryStore::new(&metadata);
    bootstrap_repo(&store, "@a", "PUB_KA", "PUB_K1");
    let clock = test_clock();

    // Commit one target file into the targets role.
    std::fs::write(targets_dir.join("file1.txt"), b"hello world").unwrap();
    let mut event = SigningEvent::open(&store, &clock, "@a", sources("PUB_KA")).unwrap();
    event.update_targets().unwrap();

    let registry = SignerRegistry::default();
    let online = OnlineRepository::new(&store, &registry, &clock);
    online.snapshot().unwrap();
    online.timestamp().unwrap();

    let out = dir.path().join("publish");
    online.publish(&out).unwrap();

    // P7: |root_history| + snapshot + timestamp + |snapshot.meta| files.
    let snapshot = store.open("snapshot").unwrap();
    let meta_count = snapshot.signed.as_snapshot().unwrap().meta.len();
    let history_count = store.root_history_versions().unwrap().len();
    let published: Vec<_> = std::fs::read_dir(out.join("metadata"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(published.len(), history_count + 1 + 1 + meta_count);
    assert!(published.contains(&"1.root.json".to_string()));
    assert!(published.contains(&"1.snapshot.json".to_string()));
    assert!(published.contains(&"timestamp.json".to_string()));
    assert!(published.contains(&"1.targets.json".to_string()));

    // The published targets metadata is byte-identical to the committed
    // one.
    assert_eq!(
        std::fs::read(out.join("metadata/1.targets.json")).unwrap(),
        std::fs::read(metadata.join("targets.json")).unwrap()
    );

    // One copy of the target per declared hash, under its hash-prefixed
    // name.
    let targets_md = store.open("targets").unwrap();
    let target = &targets_md.signed.as_targets().unwrap().targets["file1.txt"];
    let hash = hex::encode(&target.hashes.sha256);
    let copy = out.join("targets").join(format!("{}.file1.txt", hash));
    assert_eq!(std::fs::read(&copy).unwrap(), b"hello world");
}

#[test]
fn modified_target_flows_through_snapshot_to_publish() {
    let dir = TempDir::new().unwrap();
    let (metadata, targets_dir) = repo_dirs(&dir);
    bootstrap_repo(&RepositoryStore::new(&metadata), "@a", "PUBM_KA", "PUBM_K1");
    let clock = test_clock();

    std::fs::write(targets_dir.join("file1.txt"), b"v1").unwrap();
    {
        let store = RepositoryStore::new(&metadata);
        let mut event = SigningEvent::open(&store, &clock, "@a", sources("PUBM_KA")).unwrap();
        event.update_targets().unwrap();
        let registry = SignerRegistry::default();
        let online = OnlineRepository::new(&store, &registry, &clock);
        online.snapshot().unwrap();
        online.timestamp().unwrap();
    }

    // Merge, then a later event modifies the target.
    let baseline = dir.path().join("baseline");
    snapshot_as_baseline(&metadata, &baseline);
    let store = RepositoryStore::with_baseline(&metadata, &baseline);
    std::fs::write(targets_dir.join("file1.txt"), b"v2 with more bytes").unwrap();
    let mut event = SigningEvent::open(&store, &clock, "@a", sources("PUBM_KA")).unwrap();
    event.update_targets().unwrap();

    let targets = store.open("targets").unwrap();
    assert_eq!(targets.signed.version(), 2);

    let registry = SignerRegistry::default();
    let online = OnlineRepository::new(&store, &registry, &clock);
    let (changed, _) = online.snapshot().unwrap();
    assert!(changed);
    online.timestamp().unwrap();

    let snapshot = store.open("snapshot").unwrap();
    assert_eq!(
        snapshot.signed.as_snapshot().unwrap().meta["targets.json"].version,
        2
    );

    let out = dir.path().join("publish");
    online.publish(&out).unwrap();
    assert!(out.join("metadata/2.targets.json").is_file());
    let target = &targets.signed.as_targets().unwrap().targets["file1.txt"];
    let hash = hex::encode(&target.hashes.sha256);
    assert!(out
        .join("targets")
        .join(format!("{}.file1.txt", hash))
        .is_file());
}

#[test]
fn publish_refuses_overreaching_expiry() {
    let dir = TempDir::new().unwrap();
    let (metadata, _) = repo_dirs(&dir);
    let store = RepositoryStore::new(&metadata);
    bootstrap_repo(&store, "@a", "PUBR_KA", "PUBR_K1");
    let clock = test_clock();

    let registry = SignerRegistry::default();
    let online = OnlineRepository::new(&store, &registry, &clock);
    online.snapshot().unwrap();
    online.timestamp().unwrap();

    // Stretch targets' expiry beyond its declared period.
    let mut targets = store.open("targets").unwrap();
    targets
        .signed
        .set_expires(clock.0 + chrono::Duration::days(2 * 365));
    store.write("targets", &targets).unwrap();

    let out = dir.path().join("publish");
    match online.publish(&out) {
        Err(quorum::Error::ExpiryTooFar { role, .. }) => assert_eq!(role, "targets"),
        other => panic!("expected ExpiryTooFar, got {:?}", other.map(|_| ())),
    }
}
