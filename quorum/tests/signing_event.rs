// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signing-event flows against a known-good baseline: invitations,
//! acceptance, signing, and the advisory status checks.


use quorum::schema::{verify_role, RoleType};
use quorum::{
    OfflineConfig, RepositoryStore, SignerState, SigningEvent, TargetChange, EVENT_STATE_FILE,
};
use tempfile::TempDir;
use test_utils::{bootstrap_repo, env_key, repo_dirs, snapshot_as_baseline, sources, test_clock};

/// Scenario: the repository from bootstrap is merged, then a new signing
/// event invites a second root signer with a raised threshold.
#[test]
fn invite_then_accept_then_sign() {
    let dir = TempDir::new().unwrap();
    let (metadata, _) = repo_dirs(&dir);
    let baseline = dir.path().join("baseline");

    bootstrap_repo(&RepositoryStore::new(&metadata), "@a", "INV_KA", "INV_K1");
    snapshot_as_baseline(&metadata, &baseline);
    let store = RepositoryStore::with_baseline(&metadata, &baseline);
    let clock = test_clock();

    // --- Invite @b as a second root signer, threshold 2.
    let mut event = SigningEvent::open(&store, &clock, "@a", sources("INV_KA")).unwrap();
    let config = OfflineConfig {
        signers: vec!["@a".to_string(), "@b".to_string()],
        threshold: 2,
        expiry_period: 365,
        signing_period: 60,
    };
    event.set_role_config("root", &config, None).unwrap();

    // The invitation is recorded in the event state file...
    let state_file = metadata.join(EVENT_STATE_FILE);
    assert!(state_file.is_file());
    let state: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&state_file).unwrap()).unwrap();
    assert_eq!(state["invites"]["@b"], serde_json::json!(["root"]));

    // ...and root was not bumped: @b has no key yet, so the delegator diff
    // is the invitation only.
    let root = store.open("root").unwrap();
    assert_eq!(root.signed.version(), 1);

    let status = event.status("root").unwrap();
    assert_eq!(
        status.invites.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["@b"]
    );
    assert_eq!(status.threshold, 2);
    assert!(!status.valid);

    // --- @b accepts the invitation.
    let kb = env_key("INV_KB");
    event.accept_invitation("root", "@b", kb.clone()).unwrap();

    let root = store.open("root").unwrap();
    assert_eq!(root.signed.version(), 2);
    assert!(!state_file.exists());

    // P8: the key landed in root's delegation, bound to @b.
    let root_payload = root.signed.as_root().unwrap();
    let kb_id = kb.key_id().unwrap();
    assert!(root_payload.roles[&RoleType::Root].keyids.contains(&kb_id));
    assert_eq!(
        root_payload.keys.get(&kb_id).unwrap().keyowner(),
        Some("@b")
    );

    // @a signed during the accepting edit; @b has not signed yet.
    let status = event.status("root").unwrap();
    assert!(status.signed.contains("@a"));
    assert!(status.missing.contains("@b"));
    assert!(!status.valid);

    // --- @b signs.
    let event_b = SigningEvent::open(&store, &clock, "@b", sources("INV_KB")).unwrap();
    assert_eq!(event_b.unsigned_roles().unwrap(), vec!["root"]);
    assert_eq!(event_b.signer_state().unwrap(), SignerState::SignatureNeeded);
    event_b.sign("root").unwrap();

    let status = event_b.status("root").unwrap();
    assert!(status.signed.contains("@a") && status.signed.contains("@b"));
    assert!(status.valid, "{:?}", status.message);

    // The new root satisfies the previous root as well as itself.
    let root = store.open("root").unwrap();
    let prev = store.open_baseline("root").unwrap().unwrap();
    verify_role(&prev.signed, "root", &root).unwrap();
    verify_role(&root.signed, "root", &root).unwrap();
}

/// The invited identity shows up as `Invited` when they open the event.
#[test]
fn invitee_sees_invited_state() {
    let dir = TempDir::new().unwrap();
    let (metadata, _) = repo_dirs(&dir);
    let baseline = dir.path().join("baseline");
    bootstrap_repo(&RepositoryStore::new(&metadata), "@a", "INVS_KA", "INVS_K1");
    snapshot_as_baseline(&metadata, &baseline);
    let store = RepositoryStore::with_baseline(&metadata, &baseline);
    let clock = test_clock();

    let mut event = SigningEvent::open(&store, &clock, "@a", sources("INVS_KA")).unwrap();
    let config = OfflineConfig {
        signers: vec!["@a".to_string(), "@b".to_string()],
        threshold: 2,
        expiry_period: 365,
        signing_period: 60,
    };
    event.set_role_config("root", &config, None).unwrap();

    let event_b = SigningEvent::open(&store, &clock, "@b", Vec::new()).unwrap();
    assert_eq!(event_b.signer_state().unwrap(), SignerState::Invited);
    assert_eq!(event_b.state().invited_roles("@b"), ["root"]);
}

/// Scenario: an expiry beyond the declared period is an advisory failure,
/// not a write error.
#[test]
fn expiry_regression_guard() {
    let dir = TempDir::new().unwrap();
    let (metadata, _) = repo_dirs(&dir);
    let baseline = dir.path().join("baseline");
    bootstrap_repo(&RepositoryStore::new(&metadata), "@a", "EXP_KA", "EXP_K1");
    snapshot_as_baseline(&metadata, &baseline);
    let store = RepositoryStore::with_baseline(&metadata, &baseline);
    let clock = test_clock();

    // Stretch targets' expiry to twice its period; the write itself is
    // accepted, status is advisory.
    let mut targets = store.open("targets").unwrap();
    let bogus = clock.0 + chrono::Duration::days(2 * 365);
    targets.signed.set_version(2);
    targets.signed.set_expires(bogus);
    store.write("targets", &targets).unwrap();

    let event = SigningEvent::open(&store, &clock, "@a", sources("EXP_KA")).unwrap();
    let status = event.status("targets").unwrap();
    assert!(!status.valid);
    let message = status.message.unwrap();
    assert!(message.contains("expiry period"), "{}", message);
}

/// A delegated role is created through the same config edit, claims its
/// own subtree, and target files get assigned to it.
#[test]
fn delegated_role_lifecycle() {
    let dir = TempDir::new().unwrap();
    let (metadata, targets_dir) = repo_dirs(&dir);
    let baseline = dir.path().join("baseline");
    bootstrap_repo(&RepositoryStore::new(&metadata), "@a", "DEL_KA", "DEL_K1");
    snapshot_as_baseline(&metadata, &baseline);
    let store = RepositoryStore::with_baseline(&metadata, &baseline);
    let clock = test_clock();

    let mut event = SigningEvent::open(&store, &clock, "@a", sources("DEL_KA")).unwrap();
    let config = OfflineConfig {
        signers: vec!["@a".to_string()],
        threshold: 1,
        expiry_period: 90,
        signing_period: 30,
    };
    event.set_role_config("demo", &config, None).unwrap();

    // The delegation exists on targets with the default path pattern.
    let targets = store.open("targets").unwrap();
    let delegated = targets
        .signed
        .as_targets()
        .unwrap()
        .delegated_role("demo")
        .unwrap()
        .clone();
    assert_eq!(delegated.paths.vec(), &vec!["demo/*".to_string()]);
    assert!(delegated.terminating);

    // @a already holds a key in the targets delegation? No: the new role
    // starts keyless, so @a is invited to it.
    assert_eq!(event.state().invited_roles("@a"), ["demo"]);

    // Files under demo/ belong to the new role.
    std::fs::write(targets_dir.join("top.txt"), b"top-level").unwrap();
    std::fs::create_dir_all(targets_dir.join("demo")).unwrap();
    std::fs::write(targets_dir.join("demo/app.bin"), b"payload").unwrap();

    let changes = event.target_changes().unwrap();
    assert_eq!(
        changes["targets"],
        vec![TargetChange::Added("top.txt".to_string())]
    );
    assert_eq!(
        changes["demo"],
        vec![TargetChange::Added("demo/app.bin".to_string())]
    );

    let applied = event.update_targets().unwrap();
    assert_eq!(applied.len(), 2);
    let demo = store.open("demo").unwrap();
    let demo_targets = demo.signed.as_targets().unwrap();
    assert!(demo_targets.targets.contains_key("demo/app.bin"));
    assert_eq!(demo_targets.targets["demo/app.bin"].length, 7);
}

/// Delegated metadata that reaches outside its path patterns is flagged.
#[test]
fn out_of_pattern_target_invalidates_status() {
    let dir = TempDir::new().unwrap();
    let (metadata, targets_dir) = repo_dirs(&dir);
    let baseline = dir.path().join("baseline");
    bootstrap_repo(&RepositoryStore::new(&metadata), "@a", "OOP_KA", "OOP_K1");
    snapshot_as_baseline(&metadata, &baseline);
    let store = RepositoryStore::with_baseline(&metadata, &baseline);
    let clock = test_clock();

    let mut event = SigningEvent::open(&store, &clock, "@a", sources("OOP_KA")).unwrap();
    let config = OfflineConfig {
        signers: vec!["@a".to_string()],
        threshold: 1,
        expiry_period: 90,
        signing_period: 30,
    };
    event.set_role_config("demo", &config, None).unwrap();
    std::fs::create_dir_all(targets_dir.join("demo")).unwrap();
    std::fs::write(targets_dir.join("demo/app.bin"), b"payload").unwrap();
    event.update_targets().unwrap();

    // Sneak an out-of-pattern path into the delegated metadata.
    let mut demo = store.open("demo").unwrap();
    {
        let targets = demo.signed.as_targets_mut().unwrap();
        let claimed = targets.targets["demo/app.bin"].clone();
        targets.targets.insert("elsewhere/app.bin".to_string(), claimed);
    }
    store.write("demo", &demo).unwrap();

    let status = event.status("demo").unwrap();
    assert!(!status.valid);
    assert!(status.message.unwrap().contains("Invalid delegation"));
}
