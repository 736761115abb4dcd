// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The filesystem-backed metadata store: a metadata directory, an optional
//! known-good baseline directory, and the `root_history/` archive. There is
//! no in-process cache; every operation re-reads, and every write lands via
//! write-to-temp-and-rename so readers observe whole files only.

use crate::clock::Clock;
use crate::error::{self, Result};
use crate::schema::{Metadata, Payload, Root, Signed, Snapshot, Targets, Timestamp, SPEC_VERSION};
use crate::state::SigningEventState;
use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use snafu::ResultExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// The per-branch invitation state file, kept beside the metadata.
pub const EVENT_STATE_FILE: &str = ".signing-event-state";

/// The directory holding every root version ever written.
pub const ROOT_HISTORY_DIR: &str = "root_history";

/// A metadata directory plus an optional known-good baseline directory
/// (the last committed state a signing event is evaluated against).
#[derive(Debug, Clone)]
pub struct RepositoryStore {
    dir: PathBuf,
    baseline_dir: Option<PathBuf>,
}

impl RepositoryStore {
    /// A store over `dir` with no baseline.
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            baseline_dir: None,
        }
    }

    /// A store over `dir`, evaluated against the known-good metadata in
    /// `baseline_dir`.
    pub fn with_baseline<P: Into<PathBuf>, B: Into<PathBuf>>(dir: P, baseline_dir: B) -> Self {
        Self {
            dir: dir.into(),
            baseline_dir: Some(baseline_dir.into()),
        }
    }

    /// The metadata directory.
    pub fn metadata_dir(&self) -> &Path {
        &self.dir
    }

    /// The targets file tree, a sibling of the metadata directory.
    pub fn targets_dir(&self) -> PathBuf {
        match self.dir.parent() {
            Some(parent) => parent.join("targets"),
            None => PathBuf::from("targets"),
        }
    }

    fn filename(&self, role: &str) -> PathBuf {
        self.dir.join(format!("{}.json", role))
    }

    /// Whether a metadata file exists for `role`.
    pub fn exists(&self, role: &str) -> bool {
        self.filename(role).is_file()
    }

    fn read(&self, path: &Path) -> Result<Metadata> {
        let buf = std::fs::read(path).context(error::FileReadSnafu { path })?;
        serde_json::from_slice(&buf).context(error::BadCanonicalFormSnafu { path })
    }

    /// Read metadata for `role`. Absent `snapshot`/`timestamp` yield empty
    /// skeletons at the version-0 sentinel (they are created by automation
    /// on first write); any other absent role is an error.
    pub fn open(&self, role: &str) -> Result<Metadata> {
        let path = self.filename(role);
        if path.is_file() {
            return self.read(&path);
        }
        match role {
            "snapshot" => Ok(skeleton(Payload::Snapshot(Snapshot::new(
                SPEC_VERSION.to_string(),
                0,
                epoch(),
            )))),
            "timestamp" => Ok(skeleton(Payload::Timestamp(Timestamp::new(
                SPEC_VERSION.to_string(),
                0,
                epoch(),
            )))),
            _ => error::RoleMissingSnafu { role }.fail(),
        }
    }

    /// Like [`open`](Self::open), but offline roles that do not exist yet
    /// are created as empty skeletons too. Used by editors when a signing
    /// event introduces a role.
    pub fn open_or_init(&self, role: &str) -> Result<Metadata> {
        if self.exists(role) || crate::schema::is_online_role(role) {
            return self.open(role);
        }
        debug!("creating new {} metadata", role);
        let payload = match role {
            "root" => Payload::Root(Root::new(SPEC_VERSION.to_string(), 0, epoch())),
            "targets" => Payload::Targets(Targets::new(SPEC_VERSION.to_string(), 0, epoch())),
            _ => {
                // Delegated roles never delegate further, so they carry no
                // delegations block at all.
                let mut targets = Targets::new(SPEC_VERSION.to_string(), 0, epoch());
                targets.delegations = None;
                Payload::Targets(targets)
            }
        };
        Ok(skeleton(payload))
    }

    /// Read the known-good metadata for `role`, if a baseline is configured
    /// and has the role.
    pub fn open_baseline(&self, role: &str) -> Result<Option<Metadata>> {
        let baseline_dir = match &self.baseline_dir {
            Some(dir) => dir,
            None => return Ok(None),
        };
        let path = baseline_dir.join(format!("{}.json", role));
        if path.is_file() {
            self.read(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    /// The known-good version of `role`; `0` when the role has no baseline.
    pub fn baseline_version(&self, role: &str) -> Result<u64> {
        Ok(self
            .open_baseline(role)?
            .map(|md| md.signed.version())
            .unwrap_or(0))
    }

    /// Write the full envelope for `role`. Root versions are additionally
    /// archived under `root_history/`; the root chain is append-only and
    /// every version is retained.
    pub fn write(&self, role: &str, md: &Metadata) -> Result<()> {
        let mut buf = serde_json::to_vec_pretty(md)
            .context(error::FileWriteJsonSnafu { path: self.filename(role) })?;
        buf.push(b'\n');

        self.persist(&self.filename(role), &buf)?;

        if let Payload::Root(root) = &md.signed {
            let history = self.dir.join(ROOT_HISTORY_DIR);
            std::fs::create_dir_all(&history).context(error::DirCreateSnafu { path: &history })?;
            self.persist(&history.join(format!("{}.root.json", root.version)), &buf)?;
        }
        Ok(())
    }

    fn persist(&self, path: &Path, buf: &[u8]) -> Result<()> {
        let mut temp =
            NamedTempFile::new_in(&self.dir).context(error::FileTempCreateSnafu { path: &self.dir })?;
        temp.write_all(buf).context(error::FileWriteSnafu { path })?;
        temp.persist(path)
            .context(error::FilePersistSnafu { path })?;
        debug!("wrote '{}'", path.display());
        Ok(())
    }

    /// The names of all roles with a metadata file in the store.
    pub fn roles(&self) -> Result<Vec<String>> {
        let mut roles = Vec::new();
        let entries =
            std::fs::read_dir(&self.dir).context(error::FileReadSnafu { path: &self.dir })?;
        for entry in entries {
            let entry = entry.context(error::FileReadSnafu { path: &self.dir })?;
            let name = entry.file_name();
            if let Some(role) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
                roles.push(role.to_string());
            }
        }
        roles.sort();
        Ok(roles)
    }

    /// Every version in the root history, ascending.
    pub fn root_history_versions(&self) -> Result<Vec<u64>> {
        let history = self.dir.join(ROOT_HISTORY_DIR);
        let mut versions = Vec::new();
        if !history.is_dir() {
            return Ok(versions);
        }
        let entries =
            std::fs::read_dir(&history).context(error::FileReadSnafu { path: &history })?;
        for entry in entries {
            let entry = entry.context(error::FileReadSnafu { path: &history })?;
            let name = entry.file_name();
            let version = name
                .to_str()
                .and_then(|n| n.strip_suffix(".root.json"))
                .and_then(|v| v.parse::<u64>().ok());
            match version {
                Some(version) => versions.push(version),
                None => return error::RootHistoryNameSnafu { path: entry.path() }.fail(),
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }

    /// The path of an archived root version.
    pub fn root_history_file(&self, version: u64) -> PathBuf {
        self.dir
            .join(ROOT_HISTORY_DIR)
            .join(format!("{}.root.json", version))
    }

    /// Load the pending-invitation state, or an empty state when the file
    /// is absent.
    pub fn load_event_state(&self) -> Result<SigningEventState> {
        let path = self.dir.join(EVENT_STATE_FILE);
        if !path.is_file() {
            return Ok(SigningEventState::default());
        }
        let buf = std::fs::read(&path).context(error::FileReadSnafu { path: &path })?;
        serde_json::from_slice(&buf).context(error::FileParseJsonSnafu { path })
    }

    /// Persist the pending-invitation state. An empty state removes the
    /// file so merged branches carry no leftovers.
    pub fn save_event_state(&self, state: &SigningEventState) -> Result<()> {
        let path = self.dir.join(EVENT_STATE_FILE);
        if state.is_empty() {
            if path.is_file() {
                std::fs::remove_file(&path).context(error::FileWriteSnafu { path: &path })?;
            }
            return Ok(());
        }
        let mut buf =
            serde_json::to_vec_pretty(state).context(error::FileWriteJsonSnafu { path: &path })?;
        buf.push(b'\n');
        self.persist(&path, &buf)
    }

    /// True when the serialized form of `role` differs from the baseline
    /// (or the baseline does not have the role).
    pub fn differs_from_baseline(&self, role: &str) -> Result<bool> {
        let baseline_dir = match &self.baseline_dir {
            Some(dir) => dir,
            None => return Ok(true),
        };
        let baseline_path = baseline_dir.join(format!("{}.json", role));
        if !baseline_path.is_file() {
            return Ok(true);
        }
        let current = std::fs::read(self.filename(role))
            .context(error::FileReadSnafu { path: self.filename(role) })?;
        let baseline =
            std::fs::read(&baseline_path).context(error::FileReadSnafu { path: &baseline_path })?;
        Ok(current != baseline)
    }
}

/// Stamp expiries at second granularity so files stay diff-friendly.
pub(crate) fn expiry_after_days(clock: &dyn Clock, days: u32) -> DateTime<Utc> {
    crate::clock::whole_seconds(clock.now() + chrono::Duration::days(i64::from(days)))
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).unwrap()
}

fn skeleton(payload: Payload) -> Metadata {
    Signed {
        signatures: Vec::new(),
        signed: payload,
    }
}

#[cfg(test)]
mod tests {
    use super::RepositoryStore;
    use crate::error::Error;
    use crate::state::SigningEventState;
    use tempfile::TempDir;

    #[test]
    fn online_skeletons_have_version_zero() {
        let dir = TempDir::new().unwrap();
        let store = RepositoryStore::new(dir.path());
        assert_eq!(store.open("snapshot").unwrap().signed.version(), 0);
        assert_eq!(store.open("timestamp").unwrap().signed.version(), 0);
    }

    #[test]
    fn missing_offline_role_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = RepositoryStore::new(dir.path());
        match store.open("root") {
            Err(Error::RoleMissing { role, .. }) => assert_eq!(role, "root"),
            other => panic!("expected RoleMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn event_state_file_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = RepositoryStore::new(dir.path());
        let path = dir.path().join(super::EVENT_STATE_FILE);

        // empty state never creates the file
        store.save_event_state(&SigningEventState::default()).unwrap();
        assert!(!path.exists());

        let mut state = SigningEventState::default();
        state.invite("@bob", "root");
        store.save_event_state(&state).unwrap();
        assert!(path.exists());
        assert_eq!(store.load_event_state().unwrap(), state);

        // emptying the state removes the file
        state.retract("@bob", "root");
        store.save_event_state(&state).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn root_history_versions_sorted() {
        let dir = TempDir::new().unwrap();
        let history = dir.path().join(super::ROOT_HISTORY_DIR);
        std::fs::create_dir(&history).unwrap();
        for v in &[10u64, 2, 1] {
            std::fs::write(history.join(format!("{}.root.json", v)), b"{}").unwrap();
        }
        let store = RepositoryStore::new(dir.path());
        assert_eq!(store.root_history_versions().unwrap(), vec![1, 2, 10]);
    }
}
