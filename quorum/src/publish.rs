// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Produces the consistent-snapshot distribution tree: every metadata file
//! reachable under a version-qualified filename, and one copy of each
//! target per declared hash.
//!
//! Layout under the output directory:
//!
//! ```text
//! metadata/
//!   <v>.root.json          every version in root_history
//!   <v>.snapshot.json      the current snapshot
//!   timestamp.json
//!   <v>.<role>.json        every role listed in snapshot's meta
//! targets/
//!   <parent>/<hexhash>.<filename>
//! ```

use crate::error::{self, Result};
use crate::online::OnlineRepository;
use crate::schema::{Metadata, Payload};
use chrono::Duration;
use log::{debug, info};
use snafu::{ensure, ResultExt};
use std::path::Path;

impl OnlineRepository<'_> {
    /// Publish the repository into `outdir`. Refuses to publish any
    /// metadata that is expired or whose expiry exceeds its declared
    /// `x-expiry-period`.
    pub fn publish(&self, outdir: &Path) -> Result<()> {
        let store = self.store();
        let snapshot_md = store.open("snapshot")?;
        let timestamp_md = store.open("timestamp")?;

        self.check_expiry("snapshot", &snapshot_md)?;
        self.check_expiry("timestamp", &timestamp_md)?;
        self.check_expiry("root", &store.open("root")?)?;
        for filename in snapshot_md.signed.as_snapshot()?.meta.keys() {
            let role = filename.trim_end_matches(".json");
            self.check_expiry(role, &store.open(role)?)?;
        }

        let metadata_out = outdir.join("metadata");
        std::fs::create_dir_all(&metadata_out)
            .context(error::DirCreateSnafu { path: &metadata_out })?;

        // The root chain, every version under its versioned name.
        for version in store.root_history_versions()? {
            let src = store.root_history_file(version);
            let dst = metadata_out.join(format!("{}.root.json", version));
            copy(&src, &dst)?;
        }

        // The online pair: snapshot versioned, timestamp always at a
        // stable name so clients can find it.
        copy(
            &store.metadata_dir().join("snapshot.json"),
            &metadata_out.join(format!("{}.snapshot.json", snapshot_md.signed.version())),
        )?;
        copy(
            &store.metadata_dir().join("timestamp.json"),
            &metadata_out.join("timestamp.json"),
        )?;

        // Every targets metadata file snapshot describes.
        for (filename, meta) in &snapshot_md.signed.as_snapshot()?.meta {
            copy(
                &store.metadata_dir().join(filename),
                &metadata_out.join(format!("{}.{}", meta.version, filename)),
            )?;
        }

        self.publish_targets(outdir)?;
        info!("published repository to {}", outdir.display());
        Ok(())
    }

    /// Copy every target of every targets role, one copy per declared
    /// hash, under a hash-prefixed filename.
    fn publish_targets(&self, outdir: &Path) -> Result<()> {
        let store = self.store();
        let targets_dir = store.targets_dir();
        let targets_md = store.open("targets")?;

        let mut roles = vec!["targets".to_string()];
        roles.extend(
            targets_md
                .signed
                .as_targets()?
                .role_names()
                .into_iter()
                .cloned(),
        );

        for role in roles {
            let md = store.open(&role)?;
            let payload = match &md.signed {
                Payload::Targets(targets) => targets,
                _ => continue,
            };
            for (target_path, target) in &payload.targets {
                let src = targets_dir.join(target_path);
                let filename = target_path.rsplit('/').next().unwrap_or(target_path);
                let parent = &target_path[..target_path.len() - filename.len()];
                let dst_dir = outdir.join("targets").join(parent);
                std::fs::create_dir_all(&dst_dir)
                    .context(error::DirCreateSnafu { path: &dst_dir })?;

                let mut digests = vec![hex::encode(&target.hashes.sha256)];
                for value in target.hashes._extra.values() {
                    if let Some(digest) = value.as_str() {
                        digests.push(digest.to_string());
                    }
                }
                for digest in digests {
                    let dst = dst_dir.join(format!("{}.{}", digest, filename));
                    copy(&src, &dst)?;
                    debug!("published target {}", dst.display());
                }
            }
        }
        Ok(())
    }

    /// Publish-time expiry gate: `now < expires <= now + x-expiry-period`.
    fn check_expiry(&self, role: &str, md: &Metadata) -> Result<()> {
        let now = self.clock().now();
        let expires = md.signed.expires();
        ensure!(
            expires > now,
            error::RoleExpiredSnafu { role, expires }
        );
        let days = self.expiry_days(role, md)?;
        let limit = now + Duration::days(i64::from(days));
        ensure!(
            expires <= limit,
            error::ExpiryTooFarSnafu {
                role,
                expires,
                limit,
            }
        );
        Ok(())
    }
}

fn copy(src: &Path, dst: &Path) -> Result<u64> {
    std::fs::copy(src, dst).context(error::FileCopySnafu { src, dst })
}
