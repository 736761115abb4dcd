// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Materializes the known-good baseline a signing event is evaluated
//! against. The engine only ever sees a directory path; where it came from
//! (an existing directory, a git checkout of the merge base) is this
//! module's concern.

use crate::error::{self, Result};
use crate::vcs::Vcs;
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A materialized baseline. Holds the temporary checkout alive for as long
/// as the baseline is in use.
#[derive(Debug)]
pub enum Baseline {
    /// An existing directory managed by the caller.
    Dir(PathBuf),
    /// A temporary checkout created on the caller's behalf.
    Temp {
        /// The checkout directory; removed on drop.
        dir: TempDir,
        /// The metadata directory inside the checkout.
        metadata: PathBuf,
    },
}

impl Baseline {
    /// The baseline metadata directory.
    pub fn metadata_dir(&self) -> &Path {
        match self {
            Baseline::Dir(path) => path,
            Baseline::Temp { metadata, .. } => metadata,
        }
    }
}

/// Produces the known-good metadata directory for the current signing
/// event.
pub trait BaselineSource {
    /// Materialize the baseline, if one exists.
    fn materialize(&self) -> Result<Option<Baseline>>;
}

/// A baseline that already exists on disk (e.g. CI checked out the target
/// branch next to the working tree).
#[derive(Debug, Clone)]
pub struct DirBaseline(pub PathBuf);

impl BaselineSource for DirBaseline {
    fn materialize(&self) -> Result<Option<Baseline>> {
        if self.0.is_dir() {
            Ok(Some(Baseline::Dir(self.0.clone())))
        } else {
            Ok(None)
        }
    }
}

/// Materializes the baseline from version control: a clone of the working
/// tree checked out at `merge_base(upstream, HEAD)`, which is the starting
/// point of the signing event.
#[derive(Debug)]
pub struct GitBaseline<'a, V: Vcs> {
    vcs: &'a V,
    upstream: String,
}

impl<'a, V: Vcs> GitBaseline<'a, V> {
    /// A baseline at the fork point from `upstream` (e.g. `origin/main`).
    pub fn new(vcs: &'a V, upstream: &str) -> Self {
        Self {
            vcs,
            upstream: upstream.to_string(),
        }
    }
}

impl<V: Vcs> BaselineSource for GitBaseline<'_, V> {
    fn materialize(&self) -> Result<Option<Baseline>> {
        let sha = self.vcs.merge_base(&self.upstream, "HEAD")?;
        let dir = TempDir::new().context(error::FileTempCreateSnafu {
            path: std::env::temp_dir(),
        })?;
        self.vcs.clone_to(dir.path(), &sha)?;
        let metadata = dir.path().join("metadata");
        Ok(Some(Baseline::Temp { dir, metadata }))
    }
}
