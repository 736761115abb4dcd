// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A thin port over the version-control system. The engine itself never
//! touches git; drivers use this port for the handful of operations a
//! signing event needs (diff base discovery, committing and pushing the
//! metadata changes, materializing the known-good baseline).

use crate::error::{self, Result};
use log::debug;
use snafu::{ensure, ResultExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Version-control operations consumed by signing-event drivers.
pub trait Vcs {
    /// The top level of the working tree.
    fn toplevel(&self) -> Result<PathBuf>;

    /// The best common ancestor of two revisions.
    fn merge_base(&self, a: &str, b: &str) -> Result<String>;

    /// Clone the working tree into `path` and check out `sha` there.
    fn clone_to(&self, path: &Path, sha: &str) -> Result<()>;

    /// Stage the given paths.
    fn add(&self, paths: &[&Path]) -> Result<()>;

    /// Commit the staged changes.
    fn commit(&self, message: &str) -> Result<()>;

    /// Push `refspec` to `remote`.
    fn push(&self, remote: &str, refspec: &str) -> Result<()>;

    /// The name of the currently checked-out branch.
    fn show_current_branch(&self) -> Result<String>;

    /// Paths changed since `revision`.
    fn changed_files(&self, revision: &str) -> Result<Vec<PathBuf>>;
}

/// A `Vcs` implementation that shells out to `git`.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    /// A git client operating in `workdir`.
    pub fn new<P: Into<PathBuf>>(workdir: P) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    fn git(&self, args: &[&str]) -> Result<Output> {
        let command_str = format!("git {}", args.join(" "));
        debug!("running '{}'", command_str);
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .context(error::CommandExecSnafu {
                command_str: command_str.clone(),
            })?;
        ensure!(
            output.status.success(),
            error::CommandStatusSnafu {
                command_str,
                status: output.status,
            }
        );
        Ok(output)
    }

    fn git_stdout(&self, args: &[&str]) -> Result<String> {
        let command_str = format!("git {}", args.join(" "));
        let output = self.git(args)?;
        let stdout =
            String::from_utf8(output.stdout).context(error::CommandUtf8Snafu { command_str })?;
        Ok(stdout.trim().to_string())
    }
}

impl Vcs for GitCli {
    fn toplevel(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(
            self.git_stdout(&["rev-parse", "--show-toplevel"])?,
        ))
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<String> {
        self.git_stdout(&["merge-base", a, b])
    }

    fn clone_to(&self, path: &Path, sha: &str) -> Result<()> {
        let dest = path.to_string_lossy();
        self.git(&["clone", "--quiet", ".", dest.as_ref()])?;
        self.git(&["-C", dest.as_ref(), "checkout", "--quiet", sha])?;
        Ok(())
    }

    fn add(&self, paths: &[&Path]) -> Result<()> {
        let mut args = vec!["add", "--"];
        let paths: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        args.extend(paths.iter().map(String::as_str));
        self.git(&args)?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.git(&["commit", "-m", message])?;
        Ok(())
    }

    fn push(&self, remote: &str, refspec: &str) -> Result<()> {
        self.git(&["push", remote, refspec])?;
        Ok(())
    }

    fn show_current_branch(&self) -> Result<String> {
        self.git_stdout(&["branch", "--show-current"])
    }

    fn changed_files(&self, revision: &str) -> Result<Vec<PathBuf>> {
        let stdout = self.git_stdout(&["diff", "--name-only", revision])?;
        Ok(stdout
            .lines()
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}
