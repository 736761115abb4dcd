// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quorum is a Git-native operations layer for [TUF repositories].
//!
//! A repository lives as a checked-in tree of JSON metadata files. Changes
//! are proposed on feature branches ("signing events"), signed by offline
//! hardware-key or federated-identity holders through pull requests, and
//! finalized by automation that stamps the short-lived online roles
//! (`snapshot`, `timestamp`) and publishes a versioned distribution tree.
//!
//! The pieces:
//!
//! * [`RepositoryStore`] — the metadata directory, its `root_history/`
//!   archive, and the known-good baseline a proposal is compared against.
//! * [`SigningEvent`] — per-role signing status, invitations, offline
//!   editing and signing.
//! * [`OnlineRepository`] — expiry-driven resigning of the online roles,
//!   snapshot generation, timestamp maintenance, and publishing.
//! * [`schema`] — the typed metadata model with this system's custom
//!   fields (`x-keyowner`, `x-online-uri`, `x-expiry-period`,
//!   `x-signing-period`).
//!
//! Cryptographic backends are reached through [`key_source::SignerRegistry`],
//! keyed by the URI scheme in each key's `x-online-uri` (or the signer's
//! own configuration). The crate ships the `envvar:` source; PKCS#11, cloud
//! KMS and sigstore backends register their own constructors.
//!
//! [TUF repositories]: https://theupdateframework.github.io/
//!
//! # Testing
//!
//! Unit tests are run in the usual manner: `cargo test`.

#![forbid(missing_debug_implementations)]
#![deny(rust_2018_idioms)]
// missing_docs is on its own line to make it easy to comment out when making changes.
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

pub mod baseline;
mod clock;
pub mod error;
mod event;
pub mod key_source;
mod online;
mod publish;
pub mod schema;
pub mod sign;
mod state;
mod store;
pub mod vcs;

pub use crate::clock::{Clock, FixedClock, SystemClock};
pub use crate::error::{Error, Result};
pub use crate::event::{
    EditScope, OfflineConfig, OnlineConfig, SignerState, SigningEvent, SigningStatus, TargetChange,
};
pub use crate::online::OnlineRepository;
pub use crate::state::SigningEventState;
pub use crate::store::{RepositoryStore, EVENT_STATE_FILE, ROOT_HISTORY_DIR};
