// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-branch signing-event state: invitations that have been extended
//! but not yet accepted. Stored as `.signing-event-state` beside the
//! metadata files, and removed entirely once no invitations remain.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Pending invitations for the current signing event, keyed by signer
/// identity (e.g. `@alice`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningEventState {
    /// Maps an invited identity to the roles it has been invited to sign.
    #[serde(default)]
    pub invites: BTreeMap<String, Vec<String>>,
}

impl SigningEventState {
    /// True when no invitations are pending; the state file is deleted in
    /// this case.
    pub fn is_empty(&self) -> bool {
        self.invites.values().all(Vec::is_empty)
    }

    /// Record that `identity` has been invited to become a signer of `role`.
    pub fn invite(&mut self, identity: &str, role: &str) {
        let roles = self.invites.entry(identity.to_string()).or_default();
        if !roles.iter().any(|r| r == role) {
            roles.push(role.to_string());
        }
    }

    /// Withdraw the invitation of `identity` to `role`, if one exists.
    pub fn retract(&mut self, identity: &str, role: &str) {
        if let Some(roles) = self.invites.get_mut(identity) {
            roles.retain(|r| r != role);
            if roles.is_empty() {
                self.invites.remove(identity);
            }
        }
    }

    /// Withdraw every invitation to `role`, for any identity.
    pub fn retract_role(&mut self, role: &str) {
        for roles in self.invites.values_mut() {
            roles.retain(|r| r != role);
        }
        self.invites.retain(|_, roles| !roles.is_empty());
    }

    /// The roles `identity` has open invitations for.
    pub fn invited_roles(&self, identity: &str) -> &[String] {
        self.invites
            .get(identity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The identities invited to become signers of `role`.
    pub fn invitees_of(&self, role: &str) -> BTreeSet<String> {
        self.invites
            .iter()
            .filter(|(_, roles)| roles.iter().any(|r| r == role))
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    /// True if any of `roles` has an open invitation.
    pub fn any_invites_for<'a, I>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        roles.into_iter().any(|role| !self.invitees_of(role).is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::SigningEventState;

    #[test]
    fn invite_lifecycle() {
        let mut state = SigningEventState::default();
        assert!(state.is_empty());

        state.invite("@bob", "root");
        state.invite("@bob", "root");
        state.invite("@bob", "targets");
        assert_eq!(state.invited_roles("@bob"), ["root", "targets"]);
        assert_eq!(state.invitees_of("root").len(), 1);
        assert!(state.any_invites_for(vec!["root"]));

        state.retract("@bob", "root");
        assert_eq!(state.invited_roles("@bob"), ["targets"]);
        state.retract("@bob", "targets");
        assert!(state.is_empty());
        assert!(state.invites.is_empty());
    }

    #[test]
    fn file_format() {
        let mut state = SigningEventState::default();
        state.invite("@bob", "root");
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"invites":{"@bob":["root"]}}"#);
    }
}
