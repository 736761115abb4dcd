// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::schema::decoded::{Decoded, Hex};
use crate::schema::key::Key;
use std::collections::HashMap;

/// An iterator over the keys declared for a role: joins a list of key IDs
/// against a key map, skipping IDs with no matching descriptor.
pub(super) struct KeysIter<'a> {
    pub(super) keyids_iter: std::slice::Iter<'a, Decoded<Hex>>,
    pub(super) keys: &'a HashMap<Decoded<Hex>, Key>,
}

impl<'a> Iterator for KeysIter<'a> {
    type Item = (&'a Decoded<Hex>, &'a Key);

    fn next(&mut self) -> Option<Self::Item> {
        for keyid in self.keyids_iter.by_ref() {
            if let Some(key) = self.keys.get(keyid) {
                return Some((keyid, key));
            }
        }
        None
    }
}
