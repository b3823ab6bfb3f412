// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Delayed reclamation of secret keys a source no longer references.
//!
//! Each key is an independent state machine on the shared Secret:
//! Active -> PendingRemoval (expiry annotation attached) -> Removed (key and
//! annotation deleted in the same write once the expiry passes). A key seen
//! back in the active reference set has its mark cleared.

use chrono::{Duration, NaiveDateTime};
use k8s_openapi::api::core::v1::Secret;
use std::collections::{BTreeMap, BTreeSet};

use crate::constants::{annotations, PENDING_REMOVAL_TIME_FORMAT};

fn mark_key(data_key: &str) -> String {
    format!("{}{}", annotations::PENDING_REMOVAL_PREFIX, data_key)
}

/// Parse the pending-removal marks off a Secret. Unparseable stamps are
/// ignored, matching a mark that was never written.
pub fn pending_removal_marks(secret: &Secret) -> BTreeMap<String, NaiveDateTime> {
    let mut marks = BTreeMap::new();
    let Some(secret_annotations) = secret.metadata.annotations.as_ref() else {
        return marks;
    };
    for (annotation_key, stamp) in secret_annotations {
        if let Some(data_key) = annotation_key.strip_prefix(annotations::PENDING_REMOVAL_PREFIX) {
            if let Ok(expiry) = NaiveDateTime::parse_from_str(stamp, PENDING_REMOVAL_TIME_FORMAT) {
                marks.insert(data_key.to_string(), expiry);
            }
        }
    }
    marks
}

/// Run one mark-and-sweep pass over a managed Secret.
///
/// Returns the updated Secret when anything changed, None otherwise, so the
/// caller persists at most once per pass.
pub fn collect(
    secret: &Secret,
    referenced: &BTreeSet<String>,
    now: NaiveDateTime,
    retention: Duration,
) -> Option<Secret> {
    let marks = pending_removal_marks(secret);
    let mut updated = secret.clone();
    let mut changed = false;

    let data_keys: Vec<String> = secret
        .data
        .as_ref()
        .map(|data| data.keys().cloned().collect())
        .unwrap_or_default();

    let updated_annotations = updated
        .metadata
        .annotations
        .get_or_insert_with(BTreeMap::new);

    for data_key in &data_keys {
        if referenced.contains(data_key) {
            // Re-referenced before its expiry: the mark must not survive
            if marks.contains_key(data_key) {
                updated_annotations.remove(&mark_key(data_key));
                changed = true;
            }
        } else if !marks.contains_key(data_key) {
            let expiry = (now + retention).format(PENDING_REMOVAL_TIME_FORMAT);
            updated_annotations.insert(mark_key(data_key), expiry.to_string());
            changed = true;
        }
    }

    // Sweep marks whose window elapsed; key and mark go in the same write
    for (data_key, expiry) in &marks {
        if referenced.contains(data_key) {
            continue;
        }
        if now > *expiry {
            updated_annotations.remove(&mark_key(data_key));
            if let Some(data) = updated.data.as_mut() {
                data.remove(data_key);
            }
            changed = true;
        }
    }

    changed.then_some(updated)
}
