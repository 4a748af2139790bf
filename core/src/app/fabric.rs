// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Overlay-fabric membership resolution.
//!
//! A NIC landing on a fabric network needs to know which compute nodes
//! already host NICs on the same overlay (`vnet_id`) so the control plane
//! can deliver the mapping.  The set is a snapshot: one listing per
//! distinct overlay, taken in the same pass as the commit, with no attempt
//! to fence concurrent membership changes.

use crate::db::datastore::DataStore;
use crate::db::model::{IpRecord, LogicalNetwork};
use slog::Logger;
use std::collections::BTreeSet;
use uuid::Uuid;
use warden_common::api::external::Error;

/// The union of compute-node sets over every fabric network among the
/// chosen addresses, or `None` when none of them is on a fabric.
pub(crate) async fn resolve_members(
    datastore: &DataStore,
    log: &Logger,
    ips: &[(IpRecord, LogicalNetwork)],
) -> Result<Option<Vec<Uuid>>, Error> {
    let vnets: BTreeSet<u32> = ips
        .iter()
        .filter(|(_, network)| network.fabric)
        .filter_map(|(_, network)| network.vnet_id)
        .collect();
    if vnets.is_empty() {
        return Ok(None);
    }

    let lookups = vnets.iter().map(|vnet_id| datastore.vnet_cns(*vnet_id));
    let sets = futures::future::try_join_all(lookups).await?;

    let mut cns = BTreeSet::new();
    for set in sets {
        cns.extend(set);
    }
    debug!(log, "resolved overlay membership";
        "vnets" => vnets.len(), "cns" => cns.len());
    Ok(Some(cns.into_iter().collect()))
}
