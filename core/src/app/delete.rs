// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deleting a NIC and releasing the address it owned.

use super::Warden;
use crate::context::OpContext;
use crate::db::model::NicRecord;
use warden_common::api::external::{Error, MacAddr, ResourceType};

impl Warden {
    /// Delete the NIC with the given MAC.
    ///
    /// The NIC delete and the unassignment of its address land in one
    /// atomic commit.  The address is only unassigned while its binding
    /// still points at this NIC; a mismatched binding is logged and left
    /// alone.  For a NIC on a fabric network, the returned record carries
    /// the overlay's compute-node set as of this commit.
    pub async fn nic_delete(
        &self,
        opctx: &OpContext,
        mac: &MacAddr,
    ) -> Result<NicRecord, Error> {
        let mut nic = self.datastore().nic_fetch(mac).await?;
        let log = opctx.log.new(o!("operation" => "nic_delete"));

        let network = match nic.network_uuid {
            Some(uuid) => Some(self.datastore().network_fetch(&uuid).await?),
            None => None,
        };
        if let Some(net) = &network {
            if net.fabric {
                if let Some(vnet_id) = net.vnet_id {
                    let cns = self.datastore().vnet_cns(vnet_id).await?;
                    nic.vnet_cns = Some(cns.into_iter().collect());
                }
            }
        }

        let mut batch = vec![nic.delete_batch()];
        if let (Some(ip), Some(network_uuid)) =
            (nic.ip_address, nic.network_uuid)
        {
            match self.datastore().ip_fetch(&network_uuid, &ip).await? {
                Some(record)
                    if record.belongs_to_uuid == Some(nic.belongs_to_uuid) =>
                {
                    batch.push(record.unassign_batch()?);
                }
                Some(record) => {
                    warn!(log, "IP bound to another principal; leaving it";
                        "ip" => %ip,
                        "belongs_to_uuid" => ?record.belongs_to_uuid);
                }
                None => (),
            }
        }

        match self.datastore().commit(batch).await {
            Ok(()) => {
                info!(log, "deleted nic"; "mac" => %nic.mac);
                Ok(nic)
            }
            Err(err) => {
                // TOCTOU race: if a concurrent delete won, report the 404
                // that a subsequent request would see rather than the
                // internal conflict.
                if err.conflict().is_some() {
                    if self.datastore().nic_fetch_opt(mac).await?.is_none() {
                        return Err(Error::not_found_by_mac(
                            ResourceType::Nic,
                            mac,
                        ));
                    }
                    return Err(Error::unavail(
                        "nic changed during delete; retry",
                    ));
                }
                Err(err.into_external())
            }
        }
    }
}
