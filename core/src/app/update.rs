// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Updating an existing NIC, including reconciling a change of address.

use super::provision::{
    self, AllocContext, IpProvision, IpProvisioner, NetworkPoolProvision,
    NetworkProvision, NicParams, NicStrategy,
};
use super::Warden;
use crate::context::OpContext;
use crate::db::model::{IpRecord, NetworkObject};
use crate::external_api::params::NicUpdateParams;
use std::net::IpAddr;
use warden_common::address;
use warden_common::address::AddrKey;
use warden_common::api::external::{Error, MacAddr, UpdateResult};

impl Warden {
    /// Apply `changes` to the NIC with the given MAC.
    ///
    /// The merged parameters are re-validated as a whole, and when the IP
    /// binding changes the new address goes through the same allocation
    /// pipeline as a create: the MAC never changes, the new address must
    /// be provisionable, and the old one is freed in the same commit --
    /// unless its binding no longer points at this NIC, in which case it
    /// is detached without being freed.
    pub async fn nic_update(
        &self,
        opctx: &OpContext,
        mac: &MacAddr,
        changes: &NicUpdateParams,
    ) -> UpdateResult<crate::db::model::NicRecord> {
        let nic = self.datastore().nic_fetch(mac).await?;
        let log = opctx.log.new(o!("operation" => "nic_update"));
        let params = NicParams::from_update(&nic, changes)?;

        let target_network_uuid = changes.network_ref()?.or(nic.network_uuid);
        let target_ip: Option<IpAddr> = match &changes.ip {
            Some(text) => Some(address::parse_addr("ip", text)?),
            None => None,
        };

        let network_changing = target_network_uuid != nic.network_uuid;
        let current_key = nic.ip_address.map(|ip| AddrKey::new(&ip));
        let ip_changing = match target_ip {
            Some(addr) => {
                network_changing || Some(AddrKey::new(&addr)) != current_key
            }
            None => network_changing,
        };

        let mut provisioners: Vec<Box<dyn IpProvisioner>> = Vec::new();
        let mut remove_ips: Vec<IpRecord> = Vec::new();

        if ip_changing {
            let network_uuid = target_network_uuid.ok_or_else(|| {
                Error::invalid_params(
                    vec![String::from("network_uuid")],
                    "an IP can only be requested together with its network",
                )
            })?;

            if let Some(addr) = target_ip {
                let network =
                    self.datastore().network_fetch(&network_uuid).await?;
                if !network.subnet.contains(addr) {
                    return Err(Error::invalid_params(
                        vec![String::from("ip")],
                        format!(
                            "IP address {} is outside subnet {}",
                            addr, network.subnet
                        ),
                    ));
                }
                let record = match self
                    .datastore()
                    .ip_fetch(&network.uuid, &addr)
                    .await?
                {
                    Some(existing) => {
                        if !existing.provisionable_by(&params.belongs_to_uuid)
                        {
                            return Err(existing.in_use_error());
                        }
                        existing
                    }
                    None => IpRecord::new(&network, addr),
                };
                provisioners
                    .push(Box::new(IpProvision::new("ip", network, record)));
            } else {
                match self
                    .datastore()
                    .network_object_fetch(&network_uuid)
                    .await?
                {
                    NetworkObject::Network(network) => {
                        provisioners
                            .push(Box::new(NetworkProvision::new(network)));
                    }
                    NetworkObject::Pool(pool) => {
                        let members =
                            self.datastore().pool_networks(&pool).await?;
                        provisioners.push(Box::new(NetworkPoolProvision::new(
                            "network_uuid",
                            members,
                        )));
                    }
                }
            }

            // Queue the old address for freeing, but only while its
            // binding still points at this NIC.  Ownership may have been
            // reassigned underneath us; freeing it then would yank the
            // address out from under its new holder.
            if let (Some(old_ip), Some(old_network)) =
                (nic.ip_address, nic.network_uuid)
            {
                match self.datastore().ip_fetch(&old_network, &old_ip).await? {
                    Some(old)
                        if old.belongs_to_uuid
                            == Some(nic.belongs_to_uuid) =>
                    {
                        remove_ips.push(old);
                    }
                    Some(old) => {
                        debug!(log,
                            "old IP reassigned; detaching without freeing";
                            "ip" => %old_ip,
                            "belongs_to_uuid" => ?old.belongs_to_uuid);
                    }
                    None => (),
                }
            }
        }

        let mut strategy = NicStrategy::existing(nic);
        let mut ctx = AllocContext::new(
            log,
            self.datastore(),
            params,
            self.request_rng()?,
        );
        ctx.remove_ips = remove_ips;
        provision::nic_and_ip(&mut ctx, &mut provisioners, &mut strategy).await
    }
}
