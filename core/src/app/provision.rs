// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NIC and IP provisioning: candidate selection and the commit/retry loop.
//!
//! Provisioning picks identifiers out of two finite spaces -- addresses on
//! a network, MAC suffixes under the configured OUI -- while racing every
//! other request in the fleet.  Nothing is held or locked: each pass
//! assembles a batch of conditional writes and submits it; the store tells
//! us (via a version or unique conflict) exactly which identifier lost its
//! race, and only that identifier is replaced on the next pass.
//!
//! Terminal conditions (a caller-named identifier is taken, a search space
//! is exhausted) surface as [`Error`] values and end the loop; store
//! conflicts stay internal to it.

use crate::app::fabric;
use crate::db::datastore::DataStore;
use crate::db::model::{IpRecord, LogicalNetwork, NicRecord};
use crate::db::queries::next_address::NextAddress;
use crate::db::store::{Batch, Bucket, StoreError, Version};
use crate::external_api::params::{NicCreateParams, NicUpdateParams};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use slog::Logger;
use std::collections::VecDeque;
use uuid::Uuid;
use warden_common::api::external::{
    BelongsToType, Error, MacAddr, NicState, Oui,
};

/// The highest VLAN id assignable to a NIC (4095 is reserved).
const MAX_VLAN_ID: u16 = 4094;

/// The validated, merged parameters a NIC record is built from.
#[derive(Clone, Debug)]
pub(crate) struct NicParams {
    pub owner_uuid: Uuid,
    pub belongs_to_uuid: Uuid,
    pub belongs_to_type: BelongsToType,
    pub primary: bool,
    pub state: NicState,
    pub check_owner: bool,
    pub model: Option<String>,
    pub nic_tag: Option<String>,
    pub nic_tags_provided: Option<Vec<String>>,
    pub vlan_id: Option<u16>,
    pub cn_uuid: Option<Uuid>,
    pub underlay: bool,
    pub reserved: bool,
    pub allow_dhcp_spoofing: bool,
    pub allow_ip_spoofing: bool,
    pub allow_mac_spoofing: bool,
    pub allow_restricted_traffic: bool,
    pub allow_unfiltered_promisc: bool,
}

impl NicParams {
    pub fn from_create(params: &NicCreateParams) -> Result<NicParams, Error> {
        check_vlan(params.vlan_id)?;
        Ok(NicParams {
            owner_uuid: params.owner_uuid,
            belongs_to_uuid: params.belongs_to_uuid,
            belongs_to_type: params.belongs_to_type,
            primary: params.primary.unwrap_or(false),
            state: params.state.unwrap_or_default(),
            check_owner: params.check_owner.unwrap_or(true),
            model: params.model.clone(),
            nic_tag: params.nic_tag.clone(),
            nic_tags_provided: params.nic_tags_provided.clone(),
            vlan_id: params.vlan_id,
            cn_uuid: params.cn_uuid,
            underlay: params.underlay.unwrap_or(false),
            reserved: params.reserved.unwrap_or(false),
            allow_dhcp_spoofing: params.allow_dhcp_spoofing.unwrap_or(false),
            allow_ip_spoofing: params.allow_ip_spoofing.unwrap_or(false),
            allow_mac_spoofing: params.allow_mac_spoofing.unwrap_or(false),
            allow_restricted_traffic: params
                .allow_restricted_traffic
                .unwrap_or(false),
            allow_unfiltered_promisc: params
                .allow_unfiltered_promisc
                .unwrap_or(false),
        })
    }

    /// Merge an update over an existing NIC: absent fields keep the NIC's
    /// current values.
    pub fn from_update(
        nic: &NicRecord,
        changes: &NicUpdateParams,
    ) -> Result<NicParams, Error> {
        check_vlan(changes.vlan_id)?;
        Ok(NicParams {
            owner_uuid: changes.owner_uuid.unwrap_or(nic.owner_uuid),
            belongs_to_uuid: changes
                .belongs_to_uuid
                .unwrap_or(nic.belongs_to_uuid),
            belongs_to_type: changes
                .belongs_to_type
                .unwrap_or(nic.belongs_to_type),
            primary: changes.primary.unwrap_or(nic.primary),
            state: changes.state.unwrap_or(nic.state),
            check_owner: changes.check_owner.unwrap_or(nic.check_owner),
            model: changes.model.clone().or_else(|| nic.model.clone()),
            nic_tag: changes.nic_tag.clone().or_else(|| nic.nic_tag.clone()),
            nic_tags_provided: changes
                .nic_tags_provided
                .clone()
                .or_else(|| nic.nic_tags_provided.clone()),
            vlan_id: changes.vlan_id.or(Some(nic.vlan_id)),
            cn_uuid: changes.cn_uuid.or(nic.cn_uuid),
            underlay: changes.underlay.unwrap_or(nic.underlay),
            reserved: changes.reserved.unwrap_or(false),
            allow_dhcp_spoofing: changes
                .allow_dhcp_spoofing
                .unwrap_or(nic.allow_dhcp_spoofing),
            allow_ip_spoofing: changes
                .allow_ip_spoofing
                .unwrap_or(nic.allow_ip_spoofing),
            allow_mac_spoofing: changes
                .allow_mac_spoofing
                .unwrap_or(nic.allow_mac_spoofing),
            allow_restricted_traffic: changes
                .allow_restricted_traffic
                .unwrap_or(nic.allow_restricted_traffic),
            allow_unfiltered_promisc: changes
                .allow_unfiltered_promisc
                .unwrap_or(nic.allow_unfiltered_promisc),
        })
    }
}

fn check_vlan(vlan_id: Option<u16>) -> Result<(), Error> {
    match vlan_id {
        Some(vlan) if vlan > MAX_VLAN_ID => Err(Error::invalid_params(
            vec![String::from("vlan_id")],
            format!("VLAN id must be at most {}", MAX_VLAN_ID),
        )),
        _ => Ok(()),
    }
}

/// Per-request state threaded through the pipeline stages.
///
/// `batch` and `ips` are rebuilt from scratch each pass; `conflict` is
/// what the previous pass's commit failed on, and is what the candidate
/// holders consult to decide whether their identifier must be replaced.
pub(crate) struct AllocContext<'a> {
    pub log: Logger,
    pub datastore: &'a DataStore,
    pub params: NicParams,
    /// Addresses to soft-free in the same commit (update path).
    pub remove_ips: Vec<IpRecord>,
    pub batch: Batch,
    /// Addresses chosen this pass, with the networks they came from.
    pub ips: Vec<(IpRecord, LogicalNetwork)>,
    pub vnet_cns: Option<Vec<Uuid>>,
    pub conflict: Option<(Bucket, String)>,
    pub rng: StdRng,
}

impl<'a> AllocContext<'a> {
    pub fn new(
        log: Logger,
        datastore: &'a DataStore,
        params: NicParams,
        rng: StdRng,
    ) -> AllocContext<'a> {
        AllocContext {
            log,
            datastore,
            params,
            remove_ips: Vec::new(),
            batch: Vec::new(),
            ips: Vec::new(),
            vnet_cns: None,
            conflict: None,
            rng,
        }
    }

    fn reset(&mut self) {
        self.batch.clear();
        self.ips.clear();
        self.vnet_cns = None;
    }

    fn conflict_on(&self, bucket: &Bucket, key: &str) -> bool {
        matches!(&self.conflict, Some((b, k)) if b == bucket && k == key)
    }

    fn push_ip(
        &mut self,
        record: IpRecord,
        network: LogicalNetwork,
    ) -> Result<(), Error> {
        self.batch.push(record.batch()?);
        self.ips.push((record, network));
        Ok(())
    }

    /// Bind `record` to the requesting principal.
    fn assign(&self, record: &mut IpRecord) {
        record.assign(
            self.params.belongs_to_uuid,
            self.params.belongs_to_type,
            self.params.owner_uuid,
            self.params.reserved,
        );
    }
}

/// One strategy for choosing the address a pass will try to bind.
///
/// Implementations hold their current candidate across passes and consult
/// the context's conflict to decide whether to keep it.  An error return
/// is terminal for the whole allocation.
#[async_trait]
pub(crate) trait IpProvisioner: Send {
    async fn provision(&mut self, ctx: &mut AllocContext<'_>)
        -> Result<(), Error>;
}

/// The caller asked for one specific address.
pub(crate) struct IpProvision {
    field: String,
    network: LogicalNetwork,
    record: IpRecord,
}

impl IpProvision {
    pub fn new(field: &str, network: LogicalNetwork, record: IpRecord) -> Self {
        IpProvision { field: field.to_string(), network, record }
    }
}

#[async_trait]
impl IpProvisioner for IpProvision {
    async fn provision(
        &mut self,
        ctx: &mut AllocContext<'_>,
    ) -> Result<(), Error> {
        if ctx.conflict_on(&self.record.bucket(), &self.record.key()) {
            // The caller-named address lost a race; no retry will help.
            // Re-read it to name the principal now holding it.
            let current = ctx
                .datastore
                .ip_fetch(&self.network.uuid, &self.record.address)
                .await?;
            return Err(match current {
                Some(record)
                    if !record.provisionable_by(&ctx.params.belongs_to_uuid) =>
                {
                    record.in_use_error()
                }
                _ => Error::duplicate_param(&self.field),
            });
        }
        let mut record = self.record.clone();
        ctx.assign(&mut record);
        ctx.push_ip(record, self.network.clone())
    }
}

/// The caller supplied a network; scan it for a free address.
pub(crate) struct NetworkProvision {
    network: LogicalNetwork,
    search: NextAddress,
    current: Option<IpRecord>,
}

impl NetworkProvision {
    pub fn new(network: LogicalNetwork) -> Self {
        let search = NextAddress::new(&network);
        NetworkProvision { network, search, current: None }
    }
}

#[async_trait]
impl IpProvisioner for NetworkProvision {
    async fn provision(
        &mut self,
        ctx: &mut AllocContext<'_>,
    ) -> Result<(), Error> {
        let base = match &self.current {
            Some(ip) if !ctx.conflict_on(&ip.bucket(), &ip.key()) => ip.clone(),
            _ => {
                let datastore = ctx.datastore;
                let found = self
                    .search
                    .next_free(datastore, &mut ctx.rng, &self.network)
                    .await?;
                self.current = Some(found.clone());
                found
            }
        };
        let mut record = base;
        ctx.assign(&mut record);
        ctx.push_ip(record, self.network.clone())
    }
}

/// The caller supplied a pool; walk its members in order, falling over to
/// the next member when the current one fills up.
pub(crate) struct NetworkPoolProvision {
    field: String,
    queue: VecDeque<LogicalNetwork>,
    current: Option<(LogicalNetwork, NextAddress)>,
    ip: Option<IpRecord>,
}

impl NetworkPoolProvision {
    pub fn new(field: &str, networks: Vec<LogicalNetwork>) -> Self {
        NetworkPoolProvision {
            field: field.to_string(),
            queue: networks.into(),
            current: None,
            ip: None,
        }
    }
}

#[async_trait]
impl IpProvisioner for NetworkPoolProvision {
    async fn provision(
        &mut self,
        ctx: &mut AllocContext<'_>,
    ) -> Result<(), Error> {
        loop {
            if self.current.is_none() {
                match self.queue.pop_front() {
                    None => {
                        return Err(Error::PoolFull {
                            field: self.field.clone(),
                        })
                    }
                    Some(network) => {
                        debug!(ctx.log, "trying next pool member";
                            "network_uuid" => %network.uuid);
                        let search = NextAddress::new(&network);
                        self.current = Some((network, search));
                        self.ip = None;
                    }
                }
            }
            let (network, search) = match &mut self.current {
                Some(current) => current,
                None => continue,
            };

            let keep = match &self.ip {
                Some(ip) => !ctx.conflict_on(&ip.bucket(), &ip.key()),
                None => false,
            };
            if !keep {
                let datastore = ctx.datastore;
                match search.next_free(datastore, &mut ctx.rng, network).await {
                    Ok(found) => self.ip = Some(found),
                    Err(Error::SubnetFull { network_uuid }) => {
                        debug!(ctx.log, "pool member full";
                            "network_uuid" => %network_uuid);
                        self.current = None;
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let (record, network) = match (&self.ip, &self.current) {
                (Some(ip), Some((network, _))) => {
                    (ip.clone(), network.clone())
                }
                _ => continue,
            };
            let mut record = record;
            ctx.assign(&mut record);
            return ctx.push_ip(record, network);
        }
    }
}

/// How the pass obtains the NIC's MAC (and, for updates, the version the
/// NIC write must expect).
pub(crate) enum NicStrategy {
    /// A MAC was given in the request; a conflict on it is terminal.
    Supplied { mac: MacAddr },
    /// Generate a MAC within the configured OUI.
    Random { oui: Oui, retries: u32, attempts: u32, candidate: Option<MacAddr> },
    /// Update of an existing NIC; always reuses its MAC.
    Existing { nic: NicRecord },
}

impl NicStrategy {
    pub fn supplied(mac: MacAddr) -> NicStrategy {
        NicStrategy::Supplied { mac }
    }

    pub fn random(oui: Oui, retries: u32) -> NicStrategy {
        NicStrategy::Random { oui, retries, attempts: 0, candidate: None }
    }

    pub fn existing(nic: NicRecord) -> NicStrategy {
        NicStrategy::Existing { nic }
    }

    /// Choose this pass's MAC, plus the version expectation and creation
    /// time carried over for updates.
    async fn select(
        &mut self,
        ctx: &mut AllocContext<'_>,
    ) -> Result<(MacAddr, Option<Version>, Option<DateTime<Utc>>), Error> {
        match self {
            NicStrategy::Supplied { mac } => {
                if ctx.conflict_on(&Bucket::Nics, &mac.to_u64().to_string()) {
                    return Err(Error::duplicate_param("mac"));
                }
                Ok((*mac, None, None))
            }
            NicStrategy::Random { oui, retries, attempts, candidate } => {
                let mac = match *candidate {
                    None => {
                        *attempts = 1;
                        oui.mac_at(ctx.rng.gen::<u32>())
                    }
                    Some(mac)
                        if ctx.conflict_on(
                            &Bucket::Nics,
                            &mac.to_u64().to_string(),
                        ) =>
                    {
                        *attempts += 1;
                        if *attempts > *retries {
                            return Err(Error::NoFreeMac);
                        }
                        let suffix = (mac.to_u64() as u32) & Oui::MAX_SUFFIX;
                        if suffix == Oui::MAX_SUFFIX {
                            // Wrapped the OUI; start from a fresh random
                            // point rather than the bottom of the space.
                            oui.mac_at(ctx.rng.gen::<u32>())
                        } else {
                            oui.mac_at(suffix + 1)
                        }
                    }
                    Some(mac) => mac,
                };
                *candidate = Some(mac);
                Ok((mac, None, None))
            }
            NicStrategy::Existing { nic } => {
                if ctx.conflict_on(&Bucket::Nics, &nic.key()) {
                    // The NIC itself was modified underneath this update;
                    // pick up its current version and merge again.
                    let current = ctx
                        .datastore
                        .nic_fetch(&nic.mac)
                        .await?;
                    nic.version = current.version.clone();
                    nic.time_created = current.time_created;
                }
                Ok((nic.mac, nic.version.clone(), Some(nic.time_created)))
            }
        }
    }

    /// Build the NIC record for this pass from the validated parameters
    /// and whatever address the provisioners chose.
    pub async fn build(
        &mut self,
        ctx: &mut AllocContext<'_>,
    ) -> Result<NicRecord, Error> {
        let (mac, expect, created) = self.select(ctx).await?;
        let now = Utc::now();
        let params = &ctx.params;
        let mut nic = NicRecord {
            mac,
            primary: params.primary,
            state: params.state,
            belongs_to_uuid: params.belongs_to_uuid,
            belongs_to_type: params.belongs_to_type,
            owner_uuid: params.owner_uuid,
            check_owner: params.check_owner,
            model: params.model.clone(),
            vlan_id: params.vlan_id.unwrap_or(0),
            nic_tag: params.nic_tag.clone(),
            nic_tags_provided: params.nic_tags_provided.clone(),
            allow_dhcp_spoofing: params.allow_dhcp_spoofing,
            allow_ip_spoofing: params.allow_ip_spoofing,
            allow_mac_spoofing: params.allow_mac_spoofing,
            allow_restricted_traffic: params.allow_restricted_traffic,
            allow_unfiltered_promisc: params.allow_unfiltered_promisc,
            cn_uuid: params.cn_uuid,
            underlay: params.underlay,
            ip_address: None,
            network_uuid: None,
            time_created: created.unwrap_or(now),
            time_modified: now,
            version: expect,
            vnet_cns: None,
        };
        if let Some((ip, network)) = ctx.ips.first() {
            nic.set_ip(ip);
            nic.vlan_id = network.vlan_id;
            nic.nic_tag = Some(network.nic_tag.clone());
        } else if let NicStrategy::Existing { nic: prior } = self {
            // No address chosen this pass: an update that leaves the IP
            // alone keeps the existing binding.
            nic.ip_address = prior.ip_address;
            nic.network_uuid = prior.network_uuid;
        }
        Ok(nic)
    }
}

/// Run the allocation pipeline until a commit lands or a terminal error
/// surfaces.
///
/// Stages, strictly in order each pass: reset the batch, run the
/// provisioners, queue frees for removed addresses, resolve fabric
/// membership, build the NIC (with any primary demotions), commit.  There
/// is no cap on passes: the loop terminates because the address and MAC
/// spaces are finite and their exhaustion errors are terminal.
pub(crate) async fn nic_and_ip(
    ctx: &mut AllocContext<'_>,
    provisioners: &mut [Box<dyn IpProvisioner>],
    strategy: &mut NicStrategy,
) -> Result<NicRecord, Error> {
    loop {
        ctx.reset();

        for provisioner in provisioners.iter_mut() {
            provisioner.provision(ctx).await?;
        }

        let mut remove_ips = Vec::with_capacity(ctx.remove_ips.len());
        for ip in std::mem::take(&mut ctx.remove_ips) {
            // A conflict on a queued free means the record moved under
            // us: re-read it, and only keep freeing it while it is still
            // bound to the same principal.
            let ip = if ctx.conflict_on(&ip.bucket(), &ip.key()) {
                match ctx
                    .datastore
                    .ip_fetch(&ip.network_uuid, &ip.address)
                    .await?
                {
                    Some(current)
                        if current.belongs_to_uuid == ip.belongs_to_uuid =>
                    {
                        current
                    }
                    _ => {
                        debug!(ctx.log, "queued IP reassigned; not freeing";
                            "ip" => %ip.address);
                        continue;
                    }
                }
            } else {
                ip
            };
            if let Some(op) = ip.free_batch()? {
                ctx.batch.push(op);
            }
            remove_ips.push(ip);
        }
        ctx.remove_ips = remove_ips;

        ctx.vnet_cns =
            fabric::resolve_members(ctx.datastore, &ctx.log, &ctx.ips).await?;

        let mut nic = strategy.build(ctx).await?;
        ctx.batch.push(nic.batch()?);
        if nic.primary {
            for other in
                ctx.datastore.nics_for_owner(&nic.owner_uuid).await?
            {
                if other.key() != nic.key() && other.primary {
                    ctx.batch.push(other.primary_unset_batch()?);
                }
            }
        }
        nic.vnet_cns = ctx.vnet_cns.clone();

        let batch = std::mem::take(&mut ctx.batch);
        match ctx.datastore.commit(batch).await {
            Ok(()) => {
                info!(ctx.log, "provisioned nic";
                    "mac" => %nic.mac,
                    "ip" => ?nic.ip_address.map(|ip| ip.to_string()));
                return Ok(nic);
            }
            Err(StoreError::VersionConflict { bucket, key })
            | Err(StoreError::UniqueConflict { bucket, key }) => {
                debug!(ctx.log, "commit conflict; retrying";
                    "bucket" => %bucket, "key" => %key);
                ctx.conflict = Some((bucket, key));
            }
            Err(StoreError::Unavailable { message }) => {
                warn!(ctx.log, "transient store failure; retrying";
                    "error" => %message);
                ctx.conflict = None;
            }
            Err(StoreError::Fatal(error)) => return Err(error),
        }
    }
}
