// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Warden, the allocation engine at the heart of the NIC management
//! service

use crate::config::{AllocatorConfig, Config};
use crate::context::OpContext;
use crate::db::datastore::DataStore;
use crate::db::model::{IpRecord, NetworkObject, NicRecord};
use crate::db::store::Store;
use crate::external_api::params::NicCreateParams;
use rand::rngs::StdRng;
use rand::SeedableRng;
use slog::Logger;
use std::sync::Arc;
use std::sync::Mutex;
use warden_common::address;
use warden_common::api::external;
use warden_common::api::external::{
    CreateResult, Error, LookupResult, MacAddr,
};

// The implementation is split into a number of submodules by operation.
mod delete;
mod fabric;
mod provision;
mod update;

use provision::{
    AllocContext, IpProvision, IpProvisioner, NetworkPoolProvision,
    NetworkProvision, NicParams, NicStrategy,
};

/// The engine itself: owns the datastore handle, the allocator
/// configuration, and the RNG that seeds each request's probing.
pub struct Warden {
    log: Logger,
    datastore: Arc<DataStore>,
    config: AllocatorConfig,
    rng: Mutex<StdRng>,
}

impl Warden {
    pub fn new(log: Logger, store: Arc<dyn Store>, config: &Config) -> Warden {
        Warden::new_with_rng(log, store, config, StdRng::from_entropy())
    }

    /// Like [`Warden::new`], but with a caller-supplied RNG so tests can
    /// fix the probe order.  The search stays randomized either way.
    pub fn new_with_rng(
        log: Logger,
        store: Arc<dyn Store>,
        config: &Config,
        rng: StdRng,
    ) -> Warden {
        let datastore = Arc::new(DataStore::new(
            log.new(o!("component" => "datastore")),
            store,
        ));
        Warden {
            log,
            datastore,
            config: config.allocator.clone(),
            rng: Mutex::new(rng),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.log
    }

    pub fn datastore(&self) -> &Arc<DataStore> {
        &self.datastore
    }

    /// Derive a request-scoped RNG from the engine's seed RNG.
    fn request_rng(&self) -> Result<StdRng, Error> {
        let mut parent = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        StdRng::from_rng(&mut *parent).map_err(|e| {
            Error::internal_error(&format!("seeding request RNG: {}", e))
        })
    }

    /// Provision a new NIC, allocating an address when the request names a
    /// network or pool.
    pub async fn nic_create(
        &self,
        opctx: &OpContext,
        params: &NicCreateParams,
    ) -> CreateResult<NicRecord> {
        let nic_params = NicParams::from_create(params)?;
        let network_ref = params.network_ref()?;

        let mut provisioners: Vec<Box<dyn IpProvisioner>> = Vec::new();
        if let Some(ip_text) = &params.ip {
            let network_uuid = network_ref.ok_or_else(|| {
                Error::invalid_params(
                    vec![String::from("network_uuid")],
                    "an IP can only be requested together with its network",
                )
            })?;
            let addr = address::parse_addr("ip", ip_text)?;
            let network = match self
                .datastore
                .network_object_fetch(&network_uuid)
                .await?
            {
                NetworkObject::Network(network) => network,
                NetworkObject::Pool(_) => {
                    return Err(Error::invalid_params(
                        vec![String::from("ip"), String::from("network_uuid")],
                        "a specific IP cannot be requested from a network pool",
                    ))
                }
            };
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
                .datastore
                .ip_fetch(&network.uuid, &addr)
                .await?
            {
                Some(existing) => {
                    if !existing
                        .provisionable_by(&nic_params.belongs_to_uuid)
                    {
                        return Err(existing.in_use_error());
                    }
                    existing
                }
                None => IpRecord::new(&network, addr),
            };
            provisioners.push(Box::new(IpProvision::new("ip", network, record)));
        } else if let Some(network_uuid) = network_ref {
            match self.datastore.network_object_fetch(&network_uuid).await? {
                NetworkObject::Network(network) => {
                    provisioners.push(Box::new(NetworkProvision::new(network)));
                }
                NetworkObject::Pool(pool) => {
                    let members = self.datastore.pool_networks(&pool).await?;
                    provisioners.push(Box::new(NetworkPoolProvision::new(
                        "network_uuid",
                        members,
                    )));
                }
            }
        }

        let mut strategy = match params.mac {
            Some(mac) => NicStrategy::supplied(mac),
            None => NicStrategy::random(
                self.config.mac_oui,
                self.config.mac_retries,
            ),
        };

        let mut ctx = AllocContext::new(
            opctx.log.new(o!("operation" => "nic_create")),
            &self.datastore,
            nic_params,
            self.request_rng()?,
        );
        provision::nic_and_ip(&mut ctx, &mut provisioners, &mut strategy).await
    }

    /// Fetch a NIC and serialize it the way provisioning returned it.
    pub async fn nic_view(
        &self,
        _opctx: &OpContext,
        mac: &MacAddr,
    ) -> LookupResult<external::Nic> {
        let nic = self.datastore.nic_fetch(mac).await?;
        self.serialize_nic(&nic).await
    }

    /// The flattened external representation of `nic`, with its network's
    /// attributes folded in.
    pub async fn serialize_nic(
        &self,
        nic: &NicRecord,
    ) -> LookupResult<external::Nic> {
        let network = match &nic.network_uuid {
            Some(uuid) => Some(self.datastore.network_fetch(uuid).await?),
            None => None,
        };
        Ok(nic.to_external(network.as_ref()))
    }
}
