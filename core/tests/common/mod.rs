// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared setup for the allocation engine's integration tests.

use dropshot::test_util::LogContext;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use uuid::Uuid;
use warden_common::api::external::{BelongsToType, Oui};
use warden_core::config::{AllocatorConfig, Config};
use warden_core::db::model::{LogicalNetwork, NetworkPool};
use warden_core::db::store::Store;
use warden_core::db::MemStore;
use warden_core::external_api::params::NicCreateParams;
use warden_core::{OpContext, Warden};
use warden_test_utils::dev::test_setup_log;

pub struct TestContext {
    pub logctx: LogContext,
    pub warden: Arc<Warden>,
    pub store: Arc<MemStore>,
}

impl TestContext {
    pub fn opctx(&self) -> OpContext {
        OpContext::new(&self.logctx.log)
    }

    pub fn cleanup_successful(self) {
        self.logctx.cleanup_successful();
    }
}

pub fn test_config(mac_retries: u32) -> Config {
    Config {
        allocator: AllocatorConfig {
            mac_oui: Oui::try_from(String::from("90:b8:d0")).unwrap(),
            mac_retries,
        },
    }
}

/// Stand up an engine over a fresh in-memory store with a fixed RNG seed.
pub fn setup(test_name: &str, seed: u64) -> TestContext {
    let logctx = test_setup_log(test_name);
    let store = Arc::new(MemStore::new());
    let dyn_store: Arc<dyn Store> = store.clone();
    let warden = Arc::new(Warden::new_with_rng(
        logctx.log.clone(),
        dyn_store,
        &test_config(64),
        StdRng::seed_from_u64(seed),
    ));
    TestContext { logctx, warden, store }
}

/// Create and persist a network spanning `[start, end]`.
pub async fn seed_network(
    warden: &Warden,
    subnet: &str,
    start: &str,
    end: &str,
) -> LogicalNetwork {
    let network = LogicalNetwork::new(
        Uuid::new_v4(),
        subnet.parse().unwrap(),
        2,
        "external",
        start.parse().unwrap(),
        end.parse().unwrap(),
    )
    .unwrap();
    warden.datastore().network_upsert(&network).await.unwrap();
    network
}

/// Like [`seed_network`], but on an overlay fabric.
pub async fn seed_fabric_network(
    warden: &Warden,
    subnet: &str,
    start: &str,
    end: &str,
    vnet_id: u32,
) -> LogicalNetwork {
    let mut network = LogicalNetwork::new(
        Uuid::new_v4(),
        subnet.parse().unwrap(),
        2,
        "sdc_overlay",
        start.parse().unwrap(),
        end.parse().unwrap(),
    )
    .unwrap();
    network.fabric = true;
    network.vnet_id = Some(vnet_id);
    warden.datastore().network_upsert(&network).await.unwrap();
    network
}

/// Create and persist a pool over the given member networks, in order.
pub async fn seed_pool(
    warden: &Warden,
    members: &[&LogicalNetwork],
) -> NetworkPool {
    let pool = NetworkPool {
        uuid: Uuid::new_v4(),
        networks: members.iter().map(|network| network.uuid).collect(),
        version: None,
    };
    warden.datastore().pool_upsert(&pool).await.unwrap();
    pool
}

/// A minimal create request for a zone NIC.
pub fn create_params(network_uuid: Option<Uuid>) -> NicCreateParams {
    NicCreateParams {
        owner_uuid: Uuid::new_v4(),
        belongs_to_uuid: Uuid::new_v4(),
        belongs_to_type: BelongsToType::Zone,
        mac: None,
        ip: None,
        network: None,
        network_uuid,
        primary: None,
        state: None,
        check_owner: None,
        model: None,
        nic_tag: None,
        nic_tags_provided: None,
        vlan_id: None,
        cn_uuid: None,
        underlay: None,
        reserved: None,
        allow_dhcp_spoofing: None,
        allow_ip_spoofing: None,
        allow_mac_spoofing: None,
        allow_restricted_traffic: None,
        allow_unfiltered_promisc: None,
    }
}
