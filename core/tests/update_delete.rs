// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the NIC update and delete paths.

mod common;

use common::{create_params, seed_fabric_network, seed_network, setup};
use uuid::Uuid;
use warden_common::api::external::{Error, MacAddr, NicState};
use warden_core::external_api::params::NicUpdateParams;

#[tokio::test]
async fn test_update_preserves_mac() {
    let ctx = setup("test_update_preserves_mac", 20);
    let network =
        seed_network(&ctx.warden, "10.0.0.0/24", "10.0.0.10", "10.0.0.20").await;
    let nic = ctx
        .warden
        .nic_create(&ctx.opctx(), &create_params(Some(network.uuid)))
        .await
        .unwrap();

    let changes = NicUpdateParams {
        state: Some(NicState::Running),
        ..Default::default()
    };
    let updated = ctx
        .warden
        .nic_update(&ctx.opctx(), &nic.mac, &changes)
        .await
        .unwrap();

    assert_eq!(updated.mac, nic.mac);
    assert_eq!(updated.state, NicState::Running);
    assert_eq!(updated.ip_address, nic.ip_address);
    assert_eq!(updated.time_created, nic.time_created);
    ctx.cleanup_successful();
}

#[tokio::test]
async fn test_update_changes_ip_and_frees_old() {
    let ctx = setup("test_update_changes_ip_and_frees_old", 21);
    let network =
        seed_network(&ctx.warden, "10.0.0.0/24", "10.0.0.10", "10.0.0.20").await;

    let mut params = create_params(Some(network.uuid));
    params.ip = Some(String::from("10.0.0.10"));
    let nic = ctx.warden.nic_create(&ctx.opctx(), &params).await.unwrap();

    let changes = NicUpdateParams {
        ip: Some(String::from("10.0.0.11")),
        ..Default::default()
    };
    let updated = ctx
        .warden
        .nic_update(&ctx.opctx(), &nic.mac, &changes)
        .await
        .unwrap();
    assert_eq!(updated.mac, nic.mac);
    assert_eq!(updated.ip_address, Some("10.0.0.11".parse().unwrap()));

    // The old address was soft-freed in the same commit.
    let old = ctx
        .warden
        .datastore()
        .ip_fetch(&network.uuid, &"10.0.0.10".parse().unwrap())
        .await
        .unwrap()
        .expect("old record should remain");
    assert!(old.free);
    assert!(old.belongs_to_uuid.is_none());

    let new = ctx
        .warden
        .datastore()
        .ip_fetch(&network.uuid, &"10.0.0.11".parse().unwrap())
        .await
        .unwrap()
        .expect("new record should exist");
    assert_eq!(new.belongs_to_uuid, Some(nic.belongs_to_uuid));
    ctx.cleanup_successful();
}

#[tokio::test]
async fn test_update_does_not_free_reassigned_ip() {
    let ctx = setup("test_update_does_not_free_reassigned_ip", 22);
    let network =
        seed_network(&ctx.warden, "10.0.0.0/24", "10.0.0.10", "10.0.0.20").await;

    let mut params = create_params(Some(network.uuid));
    params.ip = Some(String::from("10.0.0.10"));
    let nic = ctx.warden.nic_create(&ctx.opctx(), &params).await.unwrap();

    // Reassign the address to another principal underneath the NIC.
    let interloper = Uuid::new_v4();
    let mut record = ctx
        .warden
        .datastore()
        .ip_fetch(&network.uuid, &"10.0.0.10".parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    record.belongs_to_uuid = Some(interloper);
    ctx.warden
        .datastore()
        .commit(vec![record.batch().unwrap()])
        .await
        .unwrap();

    let changes = NicUpdateParams {
        ip: Some(String::from("10.0.0.11")),
        ..Default::default()
    };
    let updated = ctx
        .warden
        .nic_update(&ctx.opctx(), &nic.mac, &changes)
        .await
        .unwrap();
    assert_eq!(updated.ip_address, Some("10.0.0.11".parse().unwrap()));

    // The reassigned address was detached, not freed.
    let still_bound = ctx
        .warden
        .datastore()
        .ip_fetch(&network.uuid, &"10.0.0.10".parse().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!still_bound.free);
    assert_eq!(still_bound.belongs_to_uuid, Some(interloper));
    ctx.cleanup_successful();
}

#[tokio::test]
async fn test_update_rejects_taken_ip() {
    let ctx = setup("test_update_rejects_taken_ip", 23);
    let network =
        seed_network(&ctx.warden, "10.0.0.0/24", "10.0.0.10", "10.0.0.20").await;

    let mut first = create_params(Some(network.uuid));
    first.ip = Some(String::from("10.0.0.10"));
    let holder = ctx.warden.nic_create(&ctx.opctx(), &first).await.unwrap();

    let second = ctx
        .warden
        .nic_create(&ctx.opctx(), &create_params(Some(network.uuid)))
        .await
        .unwrap();

    let changes = NicUpdateParams {
        ip: Some(String::from("10.0.0.10")),
        ..Default::default()
    };
    let err = ctx
        .warden
        .nic_update(&ctx.opctx(), &second.mac, &changes)
        .await
        .unwrap_err();
    match err {
        Error::IpInUse { belongs_to_uuid, .. } => {
            assert_eq!(belongs_to_uuid, holder.belongs_to_uuid)
        }
        other => panic!("unexpected error: {:?}", other),
    }
    ctx.cleanup_successful();
}

#[tokio::test]
async fn test_primary_is_exclusive_per_owner() {
    let ctx = setup("test_primary_is_exclusive_per_owner", 24);
    let network =
        seed_network(&ctx.warden, "10.0.0.0/24", "10.0.0.10", "10.0.0.20").await;

    let mut params = create_params(Some(network.uuid));
    params.primary = Some(true);
    let first = ctx.warden.nic_create(&ctx.opctx(), &params).await.unwrap();

    // Same owner, second NIC becomes primary; the first must be demoted
    // in the same commit.
    let mut second_params = create_params(Some(network.uuid));
    second_params.owner_uuid = params.owner_uuid;
    second_params.primary = Some(true);
    let second =
        ctx.warden.nic_create(&ctx.opctx(), &second_params).await.unwrap();
    assert!(second.primary);

    let demoted = ctx
        .warden
        .datastore()
        .nic_fetch(&first.mac)
        .await
        .unwrap();
    assert!(!demoted.primary);
    ctx.cleanup_successful();
}

#[tokio::test]
async fn test_update_not_found() {
    let ctx = setup("test_update_not_found", 25);
    let mac: MacAddr = "90:b8:d0:ff:ff:01".parse().unwrap();
    let err = ctx
        .warden
        .nic_update(&ctx.opctx(), &mac, &NicUpdateParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ObjectNotFound { .. }));
    ctx.cleanup_successful();
}

#[tokio::test]
async fn test_delete_releases_owned_ip() {
    let ctx = setup("test_delete_releases_owned_ip", 26);
    let network =
        seed_network(&ctx.warden, "10.0.0.0/24", "10.0.0.10", "10.0.0.20").await;

    let mut params = create_params(Some(network.uuid));
    params.ip = Some(String::from("10.0.0.10"));
    params.reserved = Some(true);
    let nic = ctx.warden.nic_create(&ctx.opctx(), &params).await.unwrap();

    ctx.warden.nic_delete(&ctx.opctx(), &nic.mac).await.unwrap();

    let err =
        ctx.warden.nic_view(&ctx.opctx(), &nic.mac).await.unwrap_err();
    assert!(matches!(err, Error::ObjectNotFound { .. }));

    // The address record remains, unbound but still reserved.
    let record = ctx
        .warden
        .datastore()
        .ip_fetch(&network.uuid, &"10.0.0.10".parse().unwrap())
        .await
        .unwrap()
        .expect("record should remain after unassign");
    assert!(record.belongs_to_uuid.is_none());
    assert!(record.owner_uuid.is_none());
    assert!(record.reserved);
    assert!(!record.free);
    ctx.cleanup_successful();
}

#[tokio::test]
async fn test_delete_fabric_nic_reports_vnet_cns() {
    let ctx = setup("test_delete_fabric_nic_reports_vnet_cns", 27);
    let fabric = seed_fabric_network(
        &ctx.warden,
        "192.168.0.0/24",
        "192.168.0.10",
        "192.168.0.20",
        77,
    )
    .await;

    let cn1 = Uuid::new_v4();
    let cn2 = Uuid::new_v4();

    let mut first = create_params(Some(fabric.uuid));
    first.cn_uuid = Some(cn1);
    let nic = ctx.warden.nic_create(&ctx.opctx(), &first).await.unwrap();
    // The snapshot is taken before this NIC's own commit, so the first
    // arrival sees an empty overlay.
    assert_eq!(nic.vnet_cns, Some(Vec::new()));

    let mut second = create_params(Some(fabric.uuid));
    second.cn_uuid = Some(cn2);
    let peer = ctx.warden.nic_create(&ctx.opctx(), &second).await.unwrap();
    assert!(peer.vnet_cns.as_ref().is_some_and(|cns| cns.contains(&cn1)));

    let deleted =
        ctx.warden.nic_delete(&ctx.opctx(), &nic.mac).await.unwrap();
    let cns = deleted.vnet_cns.expect("fabric delete must carry vnet_cns");
    assert!(cns.contains(&cn1));
    assert!(cns.contains(&cn2));

    // One NIC delete, one IP unassign: the NIC is gone and the address
    // record survives unbound.
    let record = ctx
        .warden
        .datastore()
        .ip_fetch(&fabric.uuid, &nic.ip_address.unwrap())
        .await
        .unwrap()
        .expect("record should remain after unassign");
    assert!(record.belongs_to_uuid.is_none());
    ctx.cleanup_successful();
}

#[tokio::test]
async fn test_delete_not_found() {
    let ctx = setup("test_delete_not_found", 28);
    let mac: MacAddr = "90:b8:d0:ff:ff:02".parse().unwrap();
    let err =
        ctx.warden.nic_delete(&ctx.opctx(), &mac).await.unwrap_err();
    assert!(matches!(err, Error::ObjectNotFound { .. }));
    ctx.cleanup_successful();
}
