// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! [`DataStore`] methods on per-address records.

use super::DataStore;
use crate::db::model::IpRecord;
use crate::db::store::Bucket;
use std::net::IpAddr;
use uuid::Uuid;
use warden_common::api::external::Error;

impl DataStore {
    /// Fetch the record for `address` in a network's bucket, if present.
    pub async fn ip_fetch(
        &self,
        network_uuid: &Uuid,
        address: &IpAddr,
    ) -> Result<Option<IpRecord>, Error> {
        let bucket = Bucket::NetworkIps(*network_uuid);
        let key = address.to_string();
        match self.get_raw(&bucket, &key).await? {
            None => Ok(None),
            Some((value, version)) => {
                let mut record: IpRecord = Self::decode(&bucket, &key, value)?;
                record.version = Some(version);
                Ok(Some(record))
            }
        }
    }
}
