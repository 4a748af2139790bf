// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Selection of the next available address on a logical network.
//!
//! The search follows a strategy similar to linear probing in hashtables:
//! pick a random offset in the network's provision range, then take the
//! first available address scanning forward from there, wrapping at the
//! end of the range.  The random base matters at scale: concurrent
//! provisions that all scanned from the start of the range would pile
//! their writes onto the same few keys and spend their time in conflict
//! retries instead.
//!
//! The scan state lives across retry-loop iterations, so a candidate that
//! lost its commit race is not re-examined; one full wrap without a free
//! slot means the network is genuinely full.

use crate::db::datastore::DataStore;
use crate::db::model::{IpRecord, LogicalNetwork};
use rand::rngs::StdRng;
use rand::Rng;
use warden_common::address;
use warden_common::api::external::Error;

pub(crate) struct NextAddress {
    span: u128,
    /// Offset of the next candidate; `None` until the first probe picks
    /// the random base.
    cursor: Option<u128>,
    /// Candidates left before the scan has covered the whole range.
    remaining: u128,
}

impl NextAddress {
    pub fn new(network: &LogicalNetwork) -> NextAddress {
        let span = network.provision_span();
        NextAddress { span, cursor: None, remaining: span }
    }

    /// Yield the next provisionable address on `network`, skipping any
    /// address whose record is present and not free (including reserved
    /// addresses).  A free record is returned as-is so the caller's write
    /// is conditional on the version it observed.
    pub async fn next_free(
        &mut self,
        datastore: &DataStore,
        rng: &mut StdRng,
        network: &LogicalNetwork,
    ) -> Result<IpRecord, Error> {
        loop {
            if self.remaining == 0 || self.span == 0 {
                return Err(Error::SubnetFull { network_uuid: network.uuid });
            }
            self.remaining -= 1;

            let offset = match self.cursor {
                Some(offset) => offset,
                None => rng.gen_range(0..self.span),
            };
            self.cursor = Some((offset + 1) % self.span);

            let addr = address::checked_add(network.provision_start, offset)
                .ok_or_else(|| {
                    Error::internal_error(&format!(
                        "address offset {} overflows network {}",
                        offset, network.uuid
                    ))
                })?;

            match datastore.ip_fetch(&network.uuid, &addr).await? {
                None => return Ok(IpRecord::new(network, addr)),
                Some(record) if record.free && !record.reserved => {
                    return Ok(record)
                }
                Some(_) => continue,
            }
        }
    }
}
