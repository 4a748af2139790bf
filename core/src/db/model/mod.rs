// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Record types stored in the versioned buckets.

mod ip;
mod network;
mod nic;

pub use ip::IpRecord;
pub use network::LogicalNetwork;
pub use network::NetworkObject;
pub use network::NetworkPool;
pub use nic::NicRecord;
