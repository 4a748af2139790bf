// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
 * Shared, transport-agnostic types for the warden NIC/IP allocation service
 *
 * This crate holds the pieces that both the allocation engine and any
 * front-end surface need to agree on: the address codec, MAC/OUI handling,
 * the serialized NIC representation, and the error type returned to
 * callers.
 */

pub mod address;
pub mod api;
