// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Library interface to the warden allocation engine, the part of the NIC
//! management service that owns (NIC, IP) bindings.

// We only use rustdoc for internal documentation, including private items,
// so it's expected that we'll have links to private items in the docs.
#![allow(rustdoc::private_intra_doc_links)]

pub mod app;
pub mod config;
pub mod context;
pub mod db;
pub mod external_api;

pub use app::Warden;
pub use config::Config;
pub use context::OpContext;

#[macro_use]
extern crate slog;
