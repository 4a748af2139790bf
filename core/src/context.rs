// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared state used while servicing a single operation

use slog::Logger;
use uuid::Uuid;

/// Provides context for work done on behalf of one request, chiefly the
/// request-scoped logger.
pub struct OpContext {
    pub log: Logger,
    pub request_id: Uuid,
}

impl OpContext {
    pub fn new(log: &Logger) -> OpContext {
        let request_id = Uuid::new_v4();
        OpContext {
            log: log.new(o!("request_id" => request_id.to_string())),
            request_id,
        }
    }
}
