// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
 * Facilities intended for development tools and the test suite.  These
 * should not be used in production code.
 */

use dropshot::test_util::LogContext;
use dropshot::ConfigLogging;
use dropshot::ConfigLoggingIfExists;
use dropshot::ConfigLoggingLevel;

/**
 * Build a [`dropshot::test_util::LogContext`] for the test named
 * `test_name`
 *
 * The context writes debug-level logs to a file named for the test; a
 * test that finishes cleanly calls `cleanup_successful()` to remove it,
 * so only failing tests leave a log behind to inspect.  The `path` given
 * here is a placeholder: `LogContext` derives the real file name from
 * `test_name`.
 */
pub fn test_setup_log(test_name: &str) -> LogContext {
    let log_config = ConfigLogging::File {
        level: ConfigLoggingLevel::Debug,
        path: String::from("UNUSED").into(),
        if_exists: ConfigLoggingIfExists::Fail,
    };

    LogContext::new(test_name, &log_config)
}
