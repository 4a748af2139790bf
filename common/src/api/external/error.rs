// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
 * Error handling facilities for the allocation engine
 *
 * For HTTP-level error handling, see Dropshot.
 */

use crate::api::external::BelongsToType;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/**
 * An error that can be generated within the allocation engine
 *
 * These may be generated while handling a client request or as part of
 * background operation.  When generated as part of an HTTP request, an
 * `Error` will be converted into an HTTP error as one of the last steps in
 * processing the request.  This allows most of the system to remain
 * agnostic to the transport with which the system communicates with
 * clients.
 *
 * Note that the store-level conflict signals that drive the allocation
 * retry loop are deliberately *not* represented here: they are never
 * user-facing and live with the store contract instead.
 */
#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq, Serialize)]
pub enum Error {
    /** An object needed as part of this operation was not found. */
    #[error("Object (of type {type_name:?}) not found: {lookup_type:?}")]
    ObjectNotFound { type_name: ResourceType, lookup_type: LookupType },
    /**
     * The request was well-formed, but the operation cannot be completed
     * given the current state of the system.
     */
    #[error("Invalid Request: {message}")]
    InvalidRequest { message: String },
    /** One or more request parameters are not valid. */
    #[error("Invalid Parameters: {message} (fields: {fields:?})")]
    InvalidParams { message: String, fields: Vec<String> },
    /** A caller-supplied identifier collides with an existing object. */
    #[error("Duplicate value supplied for parameter \"{field}\"")]
    DuplicateParam { field: String },
    /** The caller-named IP address is bound to another principal. */
    #[error("IP address in use by {belongs_to_type} {belongs_to_uuid}")]
    IpInUse { belongs_to_type: BelongsToType, belongs_to_uuid: Uuid },
    /** A network's provision range has no free addresses left. */
    #[error("No free IP addresses on network {network_uuid}")]
    SubnetFull { network_uuid: Uuid },
    /** Every network in the supplied pool is full. */
    #[error("All networks in pool (parameter \"{field}\") are full")]
    PoolFull { field: String },
    /** MAC generation gave up after the configured number of attempts. */
    #[error("Exhausted all attempts to generate a free MAC address")]
    NoFreeMac,
    /** The system encountered an unhandled operational error. */
    #[error("Internal Error: {internal_message}")]
    InternalError { internal_message: String },
    /** The system (or part of it) is unavailable. */
    #[error("Service Unavailable: {message}")]
    ServiceUnavailable { message: String },
}

/** Kinds of objects the engine can fail to find */
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum ResourceType {
    Nic,
    Network,
    NetworkPool,
    IpAddress,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ResourceType::Nic => "nic",
                ResourceType::Network => "network",
                ResourceType::NetworkPool => "network pool",
                ResourceType::IpAddress => "IP address",
            }
        )
    }
}

/** Indicates how an object was looked up (for an `ObjectNotFound` error) */
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum LookupType {
    /** a specific MAC address was requested */
    ByMac(String),
    /** a specific id was requested */
    ById(Uuid),
    /** a specific IP address was requested */
    ByAddress(String),
    /** some other lookup type was used */
    Other(String),
}

impl Error {
    /**
     * Returns whether the error is likely transient and could reasonably be
     * retried
     */
    pub fn retryable(&self) -> bool {
        match self {
            Error::ServiceUnavailable { .. } => true,

            Error::ObjectNotFound { .. }
            | Error::InvalidRequest { .. }
            | Error::InvalidParams { .. }
            | Error::DuplicateParam { .. }
            | Error::IpInUse { .. }
            | Error::SubnetFull { .. }
            | Error::PoolFull { .. }
            | Error::NoFreeMac
            | Error::InternalError { .. } => false,
        }
    }

    /**
     * Generates an [`Error::ObjectNotFound`] error for a lookup by MAC
     * address.
     */
    pub fn not_found_by_mac(
        type_name: ResourceType,
        mac: &crate::api::external::MacAddr,
    ) -> Error {
        Error::ObjectNotFound {
            type_name,
            lookup_type: LookupType::ByMac(mac.to_string()),
        }
    }

    /**
     * Generates an [`Error::ObjectNotFound`] error for a lookup by object
     * id.
     */
    pub fn not_found_by_id(type_name: ResourceType, id: &Uuid) -> Error {
        Error::ObjectNotFound { type_name, lookup_type: LookupType::ById(*id) }
    }

    /**
     * Generates an [`Error::InvalidParams`] error naming the offending
     * request fields.
     */
    pub fn invalid_params(fields: Vec<String>, message: impl Into<String>) -> Error {
        Error::InvalidParams { message: message.into(), fields }
    }

    /** Generates an [`Error::InvalidRequest`] with the specified message */
    pub fn invalid_request(message: &str) -> Error {
        Error::InvalidRequest { message: message.to_owned() }
    }

    /** Generates an [`Error::DuplicateParam`] for the named field */
    pub fn duplicate_param(field: &str) -> Error {
        Error::DuplicateParam { field: field.to_owned() }
    }

    /**
     * Generates an [`Error::InternalError`] error with the specific message
     *
     * InternalError should be used for operational conditions that should
     * not happen but that we cannot reasonably handle at runtime (e.g.,
     * deserializing a value from the store, or finding two records for
     * something that is supposed to be unique).
     */
    pub fn internal_error(internal_message: &str) -> Error {
        Error::InternalError { internal_message: internal_message.to_owned() }
    }

    /**
     * Generates an [`Error::ServiceUnavailable`] error with the specific
     * message
     *
     * This should be used for transient failures where the caller might be
     * expected to retry.  Logic errors or other problems indicating that a
     * retry would not work should probably be an InternalError (if it's a
     * server problem) or InvalidRequest (if it's a client problem)
     * instead.
     */
    pub fn unavail(message: &str) -> Error {
        Error::ServiceUnavailable { message: message.to_owned() }
    }
}

impl From<Error> for dropshot::HttpError {
    /**
     * Converts an `Error` error into an `HttpError`.  This defines how
     * errors that are represented internally using `Error` are ultimately
     * exposed to clients over HTTP.
     */
    fn from(error: Error) -> dropshot::HttpError {
        use dropshot::HttpError;
        match error {
            Error::ObjectNotFound { type_name: t, lookup_type: lt } => {
                let (lookup_field, lookup_value) = match lt {
                    LookupType::ByMac(mac) => ("mac", mac),
                    LookupType::ById(id) => ("id", id.to_string()),
                    LookupType::ByAddress(addr) => ("address", addr),
                    LookupType::Other(message) => ("lookup", message),
                };
                let message = format!(
                    "not found: {} with {} \"{}\"",
                    t, lookup_field, lookup_value
                );
                HttpError::for_client_error(
                    Some(String::from("ObjectNotFound")),
                    http::StatusCode::NOT_FOUND,
                    message,
                )
            }

            Error::InvalidRequest { message } => HttpError::for_bad_request(
                Some(String::from("InvalidRequest")),
                message,
            ),

            Error::InvalidParams { message, fields } => {
                let message =
                    format!("{} (fields: {})", message, fields.join(", "));
                HttpError::for_bad_request(
                    Some(String::from("InvalidParameters")),
                    message,
                )
            }

            Error::DuplicateParam { ref field } => HttpError::for_bad_request(
                Some(String::from("DuplicateParameter")),
                format!("{} (fields: {})", error, field),
            ),

            Error::IpInUse { .. } => HttpError::for_bad_request(
                Some(String::from("IpInUse")),
                error.to_string(),
            ),

            Error::SubnetFull { .. } => HttpError::for_client_error(
                Some(String::from("SubnetFull")),
                http::StatusCode::INSUFFICIENT_STORAGE,
                error.to_string(),
            ),

            Error::PoolFull { .. } => HttpError::for_client_error(
                Some(String::from("PoolFull")),
                http::StatusCode::INSUFFICIENT_STORAGE,
                error.to_string(),
            ),

            Error::NoFreeMac => HttpError::for_client_error(
                Some(String::from("NoFreeMac")),
                http::StatusCode::INSUFFICIENT_STORAGE,
                error.to_string(),
            ),

            Error::InternalError { internal_message } => {
                HttpError::for_internal_error(internal_message)
            }

            Error::ServiceUnavailable { message } => HttpError::for_unavail(
                Some(String::from("ServiceNotAvailable")),
                message,
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Error;
    use dropshot::HttpError;

    #[test]
    fn test_http_conversion() {
        let err = Error::invalid_params(
            vec![String::from("ip"), String::from("network_uuid")],
            "ip requires a network",
        );
        let http: HttpError = err.into();
        assert_eq!(http.status_code, http::StatusCode::BAD_REQUEST);
        assert_eq!(http.error_code, Some(String::from("InvalidParameters")));
        assert!(http.external_message.contains("ip, network_uuid"));

        let http: HttpError = Error::duplicate_param("mac").into();
        assert_eq!(http.status_code, http::StatusCode::BAD_REQUEST);
        assert_eq!(http.error_code, Some(String::from("DuplicateParameter")));

        let http: HttpError =
            Error::SubnetFull { network_uuid: uuid::Uuid::nil() }.into();
        assert_eq!(http.status_code, http::StatusCode::INSUFFICIENT_STORAGE);

        let http: HttpError = Error::NoFreeMac.into();
        assert_eq!(http.error_code, Some(String::from("NoFreeMac")));
    }

    #[test]
    fn test_retryable() {
        assert!(Error::unavail("store is down").retryable());
        assert!(!Error::NoFreeMac.retryable());
        assert!(!Error::duplicate_param("mac").retryable());
    }
}
