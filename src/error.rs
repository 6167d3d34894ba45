//! Error types for descriptor configuration and service calls.
//!
//! Configuration problems (malformed URLs, bad descriptor properties,
//! unsupported protocols) are reported at build time. Failures of individual
//! call attempts are collected as [`CallException`](crate::CallException)s and
//! only surface as a single [`Error::CallFailed`] once every eligible target
//! has been tried.

use crate::exception::CallExceptionList;
use http::StatusCode;

/// The main error type for descriptor building and service calls.
///
/// # Examples
///
/// ```no_run
/// use callover::{Error, HttpCallRequest, HttpServiceCaller};
///
/// # async fn example(caller: HttpServiceCaller) {
/// match caller.call(HttpCallRequest::new()).await {
///     Ok(result) => println!("Succeeded at {}", result.succeeded_target().url()),
///     Err(Error::CallFailed { exceptions, .. }) => {
///         eprintln!("Attempted {} target(s):", exceptions.len());
///         for exception in exceptions.iter() {
///             eprintln!("  {}", exception);
///         }
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A target URL does not match the accepted URL grammar.
    #[error("Malformed URL: \"{0}\"")]
    MalformedUrl(String),

    /// A descriptor property that was referenced is not set.
    #[error("Missing required property \"{0}\"")]
    MissingProperty(String),

    /// A descriptor property is set but its value cannot be used.
    #[error("Invalid value for property \"{property}\": \"{value}\". {reason}")]
    InvalidPropertyValue {
        /// The name of the offending property
        property: String,
        /// The raw property value
        value: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A target uses a protocol the protocol caller cannot handle.
    #[error("Unsupported protocol \"{protocol}\" for target {url}")]
    UnsupportedProtocol {
        /// The protocol (URL scheme) of the target
        protocol: String,
        /// The URL of the target
        url: String,
    },

    /// An argument passed to the API was invalid.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid configuration was provided.
    ///
    /// This indicates a problem while setting up a caller, such as an HTTP
    /// transport that cannot be constructed or an invalid header value.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Every attempted target failed.
    ///
    /// The exceptions are ordered by attempt: the first entry belongs to the
    /// first target that was tried.
    #[error("Call failed after {} attempt(s) while executing {request}: {}", .exceptions.len(), last_reason(.exceptions))]
    CallFailed {
        /// Description of the request that was being executed
        request: String,
        /// One exception per attempted target, in attempt order
        exceptions: CallExceptionList,
    },

    /// The body of a successful call could not be deserialized.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },
}

fn last_reason(exceptions: &CallExceptionList) -> &str {
    exceptions
        .last()
        .map(|e| e.short_reason())
        .unwrap_or("no targets attempted")
}

impl Error {
    /// Returns `true` if this error was caused by invalid configuration.
    ///
    /// Configuration errors are fatal and never worth retrying.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedUrl(_)
                | Error::MissingProperty(_)
                | Error::InvalidPropertyValue { .. }
                | Error::UnsupportedProtocol { .. }
                | Error::ConfigurationError(_)
        )
    }

    /// Returns the ordered list of attempt failures if this is a
    /// [`Error::CallFailed`].
    pub fn exceptions(&self) -> Option<&CallExceptionList> {
        match self {
            Error::CallFailed { exceptions, .. } => Some(exceptions),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for this crate.
///
/// This is a convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_errors_are_classified() {
        assert!(Error::MalformedUrl("x".to_string()).is_configuration_error());
        assert!(Error::MissingProperty("svc".to_string()).is_configuration_error());
        assert!(!Error::InvalidArgument("x".to_string()).is_configuration_error());

        let failed = Error::CallFailed {
            request: "req".to_string(),
            exceptions: CallExceptionList::new(),
        };
        assert!(!failed.is_configuration_error());
        assert_eq!(failed.exceptions().map(|e| e.len()), Some(0));
        assert!(failed.to_string().contains("no targets attempted"));
    }
}
