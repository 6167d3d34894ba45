//! # Callover - service calls with fail-over
//!
//! Callover executes a request against one of several redundant endpoints.
//! Endpoints are described by a tree of [`Descriptor`]s: leaves are
//! [`TargetDescriptor`]s (a URL plus time-outs), inner nodes are
//! [`GroupDescriptor`]s that decide the order in which their members are
//! tried. A [`ServiceCaller`] walks the targets in that order, enforces each
//! target's total time-out and fails over to the next target when that is
//! safe. Every failed attempt is recorded as a [`CallException`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use callover::{DescriptorBuilder, HttpCallRequest, HttpServiceCaller, Properties};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), callover::Error> {
//!     let properties: Properties = "
//!         catalog = group, roundrobin, eu, us
//!         catalog.eu = service, https://eu.catalog.example.com/api, 8000, 1000, 5000
//!         catalog.us = service, https://us.catalog.example.com/api, 8000, 1000, 5000
//!     ".parse()?;
//!
//!     let caller = HttpServiceCaller::new(DescriptorBuilder::build(&properties, "catalog")?)?;
//!
//!     let request = HttpCallRequest::new().with_parameter("_function", "ListProducts");
//!     let result = caller.call(request).await?;
//!
//!     println!("Answered by {}", result.succeeded_target().url());
//!     println!("Call took {:?} over {} attempt(s)", result.duration(), result.attempts());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Descriptor trees** - Ordered, random and round-robin groups, nested arbitrarily
//! - **Per-target time-outs** - Connection, socket and total time-outs in milliseconds
//! - **Safe fail-over** - Only connection-level failures fail over by default
//! - **Attempt history** - Every failed attempt is kept, in order, with its cause
//! - **Pluggable protocols** - Implement [`CallProtocol`] to call anything; HTTP is built in
//! - **Property configuration** - Build descriptors from `name = value` text
//! - **Automatic logging** - Structured logging with `tracing` for observability
//!
//! ## Error Handling
//!
//! When no target succeeds the full attempt history is available:
//!
//! ```no_run
//! use callover::{CallExceptionKind, Error, HttpCallRequest, HttpServiceCaller};
//!
//! # async fn example(caller: HttpServiceCaller) {
//! match caller.call(HttpCallRequest::new()).await {
//!     Ok(result) => println!("Status {}", result.status_code()),
//!     Err(Error::CallFailed { exceptions, .. }) => {
//!         for exception in exceptions.iter() {
//!             match exception.kind() {
//!                 CallExceptionKind::StatusCodeRejected { code } => {
//!                     eprintln!("{} answered {}", exception.target().url(), code);
//!                 }
//!                 _ => eprintln!("{}", exception),
//!             }
//!         }
//!     }
//!     Err(e) => eprintln!("Configuration problem: {}", e),
//! }
//! # }
//! ```
//!
//! ## Fail-over Policies
//!
//! Replace the default decision with a combination of policies:
//!
//! ```no_run
//! use callover::{HttpServiceCaller, TargetDescriptor};
//! use callover::failover::{FailOverOnConnectionError, FailOverOnStatusCode, OrPolicy};
//!
//! # fn example() -> Result<(), callover::Error> {
//! let caller = HttpServiceCaller::builder()
//!     .descriptor(TargetDescriptor::new("http://localhost:8080/", 5000)?)
//!     .fail_over_policy(Box::new(OrPolicy::new(vec![
//!         Box::new(FailOverOnConnectionError),
//!         Box::new(FailOverOnStatusCode),
//!     ])))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod builder;
mod caller;
mod descriptor;
mod error;
mod exception;
pub mod failover;
pub mod http;
mod request;
mod result;
mod target;

pub use builder::{DescriptorBuilder, Properties, PropertyReader};
pub use caller::{AttemptFailure, CallProtocol, ServiceCaller, ServiceCallerBuilder};
pub use descriptor::{Descriptor, GroupDescriptor, GroupPolicy, Targets};
pub use error::{Error, Result};
pub use exception::{BoxError, CallException, CallExceptionKind, CallExceptionList};
pub use failover::FailOverPolicy;
pub use self::http::{
    HttpCallConfig, HttpCallData, HttpCallRequest, HttpCallResult, HttpMethod, HttpServiceCaller,
    HttpServiceCallerBuilder, StatusCodeVerifier, SuccessfulStatus,
};
pub use request::{CallConfig, CallRequest};
pub use result::CallResult;
pub use target::TargetDescriptor;
