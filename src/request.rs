//! Call requests and call configuration.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A request that can be executed by a [`ServiceCaller`](crate::ServiceCaller).
///
/// The engine treats the request as opaque; it only needs a textual
/// description for diagnostics and the fail-over flag.
///
/// # Examples
///
/// ```
/// use callover::CallRequest;
///
/// #[derive(Debug)]
/// struct Lookup {
///     key: String,
/// }
///
/// impl CallRequest for Lookup {
///     fn describe(&self) -> String {
///         format!("lookup of {}", self.key)
///     }
/// }
/// ```
pub trait CallRequest: fmt::Debug + Send + Sync {
    /// Describes this request. Must not be empty or only whitespace.
    fn describe(&self) -> String;

    /// Whether this request may be sent to another target after *any*
    /// failure.
    ///
    /// Setting this forces fail-over even when the previous target may have
    /// processed the request already, so non-idempotent requests can then
    /// be executed more than once.
    fn is_fail_over_allowed(&self) -> bool {
        false
    }
}

static CONFIG_INSTANCES: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_instance_number() -> u64 {
    CONFIG_INSTANCES.fetch_add(1, Ordering::Relaxed) + 1
}

/// Protocol-independent call configuration.
///
/// A configuration can be shared between requests and changed while calls
/// are in progress; every read and write goes through a single lock.
pub struct CallConfig {
    instance: u64,
    fail_over_allowed: Mutex<bool>,
}

impl CallConfig {
    /// Creates a configuration that does not allow unconditional fail-over.
    pub fn new() -> Self {
        Self {
            instance: next_instance_number(),
            fail_over_allowed: Mutex::new(false),
        }
    }

    /// Whether fail-over is allowed after any failure.
    pub fn is_fail_over_allowed(&self) -> bool {
        *self.fail_over_allowed.lock()
    }

    /// Allows or disallows fail-over after any failure.
    ///
    /// See [`CallRequest::is_fail_over_allowed`] for the risk involved.
    pub fn set_fail_over_allowed(&self, allowed: bool) {
        *self.fail_over_allowed.lock() = allowed;
    }

    /// Describes this configuration, e.g.
    /// `call config #3 [failOverAllowed=false]`.
    pub fn describe(&self) -> String {
        format!(
            "call config #{} [failOverAllowed={}]",
            self.instance,
            self.is_fail_over_allowed()
        )
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl fmt::Display for CallConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_call_config_defaults() {
        let config = CallConfig::new();
        assert!(!config.is_fail_over_allowed());
        assert!(config.describe().starts_with("call config #"));
        assert!(config.describe().ends_with("[failOverAllowed=false]"));
    }

    #[test]
    fn test_instance_numbers_are_unique() {
        let a = CallConfig::new();
        let b = CallConfig::new();
        assert_ne!(a.describe(), b.describe());
    }

    #[test]
    fn test_concurrent_updates() {
        let config = Arc::new(CallConfig::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let config = config.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        config.set_fail_over_allowed(i % 2 == 0);
                        let _ = config.is_fail_over_allowed();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        config.set_fail_over_allowed(true);
        assert!(config.is_fail_over_allowed());
        assert!(config.describe().ends_with("[failOverAllowed=true]"));
    }
}
