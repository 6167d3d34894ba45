//! Leaf descriptors: a single service endpoint with its time-outs.

use crate::{Error, Result};
use std::fmt;
use std::time::Duration;

/// Describes a single service endpoint: a URL plus three time-outs.
///
/// All time-outs are in milliseconds, with `0` meaning "disabled":
///
/// * the *total* time-out bounds one complete attempt against this target,
///   covering both connecting and transferring data;
/// * the *connection* time-out bounds establishing the connection;
/// * the *socket* time-out bounds waiting for data on an open connection.
///
/// When the total time-out is enabled, the connection and socket time-outs
/// never exceed it.
///
/// # Examples
///
/// ```
/// use callover::TargetDescriptor;
///
/// let target = TargetDescriptor::with_timeouts("http://api.example.com/v1", 5000, 8000, 1000)?;
/// assert_eq!(target.total_timeout_ms(), 5000);
/// assert_eq!(target.connection_timeout_ms(), 5000); // clamped
/// assert_eq!(target.socket_timeout_ms(), 1000);
///
/// let crc = target.crc();
/// assert!(target.target_by_crc(crc).is_some());
/// # Ok::<(), callover::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    url: String,
    total_timeout_ms: u64,
    connection_timeout_ms: u64,
    socket_timeout_ms: u64,
    crc: u32,
}

impl TargetDescriptor {
    /// Creates a target whose connection and socket time-outs equal the
    /// total time-out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedUrl`] if the URL is not acceptable.
    pub fn new(url: impl Into<String>, total_timeout_ms: i64) -> Result<Self> {
        Self::with_timeouts(url, total_timeout_ms, total_timeout_ms, total_timeout_ms)
    }

    /// Creates a target with an explicit connection time-out. The socket
    /// time-out equals the total time-out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedUrl`] if the URL is not acceptable.
    pub fn with_connection_timeout(
        url: impl Into<String>,
        total_timeout_ms: i64,
        connection_timeout_ms: i64,
    ) -> Result<Self> {
        Self::with_timeouts(url, total_timeout_ms, connection_timeout_ms, total_timeout_ms)
    }

    /// Creates a target with all three time-outs.
    ///
    /// Negative and zero values disable the corresponding time-out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedUrl`] if the URL is not acceptable.
    pub fn with_timeouts(
        url: impl Into<String>,
        total_timeout_ms: i64,
        connection_timeout_ms: i64,
        socket_timeout_ms: i64,
    ) -> Result<Self> {
        let url = url.into();
        if !is_valid_url(&url) {
            return Err(Error::MalformedUrl(url));
        }

        let total = normalize(total_timeout_ms);
        let clamp = |timeout: i64| {
            let timeout = normalize(timeout);
            if total > 0 {
                timeout.min(total)
            } else {
                timeout
            }
        };

        let crc = crc32fast::hash(url.as_bytes());

        Ok(Self {
            total_timeout_ms: total,
            connection_timeout_ms: clamp(connection_timeout_ms),
            socket_timeout_ms: clamp(socket_timeout_ms),
            url,
            crc,
        })
    }

    /// Always `false`: a target is a leaf.
    pub fn is_group(&self) -> bool {
        false
    }

    /// The URL of the service endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The protocol of the URL, e.g. `"http"`.
    ///
    /// For compound schemes such as `jdbc:odbc://` this is the part before
    /// the first colon.
    pub fn protocol(&self) -> &str {
        let scheme_end = self.url.find(':').unwrap_or(self.url.len());
        &self.url[..scheme_end]
    }

    /// The total time-out in milliseconds, `0` if disabled.
    pub fn total_timeout_ms(&self) -> u64 {
        self.total_timeout_ms
    }

    /// The connection time-out in milliseconds, `0` if disabled.
    pub fn connection_timeout_ms(&self) -> u64 {
        self.connection_timeout_ms
    }

    /// The socket time-out in milliseconds, `0` if disabled.
    pub fn socket_timeout_ms(&self) -> u64 {
        self.socket_timeout_ms
    }

    /// The total time-out, or `None` if disabled.
    pub fn total_timeout(&self) -> Option<Duration> {
        as_duration(self.total_timeout_ms)
    }

    /// The connection time-out, or `None` if disabled.
    pub fn connection_timeout(&self) -> Option<Duration> {
        as_duration(self.connection_timeout_ms)
    }

    /// The socket time-out, or `None` if disabled.
    pub fn socket_timeout(&self) -> Option<Duration> {
        as_duration(self.socket_timeout_ms)
    }

    /// The CRC-32 checksum of the URL.
    pub fn crc(&self) -> u32 {
        self.crc
    }

    /// Always `1`.
    pub fn target_count(&self) -> usize {
        1
    }

    /// Iterates over this target, yielding it exactly once.
    pub fn iterate_targets(&self) -> std::iter::Once<&TargetDescriptor> {
        std::iter::once(self)
    }

    /// Returns this target if its checksum equals `crc`.
    pub fn target_by_crc(&self, crc: u32) -> Option<&TargetDescriptor> {
        (self.crc == crc).then_some(self)
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TargetDescriptor(url=\"{}\"; total-time-out={}; connection-time-out={}; socket-time-out={})",
            self.url,
            TimeoutDisplay(self.total_timeout_ms),
            TimeoutDisplay(self.connection_timeout_ms),
            TimeoutDisplay(self.socket_timeout_ms),
        )
    }
}

/// Renders a millisecond time-out as `"<n> ms"` or `"disabled"`.
pub(crate) struct TimeoutDisplay(pub(crate) u64);

impl fmt::Display for TimeoutDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            f.write_str("disabled")
        } else {
            write!(f, "{} ms", self.0)
        }
    }
}

fn normalize(timeout_ms: i64) -> u64 {
    u64::try_from(timeout_ms).unwrap_or(0)
}

fn as_duration(timeout_ms: u64) -> Option<Duration> {
    (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms))
}

/// Checks `url` against
/// `scheme[:scheme]://label(.label)*(:port)?(/segment)*`.
fn is_valid_url(url: &str) -> bool {
    let Some((scheme, rest)) = url.split_once("://") else {
        return false;
    };

    let mut schemes = scheme.split(':');
    let scheme_ok = match (schemes.next(), schemes.next(), schemes.next()) {
        (Some(main), None, None) => is_scheme(main),
        (Some(main), Some(sub), None) => is_scheme(main) && is_scheme(sub),
        _ => false,
    };
    if !scheme_ok {
        return false;
    }

    let (authority, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], Some(&rest[slash + 1..])),
        None => (rest, None),
    };

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    };

    if !host.split('.').all(is_host_label) {
        return false;
    }

    if let Some(port) = port {
        let mut digits = port.chars();
        match digits.next() {
            Some('1'..='9') => {}
            _ => return false,
        }
        if !digits.all(|c| c.is_ascii_digit()) {
            return false;
        }
    }

    path.map_or(true, |path| path.split('/').all(is_path_segment))
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some('a'..='z'))
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

fn is_host_label(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_path_segment(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '~' | '.' | '%'))
}
