//! Building descriptors from properties.
//!
//! A descriptor is configured with one property per node:
//!
//! ```text
//! api        = group, ordered, primary, backups
//! api.primary = service, http://primary.example.com/api, 5000, 1000, 4000
//! api.backups = group, roundrobin, b1, b2
//! api.b1     = service, http://b1.example.com/api, 8000
//! api.b2     = service, http://b2.example.com/api, 8000
//! ```
//!
//! A `service` value holds a URL and a total time-out, optionally followed by
//! a connection and a socket time-out, all in milliseconds. A `group` value
//! holds a policy and one or more member references. A reference `ref` is
//! always looked up as `<base>.ref`, where `<base>` is the property name the
//! build started from.

use crate::{Descriptor, Error, GroupDescriptor, GroupPolicy, Result, TargetDescriptor};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

const SERVICE_DESCRIPTOR_TYPE: &str = "service";
const GROUP_DESCRIPTOR_TYPE: &str = "group";

/// Read access to a set of named string properties.
pub trait PropertyReader {
    /// Returns the value of the property, if set.
    fn get(&self, name: &str) -> Option<&str>;
}

impl PropertyReader for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        HashMap::get(self, name).map(String::as_str)
    }
}

impl PropertyReader for BTreeMap<String, String> {
    fn get(&self, name: &str) -> Option<&str> {
        BTreeMap::get(self, name).map(String::as_str)
    }
}

/// An ordered set of properties, usually parsed from text.
///
/// The text format has one `name = value` pair per line. Blank lines and
/// lines starting with `#` or `!` are ignored. Names and values are trimmed.
///
/// # Examples
///
/// ```
/// use callover::{Properties, PropertyReader};
///
/// let properties: Properties = "
///     ! Search service
///     search = service, http://search.example.com/, 2000
/// ".parse()?;
///
/// assert_eq!(properties.get("search"), Some("service, http://search.example.com/, 2000"));
/// # Ok::<(), callover::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property, replacing any previous value.
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a property, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// The number of properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no property is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all properties, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl PropertyReader for Properties {
    fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }
}

impl FromStr for Properties {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let mut properties = Properties::new();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let (name, value) = line.split_once('=').ok_or_else(|| {
                Error::ConfigurationError(format!(
                    "Line {}: expected \"name = value\", found \"{}\"",
                    index + 1,
                    line
                ))
            })?;

            let name = name.trim();
            if name.is_empty() {
                return Err(Error::ConfigurationError(format!(
                    "Line {}: property name is empty",
                    index + 1
                )));
            }

            properties.set(name, value.trim());
        }

        Ok(properties)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Builds [`Descriptor`]s from properties.
///
/// # Examples
///
/// ```
/// use callover::{DescriptorBuilder, Properties};
///
/// let properties: Properties = "
///     myapi = group, random, server1, server2
///     myapi.server1 = service, http://server1.example.com/myapi, 10000
///     myapi.server2 = service, http://server2.example.com/myapi, 12000
/// ".parse()?;
///
/// let descriptor = DescriptorBuilder::build(&properties, "myapi")?;
/// assert!(descriptor.is_group());
/// assert_eq!(descriptor.target_count(), 2);
/// # Ok::<(), callover::Error>(())
/// ```
#[derive(Debug)]
pub struct DescriptorBuilder;

impl DescriptorBuilder {
    /// Builds the descriptor configured at `property_name`.
    ///
    /// # Errors
    ///
    /// * [`Error::MissingProperty`] if the property or a referenced member
    ///   property is not set.
    /// * [`Error::InvalidPropertyValue`] if a value cannot be parsed, a URL
    ///   is malformed, or group references form a cycle.
    pub fn build(properties: &impl PropertyReader, property_name: &str) -> Result<Descriptor> {
        let mut path = Vec::new();
        let descriptor = build_node(properties, property_name, None, &mut path)?;

        tracing::debug!(
            property = property_name,
            targets = descriptor.target_count(),
            "Built descriptor"
        );

        Ok(descriptor)
    }
}

fn build_node(
    properties: &impl PropertyReader,
    base: &str,
    reference: Option<&str>,
    path: &mut Vec<String>,
) -> Result<Descriptor> {
    let property = match reference {
        Some(reference) => format!("{}.{}", base, reference),
        None => base.to_string(),
    };

    let value = properties
        .get(&property)
        .ok_or_else(|| Error::MissingProperty(property.clone()))?;

    let invalid = |reason: &str| Error::InvalidPropertyValue {
        property: property.clone(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let tokens: Vec<&str> = value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.len() < 3 {
        return Err(invalid("Expected at least 3 tokens."));
    }

    match tokens[0] {
        SERVICE_DESCRIPTOR_TYPE => {
            if tokens.len() > 5 {
                return Err(invalid(
                    "Expected URL, total time-out and at most a connection and a socket time-out.",
                ));
            }

            let mut timeouts = [0i64; 3];
            for (slot, token) in timeouts.iter_mut().zip(&tokens[2..]) {
                *slot = token
                    .parse()
                    .map_err(|_| invalid(&format!("Unable to parse time-out \"{}\".", token)))?;
            }
            let [total, connection, socket] = timeouts;

            let url = tokens[1];
            let target = match tokens.len() {
                3 => TargetDescriptor::new(url, total),
                4 => TargetDescriptor::with_connection_timeout(url, total, connection),
                _ => TargetDescriptor::with_timeouts(url, total, connection, socket),
            };
            target
                .map(Descriptor::from)
                .map_err(|_| invalid("Malformed URL."))
        }
        GROUP_DESCRIPTOR_TYPE => {
            let policy: GroupPolicy = tokens[1]
                .parse()
                .map_err(|_| invalid("Unrecognized group descriptor type."))?;

            build_group(properties, base, &property, value, policy, &tokens[2..], path)
        }
        _ => Err(invalid(&format!(
            "Expected valid descriptor type: either \"{}\" or \"{}\".",
            SERVICE_DESCRIPTOR_TYPE, GROUP_DESCRIPTOR_TYPE
        ))),
    }
}

fn build_group(
    properties: &impl PropertyReader,
    base: &str,
    property: &str,
    value: &str,
    policy: GroupPolicy,
    references: &[&str],
    path: &mut Vec<String>,
) -> Result<Descriptor> {
    let mut members = Vec::with_capacity(references.len());

    for &reference in references {
        if path.iter().any(|visited| visited == reference) {
            return Err(Error::InvalidPropertyValue {
                property: property.to_string(),
                value: value.to_string(),
                reason: format!("Reference \"{}\" forms a cycle.", reference),
            });
        }

        path.push(reference.to_string());
        let member = build_node(properties, base, Some(reference), path);
        path.pop();
        members.push(member?);
    }

    Ok(GroupDescriptor::new(policy, members)?.into())
}
