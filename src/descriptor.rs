//! Descriptor trees: targets and groups of targets.
//!
//! A [`Descriptor`] is either a single [`TargetDescriptor`] or a
//! [`GroupDescriptor`] holding other descriptors. Groups can nest
//! arbitrarily; iterating a descriptor always yields its leaf targets in the
//! order in which a caller should try them.

use crate::{Error, Result, TargetDescriptor};
use rand::seq::SliceRandom;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Determines the order in which the members of a group are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupPolicy {
    /// Members are tried in the configured order.
    Ordered,

    /// Members are shuffled for every traversal.
    Random,

    /// Every traversal starts one member further than the previous one.
    RoundRobin,
}

impl GroupPolicy {
    /// The name used for this policy in descriptor properties.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupPolicy::Ordered => "ordered",
            GroupPolicy::Random => "random",
            GroupPolicy::RoundRobin => "roundrobin",
        }
    }
}

impl fmt::Display for GroupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ordered" => Ok(GroupPolicy::Ordered),
            "random" => Ok(GroupPolicy::Random),
            "roundrobin" | "round-robin" => Ok(GroupPolicy::RoundRobin),
            other => Err(Error::InvalidArgument(format!(
                "Unrecognized group policy \"{}\"",
                other
            ))),
        }
    }
}

/// A descriptor of one or more service targets.
///
/// # Examples
///
/// ```
/// use callover::{Descriptor, GroupDescriptor, GroupPolicy, TargetDescriptor};
///
/// let primary = TargetDescriptor::new("http://primary.example.com/api", 2000)?;
/// let backup = TargetDescriptor::new("http://backup.example.com/api", 5000)?;
///
/// let descriptor: Descriptor =
///     GroupDescriptor::new(GroupPolicy::Ordered, vec![primary.into(), backup.into()])?.into();
///
/// assert!(descriptor.is_group());
/// assert_eq!(descriptor.target_count(), 2);
///
/// let urls: Vec<_> = descriptor.iterate_targets().map(|t| t.url()).collect();
/// assert_eq!(urls, ["http://primary.example.com/api", "http://backup.example.com/api"]);
/// # Ok::<(), callover::Error>(())
/// ```
#[derive(Debug)]
pub enum Descriptor {
    /// A single service endpoint.
    Target(TargetDescriptor),

    /// A group of descriptors with a selection policy.
    Group(GroupDescriptor),
}

impl Descriptor {
    /// Returns `true` for groups.
    pub fn is_group(&self) -> bool {
        matches!(self, Descriptor::Group(_))
    }

    /// The number of leaf targets in this descriptor. Always at least `1`.
    pub fn target_count(&self) -> usize {
        match self {
            Descriptor::Target(target) => target.target_count(),
            Descriptor::Group(group) => group.target_count(),
        }
    }

    /// Lazily iterates over all leaf targets in the order they should be
    /// tried.
    ///
    /// Every call starts a new traversal. For random and round-robin groups
    /// the order may differ between traversals.
    pub fn iterate_targets(&self) -> Targets<'_> {
        Targets {
            stack: vec![vec![self].into_iter()],
        }
    }

    /// Finds the first target, depth-first in configured order, whose
    /// checksum equals `crc`.
    pub fn target_by_crc(&self, crc: u32) -> Option<&TargetDescriptor> {
        match self {
            Descriptor::Target(target) => target.target_by_crc(crc),
            Descriptor::Group(group) => group.target_by_crc(crc),
        }
    }

    /// All leaf targets, depth-first in configured order.
    ///
    /// Unlike [`iterate_targets`](Self::iterate_targets) this ignores group
    /// policies and leaves round-robin state untouched, which makes it
    /// suitable for inspecting a descriptor.
    pub fn configured_targets(&self) -> Vec<&TargetDescriptor> {
        let mut targets = Vec::with_capacity(self.target_count());
        self.collect_targets(&mut targets);
        targets
    }

    fn collect_targets<'a>(&'a self, targets: &mut Vec<&'a TargetDescriptor>) {
        match self {
            Descriptor::Target(target) => targets.push(target),
            Descriptor::Group(group) => {
                for member in &group.members {
                    member.collect_targets(targets);
                }
            }
        }
    }
}

impl From<TargetDescriptor> for Descriptor {
    fn from(target: TargetDescriptor) -> Self {
        Descriptor::Target(target)
    }
}

impl From<GroupDescriptor> for Descriptor {
    fn from(group: GroupDescriptor) -> Self {
        Descriptor::Group(group)
    }
}

impl From<TargetDescriptor> for Arc<Descriptor> {
    fn from(target: TargetDescriptor) -> Self {
        Arc::new(Descriptor::Target(target))
    }
}

impl From<GroupDescriptor> for Arc<Descriptor> {
    fn from(group: GroupDescriptor) -> Self {
        Arc::new(Descriptor::Group(group))
    }
}

/// A group of descriptors.
#[derive(Debug)]
pub struct GroupDescriptor {
    policy: GroupPolicy,
    members: Vec<Descriptor>,
    target_count: usize,
    next_start: AtomicUsize,
}

impl GroupDescriptor {
    /// Creates a group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `members` is empty.
    pub fn new(policy: GroupPolicy, members: Vec<Descriptor>) -> Result<Self> {
        if members.is_empty() {
            return Err(Error::InvalidArgument(
                "A group descriptor needs at least one member".to_string(),
            ));
        }

        let target_count = members.iter().map(Descriptor::target_count).sum();

        Ok(Self {
            policy,
            members,
            target_count,
            next_start: AtomicUsize::new(0),
        })
    }

    /// The selection policy of this group.
    pub fn policy(&self) -> GroupPolicy {
        self.policy
    }

    /// The direct members of this group, in configured order.
    pub fn members(&self) -> &[Descriptor] {
        &self.members
    }

    /// The number of leaf targets below this group.
    pub fn target_count(&self) -> usize {
        self.target_count
    }

    /// Finds the first target, depth-first in configured order, whose
    /// checksum equals `crc`.
    pub fn target_by_crc(&self, crc: u32) -> Option<&TargetDescriptor> {
        self.members.iter().find_map(|m| m.target_by_crc(crc))
    }

    /// The members in the order of one traversal.
    fn traversal_order(&self) -> Vec<&Descriptor> {
        let mut order: Vec<&Descriptor> = self.members.iter().collect();
        match self.policy {
            GroupPolicy::Ordered => {}
            GroupPolicy::Random => order.shuffle(&mut rand::thread_rng()),
            GroupPolicy::RoundRobin => {
                let start = self.next_start.fetch_add(1, Ordering::Relaxed) % order.len();
                order.rotate_left(start);
            }
        }
        order
    }
}

/// Iterator over the leaf targets of a [`Descriptor`].
///
/// Created by [`Descriptor::iterate_targets`]. The order of a group's
/// members is decided when the iterator first descends into that group.
pub struct Targets<'a> {
    stack: Vec<std::vec::IntoIter<&'a Descriptor>>,
}

impl<'a> Iterator for Targets<'a> {
    type Item = &'a TargetDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let level = self.stack.last_mut()?;
            match level.next() {
                Some(Descriptor::Target(target)) => return Some(target),
                Some(Descriptor::Group(group)) => {
                    self.stack.push(group.traversal_order().into_iter());
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl fmt::Debug for Targets<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Targets")
            .field("depth", &self.stack.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn target(name: &str) -> Descriptor {
        TargetDescriptor::new(format!("http://{}.example.com/", name), 1000)
            .unwrap()
            .into()
    }

    fn group(policy: GroupPolicy, members: Vec<Descriptor>) -> Descriptor {
        GroupDescriptor::new(policy, members).unwrap().into()
    }

    fn urls(descriptor: &Descriptor) -> Vec<String> {
        descriptor
            .iterate_targets()
            .map(|t| t.url().to_string())
            .collect()
    }

    #[test]
    fn test_empty_group_is_rejected() {
        let result = GroupDescriptor::new(GroupPolicy::Ordered, Vec::new());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_ordered_group_keeps_configured_order() {
        let descriptor = group(
            GroupPolicy::Ordered,
            vec![target("a"), group(GroupPolicy::Ordered, vec![target("b"), target("c")]), target("d")],
        );

        assert!(descriptor.is_group());
        assert_eq!(descriptor.target_count(), 4);

        let expected = [
            "http://a.example.com/",
            "http://b.example.com/",
            "http://c.example.com/",
            "http://d.example.com/",
        ];
        // Restartable: every traversal is complete and identical
        assert_eq!(urls(&descriptor), expected);
        assert_eq!(urls(&descriptor), expected);
    }

    #[test]
    fn test_every_policy_yields_each_target_once() {
        for policy in [GroupPolicy::Ordered, GroupPolicy::Random, GroupPolicy::RoundRobin] {
            let descriptor = group(
                policy,
                vec![
                    target("a"),
                    group(policy, vec![target("b"), target("c"), target("d")]),
                    target("e"),
                    group(policy, vec![target("f")]),
                ],
            );

            for _ in 0..20 {
                let seen = urls(&descriptor);
                assert_eq!(seen.len(), descriptor.target_count());
                let unique: HashSet<_> = seen.iter().collect();
                assert_eq!(unique.len(), 6, "duplicates with policy {}", policy);
            }
        }
    }

    #[test]
    fn test_round_robin_rotates_between_traversals() {
        let descriptor = group(
            GroupPolicy::RoundRobin,
            vec![target("a"), target("b"), target("c")],
        );

        let first = urls(&descriptor);
        let second = urls(&descriptor);
        let third = urls(&descriptor);
        let fourth = urls(&descriptor);

        assert_ne!(first, second);
        let mut rotated = first.clone();
        rotated.rotate_left(1);
        assert_eq!(second, rotated);
        rotated.rotate_left(1);
        assert_eq!(third, rotated);
        // Full cycle
        assert_eq!(fourth, first);
    }

    #[test]
    fn test_random_group_contains_all_members() {
        let descriptor = group(
            GroupPolicy::Random,
            vec![target("a"), target("b"), target("c"), target("d")],
        );

        let mut sorted = urls(&descriptor);
        sorted.sort();
        assert_eq!(
            sorted,
            [
                "http://a.example.com/",
                "http://b.example.com/",
                "http://c.example.com/",
                "http://d.example.com/",
            ]
        );
    }

    #[test]
    fn test_target_by_crc_searches_depth_first() {
        let descriptor = group(
            GroupPolicy::Random,
            vec![target("a"), group(GroupPolicy::Ordered, vec![target("b")])],
        );

        let b = TargetDescriptor::new("http://b.example.com/", 1).unwrap();
        let found = descriptor.target_by_crc(b.crc()).unwrap();
        assert_eq!(found.url(), "http://b.example.com/");
        assert_eq!(found.total_timeout_ms(), 1000);

        let missing = TargetDescriptor::new("http://z.example.com/", 1).unwrap();
        assert!(descriptor.target_by_crc(missing.crc()).is_none());
    }

    #[test]
    fn test_configured_targets_leave_round_robin_alone() {
        let descriptor = group(
            GroupPolicy::RoundRobin,
            vec![target("a"), group(GroupPolicy::Random, vec![target("b"), target("c")])],
        );

        let configured: Vec<_> = descriptor.configured_targets().iter().map(|t| t.url()).collect();
        assert_eq!(
            configured,
            ["http://a.example.com/", "http://b.example.com/", "http://c.example.com/"]
        );

        // The first real traversal still starts at the first member
        assert_eq!(urls(&descriptor)[0], "http://a.example.com/");
    }

    #[test]
    fn test_single_target_descriptor() {
        let descriptor = target("solo");
        assert!(!descriptor.is_group());
        assert_eq!(descriptor.target_count(), 1);
        assert_eq!(urls(&descriptor), ["http://solo.example.com/"]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("ordered".parse::<GroupPolicy>().unwrap(), GroupPolicy::Ordered);
        assert_eq!("random".parse::<GroupPolicy>().unwrap(), GroupPolicy::Random);
        assert_eq!("roundrobin".parse::<GroupPolicy>().unwrap(), GroupPolicy::RoundRobin);
        assert_eq!("round-robin".parse::<GroupPolicy>().unwrap(), GroupPolicy::RoundRobin);
        assert!("fastest".parse::<GroupPolicy>().is_err());
        assert_eq!(GroupPolicy::RoundRobin.to_string(), "roundrobin");
    }
}
