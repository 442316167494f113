//! Segmented consistent hash.
//!
//! The key space is divided into a fixed number of segments. Each segment has
//! an ordered list of owners, the first being the primary owner. Segment
//! owners are chosen by walking a virtual node ring from the segment's start
//! position, so adding or removing a member only moves the segments whose
//! ring position it takes over or gives up.

use crate::types::NodeId;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hasher;
use twox_hash::XxHash64;

/// Number of virtual nodes per member on the assignment ring.
pub const DEFAULT_VNODES_PER_NODE: usize = 256;

/// Default number of segments.
pub const DEFAULT_SEGMENTS: usize = 256;

/// An immutable segment-to-owners assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistentHash {
    /// Owners per segment, primary first.
    segments: Vec<Vec<NodeId>>,

    /// Sorted, deduplicated members.
    members: Vec<NodeId>,
}

impl ConsistentHash {
    /// Build an assignment for `members` over `num_segments` segments with
    /// up to `num_owners` owners each.
    pub fn new(members: &[NodeId], num_segments: usize, num_owners: usize) -> Self {
        let members: Vec<NodeId> = members
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let num_segments = num_segments.max(1);
        let num_owners = num_owners.max(1).min(members.len());

        let mut ring = BTreeMap::new();
        for &member in &members {
            for i in 0..DEFAULT_VNODES_PER_NODE {
                let vnode = format!("{}:{}", member, i);
                ring.insert(hash_bytes(vnode.as_bytes()), member);
            }
        }

        let segments = (0..num_segments)
            .map(|segment| {
                let start = segment_start(segment, num_segments);
                let mut owners = Vec::with_capacity(num_owners);
                for (_, &member) in ring.range(start..).chain(ring.iter()) {
                    if owners.len() >= num_owners {
                        break;
                    }
                    if !owners.contains(&member) {
                        owners.push(member);
                    }
                }
                owners
            })
            .collect();

        Self { segments, members }
    }

    /// Build from an explicit assignment: `segments[s]` lists the owners of
    /// segment `s`, primary first.
    pub fn from_assignment(segments: Vec<Vec<NodeId>>) -> Self {
        let segments = if segments.is_empty() {
            vec![Vec::new()]
        } else {
            segments
        };
        let members = segments
            .iter()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Self { segments, members }
    }

    /// A hash with no owners at all.
    pub fn empty(num_segments: usize) -> Self {
        Self::from_assignment(vec![Vec::new(); num_segments.max(1)])
    }

    /// Number of segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Members that own at least one segment.
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Check if a node is a member of this hash.
    pub fn is_member(&self, node_id: NodeId) -> bool {
        self.members.binary_search(&node_id).is_ok()
    }

    /// Segment a key belongs to.
    pub fn segment_of(&self, key: &[u8]) -> usize {
        let hash = hash_bytes(key) as u128;
        ((hash * self.segments.len() as u128) >> 64) as usize
    }

    /// Owners of a segment, primary first. Empty for an out-of-range segment.
    pub fn segment_owners(&self, segment: usize) -> &[NodeId] {
        self.segments.get(segment).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Primary owner of a segment.
    pub fn segment_primary(&self, segment: usize) -> Option<NodeId> {
        self.segment_owners(segment).first().copied()
    }

    /// Owners of a key, primary first.
    pub fn owners(&self, key: &[u8]) -> &[NodeId] {
        self.segment_owners(self.segment_of(key))
    }

    /// Primary owner of a key.
    pub fn primary_owner(&self, key: &[u8]) -> Option<NodeId> {
        self.segment_primary(self.segment_of(key))
    }

    /// Segments for which `node_id` is the primary owner.
    pub fn primary_segments(&self, node_id: NodeId) -> Vec<usize> {
        self.segments
            .iter()
            .enumerate()
            .filter(|(_, owners)| owners.first() == Some(&node_id))
            .map(|(segment, _)| segment)
            .collect()
    }

    /// Check if `node_id` is the primary owner of any segment.
    pub fn has_primary_segments(&self, node_id: NodeId) -> bool {
        self.segments
            .iter()
            .any(|owners| owners.first() == Some(&node_id))
    }
}

/// First ring position covered by a segment.
fn segment_start(segment: usize, num_segments: usize) -> u64 {
    let start = ((segment as u128) << 64).div_ceil(num_segments as u128);
    start.min(u64::MAX as u128) as u64
}

/// Hash a key with xxHash64.
fn hash_bytes(key: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(key);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_segment_has_an_owner() {
        let hash = ConsistentHash::new(&[1, 2, 3], 64, 2);
        assert_eq!(hash.num_segments(), 64);
        assert_eq!(hash.members(), &[1, 2, 3]);

        for segment in 0..hash.num_segments() {
            let owners = hash.segment_owners(segment);
            assert_eq!(owners.len(), 2);
            assert_ne!(owners[0], owners[1]);
        }
    }

    #[test]
    fn test_primary_segments_partition_the_key_space() {
        let hash = ConsistentHash::new(&[1, 2, 3], 128, 1);
        let total: usize = [1, 2, 3]
            .iter()
            .map(|&node| hash.primary_segments(node).len())
            .sum();
        assert_eq!(total, 128);

        // With 256 vnodes each member should get a reasonable share.
        for node in [1, 2, 3] {
            assert!(hash.has_primary_segments(node));
        }
    }

    #[test]
    fn test_segment_of_is_stable_and_in_range() {
        let hash = ConsistentHash::new(&[1, 2], 16, 1);
        for i in 0..1000 {
            let key = format!("session-{}", i);
            let segment = hash.segment_of(key.as_bytes());
            assert!(segment < 16);
            assert_eq!(segment, hash.segment_of(key.as_bytes()));
            assert_eq!(
                hash.primary_owner(key.as_bytes()),
                hash.segment_primary(segment)
            );
        }
    }

    #[test]
    fn test_adding_member_moves_only_some_segments() {
        let before = ConsistentHash::new(&[1, 2], 256, 1);
        let after = ConsistentHash::new(&[1, 2, 3], 256, 1);

        let mut moved = 0;
        for segment in 0..256 {
            let old = before.segment_primary(segment);
            let new = after.segment_primary(segment);
            if old != new {
                // Segments only move to the new member.
                assert_eq!(new, Some(3));
                moved += 1;
            }
        }
        assert!(moved > 0);
        assert!(moved < 256);
    }

    #[test]
    fn test_explicit_assignment() {
        let hash = ConsistentHash::from_assignment(vec![vec![1, 2], vec![2, 1], vec![]]);
        assert_eq!(hash.num_segments(), 3);
        assert_eq!(hash.members(), &[1, 2]);
        assert_eq!(hash.segment_primary(0), Some(1));
        assert_eq!(hash.segment_primary(1), Some(2));
        assert_eq!(hash.segment_primary(2), None);
        assert_eq!(hash.segment_primary(9), None);
        assert_eq!(hash.primary_segments(2), vec![1]);
    }

    #[test]
    fn test_empty_hash() {
        let hash = ConsistentHash::new(&[], 8, 2);
        assert_eq!(hash.num_segments(), 8);
        assert!(hash.members().is_empty());
        assert_eq!(hash.primary_owner(b"key"), None);
        assert!(!hash.has_primary_segments(1));

        let hash = ConsistentHash::empty(0);
        assert_eq!(hash.num_segments(), 1);
        assert!(hash.owners(b"key").is_empty());
    }
}
