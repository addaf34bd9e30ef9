//! Organizing processes as groups and communicators
//!
//! A trace only ever records communicators through process-local handles. Once the
//! construction calls of all participating ranks have been combined, a communicator is
//! described by the values in this module: a `Group` that lists the global ranks of its members
//! in local rank order, seen from one specific process, and a `Communicator` that pairs such a
//! group with an identity that is consistent across all ranks of the trace set.
//!
//! Both types are plain values. They are never mutated after construction and can be cloned
//! freely by consumers such as replay engines or format converters.
//!
//! Identities `0` and `1` are reserved for the world and self communicators, `2` is unused and
//! communicators that are reconstructed from the trace receive identities starting at `3`.
use std::fmt;

use conv::ConvUtil;

use crate::error::{Error, Result};

/// Identifies a certain process within a group or communicator.
pub type Rank = i32;

/// The identity of a communicator, consistent across all ranks of a trace set.
pub type CommId = i32;

/// A key used when determining the rank order of processes after a communicator split.
pub type Key = i32;

/// Rank of a process that is not a member of a group
pub const UNDEFINED: Rank = -1;

/// Identity of the null communicator
pub const NULL_ID: CommId = -1;

/// Identity of the world communicator
pub const WORLD_ID: CommId = 0;

/// Identity of the self communicator
pub const SELF_ID: CommId = 1;

/// First identity handed out to communicators reconstructed from a trace
pub const FIRST_USER_ID: CommId = 3;

/// Checks that `rank` addresses a member of a group with `size` members and turns it into an
/// index.
pub(crate) fn rank_index(rank: Rank, size: usize) -> Result<usize> {
    rank.value_as::<usize>()
        .ok()
        .filter(|&index| index < size)
        .ok_or(Error::InvalidRank { rank, size })
}

/// Turns an index into a group of validated size back into a rank.
fn index_rank(index: usize) -> Rank {
    index
        .value_as::<Rank>()
        .expect("Group sizes are bounded by the range of Rank")
}

/// A color used in a communicator split
///
/// Processes that pass a negative color, e.g. the undefined color, do not join any of the
/// communicators created by the split.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Color(i32);

impl Color {
    /// Special color of undefined value
    pub fn undefined() -> Color {
        Color(UNDEFINED)
    }

    /// A color of a certain value
    ///
    /// Valid values are non-negative.
    pub fn with_value(value: i32) -> Color {
        if value < 0 {
            panic!("Value of color must be non-negative.")
        }
        Color(value)
    }

    /// A color exactly as recorded in a trace, negative values opt out of the split.
    pub fn from_raw(value: i32) -> Color {
        Color(value)
    }

    /// Whether a process passing this color stays out of the split
    pub fn is_undefined(&self) -> bool {
        self.0 < 0
    }

    /// The raw value as recorded in a trace
    pub fn value(&self) -> i32 {
        self.0
    }
}

/// The membership of a communicator, seen from one process
///
/// `peers()[r]` is the global rank of the process with local rank `r`. A process that is not a
/// member of the group has no local rank.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Group {
    local_rank: Rank,
    peers: Vec<Rank>,
}

impl Default for Group {
    fn default() -> Self {
        Group::empty()
    }
}

impl Group {
    /// A group as seen by the process with rank `local_rank`.
    ///
    /// A negative `local_rank` describes the group from the point of view of a process that is
    /// not a member.
    ///
    /// # Errors
    ///
    /// `InvalidRank` if `local_rank` is not smaller than the number of peers.
    pub fn new(local_rank: Rank, peers: Vec<Rank>) -> Result<Group> {
        if peers.len().value_as::<Rank>().is_err() {
            return Err(Error::InvalidRank {
                rank: local_rank,
                size: peers.len(),
            });
        }
        if local_rank < 0 {
            return Ok(Group {
                local_rank: UNDEFINED,
                peers,
            });
        }
        rank_index(local_rank, peers.len())?;
        Ok(Group { local_rank, peers })
    }

    /// The empty group, the group of the null communicator
    pub fn empty() -> Group {
        Group {
            local_rank: UNDEFINED,
            peers: Vec::new(),
        }
    }

    /// The group `peers` as seen by the process with global rank `global`.
    ///
    /// The local rank is the first position of `global` in `peers`, if any.
    pub fn for_process(global: Rank, peers: Vec<Rank>) -> Result<Group> {
        let local_rank = peers
            .iter()
            .position(|&peer| peer == global)
            .map_or(UNDEFINED, index_rank);
        Group::new(local_rank, peers)
    }

    /// Number of processes in the group.
    pub fn size(&self) -> usize {
        self.peers.len()
    }

    /// Rank of this process within the group.
    pub fn rank(&self) -> Option<Rank> {
        if self.local_rank < 0 {
            None
        } else {
            Some(self.local_rank)
        }
    }

    /// Rank of this process within the group, `UNDEFINED` if it is not a member.
    pub fn local_rank(&self) -> Rank {
        self.local_rank
    }

    /// Global rank of this process, if it is a member of the group.
    pub fn global_rank(&self) -> Option<Rank> {
        self.rank().map(|rank| self.peers[rank as usize])
    }

    /// Global ranks of all members in local rank order
    pub fn peers(&self) -> &[Rank] {
        &self.peers[..]
    }

    /// Whether the process with global rank `global` is a member
    pub fn contains(&self, global: Rank) -> bool {
        self.peers.contains(&global)
    }

    /// Local rank of the process with global rank `global`, if it is a member.
    pub fn position_of(&self, global: Rank) -> Option<Rank> {
        self.peers
            .iter()
            .position(|&peer| peer == global)
            .map(index_rank)
    }

    /// Same local rank and same members in the same order.
    pub fn is_identical_to(&self, other: &Group) -> bool {
        self.local_rank == other.local_rank && self.peers == other.peers
    }

    /// Compare the membership of two groups.
    ///
    /// The local rank of the observing process is not taken into account.
    pub fn compare(&self, other: &Group) -> GroupRelation {
        if self.peers == other.peers {
            GroupRelation::Identical
        } else if self.size() == other.size() && self.peers.iter().all(|&p| other.contains(p)) {
            GroupRelation::Similar
        } else {
            GroupRelation::Unequal
        }
    }

    /// Group difference
    ///
    /// Constructs a new group that contains all members of the first group that are not also
    /// members of the second group in the order they have in the first group.
    pub fn difference(&self, other: &Group) -> Group {
        let peers = self
            .peers
            .iter()
            .cloned()
            .filter(|&p| !other.contains(p))
            .collect();
        self.derive(self.global_rank(), peers)
    }

    fn derive(&self, me: Option<Rank>, peers: Vec<Rank>) -> Group {
        // peers is a subset of a group that already passed validation
        let mut group = Group {
            local_rank: UNDEFINED,
            peers,
        };
        group.local_rank = me
            .and_then(|global| group.position_of(global))
            .unwrap_or(UNDEFINED);
        group
    }
}

/// The relation between two groups.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GroupRelation {
    /// Identical group members in identical order
    Identical,
    /// Identical group members in different order
    Similar,
    /// Otherwise
    Unequal,
}

/// A communicator reconstructed from a trace, seen from one process
///
/// A process that does not belong to a communicator holds the null communicator, which has a
/// negative identity and an empty group.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Communicator {
    id: CommId,
    group: Group,
}

impl Default for Communicator {
    fn default() -> Self {
        Communicator::null()
    }
}

impl Communicator {
    /// The communicator `id` as seen by the process that has its local rank in `group`.
    ///
    /// If the process is not a member of `group` (or `id` is negative) the null communicator is
    /// returned instead.
    pub fn new(id: CommId, group: Group) -> Communicator {
        if id < 0 || group.rank().is_none() {
            Communicator::null()
        } else {
            Communicator { id, group }
        }
    }

    /// The null communicator
    pub fn null() -> Communicator {
        Communicator {
            id: NULL_ID,
            group: Group::empty(),
        }
    }

    /// Whether this is the null communicator
    pub fn is_null(&self) -> bool {
        self.id < 0
    }

    /// The identity of the communicator, negative for the null communicator
    pub fn id(&self) -> CommId {
        self.id
    }

    /// The group associated with this communicator
    pub fn group(&self) -> &Group {
        &self.group
    }

    /// Number of processes in this communicator
    pub fn size(&self) -> usize {
        self.group.size()
    }

    /// The `Rank` that identifies the observing process within this communicator
    pub fn rank(&self) -> Option<Rank> {
        self.group.rank()
    }

    /// The global rank of the observing process
    pub fn global_rank(&self) -> Option<Rank> {
        self.group.global_rank()
    }

    /// Compare two communicators.
    ///
    /// See enum `CommunicatorRelation`.
    pub fn compare(&self, other: &Communicator) -> CommunicatorRelation {
        match self.group.compare(&other.group) {
            GroupRelation::Identical if self.id == other.id => CommunicatorRelation::Identical,
            GroupRelation::Identical => CommunicatorRelation::Congruent,
            GroupRelation::Similar => CommunicatorRelation::Similar,
            GroupRelation::Unequal => CommunicatorRelation::Unequal,
        }
    }
}

impl fmt::Display for Communicator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.rank() {
            Some(rank) => write!(f, "comm {} (rank {} of {})", self.id, rank, self.size()),
            None => write!(f, "comm null"),
        }
    }
}

/// The relation between two communicators.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CommunicatorRelation {
    /// Identical groups and same identity
    Identical,
    /// Groups match in constituents and rank order, identities differ
    Congruent,
    /// Group constituents match but rank order differs
    Similar,
    /// Otherwise
    Unequal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_rank_is_peer_at_local_rank() {
        let peers = vec![4, 0, 6, 7, 8];
        for local in 0..5 {
            let group = Group::new(local, peers.clone()).unwrap();
            assert_eq!(Some(peers[local as usize]), group.global_rank());
            assert_eq!(Some(local), group.rank());
        }
    }

    #[test]
    fn local_rank_out_of_range() {
        assert_eq!(
            Err(Error::InvalidRank { rank: 3, size: 3 }),
            Group::new(3, vec![0, 1, 2])
        );
        assert!(Group::new(0, vec![]).is_err());
    }

    #[test]
    fn non_member_view() {
        let group = Group::new(-5, vec![1, 2]).unwrap();
        assert_eq!(UNDEFINED, group.local_rank());
        assert_eq!(None, group.global_rank());
        assert_eq!(2, group.size());

        let group = Group::for_process(9, vec![1, 2]).unwrap();
        assert_eq!(None, group.rank());
        let group = Group::for_process(2, vec![1, 2]).unwrap();
        assert_eq!(Some(1), group.rank());
    }

    #[test]
    fn non_member_group_yields_null() {
        let comm = Communicator::new(7, Group::new(-1, vec![0, 1, 2]).unwrap());
        assert!(comm.is_null());
        assert!(comm.id() < 0);
        assert_eq!(&Group::empty(), comm.group());
        assert_eq!(Communicator::null(), comm);
        assert_eq!(Communicator::null(), Communicator::default());
    }

    #[test]
    fn negative_id_yields_null() {
        let comm = Communicator::new(-3, Group::new(0, vec![5]).unwrap());
        assert_eq!(Communicator::null(), comm);
    }

    #[test]
    fn compare_groups() {
        let a = Group::new(0, vec![0, 1, 2]).unwrap();
        let b = Group::new(2, vec![0, 1, 2]).unwrap();
        let c = Group::new(0, vec![2, 1, 0]).unwrap();
        let d = Group::new(0, vec![2, 1, 3]).unwrap();

        assert_eq!(GroupRelation::Identical, a.compare(&b));
        assert!(!a.is_identical_to(&b));
        assert!(a.is_identical_to(&a.clone()));
        assert_eq!(GroupRelation::Similar, a.compare(&c));
        assert_eq!(GroupRelation::Unequal, a.compare(&d));
    }

    #[test]
    fn compare_communicators() {
        let world = Group::new(1, vec![0, 1, 2]).unwrap();
        let a = Communicator::new(0, world.clone());
        let b = Communicator::new(3, world);
        let c = Communicator::new(4, Group::new(0, vec![1, 0, 2]).unwrap());

        assert_eq!(CommunicatorRelation::Identical, a.compare(&a.clone()));
        assert_eq!(CommunicatorRelation::Congruent, a.compare(&b));
        assert_eq!(CommunicatorRelation::Similar, a.compare(&c));
        assert_eq!(
            CommunicatorRelation::Unequal,
            a.compare(&Communicator::null())
        );
    }

    #[test]
    fn difference() {
        let a = Group::new(1, vec![0, 1, 2, 3]).unwrap();
        let b = Group::new(0, vec![5, 3, 1]).unwrap();

        let difference = a.difference(&b);
        assert_eq!(&[0, 2], difference.peers());
        assert_eq!(None, difference.rank());

        let difference = b.difference(&a);
        assert_eq!(&[5], difference.peers());
        assert_eq!(Some(0), difference.rank());
    }

    #[test]
    fn colors() {
        assert!(Color::undefined().is_undefined());
        assert!(Color::from_raw(-32766).is_undefined());
        assert!(!Color::with_value(0).is_undefined());
        assert_eq!(4, Color::with_value(4).value());
    }

    #[test]
    #[should_panic]
    fn negative_color_value() {
        Color::with_value(-1);
    }

    #[test]
    fn display() {
        let comm = Communicator::new(3, Group::new(1, vec![4, 2]).unwrap());
        assert_eq!("comm 3 (rank 1 of 2)", comm.to_string());
        assert_eq!("comm null", Communicator::null().to_string());
    }
}
