use std::collections::HashSet;

use log::trace;

use super::{ConstructionKind, Tally};
use crate::error::{Result, Violation};
use crate::topology::{CommId, Communicator, Group, Rank};

/// Reconstructs `MPI_Comm_create`
///
/// All members of the input communicator pass the same subgroup. Members of the subgroup end up
/// with a communicator whose local ranks follow the order of the subgroup, everybody else gets
/// the null communicator.
#[derive(Debug)]
pub(crate) struct Create {
    id: CommId,
    subgroup: Option<Vec<Rank>>,
    pub(super) tally: Tally,
}

impl Create {
    pub fn new(id: CommId, size: usize) -> Create {
        Create {
            id,
            subgroup: None,
            tally: Tally::new(ConstructionKind::Create, size),
        }
    }

    pub fn id(&self) -> CommId {
        self.id
    }

    pub fn add(&mut self, input: &Communicator, subgroup: &Group) -> Result<Rank> {
        let rank = self.tally.check(input)?;
        let peers = subgroup.peers();

        let mut seen = HashSet::with_capacity(peers.len());
        if let Some(&repeated) = peers.iter().find(|&&peer| !seen.insert(peer)) {
            return Err(self.tally.violation(rank, Violation::RepeatedMember(repeated)));
        }
        if let Some(&foreign) = subgroup.difference(input.group()).peers().first() {
            return Err(self.tally.violation(rank, Violation::ForeignMember(foreign)));
        }

        match self.subgroup {
            Some(ref expected) if expected.len() != peers.len() => {
                return Err(self.tally.violation(
                    rank,
                    Violation::SubgroupSizeMismatch {
                        expected: expected.len(),
                        found: peers.len(),
                    },
                ));
            }
            Some(ref expected) if expected[..] != *peers => {
                return Err(self.tally.violation(rank, Violation::SubgroupMismatch));
            }
            _ => {}
        }

        let group = Group::for_process(rank, peers.to_vec())?;
        trace!(
            "rank {} creates comm {} from comm {} at local rank {}",
            rank,
            self.id,
            input.id(),
            group.local_rank()
        );
        if self.subgroup.is_none() {
            self.subgroup = Some(peers.to_vec());
        }
        self.tally.enter(input, rank);
        self.tally.settle(rank, Communicator::new(self.id, group));
        if self.tally.is_full() {
            self.tally.seal();
        }
        Ok(rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn world(rank: Rank, size: Rank) -> Communicator {
        Communicator::new(0, Group::new(rank, (0..size).collect()).unwrap())
    }

    fn subgroup(peers: &[Rank]) -> Group {
        Group::new(-1, peers.to_vec()).unwrap()
    }

    fn violation(result: Result<Rank>) -> Violation {
        match result {
            Err(Error::ProtocolViolation { violation, .. }) => violation,
            other => panic!("expected a protocol violation, got {:?}", other),
        }
    }

    #[test]
    fn members_follow_subgroup_order() {
        let peers = [2, 0];
        let mut create = Create::new(3, 3);
        for rank in 0..3 {
            create.add(&world(rank, 3), &subgroup(&peers)).unwrap();
        }
        assert!(create.tally.complete);

        assert_eq!(Some(1), create.tally.fetch(0).unwrap().rank());
        assert!(create.tally.fetch(1).unwrap().is_null());
        assert_eq!(Some(0), create.tally.fetch(2).unwrap().rank());
    }

    #[test]
    fn size_mismatch() {
        let mut create = Create::new(3, 4);
        create.add(&world(0, 4), &subgroup(&[0, 1])).unwrap();
        assert_eq!(
            Violation::SubgroupSizeMismatch {
                expected: 2,
                found: 3
            },
            violation(create.add(&world(1, 4), &subgroup(&[0, 1, 2])))
        );
    }

    #[test]
    fn membership_mismatch() {
        let mut create = Create::new(3, 4);
        create.add(&world(0, 4), &subgroup(&[0, 1])).unwrap();
        assert_eq!(
            Violation::SubgroupMismatch,
            violation(create.add(&world(1, 4), &subgroup(&[1, 0])))
        );
    }

    #[test]
    fn repeated_member() {
        let mut create = Create::new(3, 4);
        assert_eq!(
            Violation::RepeatedMember(2),
            violation(create.add(&world(0, 4), &subgroup(&[2, 0, 2])))
        );
    }

    #[test]
    fn member_outside_input() {
        let mut create = Create::new(3, 3);
        assert_eq!(
            Violation::ForeignMember(5),
            violation(create.add(&world(0, 3), &subgroup(&[1, 5, 0])))
        );
    }

    #[test]
    fn rejected_call_is_not_counted() {
        let mut create = Create::new(3, 3);
        create.add(&world(0, 3), &subgroup(&[0, 1])).unwrap();
        assert_eq!(
            Violation::RepeatedMember(0),
            violation(create.add(&world(1, 3), &subgroup(&[0, 0])))
        );
        create.add(&world(2, 3), &subgroup(&[0, 1])).unwrap();
        assert!(!create.tally.complete);

        // the rank that was turned away can still join
        assert_eq!(Ok(1), create.add(&world(1, 3), &subgroup(&[0, 1])));
        assert!(create.tally.complete);
        assert_eq!(Some(1), create.tally.fetch(1).unwrap().rank());
    }
}
