use log::trace;

use super::{ConstructionKind, Tally};
use crate::error::Result;
use crate::topology::{CommId, Communicator, Rank};

/// Reconstructs `MPI_Comm_dup`
///
/// Every caller ends up with a communicator that has a fresh identity but the same group as the
/// input communicator.
#[derive(Debug)]
pub(crate) struct Duplicate {
    id: CommId,
    pub(super) tally: Tally,
}

impl Duplicate {
    pub fn new(id: CommId, size: usize) -> Duplicate {
        Duplicate {
            id,
            tally: Tally::new(ConstructionKind::Duplicate, size),
        }
    }

    pub fn id(&self) -> CommId {
        self.id
    }

    pub fn add(&mut self, input: &Communicator) -> Result<Rank> {
        let rank = self.tally.check(input)?;
        trace!("rank {} duplicates comm {} into {}", rank, input.id(), self.id);
        self.tally.enter(input, rank);
        self.tally
            .settle(rank, Communicator::new(self.id, input.group().clone()));
        if self.tally.is_full() {
            self.tally.seal();
        }
        Ok(rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Violation};
    use crate::topology::Group;

    fn member(id: CommId, rank: Rank, peers: &[Rank]) -> Communicator {
        Communicator::new(id, Group::for_process(rank, peers.to_vec()).unwrap())
    }

    #[test]
    fn preserves_group_structure() {
        let peers = [7, 2, 5];
        let mut dup = Duplicate::new(4, peers.len());
        for &rank in &peers {
            assert!(!dup.tally.complete);
            assert_eq!(rank, dup.add(&member(3, rank, &peers)).unwrap());
        }
        assert!(dup.tally.complete);

        for &rank in &peers {
            let comm = dup.tally.fetch(rank).unwrap();
            assert_eq!(4, comm.id());
            assert_eq!(&peers, comm.group().peers());
            assert_eq!(Some(rank), comm.global_rank());
        }
    }

    #[test]
    fn rejects_other_input() {
        let peers = [0, 1];
        let mut dup = Duplicate::new(4, 2);
        dup.add(&member(3, 0, &peers)).unwrap();
        assert_eq!(
            Err(Error::ProtocolViolation {
                kind: ConstructionKind::Duplicate,
                input: 3,
                rank: 1,
                violation: Violation::InputMismatch {
                    expected: 3,
                    found: 5
                },
            }),
            dup.add(&member(5, 1, &peers))
        );
    }

    #[test]
    fn rejects_double_entry() {
        let peers = [0, 1, 2];
        let mut dup = Duplicate::new(4, 3);
        dup.add(&member(0, 1, &peers)).unwrap();
        match dup.add(&member(0, 1, &peers)) {
            Err(Error::ProtocolViolation { violation, rank, .. }) => {
                assert_eq!(Violation::DuplicateEntry, violation);
                assert_eq!(1, rank);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(!dup.tally.complete);
    }
}
