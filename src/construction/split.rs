use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use conv::ConvUtil;
use log::trace;

use super::{ConstructionKind, Tally};
use crate::error::{Error, Result};
use crate::topology::{Color, CommId, Communicator, Group, Key, Rank};

/// Reconstructs `MPI_Comm_split`
///
/// Callers passing the same non-negative color end up in the same communicator, ordered by
/// ascending key. Ties are broken by ascending global rank. Callers passing a negative color
/// get the null communicator.
///
/// A split over a communicator with `n` members yields at most `n` communicators, so `n`
/// identities are reserved up front and handed out in ascending color order once the last
/// member has entered.
#[derive(Debug)]
pub(crate) struct Split {
    ids: Range<CommId>,
    colors: BTreeMap<Color, BTreeSet<(Key, Rank)>>,
    pub(super) tally: Tally,
}

impl Split {
    pub fn new(begin: CommId, size: usize) -> Split {
        let end = size
            .value_as::<CommId>()
            .ok()
            .and_then(|size| begin.checked_add(size))
            .unwrap_or(begin);
        Split {
            ids: begin..end,
            colors: BTreeMap::new(),
            tally: Tally::new(ConstructionKind::Split, size),
        }
    }

    /// The identities reserved for the communicators this split creates
    pub fn ids(&self) -> Range<CommId> {
        self.ids.clone()
    }

    pub fn add(&mut self, input: &Communicator, color: Color, key: Key) -> Result<Rank> {
        let rank = self.tally.check(input)?;
        trace!(
            "rank {} splits comm {} with color {} and key {}",
            rank,
            input.id(),
            color.value(),
            key
        );
        self.colors
            .entry(color)
            .or_insert_with(BTreeSet::new)
            .insert((key, rank));
        self.tally.enter(input, rank);
        if self.tally.is_full() {
            self.finish()?;
        }
        Ok(rank)
    }

    /// Assigns identities and builds the groups of all parts at once.
    fn finish(&mut self) -> Result<()> {
        let mut ids = self.ids.clone();
        let mut results = Vec::with_capacity(self.tally.target);

        for (color, members) in &self.colors {
            if color.is_undefined() {
                results.extend(members.iter().map(|&(_, rank)| (rank, Communicator::null())));
                continue;
            }

            let id = ids.next().ok_or(Error::CapacityExceeded {
                input: self.tally.input(),
                capacity: self.tally.target,
            })?;
            let peers: Vec<Rank> = members.iter().map(|&(_, rank)| rank).collect();
            for &(_, rank) in members {
                let group = Group::for_process(rank, peers.clone())?;
                results.push((rank, Communicator::new(id, group)));
            }
        }

        for (rank, comm) in results {
            self.tally.settle(rank, comm);
        }
        self.tally.seal();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(rank: Rank, size: Rank) -> Communicator {
        Communicator::new(0, Group::new(rank, (0..size).collect()).unwrap())
    }

    #[test]
    fn reserves_one_id_per_member() {
        let split = Split::new(7, 4);
        assert_eq!(7..11, split.ids());
    }

    #[test]
    fn equal_keys_order_by_global_rank() {
        let mut split = Split::new(3, 4);
        for &rank in &[3, 1, 2, 0] {
            split.add(&world(rank, 4), Color::with_value(0), 5).unwrap();
        }
        assert!(split.tally.complete);
        let comm = split.tally.fetch(3).unwrap();
        assert_eq!(&[0, 1, 2, 3], comm.group().peers());
        assert_eq!(Some(3), comm.rank());
    }

    #[test]
    fn out_of_ids() {
        let mut split = Split::new(CommId::max_value() - 1, 4);
        assert!(split.ids().next().is_none());
        for rank in 0..3 {
            split.add(&world(rank, 4), Color::with_value(1), 0).unwrap();
        }
        assert_eq!(
            Err(Error::CapacityExceeded {
                input: 0,
                capacity: 4
            }),
            split.add(&world(3, 4), Color::with_value(1), 0)
        );
        assert!(!split.tally.complete);
    }

    #[test]
    fn undefined_color_consumes_no_id() {
        let mut split = Split::new(3, 3);
        split.add(&world(0, 3), Color::undefined(), 0).unwrap();
        split.add(&world(1, 3), Color::with_value(9), 0).unwrap();
        assert!(!split.tally.complete);
        split.add(&world(2, 3), Color::with_value(2), 0).unwrap();
        assert!(split.tally.complete);

        assert!(split.tally.fetch(0).unwrap().is_null());
        // color 2 sorts before color 9
        assert_eq!(3, split.tally.fetch(2).unwrap().id());
        assert_eq!(4, split.tally.fetch(1).unwrap().id());
    }
}
