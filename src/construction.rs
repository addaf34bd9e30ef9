//! Accumulating the calls of collective communicator constructors
//!
//! Each communicator-forming operation found in a trace is a collective over some input
//! communicator. The local call of every member of the input communicator is fed into a
//! `Construction`, which materializes the resulting communicators once all members have
//! reported.
//!
//! - `Duplicate` produces one communicator with the same group as the input.
//! - `Create` produces one communicator from a subgroup that every caller supplies.
//! - `Split` partitions the input communicator by color, ordering each part by key.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::debug;

use crate::error::{Error, Result, Violation};
use crate::topology::{Color, CommId, Communicator, Group, Key, Rank, NULL_ID, UNDEFINED};

mod create;
mod duplicate;
mod split;

pub(crate) use self::create::Create;
pub(crate) use self::duplicate::Duplicate;
pub(crate) use self::split::Split;

/// The kinds of collective communicator constructors
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConstructionKind {
    /// `MPI_Comm_dup`
    Duplicate,
    /// `MPI_Comm_create`
    Create,
    /// `MPI_Comm_split`
    Split,
}

impl fmt::Display for ConstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            ConstructionKind::Duplicate => "duplicate",
            ConstructionKind::Create => "create",
            ConstructionKind::Split => "split",
        })
    }
}

/// What a single rank contributes to a construction besides its input communicator
#[derive(Copy, Clone, Debug)]
pub(crate) enum Contribution<'a> {
    Duplicate,
    Create(&'a Group),
    Split(Color, Key),
}

impl<'a> Contribution<'a> {
    pub fn kind(&self) -> ConstructionKind {
        match *self {
            Contribution::Duplicate => ConstructionKind::Duplicate,
            Contribution::Create(_) => ConstructionKind::Create,
            Contribution::Split(..) => ConstructionKind::Split,
        }
    }
}

/// One in-flight or finished collective construction
#[derive(Debug)]
pub(crate) enum Construction {
    Duplicate(Duplicate),
    Create(Create),
    Split(Split),
}

impl Construction {
    /// An empty construction of `kind` over an input communicator with `size` members.
    ///
    /// `first_id` is the first of the identities reserved for the construction, a split needs
    /// `size` of them, every other kind exactly one.
    pub fn open(kind: ConstructionKind, first_id: CommId, size: usize) -> Construction {
        match kind {
            ConstructionKind::Duplicate => Construction::Duplicate(Duplicate::new(first_id, size)),
            ConstructionKind::Create => Construction::Create(Create::new(first_id, size)),
            ConstructionKind::Split => Construction::Split(Split::new(first_id, size)),
        }
    }

    pub fn kind(&self) -> ConstructionKind {
        self.tally().kind
    }

    /// The first identity this construction hands out, unique among all constructions
    pub fn first_id(&self) -> CommId {
        match self {
            Construction::Duplicate(c) => c.id(),
            Construction::Create(c) => c.id(),
            Construction::Split(c) => c.ids().start,
        }
    }

    /// Feeds the call of one rank into the construction and returns its global rank.
    pub fn add(&mut self, input: &Communicator, contribution: Contribution) -> Result<Rank> {
        match (self, contribution) {
            (Construction::Duplicate(c), Contribution::Duplicate) => c.add(input),
            (Construction::Create(c), Contribution::Create(group)) => c.add(input, group),
            (Construction::Split(c), Contribution::Split(color, key)) => c.add(input, color, key),
            (pending, contribution) => Err(Error::ProtocolViolation {
                kind: contribution.kind(),
                input: input.id(),
                rank: input.global_rank().unwrap_or(UNDEFINED),
                violation: Violation::KindMismatch {
                    pending: pending.kind(),
                },
            }),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.tally().complete
    }

    pub fn is_fully_fetched(&self) -> bool {
        self.tally().is_fully_fetched()
    }

    /// The communicator that global rank `rank` ends up with, marking it as collected.
    pub fn fetch(&mut self, rank: Rank) -> Result<Communicator> {
        self.tally_mut().fetch(rank)
    }

    fn tally(&self) -> &Tally {
        match self {
            Construction::Duplicate(c) => &c.tally,
            Construction::Create(c) => &c.tally,
            Construction::Split(c) => &c.tally,
        }
    }

    fn tally_mut(&mut self) -> &mut Tally {
        match self {
            Construction::Duplicate(c) => &mut c.tally,
            Construction::Create(c) => &mut c.tally,
            Construction::Split(c) => &mut c.tally,
        }
    }
}

/// Bookkeeping common to all kinds of constructions
///
/// Keeps track of who entered, what each participant ends up with and who already collected
/// its result.
#[derive(Debug)]
pub(crate) struct Tally {
    kind: ConstructionKind,
    input: Option<CommId>,
    target: usize,
    entered: BTreeSet<Rank>,
    results: BTreeMap<Rank, Communicator>,
    fetched: BTreeSet<Rank>,
    complete: bool,
}

impl Tally {
    fn new(kind: ConstructionKind, target: usize) -> Tally {
        Tally {
            kind,
            input: None,
            target,
            entered: BTreeSet::new(),
            results: BTreeMap::new(),
            fetched: BTreeSet::new(),
            complete: false,
        }
    }

    /// Checks a call against the calls seen so far and returns the caller's global rank.
    ///
    /// Nothing is recorded, a caller only counts once it has been passed to `enter()`.
    fn check(&self, input: &Communicator) -> Result<Rank> {
        let rank = match input.global_rank() {
            Some(rank) => rank,
            None => return Err(self.violation(UNDEFINED, Violation::NullInput)),
        };
        match self.input {
            Some(expected) if expected != input.id() => {
                return Err(self.violation(
                    rank,
                    Violation::InputMismatch {
                        expected,
                        found: input.id(),
                    },
                ));
            }
            _ => {}
        }
        if self.entered.contains(&rank) {
            return Err(self.violation(rank, Violation::DuplicateEntry));
        }
        if self.entered.len() >= self.target {
            return Err(self.violation(rank, Violation::TooManyCalls(self.target)));
        }
        Ok(rank)
    }

    /// Registers a caller that passed `check()`.
    ///
    /// The first caller fixes the input communicator identity every later call has to present.
    fn enter(&mut self, input: &Communicator, rank: Rank) {
        self.input.get_or_insert(input.id());
        self.entered.insert(rank);
    }

    fn settle(&mut self, rank: Rank, comm: Communicator) {
        self.results.insert(rank, comm);
    }

    /// Whether every member of the input communicator has entered
    fn is_full(&self) -> bool {
        self.entered.len() == self.target
    }

    fn seal(&mut self) {
        self.complete = true;
        debug!(
            "{} over comm {} complete with {} participants",
            self.kind,
            self.input(),
            self.target
        );
    }

    fn input(&self) -> CommId {
        self.input.unwrap_or(NULL_ID)
    }

    fn violation(&self, rank: Rank, violation: Violation) -> Error {
        Error::ProtocolViolation {
            kind: self.kind,
            input: self.input(),
            rank,
            violation,
        }
    }

    fn comm(&self, rank: Rank) -> Result<&Communicator> {
        self.results.get(&rank).ok_or(Error::InvalidRank {
            rank,
            size: self.target,
        })
    }

    fn fetch(&mut self, rank: Rank) -> Result<Communicator> {
        let comm = self.comm(rank)?.clone();
        self.fetched.insert(rank);
        Ok(comm)
    }

    fn is_fully_fetched(&self) -> bool {
        self.complete && self.fetched.len() == self.results.len()
    }
}
