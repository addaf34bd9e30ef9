//! The registry that combines construction calls from all ranks
//!
//! A `SharedState` is created once per trace set, as soon as the world size is known, and is
//! handed to whatever drives the conversion. Every communicator-forming call found in any rank's
//! trace is fed into it in the order the driver sees them. Calls over the same input
//! communicator identity are combined in one construction until all members of the input
//! communicator have reported; the next call over that identity opens a new construction.
//!
//! Each call returns a `Handle` that is later redeemed for the communicator the calling rank
//! ends up with. A handle can only be redeemed once its construction is complete, so a driver
//! either checks `is_complete()` or delays redemption until all traces have been fed.
//!
//! # Examples
//!
//! ```
//! use commtrace::shared::SharedState;
//! use commtrace::topology::Color;
//!
//! # fn main() -> commtrace::error::Result<()> {
//! let mut shared = SharedState::new(4);
//! let mut handles = Vec::new();
//! for rank in 0..4 {
//!     let world = shared.retrieve_world(rank)?;
//!     handles.push(shared.comm_split(&world, Color::with_value(rank % 2), 0)?);
//! }
//!
//! let even = shared.retrieve_comm(handles[2])?;
//! assert_eq!(&[0, 2], even.group().peers());
//! assert_eq!(Some(1), even.rank());
//! # Ok(())
//! # }
//! ```
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use conv::ConvUtil;
use log::debug;

use crate::config::Config;
use crate::construction::{Construction, ConstructionKind, Contribution};
use crate::error::{Error, Result, Violation};
use crate::topology::{
    rank_index, Color, CommId, Communicator, Group, Key, Rank, FIRST_USER_ID, SELF_ID,
    UNDEFINED, WORLD_ID,
};

/// An opaque token issued for one rank's construction call
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Handle(u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a handle stands for
#[derive(Debug)]
struct Ticket {
    rank: Rank,
    construction: CommId,
    result: Option<Communicator>,
}

/// Reconstructs communicators from the construction calls of all ranks of a trace set
#[derive(Debug)]
pub struct SharedState {
    config: Config,
    world: Vec<Rank>,
    next_id: CommId,
    next_handle: u64,
    /// input communicator id -> construction collecting calls over it
    pending: HashMap<CommId, CommId>,
    /// constructions that are pending or still have uncollected results, keyed by first id
    constructions: BTreeMap<CommId, Construction>,
    handles: HashMap<Handle, Ticket>,
}

impl SharedState {
    /// State for a trace set recorded by `world_size` processes, with default settings.
    pub fn new(world_size: usize) -> SharedState {
        SharedState::with_config(Config::new(world_size))
    }

    /// State for a trace set as described by `config`.
    pub fn with_config(config: Config) -> SharedState {
        let world = (0..).take(config.world_size()).collect();
        SharedState {
            config,
            world,
            next_id: FIRST_USER_ID,
            next_handle: 0,
            pending: HashMap::new(),
            constructions: BTreeMap::new(),
            handles: HashMap::new(),
        }
    }

    /// The settings this state was created with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of processes in the world communicator
    pub fn world_size(&self) -> usize {
        self.world.len()
    }

    /// The world communicator as seen by global rank `rank`
    pub fn retrieve_world(&self, rank: Rank) -> Result<Communicator> {
        rank_index(rank, self.world_size())?;
        Ok(Communicator::new(
            WORLD_ID,
            Group::new(rank, self.world.clone())?,
        ))
    }

    /// The self communicator of global rank `rank`
    pub fn retrieve_self(&self, rank: Rank) -> Result<Communicator> {
        rank_index(rank, self.world_size())?;
        Ok(Communicator::new(SELF_ID, Group::new(0, vec![rank])?))
    }

    /// Feeds one rank's `MPI_Comm_dup` over `input` into the state.
    ///
    /// # Errors
    ///
    /// `ProtocolViolation` if the call conflicts with calls seen before, e.g. because the same
    /// rank already entered the construction or a different construction is pending over the
    /// same communicator.
    pub fn comm_dup(&mut self, input: &Communicator) -> Result<Handle> {
        self.enter(input, Contribution::Duplicate)
    }

    /// Feeds one rank's `MPI_Comm_create` over `input` into the state.
    ///
    /// Only the members of `subgroup` matter, the local rank it was recorded with is ignored.
    pub fn comm_create(&mut self, input: &Communicator, subgroup: &Group) -> Result<Handle> {
        self.enter(input, Contribution::Create(subgroup))
    }

    /// Feeds one rank's `MPI_Comm_split` over `input` into the state.
    pub fn comm_split(&mut self, input: &Communicator, color: Color, key: Key) -> Result<Handle> {
        self.enter(input, Contribution::Split(color, key))
    }

    /// Whether the construction behind `handle` has seen all of its participants
    pub fn is_complete(&self, handle: Handle) -> Result<bool> {
        let ticket = self
            .handles
            .get(&handle)
            .ok_or(Error::InvalidHandle(handle))?;
        if ticket.result.is_some() {
            return Ok(true);
        }
        self.constructions
            .get(&ticket.construction)
            .map(Construction::is_complete)
            .ok_or(Error::InvalidHandle(handle))
    }

    /// Redeems `handle` for the communicator its rank ends up with.
    ///
    /// Redeeming a handle more than once yields the same communicator every time.
    ///
    /// # Errors
    ///
    /// `InvalidHandle` if the handle was never issued, `NotComplete` if some participants of the
    /// construction have not been fed yet.
    pub fn retrieve_comm(&mut self, handle: Handle) -> Result<Communicator> {
        let ticket = self
            .handles
            .get_mut(&handle)
            .ok_or(Error::InvalidHandle(handle))?;
        if let Some(ref comm) = ticket.result {
            return Ok(comm.clone());
        }

        let key = ticket.construction;
        let construction = self
            .constructions
            .get_mut(&key)
            .ok_or(Error::InvalidHandle(handle))?;
        if !construction.is_complete() {
            return Err(Error::NotComplete(handle));
        }
        let comm = construction.fetch(ticket.rank)?;
        ticket.result = Some(comm.clone());

        if construction.is_fully_fetched() && !self.config.retains_fetched() {
            self.constructions.remove(&key);
            debug!("dropped construction {} after all results were collected", key);
        }
        Ok(comm)
    }

    /// Number of constructions still waiting for participants
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of constructions that are pending or have uncollected results
    pub fn live_constructions(&self) -> usize {
        self.constructions.len()
    }

    fn enter(&mut self, input: &Communicator, contribution: Contribution) -> Result<Handle> {
        let kind = contribution.kind();
        let pending = self
            .pending
            .get(&input.id())
            .copied()
            .and_then(|key| self.constructions.remove_entry(&key));
        let (key, mut construction) = match pending {
            Some(entry) => entry,
            None => self.open(input, kind)?,
        };

        // the construction goes back into the arena whether or not the call was accepted
        let added = construction.add(input, contribution);
        if construction.is_complete() {
            self.pending.remove(&input.id());
        } else {
            self.pending.insert(input.id(), key);
        }
        self.constructions.insert(key, construction);
        let rank = added?;

        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        self.handles.insert(
            handle,
            Ticket {
                rank,
                construction: key,
                result: None,
            },
        );
        Ok(handle)
    }

    /// Opens a new construction of `kind` over `input`.
    fn open(
        &mut self,
        input: &Communicator,
        kind: ConstructionKind,
    ) -> Result<(CommId, Construction)> {
        if input.is_null() {
            return Err(Error::ProtocolViolation {
                kind,
                input: input.id(),
                rank: UNDEFINED,
                violation: Violation::NullInput,
            });
        }

        let size = input.size();
        let count = match kind {
            ConstructionKind::Split => size,
            ConstructionKind::Duplicate | ConstructionKind::Create => 1,
        };
        let first_id = self.reserve(input.id(), count)?;
        let construction = Construction::open(kind, first_id, size);
        debug!(
            "opened {} {} over comm {} with {} members",
            kind,
            first_id,
            input.id(),
            size
        );
        Ok((construction.first_id(), construction))
    }

    /// Reserves `count` consecutive communicator identities.
    fn reserve(&mut self, input: CommId, count: usize) -> Result<CommId> {
        let first = self.next_id;
        self.next_id = count
            .value_as::<CommId>()
            .ok()
            .and_then(|count| first.checked_add(count))
            .ok_or(Error::CapacityExceeded {
                input,
                capacity: count,
            })?;
        Ok(first)
    }
}
