//! Feeding the traces of all ranks through a `SharedState`
//!
//! Before any consumer can make sense of a communicator handle found in a trace, the
//! construction calls of all ranks have to be combined. `preparse()` reads all traces
//! round-robin: each rank advances until it reaches a call over a communicator whose
//! construction still waits for other ranks, then the next rank takes over. Once every trace is
//! exhausted, all handles are redeemed and the result is a `CommTimeline` that tells, for every
//! rank and every position in its trace, which communicator a local handle refers to.
//!
//! # Examples
//!
//! ```
//! use commtrace::preparse::preparse;
//! use commtrace::shared::SharedState;
//! use commtrace::trace::{Call, LocalComm, MemoryTrace};
//!
//! # fn main() -> commtrace::error::Result<()> {
//! let traces = (0..2).map(|rank| {
//!     MemoryTrace::new(rank).call(Call::CommDup {
//!         comm: LocalComm::WORLD,
//!         newcomm: LocalComm(5),
//!     })
//! });
//!
//! let mut shared = SharedState::new(2);
//! let timeline = preparse(&mut shared, traces)?;
//! let dup = timeline.lookup(1, LocalComm(5), 0).unwrap();
//! assert_eq!(3, dup.id());
//! assert_eq!(Some(1), dup.rank());
//! # Ok(())
//! # }
//! ```
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::shared::{Handle, SharedState};
use crate::topology::{CommId, Communicator, Group, Rank};
use crate::trace::{Call, CallRecord, LocalComm, TraceReader};

/// What a local communicator handle referred to during a stretch of one rank's trace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    /// The local handle
    pub local: LocalComm,
    /// Index of the record that produced the handle, `0` for predefined communicators
    pub since: usize,
    /// Index of the record that freed or replaced the handle, if any
    pub until: Option<usize>,
    /// Time the producing call was entered
    pub created: Duration,
    /// The communicator the handle refers to
    pub comm: Communicator,
}

impl Binding {
    /// Whether the binding is in effect at record `index`
    pub fn covers(&self, index: usize) -> bool {
        self.since <= index && self.until.map_or(true, |until| index <= until)
    }
}

/// Number of records seen during a preparse, by kind
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// All records
    pub records: usize,
    /// `MPI_Comm_dup` records
    pub duplicates: usize,
    /// `MPI_Comm_create` records
    pub creates: usize,
    /// `MPI_Comm_split` records
    pub splits: usize,
    /// `MPI_Comm_free` records
    pub frees: usize,
    /// Everything else
    pub others: usize,
}

impl Summary {
    /// Records that fed a communicator construction
    pub fn constructions(&self) -> usize {
        self.duplicates + self.creates + self.splits
    }
}

/// The resolved communicators of all ranks of a trace set
#[derive(Clone, Debug, Default)]
pub struct CommTimeline {
    ranks: BTreeMap<Rank, Vec<Binding>>,
    summary: Summary,
}

impl CommTimeline {
    /// The ranks whose traces were read
    pub fn ranks<'a>(&'a self) -> impl Iterator<Item = Rank> + 'a {
        self.ranks.keys().cloned()
    }

    /// All bindings of `rank` in the order they were established
    pub fn bindings(&self, rank: Rank) -> &[Binding] {
        self.ranks.get(&rank).map(|bindings| &bindings[..]).unwrap_or(&[])
    }

    /// The communicator `local` refers to at record `index` of the trace of `rank`.
    ///
    /// At the record that replaces a binding, the new binding wins.
    pub fn lookup(&self, rank: Rank, local: LocalComm, index: usize) -> Option<&Communicator> {
        self.bindings(rank)
            .iter()
            .rev()
            .find(|binding| binding.local == local && binding.covers(index))
            .map(|binding| &binding.comm)
    }

    /// What was read
    pub fn summary(&self) -> &Summary {
        &self.summary
    }
}

/// Reads all `readers` through `shared` and resolves every communicator handle they produce.
///
/// # Errors
///
/// Everything `SharedState` reports, plus `UnknownCommunicator` for calls over unbound local
/// handles and `Stalled` if the remaining ranks all wait on constructions that never complete.
pub fn preparse<I, R>(shared: &mut SharedState, readers: I) -> Result<CommTimeline>
where
    I: IntoIterator<Item = R>,
    R: TraceReader,
{
    let mut states = readers
        .into_iter()
        .map(|reader| RankState::new(reader, shared))
        .collect::<Result<Vec<_>>>()?;
    let mut summary = Summary::default();

    loop {
        let mut advanced = false;
        let mut blocked = Vec::new();
        for state in &mut states {
            loop {
                match state.step(shared, &mut summary)? {
                    Progress::Advanced => advanced = true,
                    Progress::Blocked => {
                        blocked.push(state.rank);
                        break;
                    }
                    Progress::Finished => break,
                }
            }
        }
        if blocked.is_empty() {
            break;
        }
        if !advanced {
            return Err(Error::Stalled { ranks: blocked });
        }
        debug!("ranks {:?} blocked, starting another round", blocked);
    }

    let mut ranks = BTreeMap::new();
    for state in states {
        let rank = state.rank;
        ranks.insert(rank, state.finish(shared)?);
    }
    info!(
        "preparse of {} ranks done: {} records, {} constructions",
        ranks.len(),
        summary.records,
        summary.constructions()
    );
    Ok(CommTimeline { ranks, summary })
}

#[derive(Debug)]
enum Slot {
    Resolved(Communicator),
    Pending(Handle),
}

#[derive(Debug)]
struct OpenBinding {
    local: LocalComm,
    since: usize,
    until: Option<usize>,
    created: Duration,
    slot: Slot,
}

enum Progress {
    Advanced,
    Blocked,
    Finished,
}

/// Progress through the trace of one rank
struct RankState<R> {
    reader: R,
    rank: Rank,
    index: usize,
    next: Option<CallRecord>,
    /// local handle -> its binding in `bindings`, for handles that are currently valid
    bound: HashMap<LocalComm, usize>,
    bindings: Vec<OpenBinding>,
    /// input communicator id -> handle of the last construction this rank entered over it
    entered: HashMap<CommId, Handle>,
}

impl<R: TraceReader> RankState<R> {
    fn new(mut reader: R, shared: &SharedState) -> Result<RankState<R>> {
        let rank = reader.rank();
        let world = shared.retrieve_world(rank)?;
        let me = shared.retrieve_self(rank)?;
        let next = reader.next_record();

        let mut state = RankState {
            reader,
            rank,
            index: 0,
            next,
            bound: HashMap::new(),
            bindings: Vec::new(),
            entered: HashMap::new(),
        };
        state.bind(LocalComm::WORLD, Duration::default(), Slot::Resolved(world));
        state.bind(LocalComm::SELF, Duration::default(), Slot::Resolved(me));
        Ok(state)
    }

    fn step(&mut self, shared: &mut SharedState, summary: &mut Summary) -> Result<Progress> {
        let record = match self.next.take() {
            Some(record) => record,
            None => return Ok(Progress::Finished),
        };
        if record.rank != self.rank {
            return Err(Error::ForeignRecord {
                reader: self.rank,
                found: record.rank,
                index: self.index,
            });
        }

        if self.apply(&record, shared, summary)? {
            trace!(
                "rank {} record {}: {}",
                self.rank,
                self.index,
                record.call.name()
            );
            summary.records += 1;
            self.index += 1;
            self.next = self.reader.next_record();
            Ok(Progress::Advanced)
        } else {
            self.next = Some(record);
            Ok(Progress::Blocked)
        }
    }

    /// Processes one record, returns `false` if it has to wait for other ranks.
    fn apply(
        &mut self,
        record: &CallRecord,
        shared: &mut SharedState,
        summary: &mut Summary,
    ) -> Result<bool> {
        let (input, handle, newcomm) = match record.call {
            Call::CommDup { comm, newcomm } => {
                let input = match self.ready_input(comm, shared)? {
                    Some(input) => input,
                    None => return Ok(false),
                };
                summary.duplicates += 1;
                (input.id(), shared.comm_dup(&input)?, newcomm)
            }
            Call::CommCreate {
                comm,
                ref group,
                newcomm,
            } => {
                let input = match self.ready_input(comm, shared)? {
                    Some(input) => input,
                    None => return Ok(false),
                };
                let subgroup = Group::for_process(self.rank, group.clone())?;
                summary.creates += 1;
                (input.id(), shared.comm_create(&input, &subgroup)?, newcomm)
            }
            Call::CommSplit {
                comm,
                color,
                key,
                newcomm,
            } => {
                let input = match self.ready_input(comm, shared)? {
                    Some(input) => input,
                    None => return Ok(false),
                };
                summary.splits += 1;
                (input.id(), shared.comm_split(&input, color, key)?, newcomm)
            }
            Call::CommFree { comm } => {
                self.free(comm)?;
                summary.frees += 1;
                return Ok(true);
            }
            Call::Other { ref comm, .. } => {
                if let Some(comm) = *comm {
                    if !self.bound.contains_key(&comm) {
                        return Err(Error::UnknownCommunicator {
                            rank: self.rank,
                            comm,
                        });
                    }
                }
                summary.others += 1;
                return Ok(true);
            }
        };

        self.entered.insert(input, handle);
        self.bind(newcomm, record.start, Slot::Pending(handle));
        Ok(true)
    }

    /// The input communicator for a construction call over `local`.
    ///
    /// `None` while `local` itself is still being constructed, or while the construction this
    /// rank entered last over the same communicator still waits for other ranks.
    fn ready_input(
        &mut self,
        local: LocalComm,
        shared: &mut SharedState,
    ) -> Result<Option<Communicator>> {
        let input = match self.resolve(local, shared)? {
            Some(input) => input,
            None => return Ok(None),
        };
        if let Some(&handle) = self.entered.get(&input.id()) {
            if !shared.is_complete(handle)? {
                return Ok(None);
            }
        }
        Ok(Some(input))
    }

    /// The communicator `local` refers to, `None` while its construction is incomplete.
    fn resolve(
        &mut self,
        local: LocalComm,
        shared: &mut SharedState,
    ) -> Result<Option<Communicator>> {
        let position = *self
            .bound
            .get(&local)
            .ok_or(Error::UnknownCommunicator {
                rank: self.rank,
                comm: local,
            })?;
        let binding = &mut self.bindings[position];
        let handle = match binding.slot {
            Slot::Resolved(ref comm) => return Ok(Some(comm.clone())),
            Slot::Pending(handle) => handle,
        };
        if !shared.is_complete(handle)? {
            return Ok(None);
        }
        let comm = shared.retrieve_comm(handle)?;
        binding.slot = Slot::Resolved(comm.clone());
        Ok(Some(comm))
    }

    fn bind(&mut self, local: LocalComm, created: Duration, slot: Slot) {
        if let Some(previous) = self.bound.insert(local, self.bindings.len()) {
            if local != LocalComm::NULL {
                warn!(
                    "rank {} rebinds {} at record {} without freeing it",
                    self.rank, local, self.index
                );
            }
            self.bindings[previous].until = Some(self.index);
        }
        self.bindings.push(OpenBinding {
            local,
            since: self.index,
            until: None,
            created,
            slot,
        });
    }

    fn free(&mut self, local: LocalComm) -> Result<()> {
        let position = self
            .bound
            .remove(&local)
            .ok_or(Error::UnknownCommunicator {
                rank: self.rank,
                comm: local,
            })?;
        self.bindings[position].until = Some(self.index);
        Ok(())
    }

    /// Redeems all remaining handles.
    fn finish(self, shared: &mut SharedState) -> Result<Vec<Binding>> {
        self.bindings
            .into_iter()
            .map(|open| {
                let comm = match open.slot {
                    Slot::Resolved(comm) => comm,
                    Slot::Pending(handle) => shared.retrieve_comm(handle)?,
                };
                Ok(Binding {
                    local: open.local,
                    since: open.since,
                    until: open.until,
                    created: open.created,
                    comm,
                })
            })
            .collect()
    }
}
