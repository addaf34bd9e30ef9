//! Call records as delivered by a trace reader
//!
//! Decoding the binary trace format is not part of this crate. A reader for a specific format
//! implements `TraceReader` and yields one `CallRecord` per MPI call of one rank, in the order
//! the rank issued them. Only the calls that affect communicators carry their operands, every
//! other call is passed through as `Call::Other`.
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::topology::{Color, Key, Rank};

/// A communicator handle as recorded by one process
///
/// Local handles are only meaningful within the trace of the rank that recorded them and may be
/// reused once the communicator they refer to has been freed.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LocalComm(pub i32);

impl LocalComm {
    /// The handle the tracer records for `MPI_COMM_NULL`
    pub const NULL: LocalComm = LocalComm(-1);
    /// The handle the tracer records for `MPI_COMM_WORLD`
    pub const WORLD: LocalComm = LocalComm(0);
    /// The handle the tracer records for `MPI_COMM_SELF`
    pub const SELF: LocalComm = LocalComm(1);
}

impl fmt::Display for LocalComm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            LocalComm::NULL => f.write_str("MPI_COMM_NULL"),
            LocalComm::WORLD => f.write_str("MPI_COMM_WORLD"),
            LocalComm::SELF => f.write_str("MPI_COMM_SELF"),
            LocalComm(handle) => write!(f, "comm<{}>", handle),
        }
    }
}

/// An MPI call and the operands relevant to communicator reconstruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    /// `MPI_Comm_dup(comm, &newcomm)`
    CommDup {
        /// The communicator that was duplicated
        comm: LocalComm,
        /// The handle returned for the duplicate
        newcomm: LocalComm,
    },
    /// `MPI_Comm_create(comm, group, &newcomm)`
    CommCreate {
        /// The communicator the create was issued over
        comm: LocalComm,
        /// Global ranks of the members of the new communicator, in local rank order
        group: Vec<Rank>,
        /// The handle returned for the new communicator
        newcomm: LocalComm,
    },
    /// `MPI_Comm_split(comm, color, key, &newcomm)`
    CommSplit {
        /// The communicator that was split
        comm: LocalComm,
        /// The color passed by this rank
        color: Color,
        /// The key passed by this rank
        key: Key,
        /// The handle returned for the new communicator
        newcomm: LocalComm,
    },
    /// `MPI_Comm_free(&comm)`
    CommFree {
        /// The handle that was freed
        comm: LocalComm,
    },
    /// Any other call
    Other {
        /// Name of the MPI function
        name: String,
        /// The communicator the call was issued over, if any
        comm: Option<LocalComm>,
    },
}

impl Call {
    /// Name of the MPI function
    pub fn name(&self) -> &str {
        match self {
            Call::CommDup { .. } => "MPI_Comm_dup",
            Call::CommCreate { .. } => "MPI_Comm_create",
            Call::CommSplit { .. } => "MPI_Comm_split",
            Call::CommFree { .. } => "MPI_Comm_free",
            Call::Other { name, .. } => name.as_str(),
        }
    }
}

/// One call as recorded in the trace of one rank
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    /// Global rank of the process that issued the call
    pub rank: Rank,
    /// Time the call was entered, relative to the start of the trace
    pub start: Duration,
    /// Time the call returned, relative to the start of the trace
    pub stop: Duration,
    /// The call itself
    pub call: Call,
}

/// Yields the calls of one rank in the order they were issued
pub trait TraceReader {
    /// Global rank of the process whose trace is read
    fn rank(&self) -> Rank;

    /// The next call of this rank, `None` at the end of the trace.
    fn next_record(&mut self) -> Option<CallRecord>;
}

impl<'a, R: TraceReader + ?Sized> TraceReader for &'a mut R {
    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn next_record(&mut self) -> Option<CallRecord> {
        (**self).next_record()
    }
}

impl<R: TraceReader + ?Sized> TraceReader for Box<R> {
    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn next_record(&mut self) -> Option<CallRecord> {
        (**self).next_record()
    }
}

/// A trace held in memory
///
/// # Examples
///
/// ```
/// use commtrace::trace::{Call, LocalComm, MemoryTrace, TraceReader};
///
/// let mut trace = MemoryTrace::new(3).call(Call::CommDup {
///     comm: LocalComm::WORLD,
///     newcomm: LocalComm(7),
/// });
/// let record = trace.next_record().unwrap();
/// assert_eq!(3, record.rank);
/// assert_eq!("MPI_Comm_dup", record.call.name());
/// assert!(trace.next_record().is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryTrace {
    rank: Rank,
    records: VecDeque<CallRecord>,
    clock: Duration,
}

impl MemoryTrace {
    /// An empty trace of global rank `rank`
    pub fn new(rank: Rank) -> MemoryTrace {
        MemoryTrace {
            rank,
            records: VecDeque::new(),
            clock: Duration::default(),
        }
    }

    /// Appends a record.
    pub fn push(&mut self, record: CallRecord) {
        if record.stop > self.clock {
            self.clock = record.stop;
        }
        self.records.push_back(record);
    }

    /// Appends `call`, stamped one microsecond after the previous record and lasting one
    /// microsecond.
    pub fn call(mut self, call: Call) -> MemoryTrace {
        let start = self.clock + Duration::from_micros(1);
        let record = CallRecord {
            rank: self.rank,
            start,
            stop: start + Duration::from_micros(1),
            call,
        };
        self.push(record);
        self
    }

    /// Number of records not yet read
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether all records have been read
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TraceReader for MemoryTrace {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn next_record(&mut self) -> Option<CallRecord> {
        self.records.pop_front()
    }
}
