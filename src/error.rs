//! Error types for communicator reconstruction
//!
//! Every error in this crate describes malformed or inconsistent trace input, or a caller that
//! broke the handle protocol. None of them are transient: the conversion run that hits one
//! should be aborted and the error reported together with the offending rank.

use thiserror::Error;

use crate::construction::ConstructionKind;
use crate::shared::Handle;
use crate::topology::{CommId, Rank};
use crate::trace::LocalComm;

/// Result type for reconstruction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for reconstruction operations
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A group or a retrieval request references a rank outside valid bounds
    #[error("invalid rank {rank} (valid range is [0,{size}))")]
    InvalidRank {
        /// The offending rank
        rank: Rank,
        /// Number of ranks the request was checked against
        size: usize,
    },

    /// Conflicting or duplicate collective calls for the same logical operation
    #[error("protocol violation in {kind} over communicator {input} by rank {rank}: {violation}")]
    ProtocolViolation {
        /// The construction the call was dispatched to
        kind: ConstructionKind,
        /// Id of the input communicator
        input: CommId,
        /// Global rank of the calling process, or -1 if it could not be determined
        rank: Rank,
        /// What exactly went wrong
        violation: Violation,
    },

    /// A split produced more distinct colors than its reserved id range holds
    #[error("split over communicator {input} needs more than {capacity} communicator ids")]
    CapacityExceeded {
        /// Id of the input communicator
        input: CommId,
        /// Size of the reserved id range
        capacity: usize,
    },

    /// The handle was never issued
    #[error("invalid handle {0}")]
    InvalidHandle(Handle),

    /// The construction behind the handle has not seen all of its participants yet
    #[error("construction behind handle {0} is not complete")]
    NotComplete(Handle),

    /// A trace record refers to a local communicator handle that is not bound on its rank
    #[error("rank {rank} refers to unknown communicator handle {comm}")]
    UnknownCommunicator {
        /// Global rank of the trace
        rank: Rank,
        /// The local handle as recorded in the trace
        comm: LocalComm,
    },

    /// A reader yielded a record issued by a different rank than the one it reads for
    #[error("trace of rank {reader} contains a record of rank {found} at index {index}")]
    ForeignRecord {
        /// Rank the reader reads for
        reader: Rank,
        /// Rank found in the record
        found: Rank,
        /// Position of the record in the trace
        index: usize,
    },

    /// No trace can make progress, every remaining rank waits on an incomplete construction
    #[error("preparse stalled, ranks {ranks:?} wait on constructions that never complete")]
    Stalled {
        /// Ranks that still have unprocessed records
        ranks: Vec<Rank>,
    },
}

/// The ways a collective construction call can conflict with the calls seen before it
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// The call was issued over a different communicator than the first call of the context
    #[error("expected input communicator {expected}, found {found}")]
    InputMismatch {
        /// Input id fixed by the first call
        expected: CommId,
        /// Input id of this call
        found: CommId,
    },

    /// The same global rank entered the construction twice
    #[error("rank entered the construction twice")]
    DuplicateEntry,

    /// Another kind of construction is already pending over the same input communicator
    #[error("a {pending} is already pending over this communicator")]
    KindMismatch {
        /// Kind of the pending construction
        pending: ConstructionKind,
    },

    /// The subgroup passed to a create has a different size than the one seen before
    #[error("subgroup of size {found} differs from the expected size {expected}")]
    SubgroupSizeMismatch {
        /// Size fixed by the first call
        expected: usize,
        /// Size of this call's subgroup
        found: usize,
    },

    /// The subgroup passed to a create lists different ranks than the one seen before
    #[error("subgroup membership differs from the one seen before")]
    SubgroupMismatch,

    /// A subgroup lists the same global rank more than once
    #[error("subgroup lists rank {0} more than once")]
    RepeatedMember(Rank),

    /// A subgroup lists a global rank that is not a member of the input communicator
    #[error("subgroup lists rank {0} which is not a member of the input communicator")]
    ForeignMember(Rank),

    /// More calls arrived than the input communicator has members
    #[error("more than {0} calls entered the construction")]
    TooManyCalls(usize),

    /// The call was issued over the null communicator
    #[error("the input communicator is null")]
    NullInput,
}
