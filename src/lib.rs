#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Communicator reconstruction for MPI execution traces
//!
//! A traced MPI program leaves one log of calls per rank. Communicators appear in those logs
//! only as process-local handles, which mean nothing to any other rank and may be reused once a
//! communicator has been freed. Since `MPI_Comm_dup`, `MPI_Comm_create` and `MPI_Comm_split`
//! are collective, the group of a communicator they produce can only be told once the calls of
//! all ranks involved have been combined.
//!
//! This crate does that combination. The central type is the
//! [`SharedState`](shared/struct.SharedState.html): every construction call found in any
//! rank's trace is fed into it and answered with a handle, which is later redeemed for a
//! [`Communicator`](topology/struct.Communicator.html) carrying an identity that is the same for
//! all members and a group that lists the members in local rank order.
//!
//! The [`preparse`](preparse/fn.preparse.html) driver feeds whole traces through a
//! `SharedState`, as delivered by anything that implements
//! [`TraceReader`](trace/trait.TraceReader.html), and resolves every local handle.
//!
//! # Examples
//!
//! ```
//! use commtrace::shared::SharedState;
//! use commtrace::topology::Group;
//!
//! # fn main() -> commtrace::error::Result<()> {
//! // ranks 4, 0, 6, 7 and 8 of a world of 9 processes form a new communicator
//! let subgroup = Group::new(-1, vec![4, 0, 6, 7, 8])?;
//!
//! let mut shared = SharedState::new(9);
//! let mut handles = Vec::new();
//! for rank in 0..9 {
//!     let world = shared.retrieve_world(rank)?;
//!     handles.push(shared.comm_create(&world, &subgroup)?);
//! }
//!
//! let comm = shared.retrieve_comm(handles[7])?;
//! assert_eq!(Some(3), comm.rank());
//! assert!(shared.retrieve_comm(handles[1])?.is_null());
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The crate logs through the `log` facade. Opening and completing constructions is reported at
//! `debug` level, every single call at `trace` level. No logger is installed by the crate.

pub mod config;
mod construction;
pub mod error;
pub mod preparse;
pub mod shared;
pub mod topology;
pub mod trace;

pub use crate::construction::ConstructionKind;
pub use crate::error::{Error, Result, Violation};
pub use crate::shared::{Handle, SharedState};
pub use crate::topology::{Communicator, Group, Rank};
