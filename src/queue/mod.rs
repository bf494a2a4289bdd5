//! Spectator queue and team admission
//!
//! The waiting list, tag annotations and lock flags are plain data types.
//! [`AdmissionScheduler`] ties them to a game host and decides who gets a
//! slot, and [`EventDispatcher`] feeds it host events.

pub mod commands;
pub mod events;
pub mod locks;
pub mod scheduler;
pub mod tags;
pub mod waitlist;

pub use events::EventDispatcher;
pub use locks::{parse_lock_announcement, LockAnnouncement, TeamLocks};
pub use scheduler::{AdmissionScheduler, FrameTask, Placement, TeamCounts};
pub use tags::{compute_tag, TagContext, TagTable};
pub use waitlist::{EnqueueOutcome, Standing, Waitlist};
