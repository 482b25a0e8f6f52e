//! Authorization predicates over baby memberships.
//!
//! Everything here is pure: decisions are computed from the latest observed
//! `Baby` snapshot and never touch storage.

pub mod permissions;
