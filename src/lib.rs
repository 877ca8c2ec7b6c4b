//! `rusty-meter`: a passive damage/heal meter core for an MMO client.
//!
//! This crate is a thin re-export of [`meter_engine`], the crate that wires
//! the `meter-*` stage crates (transport reassembly, payload decoding,
//! event semantics, roster/identity tracking, session management,
//! aggregation, and snapshot projection) into the threaded pipeline
//! described in spec.md §5. Everything an embedder needs — `Engine`,
//! `Config`, `Mode`, and the control-input methods — is re-exported here so
//! a caller only needs `rusty_meter` as a dependency, the same way the
//! teacher's root crate is the one thing a consumer links against even
//! though the real logic lives in its workspace members.
//!
//! See `tests/integration/` for black-box scenario coverage of spec.md §8.

pub use meter_engine::*;
