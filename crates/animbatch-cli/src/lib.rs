//! Animbatch CLI library.
//!
//! Command implementations for the `animbatch` binary. Every command works
//! on a JSON scene description loaded into a `MemoryScene`.

pub mod commands;
