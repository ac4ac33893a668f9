//! Animbatch Integration Test Infrastructure
//!
//! This crate holds the integration tests of the export engine. Every test
//! runs against a [`MemoryScene`](animbatch_scene::MemoryScene), so no host
//! application is needed.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p animbatch-tests
//! ```
//!
//! ## Test Files
//!
//! | File | Covers |
//! |------|--------|
//! | `restore_invariant.rs` | in-place renames leave node names unchanged on every outcome |
//! | `zero_leak.rs` | duplicate-and-constrain leaves no node or constraint behind |
//! | `naming.rs` | canonical root naming and post-rename resolution |
//! | `camera_frames.rs` | camera keys cover exactly the requested frames |
//! | `bake_planner.rs` | bake planning is stable and keeps weights qualified |
//! | `result_invariant.rs` | success and errors agree on every result |
//! | `batch_scenarios.rs` | scan plus batch runs end to end |

pub mod fixtures;
