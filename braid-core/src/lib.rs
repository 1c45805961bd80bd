// braid-core/src/lib.rs

#![allow(missing_docs)]
// Memory safety
#![deny(unsafe_code)]
// Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
// Performance
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (Interfaces / Traits)
// Contracts towards the outside world (Vcs, Forge).
pub mod ports;

// 2. Domain (Core of the system)
// Plan model, canonical form, dependency graph, execution state.
// Depends on NOTHING else (no infra, no application).
pub mod domain;

// 3. Infrastructure (Adapters)
// Technical implementations (git CLI, GitHub REST, config files, env).
// Depends on the Domain and the Ports.
pub mod infrastructure;

// 4. Application (Use Cases)
// Orchestration (Loader, Gate engine, Weave, Autopilot, Deliverables).
// Depends on the Domain, the Infra and the Ports.
pub mod application;

// --- GLOBAL ERROR HANDLING ---
pub mod error;

// --- RE-EXPORTS (FACADE) ---
// Allows importing the main error easily: use braid_core::BraidError;
pub use error::BraidError;
