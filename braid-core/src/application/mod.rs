// braid-core/src/application/mod.rs

pub mod autopilot;
pub mod deliverables;
pub mod gates;
pub mod loader;
pub mod report;
pub mod weave;

// --- RE-EXPORTS (FACADE PATTERN) ---
// Lets the CLI do:
// `use braid_core::application::{Autopilot, GateEngine, load_plan_inputs};`
// without knowing the internal file structure.

pub use autopilot::{Autopilot, AutopilotConfig, AutopilotReport};
pub use deliverables::{CleanupReport, DeliverablesManager, RetentionPolicy};
pub use gates::{ExecutionReport, GateEngine};
pub use loader::{load_plan_inputs, LoadedPlan, PlanSource};
pub use weave::{integration_branch_name, WeaveOperator, WeaveOutcome};
