//! signlens-workflow: the scan lifecycle.
//!
//! [`stage`] holds the pure state machine, [`controller`] drives it against
//! the camera, the analysis provider and the store, [`simulator`] animates
//! the Processing stage, and [`presenter`] shows a completed result.

pub mod controller;
pub mod locality;
pub mod presenter;
pub mod simulator;
pub mod stage;

pub use controller::{ControllerError, ScanController, settle_with_dwell};
pub use locality::{locate, resolve_locality};
pub use presenter::{ResultPresenter, VideoState};
pub use simulator::{
    AGENT_TASKS, AgentTaskDef, DONE_MESSAGE, ProgressSimulator, SimulatorHandle,
    SimulatorOutcome, initial_snapshot, snapshot,
};
pub use stage::{Stage, StageMachine};
