//! Hook dispatch: the host-facing entry point of the substrate.

pub mod dispatch;
pub mod handlers;
pub mod kill_switch;

pub use dispatch::HookDispatcher;
pub use handlers::{HookServices, LoopModeState, SetupState};
pub use kill_switch::{hook_skipped, omc_disabled};
