//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (state.rs):
//!     Created → lock configuration → Loading → start modules → Listening
//!
//! Shutdown (cancellation.rs, signals.rs):
//!     Ctrl+C / caller cancels → accept loop stops → in-flight drain → Stopped
//! ```
//!
//! # Design Decisions
//! - One cancellation tree: caller signal → accept loop → every request
//! - State transitions are forward-only and observable

pub mod cancellation;
pub mod signals;
pub mod state;

pub use cancellation::CancellationSignal;
pub use signals::shutdown_on_ctrl_c;
pub use state::{ServerState, StateMachine};
