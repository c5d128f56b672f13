//! Pure decision core: state projection, reducer, vetoes and posture table.
//!
//! Nothing in this module performs I/O. Given the same ordered events it
//! produces the same state, the same evaluations and the same state hashes.

pub mod constraints;
pub mod intent;
pub mod reducer;
pub mod state;

pub use constraints::{evaluate, Evaluation, VetoReason};
pub use intent::{Direction, Intent, Posture, PostureTable, RiskCap, TABLE_VERSION};
pub use reducer::{apply, fold, ReducerConfig, ReducerOutput};
pub use state::{Gate, GlobalState, SymbolState, SystemState};
