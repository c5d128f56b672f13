//! Hard vetoes. Evaluated in strict priority order, first match wins:
//!
//! 1. gate blocked            -> `invariant_violation`
//! 2. listener not alive      -> `input_unavailable`
//! 3. regime unknown          -> `regime_unresolved`
//! 4. regime without a posture -> `regime_unresolved`
//!
//! A violation always dominates a crash, which always dominates an
//! unresolved regime.

use super::intent::{Posture, PostureTable};
use super::state::GlobalState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VetoReason {
    InvariantViolation,
    InputUnavailable,
    RegimeUnresolved,
}

impl VetoReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VetoReason::InvariantViolation => "invariant_violation",
            VetoReason::InputUnavailable => "input_unavailable",
            VetoReason::RegimeUnresolved => "regime_unresolved",
        }
    }

    /// Render the veto as a flat posture whose rationale names the cause.
    pub fn posture(&self, state: &GlobalState, symbol: &str) -> Posture {
        let cause = match self {
            VetoReason::InvariantViolation => "invariant.violation active".to_string(),
            VetoReason::InputUnavailable if state.system.listener_seen => {
                "listener.crash observed".to_string()
            }
            VetoReason::InputUnavailable => "listener.start not observed".to_string(),
            VetoReason::RegimeUnresolved => {
                format!("regime={}", state.regime(symbol).unwrap_or("unresolved"))
            }
        };
        Posture::flat(vec![format!("veto={}", self.as_str()), cause])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Intent(Posture),
    Veto(VetoReason),
}

impl Evaluation {
    pub fn into_posture(self, state: &GlobalState, symbol: &str) -> Posture {
        match self {
            Evaluation::Intent(posture) => posture,
            Evaluation::Veto(reason) => reason.posture(state, symbol),
        }
    }
}

pub fn evaluate(state: &GlobalState, symbol: &str, table: &PostureTable) -> Evaluation {
    if state.system.gate().is_blocked() {
        return Evaluation::Veto(VetoReason::InvariantViolation);
    }
    if !state.system.listener_alive {
        return Evaluation::Veto(VetoReason::InputUnavailable);
    }
    let Some(regime) = state.regime(symbol) else {
        return Evaluation::Veto(VetoReason::RegimeUnresolved);
    };
    match table.lookup(regime) {
        Some(posture) => Evaluation::Intent(posture),
        None => Evaluation::Veto(VetoReason::RegimeUnresolved),
    }
}
