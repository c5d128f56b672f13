//! Pure reducer: (State, Event) -> State
//!
//! All state transitions happen here. The reducer performs no I/O and never
//! fails: unknown event types and payloads missing the fields a transition
//! needs leave the projection untouched.

use chrono::{DateTime, FixedOffset};

use super::state::GlobalState;
use crate::spine::{EventKind, SpineEvent};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReducerConfig {
    /// Start of the current authority epoch. Violations stamped strictly
    /// before it belong to an earlier epoch and do not block this run.
    pub violation_epoch: Option<DateTime<FixedOffset>>,
}

/// Result of folding one event. The state hash is not computed here; call
/// [`GlobalState::hash`] where a digest is actually needed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducerOutput {
    /// Symbols whose posture must be re-evaluated, in evaluation order.
    pub affected: Vec<String>,
}

/// Fold one event into the state.
pub fn apply(state: &mut GlobalState, event: &SpineEvent, cfg: &ReducerConfig) -> ReducerOutput {
    state.applied += 1;

    let affected = match event.kind() {
        EventKind::MarketRegime => set_regime(state, event, "regime"),
        // `from` is provenance only; the stored regime follows `to`.
        EventKind::MarketRegimeChange => set_regime(state, event, "to"),
        kind if kind.is_system_wide() => {
            if apply_system(state, event, kind, cfg) {
                state.known_symbols()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    };

    ReducerOutput { affected }
}

/// Rebuild state from the empty projection.
pub fn fold<'a, I>(events: I, cfg: &ReducerConfig) -> GlobalState
where
    I: IntoIterator<Item = &'a SpineEvent>,
{
    let mut state = GlobalState::new();
    for event in events {
        apply(&mut state, event, cfg);
    }
    state
}

fn set_regime(state: &mut GlobalState, event: &SpineEvent, field: &str) -> Vec<String> {
    let (Some(symbol), Some(regime)) = (event.payload_str("symbol"), event.payload_str(field))
    else {
        return Vec::new();
    };
    let sym = state.symbol_mut(symbol);
    sym.regime = Some(regime.to_string());
    sym.last_regime_ts = event.timestamp.clone();
    vec![symbol.to_string()]
}

/// Lifecycle and violation events. Returns false when the event was not
/// admitted and the state is unchanged.
fn apply_system(
    state: &mut GlobalState,
    event: &SpineEvent,
    kind: EventKind,
    cfg: &ReducerConfig,
) -> bool {
    let ts = event.timestamp.clone();
    match kind {
        EventKind::ListenerStart | EventKind::ListenerCrash => {
            state.system.listener_alive = kind == EventKind::ListenerStart;
            state.system.listener_seen = true;
            state.system.last_listener_event_ts = ts;
            true
        }
        EventKind::InvariantViolation if admits_violation(event, cfg) => {
            state.system.violation_active = state.system.gate().on_violation().is_blocked();
            state.system.last_violation_ts = ts;
            true
        }
        _ => false,
    }
}

fn admits_violation(event: &SpineEvent, cfg: &ReducerConfig) -> bool {
    let Some(epoch) = cfg.violation_epoch else {
        return true;
    };
    // Unparsable or missing timestamps cannot prove they predate the epoch.
    match event
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
    {
        Some(at) => at >= epoch,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn regime(symbol: &str, regime: &str) -> SpineEvent {
        SpineEvent::new("market.regime", json!({"symbol": symbol, "regime": regime}))
    }

    fn violation_at(ts: &str) -> SpineEvent {
        SpineEvent::new("invariant.violation", json!({"invariant_id": "test.violation"}))
            .with_provenance("v-1", ts)
    }

    fn epoch_cfg() -> ReducerConfig {
        ReducerConfig {
            violation_epoch: Some(
                DateTime::parse_from_rfc3339("2026-01-10T00:00:00+00:00").unwrap(),
            ),
        }
    }

    #[test]
    fn listener_liveness_follows_latest_event() {
        let mut state = GlobalState::new();
        let cfg = ReducerConfig::default();
        apply(&mut state, &SpineEvent::new("listener.start", json!({})), &cfg);
        assert!(state.system.listener_alive);
        apply(&mut state, &SpineEvent::new("listener.crash", json!({})), &cfg);
        assert!(!state.system.listener_alive);
        apply(&mut state, &SpineEvent::new("listener.start", json!({})), &cfg);
        assert!(state.system.listener_alive);
        assert!(state.system.listener_seen);
    }

    #[test]
    fn violation_is_sticky() {
        let mut state = GlobalState::new();
        let cfg = ReducerConfig::default();
        apply(&mut state, &violation_at("2026-01-10T01:00:00+00:00"), &cfg);
        for event in [
            SpineEvent::new("listener.start", json!({})),
            regime("BTC-USD", "drift"),
            SpineEvent::new("listener.crash", json!({})),
            SpineEvent::new("invariant.cleared", json!({})),
        ] {
            apply(&mut state, &event, &cfg);
            assert!(state.system.violation_active);
        }
        assert_eq!(
            state.system.last_violation_ts.as_deref(),
            Some("2026-01-10T01:00:00+00:00")
        );
    }

    #[test]
    fn regime_change_stores_to_value() {
        let mut state = GlobalState::new();
        let cfg = ReducerConfig::default();
        let change = SpineEvent::new(
            "market.regime_change",
            json!({"symbol": "BTC-USD", "from": "chop", "to": "breakout"}),
        )
        .with_provenance("e-2", "2026-01-10T00:00:02+00:00");
        let out = apply(&mut state, &change, &cfg);
        assert_eq!(out.affected, vec!["BTC-USD"]);
        assert_eq!(state.regime("BTC-USD"), Some("breakout"));
        assert_eq!(
            state.symbol("BTC-USD").unwrap().last_regime_ts.as_deref(),
            Some("2026-01-10T00:00:02+00:00")
        );
    }

    #[test]
    fn regime_without_symbol_is_noop() {
        let mut state = GlobalState::new();
        let out = apply(
            &mut state,
            &SpineEvent::new("market.regime", json!({"regime": "drift"})),
            &ReducerConfig::default(),
        );
        assert!(out.affected.is_empty());
        assert!(state.symbols.is_empty());
    }

    #[test]
    fn unknown_event_changes_only_the_counter() {
        let mut state = GlobalState::new();
        let before = state.clone();
        let out = apply(
            &mut state,
            &SpineEvent::new("router.intent", json!({"symbol": "BTC-USD"})),
            &ReducerConfig::default(),
        );
        assert!(out.affected.is_empty());
        assert_eq!(state.system, before.system);
        assert_eq!(state.symbols, before.symbols);
        assert_eq!(state.applied, 1);
    }

    #[test]
    fn system_events_fan_out_in_symbol_order() {
        let mut state = GlobalState::new();
        let cfg = ReducerConfig::default();
        apply(&mut state, &regime("SOL-USD", "chop"), &cfg);
        apply(&mut state, &regime("BTC-USD", "drift"), &cfg);
        let out = apply(&mut state, &SpineEvent::new("listener.start", json!({})), &cfg);
        assert_eq!(out.affected, vec!["BTC-USD", "SOL-USD"]);
    }

    #[test]
    fn violation_before_epoch_is_ignored() {
        let mut state = GlobalState::new();
        let old = violation_at("2025-12-21T00:46:16.601321+00:00");
        let out = apply(&mut state, &old, &epoch_cfg());
        assert!(out.affected.is_empty());
        assert!(!state.system.violation_active);
        assert_eq!(state.system.last_violation_ts, None);
    }

    #[test]
    fn only_admitted_system_events_fan_out() {
        let mut state = GlobalState::new();
        apply(&mut state, &regime("BTC-USD", "drift"), &epoch_cfg());

        let stale = apply(&mut state, &violation_at("2025-12-31T23:59:59+00:00"), &epoch_cfg());
        assert!(stale.affected.is_empty());

        let fresh = apply(&mut state, &violation_at("2026-01-10T00:00:01+00:00"), &epoch_cfg());
        assert_eq!(fresh.affected, vec!["BTC-USD"]);
        let crash = apply(&mut state, &SpineEvent::new("listener.crash", json!({})), &epoch_cfg());
        assert_eq!(crash.affected, vec!["BTC-USD"]);
    }

    #[test]
    fn violation_at_or_after_epoch_counts() {
        let mut at = GlobalState::new();
        apply(&mut at, &violation_at("2026-01-10T00:00:00+00:00"), &epoch_cfg());
        assert!(at.system.violation_active);

        let mut offset = GlobalState::new();
        // Same instant expressed in another offset.
        apply(&mut offset, &violation_at("2026-01-10T01:00:00+01:00"), &epoch_cfg());
        assert!(offset.system.violation_active);
    }

    #[test]
    fn violation_with_unreadable_timestamp_counts() {
        let mut state = GlobalState::new();
        apply(&mut state, &violation_at("last tuesday"), &epoch_cfg());
        assert!(state.system.violation_active);

        let mut bare = GlobalState::new();
        apply(
            &mut bare,
            &SpineEvent::new("invariant.violation", json!({})),
            &epoch_cfg(),
        );
        assert!(bare.system.violation_active);
    }

    #[test]
    fn fold_matches_incremental_apply() {
        let cfg = ReducerConfig::default();
        let events = vec![
            SpineEvent::new("listener.start", json!({})),
            regime("BTC-USD", "drift"),
            regime("ETH-USD", "chop"),
            SpineEvent::new("listener.crash", json!({})),
        ];
        let mut live = GlobalState::new();
        for (n, event) in events.iter().enumerate() {
            apply(&mut live, event, &cfg);
            let rebuilt = fold(&events[..=n], &cfg);
            assert_eq!(rebuilt, live);
            assert_eq!(rebuilt.hash(), live.hash());
        }
    }
}
