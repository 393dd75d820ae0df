use crate::engine::state::EngineState;
use crate::store::{VarKind, VarStore};
use crate::utils::clock;

// Ladder operators. All of them address variables by name, exactly as
// the wire document does; handles never leak into the program tree.
//
// Compatibility notes: NOContact returns the negated reading (NCContact
// the plain one), and MoveMath ignores its condition. Authoring tools
// and firmware builds depend on both.

// ============== CONTACTS ===============

/// Normally-open contact. Returns the negated reading of `name`.
#[inline]
pub fn no_contact(store: &VarStore, name: &str) -> bool {
    !store.read_bool(name)
}

/// Normally-closed contact. Returns the plain reading of `name`.
#[inline]
pub fn nc_contact(store: &VarStore, name: &str) -> bool {
    store.read_bool(name)
}

// =============== COILS =================

/// Writes the rung condition to the target every scan.
#[inline]
pub fn coil(store: &VarStore, name: &str, condition: bool) {
    store.write_bool(name, condition);
}

/// Writes true for exactly one scan per rising edge of the condition.
pub fn one_shot_positive_coil(
    store: &VarStore,
    state: &EngineState,
    name: &str,
    condition: bool,
) {
    let output = state.edges.rising_edge(name, condition);
    store.write_bool(name, output);
}

/// Latches the target true while the condition holds; false is never
/// written here.
pub fn set_coil(store: &VarStore, name: &str, condition: bool) {
    if condition {
        store.write_bool(name, true);
    }
}

/// Latches the target false while the condition holds.
pub fn reset_coil(store: &VarStore, name: &str, condition: bool) {
    if condition {
        store.write_bool(name, false);
    }
}

// ============== MATH ===============

macro_rules! edge_gated_math {
    ($fn_name:ident, $op:tt, $doc:literal) => {
        #[doc = $doc]
        pub fn $fn_name(
            store: &VarStore,
            state: &EngineState,
            a: &str,
            b: &str,
            c: &str,
            condition: bool,
        ) {
            if state.edges.rising_edge(c, condition) {
                let lhs = store.read_num(a);
                let rhs = store.read_num(b);
                store.write_num(c, lhs $op rhs);
            }
        }
    };
}

edge_gated_math!(add, +, "`c := a + b`, gated on the rising edge of the condition under `c`'s name.");
edge_gated_math!(subtract, -, "`c := a - b`, rising-edge-gated like [`add`].");
edge_gated_math!(multiply, *, "`c := a * b`, rising-edge-gated like [`add`].");

/// `c := a / b`, rising-edge-gated. A near-zero divisor suppresses the
/// write entirely.
pub fn divide(
    store: &VarStore,
    state: &EngineState,
    a: &str,
    b: &str,
    c: &str,
    condition: bool,
) {
    if state.edges.rising_edge(c, condition) {
        let lhs = store.read_num(a);
        let rhs = store.read_num(b);
        if rhs.abs() < 1e-6 {
            tracing::error!("[Ladder] division by zero for {b}");
            return;
        }
        store.write_num(c, lhs / rhs);
    }
}

/// Copies `a` into `b` every scan. The condition argument is accepted
/// and ignored, matching the firmware builds in the field.
pub fn move_num(store: &VarStore, a: &str, b: &str, _condition: bool) {
    let v = store.read_num(a);
    store.write_num(b, v);
}

// ============== COMPARE ===============

macro_rules! compare {
    ($fn_name:ident, $op:tt) => {
        #[inline]
        pub fn $fn_name(store: &VarStore, a: &str, b: &str) -> bool {
            store.read_num(a) $op store.read_num(b)
        }
    };
}

compare!(greater, >);
compare!(less, <);
compare!(greater_or_equal, >=);
compare!(less_or_equal, <=);
compare!(equal, ==);
compare!(not_equal, !=);

// ======= COUNTERS / TIMERS ============

fn with_counter(store: &VarStore, name: &str, f: impl FnOnce(&VarKind)) {
    match store.find(name) {
        Some(var) if matches!(var.kind, VarKind::Counter { .. }) => f(&var.kind),
        _ => tracing::warn!("[Ladder] '{name}' is not a counter"),
    }
}

/// Increment the counter on each rising edge of the condition, then
/// refresh both outputs.
pub fn count_up(store: &VarStore, state: &EngineState, name: &str, condition: bool) {
    if state.edges.rising_edge(name, condition) {
        with_counter(store, name, |kind| {
            if let VarKind::Counter { pv, cv, qu, qd, .. } = kind {
                let next = cv.get() + 1.0;
                cv.set(next);
                qu.set(next >= pv.get());
                qd.set(next <= 0.0);
            }
        });
    }
}

/// Decrement the counter on each rising edge of the condition.
pub fn count_down(store: &VarStore, state: &EngineState, name: &str, condition: bool) {
    if state.edges.rising_edge(name, condition) {
        with_counter(store, name, |kind| {
            if let VarKind::Counter { pv, cv, qu, qd, .. } = kind {
                let next = cv.get() - 1.0;
                cv.set(next);
                qu.set(next >= pv.get());
                qd.set(next <= 0.0);
            }
        });
    }
}

/// On-delay timer. Q latches true once ET reaches PT and holds while
/// the input holds; the return value is ANDed into the rung condition.
pub fn timer_on(store: &VarStore, state: &EngineState, name: &str, condition: bool) -> bool {
    let Some(var) = store.find(name) else {
        tracing::warn!("[Ladder] timer '{name}' not found");
        return false;
    };
    let VarKind::Timer { pt, et, input, q } = &var.kind else {
        tracing::warn!("[Ladder] '{name}' is not a timer");
        return false;
    };

    let updated = state.timers.with_state(name, |st| {
        input.set(condition);

        let preset = pt.get();
        if preset <= 0.0 {
            et.set(0.0);
            q.set(false);
            st.running = false;
            return false;
        }

        if condition {
            if !st.running && !q.get() {
                st.start_us = clock::monotonic_us();
                st.running = true;
            }

            if st.running {
                let mut elapsed =
                    (clock::monotonic_us().saturating_sub(st.start_us)) as f64 / 1000.0;
                if elapsed > preset {
                    elapsed = preset;
                    st.running = false;
                }
                et.set(elapsed);
                q.set(elapsed >= preset);
            } else {
                // expired and latched
                et.set(preset);
                q.set(true);
            }
        } else {
            et.set(0.0);
            q.set(false);
            st.running = false;
        }

        q.get()
    });

    match updated {
        Some(out) => out,
        None => {
            tracing::error!("[Ladder] failed to get state for timer {name}");
            false
        }
    }
}

/// Off-delay timer. Q holds true for PT milliseconds after the input
/// drops. The caller replaces (not ANDs) the rung condition with the
/// return value.
pub fn timer_off(store: &VarStore, state: &EngineState, name: &str, condition: bool) -> bool {
    let Some(var) = store.find(name) else {
        tracing::warn!("[Ladder] timer '{name}' not found");
        return false;
    };
    let VarKind::Timer { pt, et, input, q } = &var.kind else {
        tracing::warn!("[Ladder] '{name}' is not a timer");
        return false;
    };

    let updated = state.timers.with_state(name, |st| {
        input.set(condition);

        let preset = pt.get();
        if preset <= 0.0 {
            et.set(0.0);
            q.set(condition);
            st.running = false;
            return q.get();
        }

        if condition {
            q.set(true);
            et.set(0.0);
            st.running = false;
        } else {
            if !st.running && q.get() {
                st.start_us = clock::monotonic_us();
                st.running = true;
            }

            if st.running {
                let mut elapsed =
                    (clock::monotonic_us().saturating_sub(st.start_us)) as f64 / 1000.0;
                if elapsed > preset {
                    elapsed = preset;
                    st.running = false;
                }
                et.set(elapsed);
                q.set(elapsed < preset);
            } else if !q.get() {
                et.set(0.0);
            }
        }

        q.get()
    });

    match updated {
        Some(out) => out,
        None => {
            tracing::error!("[Ladder] failed to get state for timer {name}");
            false
        }
    }
}

/// Edge-gated reset. Counters go back to 0 (counting up) or PV
/// (counting down); timers drop all four fields and their runtime slot.
pub fn reset(store: &VarStore, state: &EngineState, name: &str, condition: bool) {
    if !state.edges.rising_edge(name, condition) {
        return;
    }
    let Some(var) = store.find(name) else {
        tracing::warn!("[Ladder] reset target '{name}' not found");
        return;
    };

    match &var.kind {
        VarKind::Counter {
            pv,
            cv,
            cu,
            cd,
            qu,
            qd,
        } => {
            let mut action_taken = false;
            if cu.get() {
                cv.set(0.0);
                action_taken = true;
            }
            if cd.get() {
                cv.set(pv.get());
                action_taken = true;
            }
            if action_taken {
                qu.set(cv.get() >= pv.get());
                qd.set(cv.get() <= 0.0);
            }
            tracing::info!("[Ladder] counter {name} reset (cv: {})", cv.get());
        }
        VarKind::Timer { et, input, q, .. } => {
            let cleared = state.timers.with_state(name, |st| {
                et.set(0.0);
                q.set(false);
                input.set(false);
                st.running = false;
            });
            if cleared.is_some() {
                tracing::info!("[Ladder] timer {name} reset");
            }
        }
        _ => {
            tracing::warn!("[Ladder] reset target '{name}' is neither counter nor timer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::drivers::NullDrivers;
    use crate::device::PinMap;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn store(vars: serde_json::Value) -> VarStore {
        VarStore::load(
            vars.as_array().unwrap(),
            Arc::new(PinMap::default()),
            Arc::new(NullDrivers),
        )
        .unwrap()
    }

    #[test]
    fn contact_polarity_is_inverted() {
        let s = store(json!([{"Type": "Boolean", "Name": "b", "Value": true}]));
        // NO returns the negated reading, NC the plain one
        assert!(!no_contact(&s, "b"));
        assert!(nc_contact(&s, "b"));
    }

    #[test]
    fn one_shot_coil_fires_for_a_single_call() {
        let s = store(json!([{"Type": "Boolean", "Name": "out", "Value": false}]));
        let st = EngineState::new();
        one_shot_positive_coil(&s, &st, "out", true);
        assert!(s.read_bool("out"));
        one_shot_positive_coil(&s, &st, "out", true);
        assert!(!s.read_bool("out"));
        one_shot_positive_coil(&s, &st, "out", false);
        one_shot_positive_coil(&s, &st, "out", true);
        assert!(s.read_bool("out"));
    }

    #[test]
    fn set_and_reset_coils_latch() {
        let s = store(json!([{"Type": "Boolean", "Name": "out", "Value": false}]));
        set_coil(&s, "out", false);
        assert!(!s.read_bool("out"));
        set_coil(&s, "out", true);
        assert!(s.read_bool("out"));
        reset_coil(&s, "out", false);
        assert!(s.read_bool("out"));
        reset_coil(&s, "out", true);
        assert!(!s.read_bool("out"));
    }

    #[test]
    fn math_is_gated_on_destination_edge() {
        let s = store(json!([
            {"Type": "Number", "Name": "a", "Value": 30.0},
            {"Type": "Number", "Name": "b", "Value": 12.0},
            {"Type": "Number", "Name": "c", "Value": 0.0},
        ]));
        let st = EngineState::new();
        add(&s, &st, "a", "b", "c", true);
        assert_eq!(s.read_num("c"), 42.0);
        // same edge: no re-fire even though inputs changed
        s.write_num("a", 100.0);
        add(&s, &st, "a", "b", "c", true);
        assert_eq!(s.read_num("c"), 42.0);
        // falling then rising again re-fires
        add(&s, &st, "a", "b", "c", false);
        add(&s, &st, "a", "b", "c", true);
        assert_eq!(s.read_num("c"), 112.0);
    }

    #[test]
    fn divide_suppresses_near_zero_divisor() {
        let s = store(json!([
            {"Type": "Number", "Name": "a", "Value": 10.0},
            {"Type": "Number", "Name": "b", "Value": 0.0},
            {"Type": "Number", "Name": "c", "Value": 5.0},
        ]));
        let st = EngineState::new();
        divide(&s, &st, "a", "b", "c", true);
        assert_eq!(s.read_num("c"), 5.0);
    }

    #[test]
    fn move_ignores_condition() {
        let s = store(json!([
            {"Type": "Number", "Name": "a", "Value": 3.0},
            {"Type": "Number", "Name": "b", "Value": 0.0},
        ]));
        move_num(&s, "a", "b", false);
        assert_eq!(s.read_num("b"), 3.0);
    }

    #[test]
    fn counters_count_on_edges_and_track_outputs() {
        let s = store(json!([
            {"Type": "Counter", "Name": "c", "PV": 2.0, "CV": 0.0},
        ]));
        let st = EngineState::new();
        for _ in 0..3 {
            count_up(&s, &st, "c", true);
            count_up(&s, &st, "c", false);
        }
        assert_eq!(s.read_num("c.CV"), 3.0);
        assert!(s.read_bool("c.QU"));
        assert!(!s.read_bool("c.QD"));

        for _ in 0..3 {
            count_down(&s, &st, "c", true);
            count_down(&s, &st, "c", false);
        }
        assert_eq!(s.read_num("c.CV"), 0.0);
        assert!(!s.read_bool("c.QU"));
        assert!(s.read_bool("c.QD"));
    }

    #[test]
    fn ton_latches_after_preset_and_clears_on_drop() {
        let s = store(json!([
            {"Type": "Timer", "Name": "t", "PT": 60.0, "ET": 0.0},
        ]));
        let st = EngineState::new();
        assert!(!timer_on(&s, &st, "t", true));
        thread::sleep(Duration::from_millis(90));
        assert!(timer_on(&s, &st, "t", true));
        assert_eq!(s.read_num("t.ET"), 60.0);
        // latched while input holds
        assert!(timer_on(&s, &st, "t", true));
        // input drop resets
        assert!(!timer_on(&s, &st, "t", false));
        assert_eq!(s.read_num("t.ET"), 0.0);
    }

    #[test]
    fn ton_with_nonpositive_preset_never_runs() {
        let s = store(json!([
            {"Type": "Timer", "Name": "t", "PT": 0.0, "ET": 0.0},
        ]));
        let st = EngineState::new();
        assert!(!timer_on(&s, &st, "t", true));
        assert_eq!(s.read_num("t.ET"), 0.0);
    }

    #[test]
    fn tof_holds_q_for_preset_after_drop() {
        let s = store(json!([
            {"Type": "Timer", "Name": "t", "PT": 60.0, "ET": 0.0},
        ]));
        let st = EngineState::new();
        assert!(timer_off(&s, &st, "t", true));
        // input drops: Q holds while the off-delay runs
        assert!(timer_off(&s, &st, "t", false));
        thread::sleep(Duration::from_millis(90));
        assert!(!timer_off(&s, &st, "t", false));
        assert_eq!(s.read_num("t.ET"), 60.0);
    }

    #[test]
    fn reset_rolls_counter_toward_its_direction() {
        let s = store(json!([
            {"Type": "Counter", "Name": "c", "PV": 5.0, "CV": 3.0, "CU": true},
        ]));
        let st = EngineState::new();
        reset(&s, &st, "c", true);
        assert_eq!(s.read_num("c.CV"), 0.0);
        assert!(!s.read_bool("c.QU"));
        assert!(s.read_bool("c.QD"));
    }

    #[test]
    fn reset_clears_timer_fields() {
        let s = store(json!([
            {"Type": "Timer", "Name": "t", "PT": 30.0, "ET": 0.0},
        ]));
        let st = EngineState::new();
        timer_on(&s, &st, "t", true);
        reset(&s, &st, "t", true);
        assert_eq!(s.read_num("t.ET"), 0.0);
        assert!(!s.read_bool("t.Q"));
        assert!(!s.read_bool("t.IN"));
    }
}
