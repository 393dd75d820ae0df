use parking_lot::Mutex;

/// Cap on variables observed by rising-edge-gated operators.
pub const MAX_EDGE_STATES: usize = 64;
/// Cap on concurrently tracked timer variables.
pub const MAX_TIMER_STATES: usize = 32;

#[derive(Debug)]
struct EdgeSlot {
    name: String,
    prev: bool,
}

/// Previous-observation table behind every rising-edge gate. Keyed by
/// the gate variable's name, bounded, shared by all scan tasks and
/// discarded on apply.
#[derive(Debug, Default)]
pub struct EdgeStates {
    slots: Mutex<Vec<EdgeSlot>>,
}

impl EdgeStates {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(MAX_EDGE_STATES)),
        }
    }

    /// One observation of `condition` under the gate `name`: true only
    /// on a false→true transition. A fresh gate starts from `false`.
    /// Table exhaustion degrades the gate to never-firing.
    pub fn rising_edge(&self, name: &str, condition: bool) -> bool {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|s| s.name == name) {
            let fired = condition && !slot.prev;
            slot.prev = condition;
            return fired;
        }
        if slots.len() >= MAX_EDGE_STATES {
            tracing::error!("[Engine] too many edge states, gate '{name}' disabled");
            return false;
        }
        slots.push(EdgeSlot {
            name: name.to_string(),
            prev: condition,
        });
        condition
    }

    /// Forget everything (apply path).
    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Monotonic-clock state of one running timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerRuntime {
    pub start_us: u64,
    pub running: bool,
}

#[derive(Debug)]
struct TimerSlot {
    name: String,
    state: TimerRuntime,
}

/// Runtime table for TON/TOF timers, distinct from the variable store
/// so apply can reset engine state without touching variable values.
#[derive(Debug, Default)]
pub struct TimerStates {
    slots: Mutex<Vec<TimerSlot>>,
}

impl TimerStates {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(MAX_TIMER_STATES)),
        }
    }

    /// Run `f` against the timer's runtime slot, creating it zeroed on
    /// first use. Returns `None` when the table is full; the caller
    /// treats that as a driver-style degradation.
    pub fn with_state<R>(&self, name: &str, f: impl FnOnce(&mut TimerRuntime) -> R) -> Option<R> {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.iter_mut().find(|s| s.name == name) {
            return Some(f(&mut slot.state));
        }
        if slots.len() >= MAX_TIMER_STATES {
            tracing::error!("[Engine] too many timer states for '{name}'");
            return None;
        }
        slots.push(TimerSlot {
            name: name.to_string(),
            state: TimerRuntime::default(),
        });
        let slot = slots.last_mut().unwrap();
        Some(f(&mut slot.state))
    }

    /// Forget everything (apply path).
    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

/// Engine-private state shared by every scan task of one program
/// generation. Preserved across wire iterations, reset on apply.
#[derive(Debug, Default)]
pub struct EngineState {
    pub edges: EdgeStates,
    pub timers: TimerStates,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            edges: EdgeStates::new(),
            timers: TimerStates::new(),
        }
    }

    pub fn reset(&self) {
        self.edges.clear();
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_of_true_fires() {
        let edges = EdgeStates::new();
        assert!(edges.rising_edge("a", true));
        assert!(!edges.rising_edge("a", true));
        assert!(!edges.rising_edge("a", false));
        assert!(edges.rising_edge("a", true));
    }

    #[test]
    fn gates_are_independent_per_name() {
        let edges = EdgeStates::new();
        assert!(edges.rising_edge("a", true));
        assert!(edges.rising_edge("b", true));
    }

    #[test]
    fn edge_table_is_bounded() {
        let edges = EdgeStates::new();
        for i in 0..MAX_EDGE_STATES {
            edges.rising_edge(&format!("g{i}"), false);
        }
        assert_eq!(edges.len(), MAX_EDGE_STATES);
        // overflow: gate never fires
        assert!(!edges.rising_edge("overflow", true));
        assert_eq!(edges.len(), MAX_EDGE_STATES);
    }

    #[test]
    fn timer_slots_persist_between_calls() {
        let timers = TimerStates::new();
        timers.with_state("t", |st| {
            st.start_us = 42;
            st.running = true;
        });
        let running = timers.with_state("t", |st| st.running).unwrap();
        assert!(running);
        timers.clear();
        let running = timers.with_state("t", |st| st.running).unwrap();
        assert!(!running);
    }
}
