use crate::engine::state::EngineState;
use crate::engine::wire::{scan_wire, Wire};
use crate::store::VarStore;
use crate::utils::{CancelToken, HealthFlag};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// Handle to one running scan task.
pub struct WireTask {
    id: uuid::fmt::Simple,
    index: usize,
    cancel: CancelToken,
    health: HealthFlag,
    handle: Option<JoinHandle<()>>,
}

impl WireTask {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn is_healthy(&self) -> bool {
        self.health.get()
    }

    fn join(mut self) {
        self.cancel.cancel();
        self.health.down();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("[WireScan] task {} panicked", self.id);
            }
        }
    }
}

/// One program generation's worth of scan tasks. Built at apply, torn
/// down in full before the next store swap.
pub struct WireScheduler {
    tasks: Vec<WireTask>,
    cancel: CancelToken,
}

impl WireScheduler {
    /// Scheduler with no tasks; what runs before the first document.
    pub fn idle() -> Self {
        Self {
            tasks: Vec::new(),
            cancel: CancelToken::new_root(),
        }
    }

    /// Spawn one scan task per wire. Each task owns its wire tree and
    /// loops scan → 10 ms tail sleep until cancelled. Spawns are spaced
    /// by `spawn_pause` so bulk creation does not starve running tasks.
    pub fn spawn(
        wires: Vec<Wire>,
        store: Arc<ArcSwap<VarStore>>,
        state: Arc<EngineState>,
        parent: &CancelToken,
        scan_sleep: Duration,
        spawn_pause: Duration,
    ) -> Self {
        let cancel = parent.new_child();
        let mut tasks = Vec::with_capacity(wires.len());

        for (index, wire) in wires.into_iter().enumerate() {
            let task_cancel = cancel.new_child();
            let health = HealthFlag::new(false);
            let id = Uuid::new_v4().simple();

            let store = store.clone();
            let state = state.clone();
            let thread_cancel = task_cancel.clone();
            let thread_health = health.clone();

            let spawned = thread::Builder::new()
                .name(format!("wire-{index}"))
                .spawn(move || {
                    thread_health.up();
                    loop {
                        if thread_cancel.is_cancelled() {
                            break;
                        }
                        {
                            let snapshot = store.load();
                            scan_wire(&wire, &snapshot, &state);
                        }
                        if !thread_cancel.sleep_cancellable(scan_sleep) {
                            break;
                        }
                    }
                    thread_health.down();
                });

            match spawned {
                Ok(handle) => {
                    tracing::info!("[WireScan] created task {id} for wire {index}");
                    tasks.push(WireTask {
                        id,
                        index,
                        cancel: task_cancel,
                        health,
                        handle: Some(handle),
                    });
                }
                Err(e) => {
                    tracing::error!("[WireScan] failed to create task for wire {index}: {e}");
                }
            }

            if !spawn_pause.is_zero() {
                thread::sleep(spawn_pause);
            }
        }

        Self { tasks, cancel }
    }

    #[inline]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel every task and join them synchronously. Any in-flight
    /// element evaluation completes before its task is joined, so the
    /// store can be swapped right after this returns.
    pub fn teardown(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        self.cancel.cancel();
        let count = self.tasks.len();
        for task in self.tasks.drain(..) {
            task.join();
        }
        tracing::info!("[WireScan] tore down {count} tasks");
    }
}

impl Drop for WireScheduler {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::drivers::NullDrivers;
    use crate::device::PinMap;
    use serde_json::json;
    use std::time::Instant;

    fn shared_store(vars: serde_json::Value) -> Arc<ArcSwap<VarStore>> {
        let store = VarStore::load(
            vars.as_array().unwrap(),
            Arc::new(PinMap::default()),
            Arc::new(NullDrivers),
        )
        .unwrap();
        Arc::new(ArcSwap::from_pointee(store))
    }

    fn wire(json: serde_json::Value) -> Wire {
        Wire::from_json(&json).unwrap()
    }

    #[test]
    fn scan_task_drives_its_wire_until_teardown() {
        let store = shared_store(json!([
            {"Type": "Boolean", "Name": "a", "Value": false},
            {"Type": "Boolean", "Name": "out", "Value": false},
        ]));
        let state = Arc::new(EngineState::new());
        let root = CancelToken::new_root();

        let mut sched = WireScheduler::spawn(
            vec![wire(json!({"Nodes": [
                {"Type": "LadderElement", "ElementType": "NOContact", "ComboBoxValues": ["a"]},
                {"Type": "LadderElement", "ElementType": "Coil", "ComboBoxValues": ["out"]},
            ]}))],
            store.clone(),
            state,
            &root,
            Duration::from_millis(1),
            Duration::ZERO,
        );
        assert_eq!(sched.task_count(), 1);

        // a=false reads active through the NO contact
        let deadline = Instant::now() + Duration::from_millis(500);
        while !store.load().read_bool("out") {
            assert!(Instant::now() < deadline, "scan never drove the coil");
            thread::sleep(Duration::from_millis(2));
        }

        store.load().write_bool("a", true);
        let deadline = Instant::now() + Duration::from_millis(500);
        while store.load().read_bool("out") {
            assert!(Instant::now() < deadline, "scan never released the coil");
            thread::sleep(Duration::from_millis(2));
        }

        sched.teardown();
        assert_eq!(sched.task_count(), 0);
    }

    #[test]
    fn cancelling_the_parent_token_stops_tasks() {
        let store = shared_store(json!([
            {"Type": "Boolean", "Name": "out", "Value": false},
        ]));
        let state = Arc::new(EngineState::new());
        let root = CancelToken::new_root();

        let sched = WireScheduler::spawn(
            vec![wire(json!({"Nodes": [
                {"Type": "LadderElement", "ElementType": "Coil", "ComboBoxValues": ["out"]},
            ]}))],
            store,
            state,
            &root,
            Duration::from_millis(1),
            Duration::ZERO,
        );

        root.cancel();
        let deadline = Instant::now() + Duration::from_millis(500);
        while sched.tasks.iter().any(WireTask::is_healthy) {
            assert!(Instant::now() < deadline, "tasks ignored parent cancel");
            thread::sleep(Duration::from_millis(2));
        }
    }
}
