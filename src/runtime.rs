use crate::bus::ports::{EgressTx, IngressRx, PortChannel, PortReceiver, PortSender};
use crate::bus::{ConnectionMsg, IngressEvent, Publication, Topic, Topics};
use crate::config::RuntimeConfig;
use crate::device::drivers::{IoDriver, OneWireBus};
use crate::device::{PinMap, PinRole};
use crate::engine::samplers::{self, AdcConditioner};
use crate::engine::scheduler::WireScheduler;
use crate::engine::state::EngineState;
use crate::error::TryRecvError;
use crate::ingest::{self, ChunkBuffer};
use crate::onewire::OneWireDetector;
use crate::storage::{self, BlobStore};
use crate::store::VarStore;
use crate::utils::{clock, CancelToken};
use anyhow::{anyhow, Result};
use arc_swap::ArcSwap;
use bytes::Bytes;
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const MQTT_QOS: u8 = 1;
const PARENT_QOS: u8 = 0;
/// Max ingress events drained per control iteration.
const MAX_INGRESS_DRAIN: usize = 32;

/// State every task of the runtime observes. The store is replaced
/// wholesale on apply; everything else is scalar flags.
struct Shared {
    store: Arc<ArcSwap<VarStore>>,
    engine: Arc<EngineState>,
    app_connected: AtomicBool,
    bus_connected: AtomicBool,
    last_present_us: AtomicU64,
}

impl Shared {
    fn new(io: Arc<dyn IoDriver>) -> Self {
        Self {
            store: Arc::new(ArcSwap::from_pointee(VarStore::empty(
                Arc::new(PinMap::default()),
                io,
            ))),
            engine: Arc::new(EngineState::new()),
            app_connected: AtomicBool::new(false),
            bus_connected: AtomicBool::new(false),
            last_present_us: AtomicU64::new(0),
        }
    }
}

/// One applied program generation: its wire tasks and the samplers the
/// store required. Torn down as a unit before the next swap.
struct Generation {
    cancel: CancelToken,
    scheduler: WireScheduler,
    samplers: Vec<JoinHandle<()>>,
}

impl Generation {
    fn idle(parent: &CancelToken) -> Self {
        Self {
            cancel: parent.new_child(),
            scheduler: WireScheduler::idle(),
            samplers: Vec::new(),
        }
    }

    fn teardown(&mut self) {
        self.cancel.cancel();
        self.scheduler.teardown();
        for handle in self.samplers.drain(..) {
            let _ = handle.join();
        }
    }
}

/// The assembled controller core. Owns the control thread; transports
/// feed it through the ingress port and consume the egress port.
pub struct Runtime {
    ingress_tx: PortSender<IngressEvent>,
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl Runtime {
    /// TX half transports push inbound events into.
    pub fn ingress_tx(&self) -> PortSender<IngressEvent> {
        self.ingress_tx.clone()
    }

    /// Block until the control thread exits (TERM signal or shutdown).
    pub fn run_blocking(mut self) -> Result<()> {
        if let Some(join) = self.join.take() {
            let _ = join.join();
            Ok(())
        } else {
            Err(anyhow!("control thread is gone"))
        }
    }

    /// Cooperative shutdown: cancel everything and join.
    pub fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn into_guard(self) -> RuntimeGuard {
        RuntimeGuard(Some(self))
    }

    /// Spawn the runtime: boot from the persisted document if one
    /// exists, then serve ingress events until cancelled.
    pub fn spawn<E>(
        cfg: RuntimeConfig,
        io: Arc<dyn IoDriver>,
        onewire: Arc<dyn OneWireBus>,
        blobs: Arc<dyn BlobStore>,
        egress: E,
    ) -> Result<Runtime>
    where
        E: EgressTx<Item = Publication> + Clone,
    {
        let (ingress_tx, ingress_rx) = PortChannel::unbounded::<IngressEvent>();
        let cancel = CancelToken::new_root();

        let thread_cancel = cancel.clone();
        let join = thread::Builder::new()
            .name("plc-control".into())
            .spawn(move || {
                let term_flag = Arc::new(AtomicBool::new(false));
                for sig in TERM_SIGNALS {
                    let _ = flag::register(*sig, term_flag.clone());
                }

                let mut core = Core::new(cfg, io, onewire, blobs, egress, thread_cancel.clone());
                core.boot_from_storage();
                core.run(ingress_rx, &term_flag);
                core.stop();
            })
            .map_err(|e| anyhow!("failed to spawn control thread: {e}"))?;

        Ok(Runtime {
            ingress_tx,
            cancel,
            join: Some(join),
        })
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct RuntimeGuard(Option<Runtime>);

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        if let Some(rt) = self.0.take() {
            rt.shutdown();
        }
    }
}

/// Control-thread state: owns the apply machinery and the steady tasks.
struct Core<E: EgressTx<Item = Publication> + Clone> {
    cfg: RuntimeConfig,
    topics: Topics,
    io: Arc<dyn IoDriver>,
    onewire: Arc<dyn OneWireBus>,
    blobs: Arc<dyn BlobStore>,
    egress: E,
    shared: Arc<Shared>,
    adc_conditioner: Arc<AdcConditioner>,
    chunks: ChunkBuffer,
    cancel: CancelToken,
    generation: Generation,
    steady: Vec<JoinHandle<()>>,
}

impl<E: EgressTx<Item = Publication> + Clone> Core<E> {
    fn new(
        cfg: RuntimeConfig,
        io: Arc<dyn IoDriver>,
        onewire: Arc<dyn OneWireBus>,
        blobs: Arc<dyn BlobStore>,
        egress: E,
        cancel: CancelToken,
    ) -> Self {
        let shared = Arc::new(Shared::new(io.clone()));
        let topics = Topics::for_mac(cfg.mac.clone());
        let chunks = ChunkBuffer::new(Duration::from_secs(cfg.ingest_timeout_secs()));
        let generation = Generation::idle(&cancel);

        let mut core = Self {
            cfg,
            topics,
            io,
            onewire,
            blobs,
            egress,
            shared,
            adc_conditioner: Arc::new(AdcConditioner::new()),
            chunks,
            cancel,
            generation,
            steady: Vec::new(),
        };
        core.spawn_steady_tasks();
        core
    }

    // ---- steady tasks (outlive applies) ----

    fn spawn_steady_tasks(&mut self) {
        self.steady.push(self.spawn_clock_task());
        self.steady.push(self.spawn_publisher_task());
        self.steady.push(self.spawn_watchdog_task());
    }

    fn spawn_clock_task(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let cancel = self.cancel.new_child();
        thread::Builder::new()
            .name("clock".into())
            .spawn(move || {
                while cancel.sleep_cancellable(Duration::from_secs(1)) {
                    shared.store.load().update_current_time();
                }
            })
            .expect("failed to spawn clock task")
    }

    fn spawn_publisher_task(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let cancel = self.cancel.new_child();
        let mut egress = self.egress.clone();
        let topics = self.topics.clone();
        let onewire = self.onewire.clone();
        let tick = Duration::from_millis(self.cfg.publish_tick_ms());
        thread::Builder::new()
            .name("publisher".into())
            .spawn(move || {
                let mut detector = OneWireDetector::new();
                while cancel.sleep_cancellable(tick) {
                    let store = shared.store.load();

                    if shared.bus_connected.load(Ordering::Relaxed) {
                        let delta = Bytes::from(store.parent_delta());
                        for parent in store.pins().parent_devices() {
                            let topic = Topics::children_listener_of(parent);
                            let _ = egress.try_send(Publication::new(
                                topic,
                                delta.clone(),
                                PARENT_QOS,
                            ));
                        }
                    }

                    if shared.app_connected.load(Ordering::Relaxed) {
                        let _ = egress.try_send(Publication::new(
                            topics.topic(Topic::Monitor),
                            store.snapshot_json(),
                            MQTT_QOS,
                        ));
                        let report =
                            detector.search(store.pins().one_wire_buses(), onewire.as_ref());
                        let _ = egress.try_send(Publication::new(
                            topics.topic(Topic::OneWire),
                            report,
                            MQTT_QOS,
                        ));
                    }
                }
            })
            .expect("failed to spawn publisher task")
    }

    fn spawn_watchdog_task(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let cancel = self.cancel.new_child();
        let mut egress = self.egress.clone();
        let topics = self.topics.clone();
        let timeout_us = self.cfg.heartbeat_timeout_secs() * 1_000_000;
        thread::Builder::new()
            .name("app-watchdog".into())
            .spawn(move || {
                while cancel.sleep_cancellable(Duration::from_secs(1)) {
                    if !shared.app_connected.load(Ordering::Relaxed) {
                        continue;
                    }
                    let last = shared.last_present_us.load(Ordering::Relaxed);
                    if clock::monotonic_us().saturating_sub(last) > timeout_us {
                        tracing::info!(
                            "[Liveness] no 'Present' within the window, disconnecting app"
                        );
                        shared.app_connected.store(false, Ordering::Relaxed);
                        let _ = egress.try_send(Publication::new(
                            topics.topic(Topic::ConnectionResponse),
                            &b"Disconnected"[..],
                            MQTT_QOS,
                        ));
                    }
                }
            })
            .expect("failed to spawn watchdog task")
    }

    // ---- control loop ----

    fn run(&mut self, mut ingress_rx: PortReceiver<IngressEvent>, term_flag: &AtomicBool) {
        loop {
            if term_flag.load(Ordering::Relaxed) {
                tracing::warn!("[Runtime] termination signal received");
                break;
            }
            if self.cancel.is_cancelled() {
                break;
            }

            for _ in 0..MAX_INGRESS_DRAIN {
                match ingress_rx.try_recv() {
                    Ok(event) => self.handle_event(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        tracing::error!("[Runtime] ingress port disconnected");
                        return;
                    }
                }
            }

            self.chunks.expire_if_due();
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn handle_event(&mut self, event: IngressEvent) {
        match event {
            IngressEvent::ConfigChunk(chunk) => {
                if let Some((doc, raw)) = self.chunks.push_chunk(&chunk) {
                    self.apply(&doc, raw, false);
                }
            }
            IngressEvent::ConfigRequest => self.replay_config(),
            IngressEvent::Connection(msg) => self.handle_connection(msg),
            IngressEvent::ChildrenUpdate(payload) => {
                self.shared.store.load().absorb_children(&payload);
            }
            IngressEvent::BusUp => {
                self.shared.bus_connected.store(true, Ordering::Relaxed);
            }
            IngressEvent::BusDown => {
                tracing::info!("[Runtime] bus disconnected");
                self.shared.bus_connected.store(false, Ordering::Relaxed);
                self.shared.app_connected.store(false, Ordering::Relaxed);
            }
        }
    }

    fn handle_connection(&mut self, msg: ConnectionMsg) {
        match msg {
            ConnectionMsg::Present => {
                self.shared
                    .last_present_us
                    .store(clock::monotonic_us(), Ordering::Relaxed);
            }
            ConnectionMsg::Connect => {
                if !self.shared.app_connected.load(Ordering::Relaxed) {
                    tracing::info!("[Runtime] app connected");
                    self.shared.app_connected.store(true, Ordering::Relaxed);
                    self.shared
                        .last_present_us
                        .store(clock::monotonic_us(), Ordering::Relaxed);
                    let _ = self.egress.try_send(Publication::new(
                        self.topics.topic(Topic::ConnectionResponse),
                        &b"Connected"[..],
                        MQTT_QOS,
                    ));
                }
            }
            ConnectionMsg::Disconnect => {
                if self.shared.app_connected.load(Ordering::Relaxed) {
                    tracing::info!("[Runtime] app disconnected");
                    self.shared.app_connected.store(false, Ordering::Relaxed);
                }
            }
        }
    }

    fn replay_config(&mut self) {
        if !self.shared.app_connected.load(Ordering::Relaxed) {
            return;
        }
        tracing::info!("[Runtime] configuration requested");
        match storage::load_config(self.blobs.as_ref()) {
            Some(blob) => {
                let _ = self.egress.try_send(Publication::new(
                    self.topics.topic(Topic::ConfigResponse),
                    blob,
                    MQTT_QOS,
                ));
            }
            None => tracing::error!("[Runtime] no stored configuration to send"),
        }
    }

    // ---- apply ----

    fn boot_from_storage(&mut self) {
        let Some(blob) = storage::load_config(self.blobs.as_ref()) else {
            return;
        };
        match serde_json::from_slice(&blob) {
            Ok(doc) => self.apply(&doc, blob, true),
            Err(e) => tracing::error!("[Runtime] persisted blob is not valid JSON: {e}"),
        }
    }

    /// The apply point: validate, persist, drain the old generation,
    /// swap the store, reset engine state, spawn the new generation.
    /// Any validation error leaves the previous program running.
    fn apply(&mut self, doc: &serde_json::Value, raw: Bytes, loaded_from_storage: bool) {
        let plan = match ingest::build_plan(doc, self.io.clone(), self.cfg.max_wires()) {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("[Runtime] configuration refused: {e}");
                return;
            }
        };

        if !loaded_from_storage {
            storage::save_config(self.blobs.as_ref(), raw);
        }

        // drain first: no scan task may observe the swap
        self.generation.teardown();
        self.shared.engine.reset();
        self.adc_conditioner.clear();

        self.configure_pins(&plan.pins, &plan.store);
        plan.pins.log_summary();

        self.shared.store.store(plan.store.clone());

        let gen_cancel = self.cancel.new_child();
        let mut samplers = Vec::new();
        if !plan.store.one_wire_vars().is_empty() {
            samplers.push(samplers::spawn_one_wire_sampler(
                self.shared.store.clone(),
                plan.pins.clone(),
                self.onewire.clone(),
                gen_cancel.new_child(),
            ));
            tracing::info!("[Runtime] created one-wire sampler");
        }
        if !plan.store.adc_vars().is_empty() {
            samplers.push(samplers::spawn_adc_sampler(
                self.shared.store.clone(),
                plan.pins.clone(),
                self.io.clone(),
                self.adc_conditioner.clone(),
                gen_cancel.new_child(),
            ));
            tracing::info!("[Runtime] created adc sampler");
        }

        let scheduler = WireScheduler::spawn(
            plan.wires,
            self.shared.store.clone(),
            self.shared.engine.clone(),
            &gen_cancel,
            Duration::from_millis(self.cfg.scan_sleep_ms()),
            Duration::from_millis(self.cfg.spawn_pause_ms()),
        );

        self.generation = Generation {
            cancel: gen_cancel,
            scheduler,
            samplers,
        };
        tracing::info!("[Runtime] apply complete");
    }

    fn configure_pins(&self, pins: &Arc<PinMap>, store: &Arc<VarStore>) {
        for (name, pin, role) in store.bound_pins() {
            if let Err(e) = self.io.configure(pin, role) {
                tracing::error!("[Runtime] configuring pin {name} failed: {e}");
            }
        }
        for &pin in pins.one_wire_buses() {
            if let Err(e) = self.io.configure(pin, PinRole::OneWire) {
                tracing::error!("[Runtime] configuring one-wire bus {pin} failed: {e}");
            }
        }
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        self.generation.teardown();
        self.chunks.clear();
        for handle in self.steady.drain(..) {
            let _ = handle.join();
        }
        tracing::info!("[Runtime] stopped");
    }
}
