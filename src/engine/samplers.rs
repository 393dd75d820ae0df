use crate::device::drivers::{IoDriver, OneWireBus};
use crate::device::PinMap;
use crate::store::VarStore;
use crate::utils::CancelToken;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cap on conditioned ADC sensors.
pub const MAX_ADC_SENSORS: usize = 10;
/// Moving-average depth over recent ADC samples.
const VALUE_BUFFER_SIZE: usize = 3;

/// Map a value from one range onto another.
fn map_value(value: f64, from_low: f64, from_high: f64, to_low: f64, to_high: f64) -> f64 {
    if from_high == from_low {
        return to_low;
    }
    (value - from_low) * (to_high - to_low) / (from_high - from_low) + to_low
}

#[derive(Debug, Default, Clone)]
struct AdcSlot {
    name: String,
    last_value: f64,
    has_value: bool,
    buffer: [f64; VALUE_BUFFER_SIZE],
    buffer_index: usize,
    buffer_count: usize,
}

/// Per-sensor conditioning state: extreme-value rejection and a short
/// moving average. Bounded at [`MAX_ADC_SENSORS`].
#[derive(Debug, Default)]
pub struct AdcConditioner {
    slots: Mutex<Vec<AdcSlot>>,
}

impl AdcConditioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Condition one raw 24-bit reading into the mapped range. Raw 0 and
    /// full-scale are treated as converter glitches and yield the last
    /// good value.
    pub fn condition(&self, name: &str, raw: u32, map_low: f64, map_high: f64) -> f64 {
        let mut slots = self.slots.lock();
        let slot = match slots.iter_mut().position(|s| s.name == name) {
            Some(i) => &mut slots[i],
            None => {
                if slots.len() >= MAX_ADC_SENSORS {
                    tracing::error!("[AdcSampler] sensor capacity exceeded");
                    return 0.0;
                }
                slots.push(AdcSlot {
                    name: name.to_string(),
                    ..AdcSlot::default()
                });
                slots.last_mut().unwrap()
            }
        };

        if raw == 0 || raw == 0xFF_FFFF {
            tracing::warn!("[AdcSampler] extreme value for {name}: {raw}, keeping last");
            return if slot.has_value { slot.last_value } else { 0.0 };
        }

        let mapped = map_value(f64::from(raw), 0.0, 16_777_215.0, map_low, map_high);

        slot.buffer[slot.buffer_index] = mapped;
        slot.buffer_index = (slot.buffer_index + 1) % VALUE_BUFFER_SIZE;
        if slot.buffer_count < VALUE_BUFFER_SIZE {
            slot.buffer_count += 1;
        }

        let avg = slot.buffer[..slot.buffer_count].iter().sum::<f64>() / slot.buffer_count as f64;
        slot.last_value = avg;
        slot.has_value = true;
        avg
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }
}

/// Spawn the one-wire sampler: walks every `OneWireInput` variable,
/// reads its bound sensor and caches the value, sleeping 1 s after each
/// read and 1 s at the end of a cycle. Reads are slow by nature, which
/// is exactly why they live here and not in a wire scan.
pub fn spawn_one_wire_sampler(
    store: Arc<ArcSwap<VarStore>>,
    pins: Arc<PinMap>,
    bus: Arc<dyn OneWireBus>,
    cancel: CancelToken,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("one-wire-sampler".into())
        .spawn(move || {
            tracing::info!("[OneWireSampler] started");
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let snapshot = store.load();
                for (sensor_name, cell) in snapshot.one_wire_vars() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    match pins.find_sensor(sensor_name) {
                        Some(s) => {
                            match bus.read_sensor(&s.sensor_type, &s.address, s.pin) {
                                Ok(v) => cell.set(v),
                                Err(e) => {
                                    tracing::error!(
                                        "[OneWireSampler] read {sensor_name} failed: {e}"
                                    );
                                }
                            }
                        }
                        None => {
                            tracing::error!("[OneWireSampler] sensor {sensor_name} not bound");
                        }
                    }
                    if !cancel.sleep_cancellable(Duration::from_secs(1)) {
                        break;
                    }
                }
                if !cancel.sleep_cancellable(Duration::from_secs(1)) {
                    break;
                }
            }
            tracing::info!("[OneWireSampler] stopped");
        })
        .expect("failed to spawn one-wire sampler")
}

/// Spawn the ADC sampler: raw conversion through the driver, range
/// mapping and averaging through [`AdcConditioner`]. An invalid sample
/// (0.0) keeps the previous cached value. Pacing follows the sensor's
/// rate tag: 150 ms at "10Hz", 100 ms otherwise, 1 s between cycles.
pub fn spawn_adc_sampler(
    store: Arc<ArcSwap<VarStore>>,
    pins: Arc<PinMap>,
    io: Arc<dyn IoDriver>,
    conditioner: Arc<AdcConditioner>,
    cancel: CancelToken,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("adc-sampler".into())
        .spawn(move || {
            tracing::info!("[AdcSampler] started");
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let snapshot = store.load();
                for adc in snapshot.adc_vars() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    if adc.map_low == adc.map_high || adc.gain < 0.0 {
                        tracing::error!("[AdcSampler] invalid mapping or gain for {}", adc.name);
                        continue;
                    }
                    let clock = pins.find_pin(adc.clock_pin).map(|(p, _)| p);
                    let data = pins.find_pin(adc.data_pin).map(|(p, _)| p);
                    let value = match (clock, data) {
                        (Some(clock), Some(data)) => {
                            match io.read_adc_raw(clock, data, adc.sampling_rate) {
                                Ok(raw) => conditioner.condition(
                                    adc.name,
                                    raw,
                                    adc.map_low,
                                    adc.map_high,
                                ),
                                Err(e) => {
                                    tracing::error!("[AdcSampler] read {} failed: {e}", adc.name);
                                    0.0
                                }
                            }
                        }
                        _ => {
                            tracing::error!("[AdcSampler] pins for {} not found", adc.name);
                            0.0
                        }
                    };

                    if value != 0.0 || adc.value.get() == 0.0 {
                        adc.value.set(value);
                    } else {
                        tracing::warn!(
                            "[AdcSampler] invalid value for {}, keeping old: {}",
                            adc.name,
                            adc.value.get()
                        );
                    }

                    let delay = if adc.sampling_rate == "10Hz" { 150 } else { 100 };
                    if !cancel.sleep_cancellable(Duration::from_millis(delay)) {
                        break;
                    }
                }
                if !cancel.sleep_cancellable(Duration::from_secs(1)) {
                    break;
                }
            }
            tracing::info!("[AdcSampler] stopped");
        })
        .expect("failed to spawn adc sampler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_spans_the_target_range() {
        assert_eq!(map_value(0.0, 0.0, 100.0, 0.0, 10.0), 0.0);
        assert_eq!(map_value(50.0, 0.0, 100.0, 0.0, 10.0), 5.0);
        // degenerate input range collapses to the low bound
        assert_eq!(map_value(5.0, 3.0, 3.0, 0.0, 10.0), 0.0);
    }

    #[test]
    fn conditioner_rejects_extremes_and_averages() {
        let c = AdcConditioner::new();
        let mid = 16_777_215 / 2; // maps to the middle of [0, 100]
        let v1 = c.condition("s", mid, 0.0, 100.0);
        assert!((v1 - 50.0).abs() < 0.1);

        // extreme raw keeps the last good value
        let v2 = c.condition("s", 0, 0.0, 100.0);
        assert_eq!(v1, v2);
        let v3 = c.condition("s", 0xFF_FFFF, 0.0, 100.0);
        assert_eq!(v1, v3);
    }

    #[test]
    fn conditioner_is_bounded() {
        let c = AdcConditioner::new();
        for i in 0..MAX_ADC_SENSORS {
            c.condition(&format!("s{i}"), 1000, 0.0, 1.0);
        }
        assert_eq!(c.condition("one-too-many", 1000, 0.0, 1.0), 0.0);
    }
}
