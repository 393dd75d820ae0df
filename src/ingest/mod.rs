use crate::device::drivers::IoDriver;
use crate::device::{DeviceDescriptor, PinMap};
use crate::engine::wire::Wire;
use crate::error::ConfigError;
use crate::store::VarStore;
use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Reassembles a configuration document from transport chunks. A chunk
/// restarts the deadline; the document is complete the moment the
/// buffer parses as JSON. Parse failures of any kind just mean "keep
/// buffering".
#[derive(Debug)]
pub struct ChunkBuffer {
    buffer: Vec<u8>,
    deadline: Option<Instant>,
    timeout: Duration,
}

impl ChunkBuffer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            buffer: Vec::new(),
            deadline: None,
            timeout,
        }
    }

    /// Append one chunk. Returns the parsed document and the exact raw
    /// bytes once the buffer completes; the buffer resets either way
    /// it returns `Some`.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Option<(Value, Bytes)> {
        self.deadline = Some(Instant::now() + self.timeout);
        self.buffer.extend_from_slice(chunk);
        tracing::info!(
            "[Ingest] received {} bytes, total: {}",
            chunk.len(),
            self.buffer.len()
        );

        match serde_json::from_slice::<Value>(&self.buffer) {
            Ok(doc) => {
                tracing::info!(
                    "[Ingest] complete document received, length: {} bytes",
                    self.buffer.len()
                );
                self.deadline = None;
                let raw = Bytes::from(std::mem::take(&mut self.buffer));
                Some((doc, raw))
            }
            Err(_) => {
                tracing::info!("[Ingest] document incomplete, waiting for next part");
                None
            }
        }
    }

    /// Drop a stalled transfer once the deadline passes. Returns true
    /// if the buffer was cleared.
    pub fn expire_if_due(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                tracing::warn!("[Ingest] configuration timeout, clearing buffer");
                self.buffer.clear();
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Discard any partial transfer (apply and shutdown paths).
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.deadline = None;
    }
}

/// Everything a validated document materializes into. Built entirely
/// off to the side; the runtime swaps it in only after the old wire
/// tasks are gone.
pub struct ApplyPlan {
    pub pins: Arc<PinMap>,
    pub store: Arc<VarStore>,
    pub wires: Vec<Wire>,
}

/// Validate a complete document and build its apply plan. Any error
/// refuses the whole document; a degraded partial apply never happens.
pub fn build_plan(
    doc: &Value,
    io: Arc<dyn IoDriver>,
    max_wires: usize,
) -> Result<ApplyPlan, ConfigError> {
    let device_json = doc
        .get("Device")
        .ok_or_else(|| ConfigError::Structure("missing Device".into()))?;
    let variables = doc
        .get("Variables")
        .and_then(Value::as_array)
        .ok_or_else(|| ConfigError::Structure("Variables is not an array".into()))?;
    let wires_json = doc
        .get("Wires")
        .and_then(Value::as_array)
        .ok_or_else(|| ConfigError::Structure("Wires is not an array".into()))?;

    let descriptor: DeviceDescriptor = serde_json::from_value(device_json.clone())
        .map_err(|e| ConfigError::Structure(format!("Device: {e}")))?;
    let pins = Arc::new(PinMap::new(descriptor));

    let store = Arc::new(VarStore::load(variables, pins.clone(), io)?);

    if wires_json.len() > max_wires {
        return Err(ConfigError::TooManyWires {
            found: wires_json.len(),
            max: max_wires,
        });
    }
    tracing::info!("[Ingest] found wires: {}", wires_json.len());

    let mut wires = Vec::with_capacity(wires_json.len());
    for (i, wire_json) in wires_json.iter().enumerate() {
        if !wire_json.is_object() {
            tracing::warn!("[Ingest] wire {i} is not an object, skipping");
            continue;
        }
        let wire = Wire::from_json(wire_json)?;
        wire.validate(&store)?;
        wires.push(wire);
    }

    Ok(ApplyPlan { pins, store, wires })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::drivers::NullDrivers;
    use serde_json::json;
    use std::thread;

    fn doc() -> Value {
        json!({
            "Device": {
                "device_name": "unit",
                "digital_inputs": [4],
                "digital_inputs_names": ["dig_in_1"],
                "digital_outputs": [18],
                "digital_outputs_names": ["dig_out_1"],
            },
            "Variables": [
                {"Type": "Digital Input", "Name": "in_1", "Pin": "dig_in_1"},
                {"Type": "Digital Output", "Name": "out_1", "Pin": "dig_out_1"},
            ],
            "Wires": [
                {"Nodes": [
                    {"Type": "LadderElement", "ElementType": "NOContact", "ComboBoxValues": ["in_1"]},
                    {"Type": "LadderElement", "ElementType": "Coil", "ComboBoxValues": ["out_1"]},
                ]}
            ]
        })
    }

    #[test]
    fn chunked_reassembly_matches_single_shot() {
        let raw = serde_json::to_vec(&doc()).unwrap();
        let mut whole = ChunkBuffer::new(Duration::from_secs(10));
        let (doc_whole, raw_whole) = whole.push_chunk(&raw).unwrap();

        let mut chunked = ChunkBuffer::new(Duration::from_secs(10));
        let mut result = None;
        for chunk in raw.chunks(7) {
            assert!(result.is_none(), "completed before the last chunk");
            result = chunked.push_chunk(chunk);
        }
        let (doc_chunked, raw_chunked) = result.unwrap();

        assert_eq!(doc_whole, doc_chunked);
        assert_eq!(raw_whole, raw_chunked);
    }

    #[test]
    fn stalled_transfer_expires() {
        let mut buf = ChunkBuffer::new(Duration::from_millis(20));
        assert!(buf.push_chunk(b"{\"partial").is_none());
        assert!(!buf.expire_if_due());
        thread::sleep(Duration::from_millis(30));
        assert!(buf.expire_if_due());
        assert!(buf.is_empty());
        // a fresh transfer starts clean
        assert!(buf.push_chunk(b"{\"a\":").is_none());
        assert!(buf.push_chunk(b"1}").is_some());
    }

    #[test]
    fn plan_builds_from_a_valid_document() {
        let plan = build_plan(&doc(), Arc::new(NullDrivers), 64).unwrap();
        assert_eq!(plan.store.len(), 2);
        assert_eq!(plan.wires.len(), 1);
        assert!(plan.pins.find_pin("dig_in_1").is_some());
    }

    #[test]
    fn missing_top_level_keys_refuse_the_document() {
        let mut d = doc();
        d.as_object_mut().unwrap().remove("Wires");
        assert!(matches!(
            build_plan(&d, Arc::new(NullDrivers), 64),
            Err(ConfigError::Structure(_))
        ));

        let d = json!({"Device": {}, "Variables": [], "Wires": "nope"});
        assert!(matches!(
            build_plan(&d, Arc::new(NullDrivers), 64),
            Err(ConfigError::Structure(_))
        ));
    }

    #[test]
    fn unresolvable_wire_reference_refuses_the_document() {
        let mut d = doc();
        d["Wires"][0]["Nodes"][0]["ComboBoxValues"][0] = json!("ghost");
        assert!(matches!(
            build_plan(&d, Arc::new(NullDrivers), 64),
            Err(ConfigError::UnknownVariable(_))
        ));
    }

    #[test]
    fn wire_cap_refuses_oversized_documents() {
        let mut d = doc();
        let wire = d["Wires"][0].clone();
        d["Wires"] = json!([wire.clone(), wire]);
        assert!(matches!(
            build_plan(&d, Arc::new(NullDrivers), 1),
            Err(ConfigError::TooManyWires { .. })
        ));
    }

    #[test]
    fn non_object_wires_are_skipped_with_the_rest_kept() {
        let mut d = doc();
        let wire = d["Wires"][0].clone();
        d["Wires"] = json!([42, wire]);
        let plan = build_plan(&d, Arc::new(NullDrivers), 64).unwrap();
        assert_eq!(plan.wires.len(), 1);
    }
}
