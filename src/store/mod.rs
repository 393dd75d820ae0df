use crate::device::drivers::IoDriver;
use crate::device::{PinMap, PinRole};
use ahash::AHashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;

/// Longest accepted variable name (used verbatim as the lookup key).
pub const MAX_VAR_NAME_LEN: usize = 63;

/// Scan loops re-read bad names every few milliseconds; diagnostics on
/// those paths are rate-limited to one line per interval.
const WARN_EVERY: Duration = Duration::from_secs(5);

/// Lock-free boolean slot. Every scalar access is one atomic op, which
/// is the whole shared-memory contract between scan tasks.
#[derive(Debug, Default)]
pub struct BoolCell(AtomicBool);

impl BoolCell {
    pub fn new(v: bool) -> Self {
        Self(AtomicBool::new(v))
    }

    #[inline(always)]
    pub fn get(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    #[inline(always)]
    pub fn set(&self, v: bool) {
        self.0.store(v, Ordering::Relaxed)
    }
}

/// Lock-free f64 slot carried as raw bits in an `AtomicU64`.
#[derive(Debug, Default)]
pub struct NumCell(AtomicU64);

impl NumCell {
    pub fn new(v: f64) -> Self {
        Self(AtomicU64::new(v.to_bits()))
    }

    #[inline(always)]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline(always)]
    pub fn set(&self, v: f64) {
        self.0.store(v.to_bits(), Ordering::Relaxed)
    }
}

/// Sub-flavour of a pin-bound variable, derived from its type string.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IoKind {
    DigitalInput,
    DigitalOutput,
    AnalogInput,
    AnalogOutput,
}

impl IoKind {
    fn from_type(type_tag: &str) -> Option<Self> {
        match type_tag {
            "Digital Input" => Some(IoKind::DigitalInput),
            "Digital Output" => Some(IoKind::DigitalOutput),
            "Analog Input" => Some(IoKind::AnalogInput),
            "Analog Output" => Some(IoKind::AnalogOutput),
            _ => None,
        }
    }
}

/// Payload of one variable. Scalar state lives in atomic cells so the
/// store can be shared read/write across every task without locks;
/// structural replacement only ever happens behind the apply drain.
#[derive(Debug)]
pub enum VarKind {
    DigitalIo {
        pin_name: String,
        io: IoKind,
    },
    OneWireInput {
        pin_name: String,
        value: NumCell,
    },
    AdcSensor {
        sensor_type: String,
        clock_pin: String,
        data_pin: String,
        map_low: f64,
        map_high: f64,
        gain: f64,
        sampling_rate: String,
        value: NumCell,
    },
    Boolean {
        value: BoolCell,
    },
    Number {
        value: NumCell,
    },
    Counter {
        pv: NumCell,
        cv: NumCell,
        cu: BoolCell,
        cd: BoolCell,
        qu: BoolCell,
        qd: BoolCell,
    },
    Timer {
        pt: NumCell,
        et: NumCell,
        input: BoolCell,
        q: BoolCell,
    },
    Time {
        value: NumCell,
    },
}

/// One named entry of the table. `type_tag` keeps the exact string the
/// document used, so snapshots echo what was sent and the distinguished
/// "Current Time" variable stays recognizable.
#[derive(Debug)]
pub struct Variable {
    pub name: String,
    pub type_tag: String,
    pub kind: VarKind,
}

/// Dotted sub-field suffixes of compound variables.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Suffix {
    Cu,
    Cd,
    Qu,
    Qd,
    In,
    Q,
    Pv,
    Cv,
    Pt,
    Et,
}

/// Split a lookup name into base name and recognized suffix. Only the
/// last dot is considered, and only the closed suffix set splits; any
/// other dotted name is a plain key.
pub fn parse_name(name: &str) -> (&str, Option<Suffix>) {
    if let Some(dot) = name.rfind('.') {
        let suffix = match &name[dot..] {
            ".CU" => Some(Suffix::Cu),
            ".CD" => Some(Suffix::Cd),
            ".QU" => Some(Suffix::Qu),
            ".QD" => Some(Suffix::Qd),
            ".IN" => Some(Suffix::In),
            ".Q" => Some(Suffix::Q),
            ".PV" => Some(Suffix::Pv),
            ".CV" => Some(Suffix::Cv),
            ".PT" => Some(Suffix::Pt),
            ".ET" => Some(Suffix::Et),
            _ => None,
        };
        if suffix.is_some() {
            return (&name[..dot], suffix);
        }
    }
    (name, None)
}

fn str_field<'a>(entry: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| entry.get(*k).and_then(Value::as_str))
}

fn num_field(entry: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|k| entry.get(*k).and_then(Value::as_f64))
        .unwrap_or(0.0)
}

fn bool_field(entry: &Value, key: &str) -> bool {
    entry.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Typed, named variable table. Replaced wholesale on every apply; all
/// tasks observe it through an `ArcSwap` held by the runtime.
pub struct VarStore {
    vars: Vec<Variable>,
    index: AHashMap<String, usize>,
    pins: Arc<PinMap>,
    io: Arc<dyn IoDriver>,
}

impl std::fmt::Debug for VarStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VarStore")
            .field("vars", &self.vars.len())
            .finish()
    }
}

impl VarStore {
    /// Empty store bound to a pin map and driver; what the runtime runs
    /// before the first document arrives.
    pub fn empty(pins: Arc<PinMap>, io: Arc<dyn IoDriver>) -> Self {
        Self {
            vars: Vec::new(),
            index: AHashMap::new(),
            pins,
            io,
        }
    }

    /// Materialize the table from the document's `Variables` array.
    /// All-or-nothing: any unparseable entry fails the whole load and
    /// the caller keeps the previous store.
    pub fn load(
        entries: &[Value],
        pins: Arc<PinMap>,
        io: Arc<dyn IoDriver>,
    ) -> Result<Self, ConfigError> {
        let mut vars = Vec::with_capacity(entries.len());
        let mut index = AHashMap::with_capacity(entries.len());

        for entry in entries {
            let type_tag = str_field(entry, &["Type"])
                .ok_or_else(|| ConfigError::Variable("entry without Type".into()))?
                .to_string();
            let name = str_field(entry, &["Name"])
                .ok_or_else(|| ConfigError::Variable("entry without Name".into()))?
                .to_string();
            if name.len() > MAX_VAR_NAME_LEN {
                return Err(ConfigError::Variable(format!(
                    "name '{name}' exceeds {MAX_VAR_NAME_LEN} chars"
                )));
            }
            if index.contains_key(&name) {
                return Err(ConfigError::Variable(format!("duplicate name '{name}'")));
            }

            let kind = if let Some(io_kind) = IoKind::from_type(&type_tag) {
                let pin_name = str_field(entry, &["Pin"])
                    .ok_or_else(|| ConfigError::Variable(format!("'{name}' without Pin")))?
                    .to_string();
                if pins.find_pin(&pin_name).is_none() {
                    return Err(ConfigError::UnknownPin(pin_name));
                }
                VarKind::DigitalIo {
                    pin_name,
                    io: io_kind,
                }
            } else {
                match type_tag.as_str() {
                    "One Wire Input" => {
                        let pin_name = str_field(entry, &["Pin"])
                            .ok_or_else(|| ConfigError::Variable(format!("'{name}' without Pin")))?
                            .to_string();
                        if pins.find_sensor(&pin_name).is_none() {
                            return Err(ConfigError::UnknownPin(pin_name));
                        }
                        VarKind::OneWireInput {
                            pin_name,
                            value: NumCell::new(0.0),
                        }
                    }
                    "ADC Sensor" => {
                        let field = |spaced: &str, plain: &str| -> Result<String, ConfigError> {
                            str_field(entry, &[spaced, plain])
                                .map(str::to_string)
                                .ok_or_else(|| {
                                    ConfigError::Variable(format!("'{name}' without {spaced}"))
                                })
                        };
                        VarKind::AdcSensor {
                            sensor_type: field("Sensor Type", "SensorType")?,
                            clock_pin: field("PD_SCK", "PD_SCK")?,
                            data_pin: field("DOUT", "DOUT")?,
                            map_low: num_field(entry, &["Map Low", "MapLow"]),
                            map_high: num_field(entry, &["Map High", "MapHigh"]),
                            gain: num_field(entry, &["Gain"]),
                            sampling_rate: field("Sampling Rate", "SamplingRate")?,
                            value: NumCell::new(0.0),
                        }
                    }
                    "Boolean" => VarKind::Boolean {
                        value: BoolCell::new(bool_field(entry, "Value")),
                    },
                    "Number" => VarKind::Number {
                        value: NumCell::new(num_field(entry, &["Value"])),
                    },
                    "Counter" => {
                        let pv = num_field(entry, &["PV"]);
                        let cv = num_field(entry, &["CV"]);
                        VarKind::Counter {
                            pv: NumCell::new(pv),
                            cv: NumCell::new(cv),
                            cu: BoolCell::new(bool_field(entry, "CU")),
                            cd: BoolCell::new(bool_field(entry, "CD")),
                            // outputs follow the loaded values, whatever flags were sent
                            qu: BoolCell::new(cv >= pv),
                            qd: BoolCell::new(cv <= 0.0),
                        }
                    }
                    "Timer" => VarKind::Timer {
                        pt: NumCell::new(num_field(entry, &["PT"])),
                        et: NumCell::new(num_field(entry, &["ET"])),
                        input: BoolCell::new(bool_field(entry, "IN")),
                        q: BoolCell::new(bool_field(entry, "Q")),
                    },
                    // any other tag (incl. "Current Time") is a Time variable
                    _ => VarKind::Time {
                        value: NumCell::new(num_field(entry, &["Value"])),
                    },
                }
            };

            index.insert(name.clone(), vars.len());
            vars.push(Variable {
                name,
                type_tag,
                kind,
            });
        }

        tracing::info!("[Store] loaded {} variables", vars.len());
        Ok(Self {
            vars,
            index,
            pins,
            io,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    #[inline]
    pub fn pins(&self) -> &Arc<PinMap> {
        &self.pins
    }

    /// Exact-match lookup by base name (no suffix handling).
    #[inline]
    pub fn find(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|&i| &self.vars[i])
    }

    /// The distinguished wall-clock variable, if the program declares one.
    pub fn find_current_time(&self) -> Option<&Variable> {
        self.vars
            .iter()
            .find(|v| matches!(v.kind, VarKind::Time { .. }) && v.type_tag == "Current Time")
    }

    // ---- scalar access ----

    /// Boolean read. Dotted suffixes address counter/timer flags; pin
    /// variables delegate to the driver. Unknown names and suffix/kind
    /// mismatches read as `false` with a diagnostic.
    pub fn read_bool(&self, name: &str) -> bool {
        let (base, suffix) = parse_name(name);
        let Some(var) = self.find(base) else {
            crate::warn_throttled!(WARN_EVERY, "[Store] read of unknown variable '{name}'");
            return false;
        };

        match (&var.kind, suffix) {
            (VarKind::DigitalIo { pin_name, io }, None)
                if matches!(io, IoKind::DigitalInput | IoKind::DigitalOutput) =>
            {
                self.driver_read_digital(pin_name)
            }
            (VarKind::Boolean { value }, _) => value.get(),
            (VarKind::Counter { cu, .. }, Some(Suffix::Cu)) => cu.get(),
            (VarKind::Counter { cd, .. }, Some(Suffix::Cd)) => cd.get(),
            (VarKind::Counter { qu, .. }, Some(Suffix::Qu)) => qu.get(),
            (VarKind::Counter { qd, .. }, Some(Suffix::Qd)) => qd.get(),
            (VarKind::Timer { input, .. }, Some(Suffix::In)) => input.get(),
            (VarKind::Timer { q, .. }, Some(Suffix::Q)) => q.get(),
            _ => {
                crate::warn_throttled!(WARN_EVERY, "[Store] '{name}' has no boolean reading");
                false
            }
        }
    }

    /// Boolean write. Only digital outputs accept pin writes.
    pub fn write_bool(&self, name: &str, value: bool) {
        let (base, suffix) = parse_name(name);
        let Some(var) = self.find(base) else {
            crate::warn_throttled!(WARN_EVERY, "[Store] write to unknown variable '{name}'");
            return;
        };

        match (&var.kind, suffix) {
            (VarKind::DigitalIo { pin_name, io }, None) => {
                if *io == IoKind::DigitalOutput {
                    self.driver_write_digital(pin_name, value);
                } else {
                    crate::warn_throttled!(WARN_EVERY, "[Store] boolean write to non-output '{name}'");
                }
            }
            (VarKind::Boolean { value: cell }, _) => cell.set(value),
            (VarKind::Counter { cu, .. }, Some(Suffix::Cu)) => cu.set(value),
            (VarKind::Counter { cd, .. }, Some(Suffix::Cd)) => cd.set(value),
            (VarKind::Counter { qu, .. }, Some(Suffix::Qu)) => qu.set(value),
            (VarKind::Counter { qd, .. }, Some(Suffix::Qd)) => qd.set(value),
            (VarKind::Timer { input, .. }, Some(Suffix::In)) => input.set(value),
            (VarKind::Timer { q, .. }, Some(Suffix::Q)) => q.set(value),
            _ => {
                crate::warn_throttled!(WARN_EVERY, "[Store] '{name}' has no boolean slot to write");
            }
        }
    }

    /// Numeric read. `.PV .CV .PT .ET` address counter/timer numerics;
    /// analog pins delegate to the driver; sensor kinds return their
    /// last cached sample.
    pub fn read_num(&self, name: &str) -> f64 {
        let (base, suffix) = parse_name(name);
        let Some(var) = self.find(base) else {
            crate::warn_throttled!(WARN_EVERY, "[Store] read of unknown variable '{name}'");
            return 0.0;
        };

        match (&var.kind, suffix) {
            (VarKind::DigitalIo { pin_name, io }, None)
                if matches!(io, IoKind::AnalogInput | IoKind::AnalogOutput) =>
            {
                self.driver_read_analog(pin_name)
            }
            (VarKind::OneWireInput { value, .. }, _) => value.get(),
            (VarKind::AdcSensor { value, .. }, _) => value.get(),
            (VarKind::Number { value }, _) => value.get(),
            (VarKind::Time { value }, _) => value.get(),
            (VarKind::Counter { pv, .. }, Some(Suffix::Pv)) => pv.get(),
            (VarKind::Counter { cv, .. }, Some(Suffix::Cv)) => cv.get(),
            (VarKind::Timer { pt, .. }, Some(Suffix::Pt)) => pt.get(),
            (VarKind::Timer { et, .. }, Some(Suffix::Et)) => et.get(),
            _ => {
                crate::warn_throttled!(WARN_EVERY, "[Store] '{name}' has no numeric reading");
                0.0
            }
        }
    }

    /// Numeric write. Pin variables clamp to `0..=255` and go to the
    /// DAC driver.
    pub fn write_num(&self, name: &str, value: f64) {
        let (base, suffix) = parse_name(name);
        let Some(var) = self.find(base) else {
            crate::warn_throttled!(WARN_EVERY, "[Store] write to unknown variable '{name}'");
            return;
        };

        match (&var.kind, suffix) {
            (VarKind::DigitalIo { pin_name, .. }, None) => {
                let scaled = value.round().clamp(0.0, 255.0) as u8;
                self.driver_write_analog(pin_name, scaled);
            }
            (VarKind::Number { value: cell }, _) => cell.set(value),
            (VarKind::Time { value: cell }, _) => cell.set(value),
            (VarKind::Counter { pv, .. }, Some(Suffix::Pv)) => pv.set(value),
            (VarKind::Counter { cv, .. }, Some(Suffix::Cv)) => cv.set(value),
            (VarKind::Timer { pt, .. }, Some(Suffix::Pt)) => pt.set(value),
            (VarKind::Timer { et, .. }, Some(Suffix::Et)) => et.set(value),
            _ => {
                crate::warn_throttled!(WARN_EVERY, "[Store] '{name}' has no numeric slot to write");
            }
        }
    }

    // ---- driver delegation ----

    fn driver_read_digital(&self, pin_name: &str) -> bool {
        let Some((pin, _)) = self.pins.find_pin(pin_name) else {
            crate::error_throttled!(WARN_EVERY, "[Store] digital pin '{pin_name}' not found");
            return false;
        };
        self.io.read_digital(pin).unwrap_or_else(|e| {
            crate::error_throttled!(WARN_EVERY, "[Store] read_digital({pin_name}): {e}");
            false
        })
    }

    fn driver_write_digital(&self, pin_name: &str, value: bool) {
        let Some((pin, _)) = self.pins.find_pin(pin_name) else {
            crate::error_throttled!(WARN_EVERY, "[Store] digital pin '{pin_name}' not found");
            return;
        };
        if let Err(e) = self.io.write_digital(pin, value) {
            crate::error_throttled!(WARN_EVERY, "[Store] write_digital({pin_name}): {e}");
        }
    }

    fn driver_read_analog(&self, pin_name: &str) -> f64 {
        let Some((pin, _)) = self.pins.find_pin(pin_name) else {
            crate::error_throttled!(WARN_EVERY, "[Store] analog pin '{pin_name}' not found");
            return 0.0;
        };
        self.io.read_analog(pin).unwrap_or_else(|e| {
            crate::error_throttled!(WARN_EVERY, "[Store] read_analog({pin_name}): {e}");
            0.0
        })
    }

    fn driver_write_analog(&self, pin_name: &str, value: u8) {
        let Some((pin, _)) = self.pins.find_pin(pin_name) else {
            crate::error_throttled!(WARN_EVERY, "[Store] analog pin '{pin_name}' not found");
            return;
        };
        if let Err(e) = self.io.write_analog(pin, value) {
            crate::error_throttled!(WARN_EVERY, "[Store] write_analog({pin_name}): {e}");
        }
    }

    // ---- serialization ----

    /// Serialize every entry with its type tag, name and state fields,
    /// in the same shape the authoring tool sent plus live `Value`s.
    pub fn snapshot_json(&self) -> Vec<u8> {
        let entries: Vec<Value> = self.vars.iter().map(|v| self.entry_json(v)).collect();
        serde_json::to_vec(&entries).unwrap_or_else(|_| b"[]".to_vec())
    }

    fn entry_json(&self, var: &Variable) -> Value {
        match &var.kind {
            VarKind::DigitalIo { pin_name, io } => {
                let value = match io {
                    IoKind::DigitalInput | IoKind::DigitalOutput => {
                        f64::from(u8::from(self.read_bool(&var.name)))
                    }
                    IoKind::AnalogInput | IoKind::AnalogOutput => self.read_num(&var.name),
                };
                json!({
                    "Type": var.type_tag,
                    "Name": var.name,
                    "Pin": pin_name,
                    "Value": value,
                })
            }
            VarKind::OneWireInput { pin_name, value } => json!({
                "Type": var.type_tag,
                "Name": var.name,
                "Pin": pin_name,
                "Value": value.get(),
            }),
            VarKind::AdcSensor {
                sensor_type,
                clock_pin,
                data_pin,
                map_low,
                map_high,
                gain,
                sampling_rate,
                value,
            } => json!({
                "Type": var.type_tag,
                "Name": var.name,
                "SensorType": sensor_type,
                "PD_SCK": clock_pin,
                "DOUT": data_pin,
                "MapLow": map_low,
                "MapHigh": map_high,
                "Gain": gain,
                "SamplingRate": sampling_rate,
                "Value": value.get(),
            }),
            VarKind::Boolean { value } => json!({
                "Type": var.type_tag,
                "Name": var.name,
                "Value": value.get(),
            }),
            VarKind::Number { value } => json!({
                "Type": var.type_tag,
                "Name": var.name,
                "Value": value.get(),
            }),
            VarKind::Counter {
                pv,
                cv,
                cu,
                cd,
                qu,
                qd,
            } => json!({
                "Type": var.type_tag,
                "Name": var.name,
                "PV": pv.get(),
                "CV": cv.get(),
                "CU": cu.get(),
                "CD": cd.get(),
                "QU": qu.get(),
                "QD": qd.get(),
            }),
            VarKind::Timer { pt, et, input, q } => json!({
                "Type": var.type_tag,
                "Name": var.name,
                "PT": pt.get(),
                "ET": et.get(),
                "IN": input.get(),
                "Q": q.get(),
            }),
            VarKind::Time { value } => json!({
                "Type": var.type_tag,
                "Name": var.name,
                "Value": value.get(),
            }),
        }
    }

    // ---- inter-device sync ----

    /// Flat `{name: value}` object of every Boolean and Number, the
    /// payload published to each parent's listener topic.
    pub fn parent_delta(&self) -> Vec<u8> {
        let mut obj = serde_json::Map::new();
        for var in &self.vars {
            match &var.kind {
                VarKind::Boolean { value } => {
                    obj.insert(var.name.clone(), Value::Bool(value.get()));
                }
                VarKind::Number { value } => {
                    obj.insert(var.name.clone(), json!(value.get()));
                }
                _ => {}
            }
        }
        serde_json::to_vec(&Value::Object(obj)).unwrap_or_else(|_| b"{}".to_vec())
    }

    /// Absorb a child's delta: matching Boolean/Number names overwrite
    /// local values, everything else is ignored. Malformed payloads are
    /// dropped after a log line.
    pub fn absorb_children(&self, payload: &[u8]) {
        let parsed: Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("[Store] child delta parse failed: {e}");
                return;
            }
        };
        let Some(obj) = parsed.as_object() else {
            return;
        };

        for var in &self.vars {
            match &var.kind {
                VarKind::Boolean { value } => {
                    if let Some(v) = obj.get(&var.name).and_then(Value::as_bool) {
                        value.set(v);
                    }
                }
                VarKind::Number { value } => {
                    if let Some(v) = obj.get(&var.name).and_then(Value::as_f64) {
                        value.set(v);
                    }
                }
                _ => {}
            }
        }
    }

    /// Push the packed wall clock into the "Current Time" variable.
    pub fn update_current_time(&self) {
        if let Some(var) = self.find_current_time() {
            if let VarKind::Time { value } = &var.kind {
                if let Some(packed) = crate::utils::clock::wall_clock_hhmmss() {
                    value.set(packed);
                }
            }
        }
    }

    // ---- sampler views ----

    /// One-wire variables as (sensor binding name, cached cell) pairs.
    pub fn one_wire_vars(&self) -> Vec<(&str, &NumCell)> {
        self.vars
            .iter()
            .filter_map(|v| match &v.kind {
                VarKind::OneWireInput { pin_name, value } => Some((pin_name.as_str(), value)),
                _ => None,
            })
            .collect()
    }

    /// ADC sensor variables with their full acquisition parameters.
    pub fn adc_vars(&self) -> Vec<AdcVarView<'_>> {
        self.vars
            .iter()
            .filter_map(|v| match &v.kind {
                VarKind::AdcSensor {
                    sensor_type,
                    clock_pin,
                    data_pin,
                    map_low,
                    map_high,
                    gain,
                    sampling_rate,
                    value,
                } => Some(AdcVarView {
                    name: &v.name,
                    sensor_type,
                    clock_pin,
                    data_pin,
                    map_low: *map_low,
                    map_high: *map_high,
                    gain: *gain,
                    sampling_rate,
                    value,
                }),
                _ => None,
            })
            .collect()
    }

    /// Pins the apply path must configure, with their roles.
    pub fn bound_pins(&self) -> Vec<(String, i32, PinRole)> {
        let mut out = Vec::new();
        for var in &self.vars {
            if let VarKind::DigitalIo { pin_name, .. } = &var.kind {
                if let Some((pin, role)) = self.pins.find_pin(pin_name) {
                    out.push((pin_name.clone(), pin, role));
                }
            }
        }
        out
    }
}

/// Borrowed view of one ADC sensor's parameters for the sampler.
#[derive(Debug)]
pub struct AdcVarView<'a> {
    pub name: &'a str,
    pub sensor_type: &'a str,
    pub clock_pin: &'a str,
    pub data_pin: &'a str,
    pub map_low: f64,
    pub map_high: f64,
    pub gain: f64,
    pub sampling_rate: &'a str,
    pub value: &'a NumCell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::drivers::NullDrivers;
    use crate::device::DeviceDescriptor;

    fn pins() -> Arc<PinMap> {
        let d: DeviceDescriptor = serde_json::from_value(json!({
            "digital_inputs": [4],
            "digital_inputs_names": ["dig_in_1"],
            "digital_outputs": [18],
            "digital_outputs_names": ["dig_out_1"],
        }))
        .unwrap();
        Arc::new(PinMap::new(d))
    }

    fn store(vars: Value) -> VarStore {
        let entries = vars.as_array().unwrap().clone();
        VarStore::load(&entries, pins(), Arc::new(NullDrivers)).unwrap()
    }

    #[test]
    fn counter_flags_follow_loaded_values() {
        let s = store(json!([
            {"Type": "Counter", "Name": "c", "PV": 3.0, "CV": 5.0, "QU": false, "QD": true}
        ]));
        assert!(s.read_bool("c.QU"));
        assert!(!s.read_bool("c.QD"));
    }

    #[test]
    fn dotted_suffixes_address_subfields() {
        let s = store(json!([
            {"Type": "Timer", "Name": "t", "PT": 500.0, "ET": 0.0, "IN": false, "Q": false}
        ]));
        s.write_num("t.PT", 750.0);
        s.write_bool("t.IN", true);
        assert_eq!(s.read_num("t.PT"), 750.0);
        assert!(s.read_bool("t.IN"));
        assert_eq!(s.read_num("t.ET"), 0.0);
    }

    #[test]
    fn unknown_names_read_as_sentinels() {
        let s = store(json!([{"Type": "Number", "Name": "n", "Value": 1.5}]));
        assert!(!s.read_bool("missing"));
        assert_eq!(s.read_num("missing"), 0.0);
        s.write_num("missing", 9.0); // no-op
        assert_eq!(s.read_num("n"), 1.5);
    }

    #[test]
    fn suffix_kind_mismatch_is_a_sentinel() {
        let s = store(json!([{"Type": "Number", "Name": "n", "Value": 1.0}]));
        assert!(!s.read_bool("n.QU"));
        assert_eq!(s.read_num("n.PT"), 1.0); // bare-value kinds ignore suffixes
    }

    #[test]
    fn load_is_all_or_nothing() {
        let entries = json!([
            {"Type": "Number", "Name": "good", "Value": 1.0},
            {"Type": "Digital Input", "Name": "bad", "Pin": "no_such_pin"}
        ]);
        let err = VarStore::load(
            entries.as_array().unwrap(),
            pins(),
            Arc::new(NullDrivers),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPin(_)));
    }

    #[test]
    fn duplicate_names_are_refused() {
        let entries = json!([
            {"Type": "Number", "Name": "x", "Value": 1.0},
            {"Type": "Boolean", "Name": "x", "Value": true}
        ]);
        assert!(VarStore::load(
            entries.as_array().unwrap(),
            pins(),
            Arc::new(NullDrivers)
        )
        .is_err());
    }

    #[test]
    fn unknown_type_tag_falls_back_to_time() {
        let s = store(json!([{"Type": "Current Time", "Name": "now", "Value": 0.0}]));
        assert!(s.find_current_time().is_some());
    }

    #[test]
    fn snapshot_round_trips_through_load() {
        let s = store(json!([
            {"Type": "Boolean", "Name": "b", "Value": true},
            {"Type": "Number", "Name": "n", "Value": 2.5},
            {"Type": "Counter", "Name": "c", "PV": 2.0, "CV": 1.0},
            {"Type": "Timer", "Name": "t", "PT": 100.0},
        ]));
        let snap: Vec<Value> = serde_json::from_slice(&s.snapshot_json()).unwrap();
        let again = VarStore::load(&snap, pins(), Arc::new(NullDrivers)).unwrap();
        assert_eq!(again.len(), s.len());
        assert!(again.read_bool("b"));
        assert_eq!(again.read_num("n"), 2.5);
        assert_eq!(again.read_num("c.PV"), 2.0);
        assert_eq!(again.read_num("t.PT"), 100.0);
    }

    #[test]
    fn parent_delta_and_absorb_are_symmetric() {
        let a = store(json!([
            {"Type": "Boolean", "Name": "flag", "Value": true},
            {"Type": "Number", "Name": "level", "Value": 7.0},
            {"Type": "Counter", "Name": "c", "PV": 1.0, "CV": 0.0},
        ]));
        let b = store(json!([
            {"Type": "Boolean", "Name": "flag", "Value": false},
            {"Type": "Number", "Name": "level", "Value": 0.0},
        ]));
        b.absorb_children(&a.parent_delta());
        assert!(b.read_bool("flag"));
        assert_eq!(b.read_num("level"), 7.0);
        // garbage payloads are dropped without effect
        b.absorb_children(b"not json");
        assert!(b.read_bool("flag"));
    }
}
