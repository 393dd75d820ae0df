use ahash::AHashMap;
use serde::{Deserialize, Serialize};

pub mod drivers;

/// Role a symbolic pin name is bound to. Names are unique across the
/// whole descriptor; the first occurrence wins on duplicates, matching
/// the lookup order digital-in, digital-out, analog-in, dac, one-wire.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PinRole {
    DigitalInput,
    DigitalOutput,
    AnalogInput,
    DacOutput,
    OneWire,
}

/// Hardware map of one device as the authoring tool ships it. Immutable
/// between apply events. Fields the engine never reads still round-trip
/// so a config request returns what was sent.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceDescriptor {
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub logic_voltage: f64,
    #[serde(default)]
    pub digital_inputs: Vec<i32>,
    #[serde(default)]
    pub digital_inputs_names: Vec<String>,
    #[serde(default)]
    pub digital_outputs: Vec<i32>,
    #[serde(default)]
    pub digital_outputs_names: Vec<String>,
    #[serde(default)]
    pub analog_inputs: Vec<i32>,
    #[serde(default)]
    pub analog_inputs_names: Vec<String>,
    #[serde(default)]
    pub dac_outputs: Vec<i32>,
    #[serde(default)]
    pub dac_outputs_names: Vec<String>,
    #[serde(default)]
    pub one_wire_inputs: Vec<i32>,
    #[serde(default)]
    pub one_wire_inputs_names: Vec<Vec<String>>,
    #[serde(default)]
    pub one_wire_inputs_devices_types: Vec<Vec<String>>,
    #[serde(default)]
    pub one_wire_inputs_devices_addresses: Vec<Vec<String>>,
    #[serde(default)]
    pub pwm_channels: i32,
    #[serde(default)]
    pub max_hardware_timers: i32,
    #[serde(default)]
    pub has_rtos: bool,
    #[serde(default, rename = "UART")]
    pub uart: Vec<i32>,
    #[serde(default, rename = "I2C")]
    pub i2c: Vec<i32>,
    #[serde(default, rename = "SPI")]
    pub spi: Vec<i32>,
    #[serde(default, rename = "USB")]
    pub usb: bool,
    #[serde(default)]
    pub parent_devices: Vec<String>,
}

/// One-wire sensor binding: logical name to (bus pin, type tag, address).
#[derive(Debug, Clone)]
pub struct OneWireSensor {
    pub pin: i32,
    pub sensor_type: String,
    pub address: String,
}

/// Name-indexed view over a [`DeviceDescriptor`], built once per apply.
#[derive(Debug, Default)]
pub struct PinMap {
    descriptor: DeviceDescriptor,
    pins: AHashMap<String, (i32, PinRole)>,
    sensors: AHashMap<String, OneWireSensor>,
}

impl PinMap {
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        let mut pins = AHashMap::new();
        let mut bind = |names: &[String], ids: &[i32], role: PinRole| {
            for (name, &pin) in names.iter().zip(ids.iter()) {
                pins.entry(name.clone()).or_insert((pin, role));
            }
        };
        bind(
            &descriptor.digital_inputs_names,
            &descriptor.digital_inputs,
            PinRole::DigitalInput,
        );
        bind(
            &descriptor.digital_outputs_names,
            &descriptor.digital_outputs,
            PinRole::DigitalOutput,
        );
        bind(
            &descriptor.analog_inputs_names,
            &descriptor.analog_inputs,
            PinRole::AnalogInput,
        );
        bind(
            &descriptor.dac_outputs_names,
            &descriptor.dac_outputs,
            PinRole::DacOutput,
        );

        let mut sensors = AHashMap::new();
        for (bus, &pin) in descriptor.one_wire_inputs.iter().enumerate() {
            let names = descriptor.one_wire_inputs_names.get(bus);
            let types = descriptor.one_wire_inputs_devices_types.get(bus);
            let addrs = descriptor.one_wire_inputs_devices_addresses.get(bus);
            let Some(names) = names else { continue };
            for (j, name) in names.iter().enumerate() {
                pins.entry(name.clone()).or_insert((pin, PinRole::OneWire));
                let sensor_type = types.and_then(|t| t.get(j)).cloned();
                let address = addrs.and_then(|a| a.get(j)).cloned();
                if let (Some(sensor_type), Some(address)) = (sensor_type, address) {
                    sensors.entry(name.clone()).or_insert(OneWireSensor {
                        pin,
                        sensor_type,
                        address,
                    });
                } else {
                    tracing::error!(
                        "[Device] missing type or address for one-wire sensor {name}"
                    );
                }
            }
        }

        Self {
            descriptor,
            pins,
            sensors,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Resolve a symbolic pin name to its physical id and role.
    #[inline]
    pub fn find_pin(&self, name: &str) -> Option<(i32, PinRole)> {
        self.pins.get(name).copied()
    }

    /// Resolve a one-wire sensor binding by logical name.
    #[inline]
    pub fn find_sensor(&self, name: &str) -> Option<&OneWireSensor> {
        self.sensors.get(name)
    }

    #[inline]
    pub fn one_wire_buses(&self) -> &[i32] {
        &self.descriptor.one_wire_inputs
    }

    #[inline]
    pub fn parent_devices(&self) -> &[String] {
        &self.descriptor.parent_devices
    }

    /// One-line inventory at info level, emitted after every apply.
    pub fn log_summary(&self) {
        let d = &self.descriptor;
        tracing::info!(
            "[Device] '{}' logic={}V din={} dout={} ain={} dac={} one-wire buses={} parents={}",
            d.device_name,
            d.logic_voltage,
            d.digital_inputs.len(),
            d.digital_outputs.len(),
            d.analog_inputs.len(),
            d.dac_outputs.len(),
            d.one_wire_inputs.len(),
            d.parent_devices.len(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DeviceDescriptor {
        serde_json::from_value(serde_json::json!({
            "device_name": "bench",
            "digital_inputs": [4, 5],
            "digital_inputs_names": ["dig_in_1", "dig_in_2"],
            "digital_outputs": [18],
            "digital_outputs_names": ["dig_out_1"],
            "one_wire_inputs": [25],
            "one_wire_inputs_names": [["temp_1"]],
            "one_wire_inputs_devices_types": [["DS18B20"]],
            "one_wire_inputs_devices_addresses": [["28FF4A1B00000042"]],
            "parent_devices": ["ABCDEF"]
        }))
        .unwrap()
    }

    #[test]
    fn resolves_names_across_roles() {
        let map = PinMap::new(descriptor());
        assert_eq!(map.find_pin("dig_in_2"), Some((5, PinRole::DigitalInput)));
        assert_eq!(map.find_pin("dig_out_1"), Some((18, PinRole::DigitalOutput)));
        assert_eq!(map.find_pin("temp_1"), Some((25, PinRole::OneWire)));
        assert!(map.find_pin("nope").is_none());
    }

    #[test]
    fn sensor_binding_carries_type_and_address() {
        let map = PinMap::new(descriptor());
        let s = map.find_sensor("temp_1").unwrap();
        assert_eq!(s.pin, 25);
        assert_eq!(s.sensor_type, "DS18B20");
        assert_eq!(s.address, "28FF4A1B00000042");
    }

    #[test]
    fn missing_optional_fields_default() {
        let d: DeviceDescriptor = serde_json::from_value(serde_json::json!({
            "device_name": "tiny"
        }))
        .unwrap();
        assert!(d.digital_inputs.is_empty());
        assert!(!d.usb);
    }
}
