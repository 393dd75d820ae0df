use crate::device::PinRole;
use crate::error::DriverError;

/// Physical I/O surface the store delegates to. Implementations wrap
/// the platform's GPIO/DAC/ADC glue; every method is expected to return
/// quickly (one-wire reads go through [`OneWireBus`] instead, off the
/// scan path).
pub trait IoDriver: Send + Sync + 'static {
    /// Prepare a pin for its role. Called once per pin at apply time.
    fn configure(&self, pin: i32, role: PinRole) -> Result<(), DriverError>;

    fn read_digital(&self, pin: i32) -> Result<bool, DriverError>;

    fn write_digital(&self, pin: i32, value: bool) -> Result<(), DriverError>;

    fn read_analog(&self, pin: i32) -> Result<f64, DriverError>;

    /// DAC write; the store clamps numeric writes to `0..=255` first.
    fn write_analog(&self, pin: i32, value: u8) -> Result<(), DriverError>;

    /// Raw bit-banged ADC conversion for the given clock/data pin pair.
    /// `sampling_rate` is the sensor's rate tag ("10Hz", "40Hz",
    /// "Temperature").
    fn read_adc_raw(
        &self,
        clock_pin: i32,
        data_pin: i32,
        sampling_rate: &str,
    ) -> Result<u32, DriverError>;
}

/// One-wire bus surface. Reads can take tens of milliseconds, so only
/// the dedicated sampler and the discovery scan call in here.
pub trait OneWireBus: Send + Sync + 'static {
    /// Enumerate device addresses currently answering on a bus pin.
    fn enumerate(&self, pin: i32) -> Vec<u64>;

    /// Read one sensor by type tag and 64-bit hex address.
    fn read_sensor(&self, sensor_type: &str, address: &str, pin: i32)
        -> Result<f64, DriverError>;
}

/// Driver stub for embeddings without hardware: reads return sentinels,
/// writes succeed and vanish.
#[derive(Debug, Clone, Default)]
pub struct NullDrivers;

impl IoDriver for NullDrivers {
    fn configure(&self, _pin: i32, _role: PinRole) -> Result<(), DriverError> {
        Ok(())
    }

    fn read_digital(&self, _pin: i32) -> Result<bool, DriverError> {
        Ok(false)
    }

    fn write_digital(&self, _pin: i32, _value: bool) -> Result<(), DriverError> {
        Ok(())
    }

    fn read_analog(&self, _pin: i32) -> Result<f64, DriverError> {
        Ok(0.0)
    }

    fn write_analog(&self, _pin: i32, _value: u8) -> Result<(), DriverError> {
        Ok(())
    }

    fn read_adc_raw(
        &self,
        _clock_pin: i32,
        _data_pin: i32,
        _sampling_rate: &str,
    ) -> Result<u32, DriverError> {
        Ok(0)
    }
}

impl OneWireBus for NullDrivers {
    fn enumerate(&self, _pin: i32) -> Vec<u64> {
        Vec::new()
    }

    fn read_sensor(
        &self,
        _sensor_type: &str,
        _address: &str,
        _pin: i32,
    ) -> Result<f64, DriverError> {
        Ok(0.0)
    }
}
