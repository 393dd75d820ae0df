use crate::device::drivers::OneWireBus;
use serde_json::json;

/// Consecutive detections before a sensor is reported.
pub const DETECTION_THRESHOLD: i32 = 3;
/// Consecutive misses before a sensor is dropped.
pub const MISS_THRESHOLD: i32 = 3;

#[derive(Debug)]
struct SensorTrack {
    pin: i32,
    address: String,
    /// Positive for detections, negative for misses.
    detection_count: i32,
    seen: bool,
}

/// Debounced one-wire topology scanner. Owned by the publisher task;
/// each call walks every configured bus and reports only sensors that
/// have answered [`DETECTION_THRESHOLD`] scans in a row.
#[derive(Debug, Default)]
pub struct OneWireDetector {
    tracks: Vec<SensorTrack>,
}

impl OneWireDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan all buses and serialize the stable topology as
    /// `{"pins": [{"pin": n, "addresses": ["<hex16>", ...]}, ...]}`.
    pub fn search(&mut self, buses: &[i32], bus: &dyn OneWireBus) -> Vec<u8> {
        if buses.is_empty() {
            return serde_json::to_vec(&json!({ "pins": [] })).unwrap_or_else(|_| b"{}".to_vec());
        }

        for track in &mut self.tracks {
            track.seen = false;
        }

        let mut pins = Vec::with_capacity(buses.len());
        for &pin in buses {
            for addr in bus.enumerate(pin) {
                let addr_str = format!("{addr:016X}");
                match self
                    .tracks
                    .iter_mut()
                    .find(|t| t.pin == pin && t.address == addr_str)
                {
                    Some(track) => {
                        if track.detection_count < DETECTION_THRESHOLD {
                            track.detection_count += 1;
                        }
                        track.seen = true;
                    }
                    None => {
                        self.tracks.push(SensorTrack {
                            pin,
                            address: addr_str,
                            detection_count: 1,
                            seen: true,
                        });
                    }
                }
            }

            let addresses: Vec<&str> = self
                .tracks
                .iter()
                .filter(|t| t.pin == pin && t.detection_count >= DETECTION_THRESHOLD)
                .map(|t| t.address.as_str())
                .collect();
            pins.push(json!({ "pin": pin, "addresses": addresses }));
        }

        for track in &mut self.tracks {
            if !track.seen && track.detection_count > -MISS_THRESHOLD {
                track.detection_count -= 1;
            }
        }
        self.tracks.retain(|t| t.detection_count > -MISS_THRESHOLD);

        serde_json::to_vec(&json!({ "pins": pins })).unwrap_or_else(|_| b"{}".to_vec())
    }
}
