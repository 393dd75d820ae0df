use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Monotonic microseconds since the first call in this process.
/// Timer state machines compare two readings of this clock; the
/// absolute origin is irrelevant.
#[inline]
pub fn monotonic_us() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as u64
}

/// Local wall clock folded to the packed `HH*10000 + MM*100 + SS` form
/// the Current Time variable carries. Returns `None` when the system
/// clock is unreadable (pre-epoch), in which case the variable keeps
/// its last value.
pub fn wall_clock_hhmmss() -> Option<f64> {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    let day = secs % 86_400;
    let hh = day / 3_600;
    let mm = (day % 3_600) / 60;
    let ss = day % 60;
    Some((hh * 10_000 + mm * 100 + ss) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_never_goes_backwards() {
        let a = monotonic_us();
        let b = monotonic_us();
        assert!(b >= a);
    }

    #[test]
    fn packed_wall_clock_is_in_range() {
        let v = wall_clock_hhmmss().unwrap();
        assert!((0.0..=235_959.0).contains(&v));
    }
}
