// src/battery.rs
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, warn};

/// Default spacing between battery samples.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(10);

const EMPTY_VOLTS: f32 = 3.6;
const RANGE_VOLTS: f32 = 0.6;

pub trait VoltageSource {
    fn read_volts(&mut self) -> Option<f32>;
}

impl<S: VoltageSource + ?Sized> VoltageSource for Box<S> {
    fn read_volts(&mut self) -> Option<f32> {
        (**self).read_volts()
    }
}

/// Linux power_supply `voltage_now` (microvolts).
pub struct SysfsVoltage {
    path: PathBuf,
}

impl SysfsVoltage {
    pub fn new(path: PathBuf) -> Self {
        SysfsVoltage { path }
    }
}

impl VoltageSource for SysfsVoltage {
    fn read_volts(&mut self) -> Option<f32> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                warn!("Cannot read {}: {}", self.path.display(), e);
                return None;
            }
        };
        let micro: f32 = text.trim().parse().ok()?;
        Some(micro / 1_000_000.0)
    }
}

/// Linear LiPo estimate: 3.6 V is empty, 4.2 V is full.
pub fn percent_from_volts(volts: f32) -> u8 {
    let level = ((volts - EMPTY_VOLTS).max(0.0) / RANGE_VOLTS * 100.0).round();
    level.clamp(0.0, 100.0) as u8
}

/// Samples a voltage source no more than once per interval.
pub struct BatteryMonitor<S> {
    source: S,
    interval: Duration,
    last_check: Option<Instant>,
    level: u8,
}

impl<S: VoltageSource> BatteryMonitor<S> {
    pub fn new(source: S, interval: Duration) -> Self {
        BatteryMonitor {
            source,
            interval,
            last_check: None,
            level: 0,
        }
    }

    /// Returns the fresh level when a sample was taken this call.
    pub fn update(&mut self, now: Instant) -> Option<u8> {
        if let Some(last) = self.last_check {
            if now.saturating_duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_check = Some(now);

        let volts = self.source.read_volts()?;
        self.level = percent_from_volts(volts);
        debug!("Battery {:.2} V -> {}%", volts, self.level);
        Some(self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<f32>);

    impl VoltageSource for Fixed {
        fn read_volts(&mut self) -> Option<f32> {
            if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            }
        }
    }

    #[test]
    fn percent_curve() {
        assert_eq!(percent_from_volts(3.0), 0);
        assert_eq!(percent_from_volts(3.6), 0);
        assert_eq!(percent_from_volts(3.9), 50);
        assert_eq!(percent_from_volts(4.2), 100);
        assert_eq!(percent_from_volts(4.5), 100);
    }

    #[test]
    fn samples_at_most_once_per_interval() {
        let start = Instant::now();
        let mut monitor = BatteryMonitor::new(Fixed(vec![4.2, 3.9]), CHECK_INTERVAL);

        assert_eq!(monitor.update(start), Some(100));
        assert_eq!(monitor.update(start + Duration::from_secs(5)), None);
        assert_eq!(monitor.update(start + CHECK_INTERVAL), Some(50));
    }

    #[test]
    fn sysfs_microvolts() {
        let path = std::env::temp_dir().join(format!("nfc-bridge-vbat-{}", std::process::id()));
        fs::write(&path, "3900000\n").unwrap();
        let mut source = SysfsVoltage::new(path.clone());
        let volts = source.read_volts().unwrap();
        assert!((volts - 3.9).abs() < 1e-4);
        fs::remove_file(path).unwrap();
    }
}
