//! Progress accounting for a restore run.

use std::time::{Duration, Instant};

/// Counts shards and bytes restored during one run.
#[derive(Debug)]
pub struct RestoreProgress {
    start_time: Instant,

    /// Shards selected for this run (for partial restore, as they are discovered)
    pub shards_total: usize,

    /// Shards successfully transferred
    pub shards_restored: usize,

    /// Shards not transferred because the server had no catalog entry for them
    pub shards_unmapped: usize,

    /// Decompressed bytes sent to the server
    pub bytes_restored: u64,
}

impl RestoreProgress {
    pub fn new(shards_total: usize) -> Self {
        Self {
            start_time: Instant::now(),
            shards_total,
            shards_restored: 0,
            shards_unmapped: 0,
            bytes_restored: 0,
        }
    }

    pub fn add_planned(&mut self, shards: usize) {
        self.shards_total += shards;
    }

    pub fn record_shard(&mut self, bytes: u64) {
        self.shards_restored += 1;
        self.bytes_restored += bytes;
    }

    pub fn record_unmapped(&mut self, shards: usize) {
        self.shards_unmapped += shards;
    }

    /// Get total elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get average speed since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.bytes_restored as f64 / elapsed) as u64
        } else {
            0
        }
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_shards() {
        let mut progress = RestoreProgress::new(2);
        progress.add_planned(1);
        progress.record_shard(1000);
        progress.record_shard(24);
        progress.record_unmapped(1);

        assert_eq!(progress.shards_total, 3);
        assert_eq!(progress.shards_restored, 2);
        assert_eq!(progress.shards_unmapped, 1);
        assert_eq!(progress.bytes_restored, 1024);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024 * 1024), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
