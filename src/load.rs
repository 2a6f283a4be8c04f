//! Host load sampling for the worker loop.
//!
//! When CPU or memory usage crosses the high-water mark the worker waits an
//! extra `overload_backoff` before its next tick. Events keep queueing in the
//! meantime; nothing is dropped.

use crate::config::LoadConfig;
use std::time::Duration;
use sysinfo::System;

/// CPU and memory usage, both in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadSample {
    pub cpu_percent: f32,
    pub memory_percent: f32,
}

/// Source of load samples.
pub trait LoadProbe {
    fn sample(&mut self) -> LoadSample;
}

/// Reads global CPU and memory usage through sysinfo.
pub struct SystemLoad {
    sys: System,
}

impl SystemLoad {
    pub fn new() -> Self {
        let mut sys = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        sys.refresh_cpu_usage();
        Self { sys }
    }
}

impl Default for SystemLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadProbe for SystemLoad {
    fn sample(&mut self) -> LoadSample {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        let memory_percent = if total == 0 {
            0.0
        } else {
            (self.sys.used_memory() as f64 / total as f64 * 100.0) as f32
        };

        LoadSample {
            cpu_percent: self.sys.global_cpu_usage(),
            memory_percent,
        }
    }
}

/// Decides how long the worker should back off under load.
pub struct AdaptiveBackoff<P: LoadProbe> {
    probe: P,
    high_water_percent: f32,
    backoff: Duration,
}

impl AdaptiveBackoff<SystemLoad> {
    pub fn from_config(config: &LoadConfig) -> Self {
        Self::new(SystemLoad::new(), config)
    }
}

impl<P: LoadProbe> AdaptiveBackoff<P> {
    pub fn new(probe: P, config: &LoadConfig) -> Self {
        Self {
            probe,
            high_water_percent: config.high_water_percent,
            backoff: Duration::from_secs(config.overload_backoff_secs),
        }
    }

    /// Extra wait before the next tick, zero when the host is not overloaded.
    pub fn extra_delay(&mut self) -> Duration {
        let sample = self.probe.sample();
        if sample.cpu_percent > self.high_water_percent
            || sample.memory_percent > self.high_water_percent
        {
            tracing::warn!(
                cpu = sample.cpu_percent,
                memory = sample.memory_percent,
                backoff_secs = self.backoff.as_secs(),
                "host overloaded, backing off"
            );
            self.backoff
        } else {
            Duration::ZERO
        }
    }
}
