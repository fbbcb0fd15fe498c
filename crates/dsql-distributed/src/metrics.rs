//! Resource gauges reported in heartbeats and system status

use rand::Rng;
use std::fmt::Debug;

/// Source of CPU and memory usage readings (percent)
pub trait MetricsProvider: Debug + Send + Sync {
    /// Current CPU usage
    fn cpu_usage(&self) -> f64;
    /// Current memory usage
    fn memory_usage(&self) -> f64;
}

/// Random readings in plausible ranges, for in-process clusters
#[derive(Debug, Clone)]
pub struct SimulatedMetrics {
    cpu_range: (f64, f64),
    memory_range: (f64, f64),
}

impl SimulatedMetrics {
    pub fn new(cpu_range: (f64, f64), memory_range: (f64, f64)) -> Self {
        Self {
            cpu_range,
            memory_range,
        }
    }

    fn sample(range: (f64, f64)) -> f64 {
        if range.1 <= range.0 {
            return range.0;
        }
        rand::thread_rng().gen_range(range.0..range.1)
    }
}

impl Default for SimulatedMetrics {
    fn default() -> Self {
        Self::new((10.0, 60.0), (30.0, 80.0))
    }
}

impl MetricsProvider for SimulatedMetrics {
    fn cpu_usage(&self) -> f64 {
        Self::sample(self.cpu_range)
    }

    fn memory_usage(&self) -> f64 {
        Self::sample(self.memory_range)
    }
}

/// Constant readings
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedMetrics {
    pub cpu: f64,
    pub memory: f64,
}

impl MetricsProvider for FixedMetrics {
    fn cpu_usage(&self) -> f64 {
        self.cpu
    }

    fn memory_usage(&self) -> f64 {
        self.memory
    }
}
