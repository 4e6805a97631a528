//! Pipeline load profiling
//!
//! Collects [`FrameStats`] samples per session and classifies how well the
//! processor keeps up with its input.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tryon_core::{TryOnError, TryOnResult};
use tryon_media::FrameStats;

/// How well a session's processor keeps up
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoadLevel {
    /// No meaningful input
    Idle,
    /// Delivering at the expected rate
    Healthy,
    /// Falling behind but still delivering
    Saturated,
    /// Output has collapsed relative to input
    Overloaded,
}

/// Profiler thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Samples kept per session
    pub max_samples: usize,
    /// Output rate pacing allows; the processor is not expected to beat it
    pub expected_output_fps: f64,
    /// Input below this rate counts as idle
    pub idle_input_fps: f64,
    /// Delivery ratio at or above which a session is healthy
    pub healthy_ratio: f64,
    /// Delivery ratio at or above which a session is saturated (else overloaded)
    pub saturated_ratio: f64,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            max_samples: 30,
            expected_output_fps: 10.0,
            idle_input_fps: 0.5,
            healthy_ratio: 0.8,
            saturated_ratio: 0.4,
        }
    }
}

impl ProfilerConfig {
    /// Validate thresholds
    pub fn validate(&self) -> TryOnResult<()> {
        if self.max_samples == 0 {
            return Err(TryOnError::InvalidConfiguration {
                message: "max_samples must be > 0".to_string(),
            });
        }
        if self.expected_output_fps <= 0.0 {
            return Err(TryOnError::InvalidConfiguration {
                message: "expected_output_fps must be > 0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.saturated_ratio)
            || !(0.0..=1.0).contains(&self.healthy_ratio)
            || self.saturated_ratio > self.healthy_ratio
        {
            return Err(TryOnError::InvalidConfiguration {
                message: format!(
                    "ratios must satisfy 0 <= saturated ({}) <= healthy ({}) <= 1",
                    self.saturated_ratio, self.healthy_ratio
                ),
            });
        }
        Ok(())
    }
}

/// Load summary for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Session the samples belong to
    pub session_id: String,
    /// Samples the report is based on
    pub samples: usize,
    /// Mean input rate
    pub mean_input_fps: f64,
    /// Mean output rate
    pub mean_output_fps: f64,
    /// Output relative to what pacing allows for the observed input
    pub delivery_ratio: f64,
    /// Classification
    pub load: LoadLevel,
    /// Transform failures in the latest sample
    pub total_failures: u64,
    /// Most recent transform duration
    pub last_processing_time: Option<Duration>,
}

/// Per-session sample history
#[derive(Debug)]
pub struct PipelineProfiler {
    config: ProfilerConfig,
    samples: Mutex<HashMap<String, VecDeque<FrameStats>>>,
}

impl PipelineProfiler {
    /// Create a profiler
    pub fn new(config: ProfilerConfig) -> TryOnResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            samples: Mutex::new(HashMap::new()),
        })
    }

    /// Record a sample for `session_id`
    pub fn record(&self, session_id: &str, stats: FrameStats) {
        let mut samples = self.samples.lock();
        let history = samples.entry(session_id.to_string()).or_default();
        if history.len() == self.config.max_samples {
            history.pop_front();
        }
        history.push_back(stats);
    }

    /// Drop a session's history
    pub fn forget(&self, session_id: &str) {
        self.samples.lock().remove(session_id);
    }

    /// Drop histories of sessions not in `live`
    pub fn retain(&self, live: &[String]) {
        self.samples.lock().retain(|id, _| live.contains(id));
    }

    /// Report for one session
    pub fn report(&self, session_id: &str) -> Option<PipelineReport> {
        let samples = self.samples.lock();
        let history = samples.get(session_id)?;
        self.summarize(session_id, history)
    }

    /// Reports for every profiled session, worst load first
    pub fn reports(&self) -> Vec<PipelineReport> {
        let mut reports: Vec<PipelineReport> = {
            let samples = self.samples.lock();
            samples
                .iter()
                .filter_map(|(id, history)| self.summarize(id, history))
                .collect()
        };
        reports.sort_by(|a, b| {
            b.load
                .cmp(&a.load)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        for report in &reports {
            if report.load == LoadLevel::Overloaded {
                tracing::warn!(
                    session_id = %report.session_id,
                    "Pipeline overloaded: {:.1} fps in, {:.1} fps out",
                    report.mean_input_fps,
                    report.mean_output_fps
                );
            }
        }
        reports
    }

    fn summarize(&self, session_id: &str, history: &VecDeque<FrameStats>) -> Option<PipelineReport> {
        let latest = history.back()?;
        let count = history.len() as f64;
        let mean_input_fps = history.iter().map(|s| s.input_fps).sum::<f64>() / count;
        let mean_output_fps = history.iter().map(|s| s.output_fps).sum::<f64>() / count;

        let (delivery_ratio, load) = self.classify(mean_input_fps, mean_output_fps);
        Some(PipelineReport {
            session_id: session_id.to_string(),
            samples: history.len(),
            mean_input_fps,
            mean_output_fps,
            delivery_ratio,
            load,
            total_failures: latest.total_failures,
            last_processing_time: latest.last_processing_time,
        })
    }

    fn classify(&self, input_fps: f64, output_fps: f64) -> (f64, LoadLevel) {
        if input_fps < self.config.idle_input_fps {
            return (0.0, LoadLevel::Idle);
        }

        let achievable = input_fps.min(self.config.expected_output_fps);
        let ratio = (output_fps / achievable).min(1.0);
        let load = if ratio >= self.config.healthy_ratio {
            LoadLevel::Healthy
        } else if ratio >= self.config.saturated_ratio {
            LoadLevel::Saturated
        } else {
            LoadLevel::Overloaded
        };
        (ratio, load)
    }
}

impl Default for PipelineProfiler {
    fn default() -> Self {
        Self {
            config: ProfilerConfig::default(),
            samples: Mutex::new(HashMap::new()),
        }
    }
}
