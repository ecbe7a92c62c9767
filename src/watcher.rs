// Edge-triggered alarm with a fixed cooldown, one AlarmState per endpoint.
//
// Armed --breach--> Cooling (fire once)
// Cooling --cooldown exhausted--> Armed (no fire on that tick)

use crate::models::Metrics;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    /// Breach when connected count is strictly above this.
    pub connected_high_water: u64,
    /// Breach when blocked count is strictly above this.
    pub blocked_mark: u64,
    /// Cooling lasts until more than this many ticks have elapsed.
    pub cooldown_ticks: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            connected_high_water: 1000,
            blocked_mark: 2,
            cooldown_ticks: 55,
        }
    }
}

impl AlarmConfig {
    pub fn is_breach(&self, metrics: &Metrics) -> bool {
        metrics.connected > self.connected_high_water || metrics.blocked > self.blocked_mark
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmPhase {
    Armed,
    Cooling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureDecision {
    pub fire: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmState {
    phase: AlarmPhase,
    cooling_elapsed: u64,
}

impl Default for AlarmState {
    fn default() -> Self {
        Self {
            phase: AlarmPhase::Armed,
            cooling_elapsed: 0,
        }
    }
}

impl AlarmState {
    pub fn phase(&self) -> AlarmPhase {
        self.phase
    }

    pub fn is_armed(&self) -> bool {
        self.phase == AlarmPhase::Armed
    }

    pub fn cooling_elapsed(&self) -> u64 {
        self.cooling_elapsed
    }

    /// Cooling ticks left before the alarm re-arms; 0 while armed.
    pub fn cooldown_remaining(&self, config: &AlarmConfig) -> u64 {
        match self.phase {
            AlarmPhase::Armed => 0,
            AlarmPhase::Cooling => (config.cooldown_ticks + 1).saturating_sub(self.cooling_elapsed),
        }
    }

    pub fn evaluate(&mut self, config: &AlarmConfig, metrics: &Metrics) -> CaptureDecision {
        match self.phase {
            AlarmPhase::Armed => {
                if config.is_breach(metrics) {
                    self.phase = AlarmPhase::Cooling;
                    self.cooling_elapsed = 0;
                    CaptureDecision { fire: true }
                } else {
                    CaptureDecision { fire: false }
                }
            }
            AlarmPhase::Cooling => {
                self.cooling_elapsed += 1;
                if self.cooling_elapsed > config.cooldown_ticks {
                    self.cooling_elapsed = 0;
                    self.phase = AlarmPhase::Armed;
                }
                CaptureDecision { fire: false }
            }
        }
    }
}

/// Alarm states for a fixed set of endpoints, indexed like the endpoint list.
/// Owned by the sampling loop; never shared across tasks.
#[derive(Debug, Clone)]
pub struct ThresholdWatcher {
    config: AlarmConfig,
    states: Vec<AlarmState>,
}

impl ThresholdWatcher {
    pub fn new(config: AlarmConfig, endpoints: usize) -> Self {
        Self {
            config,
            states: vec![AlarmState::default(); endpoints],
        }
    }

    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }

    pub fn state(&self, index: usize) -> Option<&AlarmState> {
        self.states.get(index)
    }

    pub fn evaluate(&mut self, index: usize, metrics: &Metrics) -> CaptureDecision {
        match self.states.get_mut(index) {
            Some(state) => {
                if !state.is_armed() && self.config.is_breach(metrics) {
                    tracing::debug!(
                        index,
                        cooldown_remaining = state.cooldown_remaining(&self.config),
                        "breach suppressed while cooling"
                    );
                }
                state.evaluate(&self.config, metrics)
            }
            None => CaptureDecision { fire: false },
        }
    }
}
