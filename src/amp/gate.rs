use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::amp::params::{GATE_OFF_DB, db_to_gain};

// Fixed gate timing, matching the hard-wired constants of the amp design.
const DETECT_TIME_S: f32 = 0.01;
const OPEN_TIME_S: f32 = 0.005;
const HOLD_TIME_S: f32 = 0.01;
const CLOSE_TIME_S: f32 = 0.05;

// Thresholds at or below this are treated as the "OFF" position.
const GATE_OFF_LIMIT_DB: f32 = GATE_OFF_DB + 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Closed,
    Opening,
    Open,
    Holding,
    Closing,
}

/// Noise gate trigger: an envelope follower driving a five-state machine.
///
/// `detect` runs on the pre-gate signal and fills a per-sample gain ramp;
/// `apply` multiplies that ramp into the post-model signal. The split lets
/// the gate key off the raw instrument level while attenuating the
/// processed output, so amp hiss never re-triggers the gate.
pub struct GateTrigger {
    state: GateState,
    envelope: f32,
    gain: f32,
    enabled: bool,

    env_coeff: f32,
    open_step: f32,
    close_step: f32,
    hold_samples: usize,
    hold_counter: usize,

    gain_buf: Vec<f32>,
    gating: Arc<AtomicBool>,
}

/// Read-only view for the UI: reports whether the gate is audibly
/// attenuating right now. Updated once per block by the audio thread.
#[derive(Clone)]
pub struct GateHandle {
    gating: Arc<AtomicBool>,
}

impl GateHandle {
    pub fn is_gating(&self) -> bool {
        self.gating.load(Ordering::Relaxed)
    }
}

impl GateTrigger {
    pub fn new(sample_rate: f32, max_block: usize) -> (Self, GateHandle) {
        let gating = Arc::new(AtomicBool::new(false));

        let mut trigger = Self {
            state: GateState::Closed,
            envelope: 0.0,
            gain: 0.0,
            enabled: false,
            env_coeff: 0.0,
            open_step: 0.0,
            close_step: 0.0,
            hold_samples: 0,
            hold_counter: 0,
            gain_buf: vec![1.0; max_block],
            gating: Arc::clone(&gating),
        };
        trigger.prepare(sample_rate, max_block);

        (trigger, GateHandle { gating })
    }

    /// Recomputes timing coefficients and resets all state. May allocate.
    pub fn prepare(&mut self, sample_rate: f32, max_block: usize) {
        self.env_coeff = (-1.0 / (sample_rate * DETECT_TIME_S)).exp();
        self.open_step = 1.0 / (sample_rate * OPEN_TIME_S);
        self.close_step = 1.0 / (sample_rate * CLOSE_TIME_S);
        self.hold_samples = (sample_rate * HOLD_TIME_S) as usize;
        self.gain_buf.resize(max_block, 1.0);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.state = GateState::Closed;
        self.envelope = 0.0;
        self.gain = 0.0;
        self.hold_counter = 0;
        self.gating.store(false, Ordering::Relaxed);
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Runs the detector over the pre-gate signal, filling the internal
    /// gain ramp for this block.
    pub fn detect(&mut self, input: &[f32], threshold_db: f32) {
        self.enabled = threshold_db > GATE_OFF_LIMIT_DB;

        if !self.enabled {
            // OFF sentinel: pin the machine open, unity gain.
            self.state = GateState::Open;
            self.gain = 1.0;
            for g in self.gain_buf.iter_mut().take(input.len()) {
                *g = 1.0;
            }
            self.gating.store(false, Ordering::Relaxed);
            return;
        }

        let threshold = db_to_gain(threshold_db);

        for (g, &x) in self.gain_buf.iter_mut().zip(input) {
            self.envelope = self.env_coeff * self.envelope + (1.0 - self.env_coeff) * x.abs();
            let above = self.envelope > threshold;

            match self.state {
                GateState::Closed => {
                    self.gain = 0.0;
                    if above {
                        self.state = GateState::Opening;
                    }
                }
                GateState::Opening => {
                    if above {
                        self.gain += self.open_step;
                        if self.gain >= 1.0 {
                            self.gain = 1.0;
                            self.state = GateState::Open;
                        }
                    } else {
                        self.state = GateState::Closing;
                    }
                }
                GateState::Open => {
                    self.gain = 1.0;
                    if !above {
                        self.hold_counter = self.hold_samples;
                        self.state = GateState::Holding;
                    }
                }
                GateState::Holding => {
                    self.gain = 1.0;
                    if above {
                        self.state = GateState::Open;
                    } else if self.hold_counter > 0 {
                        self.hold_counter -= 1;
                    } else {
                        self.state = GateState::Closing;
                    }
                }
                GateState::Closing => {
                    if above {
                        self.state = GateState::Opening;
                    } else {
                        self.gain -= self.close_step;
                        if self.gain <= 0.0 {
                            self.gain = 0.0;
                            self.state = GateState::Closed;
                        }
                    }
                }
            }

            *g = self.gain;
        }

        self.gating
            .store(self.state != GateState::Open, Ordering::Relaxed);
    }

    /// Applies the gain ramp computed by the last `detect` call.
    pub fn apply(&self, block: &mut [f32]) {
        for (s, &g) in block.iter_mut().zip(&self.gain_buf) {
            *s *= g;
        }
    }
}
