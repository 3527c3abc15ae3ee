use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Gate threshold value (dB) that switches the noise gate off entirely.
/// The UI shows this position as "OFF"; anything at or below it bypasses
/// the trigger state machine.
pub const GATE_OFF_DB: f32 = -101.0;

/// Loudness target (dBFS) for output normalization. Model loudness
/// metadata is compared against this at load time.
pub const TARGET_LOUDNESS_DB: f32 = -18.0;

#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// f32 stored as its bit pattern in an `AtomicU32`, so parameter writes
/// from the control thread never block the audio thread.
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// The eight host-automatable engine parameters.
///
/// The table is fixed at construction and shared by `Arc`: the control
/// context writes through the setters (clamped to range), the audio
/// thread takes one `snapshot()` per block. No locks anywhere.
pub struct ParamTable {
    input_level_db: AtomicF32,
    gate_threshold_db: AtomicF32,
    bass: AtomicF32,
    mid: AtomicF32,
    treble: AtomicF32,
    output_level_db: AtomicF32,
    tonestack_enabled: AtomicBool,
    out_norm_enabled: AtomicBool,
}

/// Plain-value copy of the table, read once per audio block.
#[derive(Debug, Clone, Copy)]
pub struct ParamSnapshot {
    pub input_level_db: f32,
    pub gate_threshold_db: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub output_level_db: f32,
    pub tonestack_enabled: bool,
    pub out_norm_enabled: bool,
}

impl Default for ParamTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamTable {
    pub fn new() -> Self {
        Self {
            input_level_db: AtomicF32::new(0.0),
            gate_threshold_db: AtomicF32::new(-80.0),
            bass: AtomicF32::new(5.0),
            mid: AtomicF32::new(5.0),
            treble: AtomicF32::new(5.0),
            output_level_db: AtomicF32::new(0.0),
            tonestack_enabled: AtomicBool::new(true),
            out_norm_enabled: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> ParamSnapshot {
        ParamSnapshot {
            input_level_db: self.input_level_db.load(),
            gate_threshold_db: self.gate_threshold_db.load(),
            bass: self.bass.load(),
            mid: self.mid.load(),
            treble: self.treble.load(),
            output_level_db: self.output_level_db.load(),
            tonestack_enabled: self.tonestack_enabled.load(Ordering::Relaxed),
            out_norm_enabled: self.out_norm_enabled.load(Ordering::Relaxed),
        }
    }

    pub fn set_input_level_db(&self, db: f32) {
        self.input_level_db.store(db.clamp(-20.0, 20.0));
    }

    pub fn set_gate_threshold_db(&self, db: f32) {
        self.gate_threshold_db.store(db.clamp(GATE_OFF_DB, 0.0));
    }

    pub fn set_bass(&self, value: f32) {
        self.bass.store(value.clamp(0.0, 10.0));
    }

    pub fn set_mid(&self, value: f32) {
        self.mid.store(value.clamp(0.0, 10.0));
    }

    pub fn set_treble(&self, value: f32) {
        self.treble.store(value.clamp(0.0, 10.0));
    }

    pub fn set_output_level_db(&self, db: f32) {
        self.output_level_db.store(db.clamp(-40.0, 40.0));
    }

    pub fn set_tonestack_enabled(&self, enabled: bool) {
        self.tonestack_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_out_norm_enabled(&self, enabled: bool) {
        self.out_norm_enabled.store(enabled, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_parameter_table() {
        let params = ParamTable::new();
        let snap = params.snapshot();

        assert_eq!(snap.input_level_db, 0.0);
        assert_eq!(snap.gate_threshold_db, -80.0);
        assert_eq!(snap.bass, 5.0);
        assert_eq!(snap.mid, 5.0);
        assert_eq!(snap.treble, 5.0);
        assert_eq!(snap.output_level_db, 0.0);
        assert!(snap.tonestack_enabled);
        assert!(!snap.out_norm_enabled);
    }

    #[test]
    fn test_setters_clamp_to_range() {
        let params = ParamTable::new();

        params.set_input_level_db(100.0);
        params.set_gate_threshold_db(-500.0);
        params.set_bass(-3.0);
        params.set_treble(42.0);
        params.set_output_level_db(-100.0);

        let snap = params.snapshot();
        assert_eq!(snap.input_level_db, 20.0);
        assert_eq!(snap.gate_threshold_db, GATE_OFF_DB);
        assert_eq!(snap.bass, 0.0);
        assert_eq!(snap.treble, 10.0);
        assert_eq!(snap.output_level_db, -40.0);
    }

    #[test]
    fn test_db_to_gain() {
        assert_eq!(db_to_gain(0.0), 1.0);
        assert!((db_to_gain(20.0) - 10.0).abs() < 1e-5);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-6);
    }
}
