use std::f32::consts::PI;

/// Capability interface for the bass/mid/treble EQ stage. Concrete filter
/// topologies can be swapped without touching the pipeline.
pub trait ToneStack: Send {
    /// Controls arrive in the UI range 0–10, with 5 meaning flat.
    fn set_params(&mut self, bass: f32, mid: f32, treble: f32);

    fn process(&mut self, block: &mut [f32]);

    fn reset(&mut self);
}

const BASS_CORNER_HZ: f32 = 120.0;
const TREBLE_CORNER_HZ: f32 = 2200.0;

/// Three-band tone stack built from complementary first-order splits.
///
/// The signal is split into low / mid / high bands that sum back to the
/// input exactly, so all controls at 5 are a true flat response (modulo
/// float rounding). Each control then scales its band 0x–2x.
pub struct FirstOrderToneStack {
    bass_gain: f32,
    mid_gain: f32,
    treble_gain: f32,

    bass_alpha: f32,
    treble_alpha: f32,

    // filter state
    bass_lp: f32,
    mid_lp: f32,
}

impl FirstOrderToneStack {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            bass_gain: 1.0,
            mid_gain: 1.0,
            treble_gain: 1.0,
            bass_alpha: Self::alpha(BASS_CORNER_HZ, sample_rate),
            treble_alpha: Self::alpha(TREBLE_CORNER_HZ, sample_rate),
            bass_lp: 0.0,
            mid_lp: 0.0,
        }
    }

    #[inline]
    fn alpha(f: f32, sample_rate: f32) -> f32 {
        let dt = 1.0 / sample_rate;
        dt / (dt + 1.0 / (2.0 * PI * f))
    }
}

impl ToneStack for FirstOrderToneStack {
    fn set_params(&mut self, bass: f32, mid: f32, treble: f32) {
        // 0 → silence the band, 5 → unity, 10 → +6 dB.
        self.bass_gain = bass.clamp(0.0, 10.0) / 5.0;
        self.mid_gain = mid.clamp(0.0, 10.0) / 5.0;
        self.treble_gain = treble.clamp(0.0, 10.0) / 5.0;
    }

    fn process(&mut self, block: &mut [f32]) {
        for x in block.iter_mut() {
            // Low band: one-pole LP at the bass corner.
            self.bass_lp += self.bass_alpha * (*x - self.bass_lp);
            let low = self.bass_lp;
            let rest = *x - low;

            // Mid band: what's left below the treble corner. High band is
            // the complement, so low + mid + high reconstructs the input.
            self.mid_lp += self.treble_alpha * (rest - self.mid_lp);
            let mid = self.mid_lp;
            let high = rest - mid;

            *x = low * self.bass_gain + mid * self.mid_gain + high * self.treble_gain;
        }
    }

    fn reset(&mut self) {
        self.bass_lp = 0.0;
        self.mid_lp = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / SAMPLE_RATE).sin() * 0.5)
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_flat_settings_are_identity() {
        let mut stack = FirstOrderToneStack::new(SAMPLE_RATE);
        stack.set_params(5.0, 5.0, 5.0);

        let input = sine(440.0, 4096);
        let mut block = input.clone();
        stack.process(&mut block);

        for (y, x) in block.iter().zip(&input) {
            assert!((y - x).abs() < 1e-5, "expected flat response, {y} != {x}");
        }
    }

    #[test]
    fn test_bass_cut_attenuates_low_frequencies() {
        let mut stack = FirstOrderToneStack::new(SAMPLE_RATE);
        stack.set_params(0.0, 5.0, 5.0);

        let mut low = sine(60.0, 8192);
        let low_in_rms = rms(&low);
        stack.process(&mut low);
        let low_out_rms = rms(&low);

        stack.reset();
        let mut high = sine(5000.0, 8192);
        let high_in_rms = rms(&high);
        stack.process(&mut high);
        let high_out_rms = rms(&high);

        assert!(low_out_rms / low_in_rms < 0.4, "low band should be cut");
        assert!(high_out_rms / high_in_rms > 0.8, "high band should pass");
    }

    #[test]
    fn test_treble_boost_amplifies_high_frequencies() {
        let mut stack = FirstOrderToneStack::new(SAMPLE_RATE);
        stack.set_params(5.0, 5.0, 10.0);

        let mut high = sine(8000.0, 8192);
        let in_rms = rms(&high);
        stack.process(&mut high);

        assert!(rms(&high) / in_rms > 1.3, "high band should be boosted");
    }

    #[test]
    fn test_reset_clears_state() {
        let mut stack = FirstOrderToneStack::new(SAMPLE_RATE);
        stack.set_params(10.0, 0.0, 10.0);

        let mut block = vec![1.0f32; 256];
        stack.process(&mut block);
        stack.reset();

        let mut silence = vec![0.0f32; 4];
        stack.process(&mut silence);
        assert!(silence.iter().all(|&x| x == 0.0));
    }
}
