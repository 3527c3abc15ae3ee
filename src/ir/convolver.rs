use anyhow::{Result, anyhow};
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;

/// Uniform partition length. The first partition runs in the time domain
/// so the convolver stays zero-latency; the rest go through the FFT.
const PARTITION: usize = 256;
const FFT_SIZE: usize = 2 * PARTITION;
const NUM_BINS: usize = FFT_SIZE / 2 + 1;

/// Cabinet IR convolver: time-domain FIR head plus a frequency-delay-line
/// of uniform FFT partitions for the tail.
pub struct CabConvolver {
    // Head (first PARTITION taps, zero latency)
    head: Vec<f32>,
    head_ring: Vec<f32>,
    head_pos: usize,

    // Tail partitions in the frequency domain
    partitions: Vec<Vec<Complex<f32>>>,
    fdl: Vec<Vec<Complex<f32>>>,
    fdl_pos: usize,

    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    r2c_scratch: Vec<Complex<f32>>,
    c2r_scratch: Vec<Complex<f32>>,

    // Input staging for the next tail partition
    stage: Vec<f32>,
    stage_fill: usize,

    // Overlap-add ring the tail output is read from
    ola: Vec<f32>,
    ola_read: usize,

    time_scratch: Vec<f32>,
    freq_scratch: Vec<Complex<f32>>,
    freq_accum: Vec<Complex<f32>>,

    ir_length: usize,
}

impl Default for CabConvolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CabConvolver {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(FFT_SIZE);
        let c2r = planner.plan_fft_inverse(FFT_SIZE);
        let r2c_scratch = r2c.make_scratch_vec();
        let c2r_scratch = c2r.make_scratch_vec();

        Self {
            head: vec![0.0; PARTITION],
            head_ring: vec![0.0; PARTITION],
            head_pos: 0,

            partitions: Vec::new(),
            fdl: Vec::new(),
            fdl_pos: 0,

            r2c,
            c2r,
            r2c_scratch,
            c2r_scratch,

            stage: vec![0.0; PARTITION],
            stage_fill: 0,

            ola: vec![0.0; FFT_SIZE],
            ola_read: 0,

            time_scratch: vec![0.0; FFT_SIZE],
            freq_scratch: vec![Complex::new(0.0, 0.0); NUM_BINS],
            freq_accum: vec![Complex::new(0.0, 0.0); NUM_BINS],

            ir_length: 0,
        }
    }

    pub fn set_ir(&mut self, ir: &[f32]) -> Result<()> {
        if ir.is_empty() {
            return Err(anyhow!("impulse response is empty"));
        }

        self.ir_length = ir.len();

        let head_len = ir.len().min(PARTITION);
        self.head.fill(0.0);
        self.head[..head_len].copy_from_slice(&ir[..head_len]);

        self.partitions.clear();
        if ir.len() > PARTITION {
            for chunk in ir[PARTITION..].chunks(PARTITION) {
                self.time_scratch.fill(0.0);
                self.time_scratch[..chunk.len()].copy_from_slice(chunk);

                let mut freq = vec![Complex::new(0.0, 0.0); NUM_BINS];
                self.r2c
                    .process_with_scratch(&mut self.time_scratch, &mut freq, &mut self.r2c_scratch)
                    .map_err(|e| anyhow!("FFT failed while partitioning IR: {e}"))?;
                self.partitions.push(freq);
            }
        }

        self.fdl = vec![vec![Complex::new(0.0, 0.0); NUM_BINS]; self.partitions.len()];
        self.fdl_pos = 0;

        self.reset();
        Ok(())
    }

    pub fn ir_length(&self) -> usize {
        self.ir_length
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        // Head: direct FIR over the ring buffer.
        self.head_ring[self.head_pos] = input;

        let mut head_out = 0.0f32;
        let mut idx = self.head_pos;
        for &coeff in &self.head {
            head_out += coeff * self.head_ring[idx];
            idx = if idx == 0 { PARTITION - 1 } else { idx - 1 };
        }
        self.head_pos = (self.head_pos + 1) % PARTITION;

        if self.partitions.is_empty() {
            return head_out;
        }

        // Tail: read this sample's contribution, then stage the input.
        // A completed partition only affects samples after the boundary,
        // so reading before processing keeps the alignment exact.
        let tail_out = self.ola[self.ola_read];
        self.ola[self.ola_read] = 0.0;
        self.ola_read = (self.ola_read + 1) % FFT_SIZE;

        self.stage[self.stage_fill] = input;
        self.stage_fill += 1;
        if self.stage_fill == PARTITION {
            self.stage_fill = 0;
            self.process_tail_partition();
        }

        head_out + tail_out
    }

    pub fn process_block(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn process_tail_partition(&mut self) {
        self.time_scratch[..PARTITION].copy_from_slice(&self.stage);
        self.time_scratch[PARTITION..].fill(0.0);

        if self
            .r2c
            .process_with_scratch(
                &mut self.time_scratch,
                &mut self.freq_scratch,
                &mut self.r2c_scratch,
            )
            .is_err()
        {
            return;
        }

        self.fdl[self.fdl_pos].copy_from_slice(&self.freq_scratch);

        // Multiply-accumulate the frequency delay line against the
        // partitioned IR: partition j pairs with the input block j
        // partitions ago.
        self.freq_accum.fill(Complex::new(0.0, 0.0));
        let len = self.fdl.len();
        for (j, partition) in self.partitions.iter().enumerate() {
            let hist = &self.fdl[(self.fdl_pos + len - j) % len];
            for (acc, (&h, &p)) in self.freq_accum.iter_mut().zip(hist.iter().zip(partition)) {
                *acc += h * p;
            }
        }
        self.fdl_pos = (self.fdl_pos + 1) % len;

        // DC and Nyquist bins must stay real for the inverse transform.
        self.freq_accum[0].im = 0.0;
        if let Some(last) = self.freq_accum.last_mut() {
            last.im = 0.0;
        }

        if self
            .c2r
            .process_with_scratch(
                &mut self.freq_accum,
                &mut self.time_scratch,
                &mut self.c2r_scratch,
            )
            .is_err()
        {
            return;
        }

        // Overlap-add starting at the next sample to be read.
        let scale = 1.0 / FFT_SIZE as f32;
        for (i, &y) in self.time_scratch.iter().enumerate() {
            let pos = (self.ola_read + i) % FFT_SIZE;
            self.ola[pos] += y * scale;
        }
    }

    pub fn reset(&mut self) {
        self.head_ring.fill(0.0);
        self.head_pos = 0;
        self.stage.fill(0.0);
        self.stage_fill = 0;
        self.ola.fill(0.0);
        self.ola_read = 0;
        self.fdl_pos = 0;
        for slot in &mut self.fdl {
            slot.fill(Complex::new(0.0, 0.0));
        }
    }
}
