use anyhow::{Context, Result, anyhow};
use rubato::{FftFixedInOut, Resampler};

const CHANNELS: usize = 1;

/// Converts audio blocks between the host rate and a model's native rate.
///
/// Interpolation state persists across calls, so block boundaries stay
/// continuous. When the two rates match this is a passthrough with zero
/// added latency and no state at all.
///
/// Construction allocates and may fail on rate ratios rubato cannot
/// service; both construction and reconstruction happen off the audio
/// thread (at staging time or inside `prepare`).
pub struct RateConverter {
    inner: Option<Converters>,
    host_rate: u32,
    model_rate: u32,
    host_block: usize,
}

struct Converters {
    up: FftFixedInOut<f32>,
    down: FftFixedInOut<f32>,
    input_buf: Vec<Vec<f32>>,
    model_buf: Vec<Vec<f32>>,
    feed_buf: Vec<Vec<f32>>,
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    pub fn new(host_rate: u32, model_rate: u32, host_block: usize) -> Result<Self> {
        if host_rate == model_rate {
            return Ok(Self {
                inner: None,
                host_rate,
                model_rate,
                host_block,
            });
        }

        let up = FftFixedInOut::new(
            host_rate as usize,
            model_rate as usize,
            host_block,
            CHANNELS,
        )
        .with_context(|| format!("unsupported rate conversion {host_rate} -> {model_rate}"))?;

        // The FFT resampler rounds the chunk size up to fit the rate
        // ratio; a chunk that no longer matches the host block cannot be
        // fed block-synchronously.
        if up.input_frames_next() != host_block {
            return Err(anyhow!(
                "rate conversion {host_rate} -> {model_rate} needs {}-frame chunks, host blocks are {host_block}",
                up.input_frames_next()
            ));
        }

        let model_buf = up.output_buffer_allocate(true);
        let model_chunk = model_buf[0].len();

        let down = FftFixedInOut::new(
            model_rate as usize,
            host_rate as usize,
            model_chunk,
            CHANNELS,
        )
        .with_context(|| format!("unsupported rate conversion {model_rate} -> {host_rate}"))?;

        if down.input_frames_next() != model_chunk {
            return Err(anyhow!(
                "rate conversion {model_rate} -> {host_rate} needs {}-frame chunks, model blocks are {model_chunk}",
                down.input_frames_next()
            ));
        }

        let output_buf = down.output_buffer_allocate(true);

        Ok(Self {
            inner: Some(Converters {
                up,
                feed_buf: vec![vec![0.0; model_chunk]],
                down,
                input_buf: vec![vec![0.0; host_block]],
                model_buf,
                output_buf,
            }),
            host_rate,
            model_rate,
            host_block,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    pub fn host_rate(&self) -> u32 {
        self.host_rate
    }

    pub fn model_rate(&self) -> u32 {
        self.model_rate
    }

    /// Largest model-rate block `to_model_rate` can produce; used to size
    /// inference scratch buffers ahead of time.
    pub fn model_frames_max(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(self.host_block, |c| c.model_buf[0].len())
    }

    /// Converts a host-rate block to the model rate.
    pub fn to_model_rate<'a>(&'a mut self, input: &'a [f32]) -> Result<&'a [f32]> {
        let Some(conv) = self.inner.as_mut() else {
            // Inference scratch downstream is sized for host_block; a
            // converter staged before a block-size change must not hand
            // through a block it was never sized for.
            if input.len() > self.host_block {
                return Err(anyhow!(
                    "input block size mismatch: expected at most {}, got {}",
                    self.host_block,
                    input.len()
                ));
            }
            return Ok(input);
        };

        if input.len() != conv.input_buf[0].len() {
            return Err(anyhow!(
                "input block size mismatch: expected {}, got {}",
                conv.input_buf[0].len(),
                input.len()
            ));
        }
        conv.input_buf[0].copy_from_slice(input);

        let (_, frames) = conv
            .up
            .process_into_buffer(&conv.input_buf, &mut conv.model_buf, None)
            .context("upsampling to model rate failed")?;

        Ok(&conv.model_buf[0][..frames])
    }

    /// Converts a model-rate block back to the host rate, writing into
    /// `out` (padding with silence if the converter comes up short).
    pub fn to_host_rate(&mut self, processed: &[f32], out: &mut [f32]) -> Result<()> {
        let Some(conv) = self.inner.as_mut() else {
            let n = processed.len().min(out.len());
            out[..n].copy_from_slice(&processed[..n]);
            out[n..].fill(0.0);
            return Ok(());
        };

        if processed.len() != conv.feed_buf[0].len() {
            return Err(anyhow!(
                "model block size mismatch: expected {}, got {}",
                conv.feed_buf[0].len(),
                processed.len()
            ));
        }
        conv.feed_buf[0].copy_from_slice(processed);

        let (_, frames) = conv
            .down
            .process_into_buffer(&conv.feed_buf, &mut conv.output_buf, None)
            .context("downsampling to host rate failed")?;

        let n = frames.min(out.len());
        out[..n].copy_from_slice(&conv.output_buf[0][..n]);
        out[n..].fill(0.0);

        Ok(())
    }

    pub fn reset(&mut self) {
        if let Some(conv) = self.inner.as_mut() {
            conv.up.reset();
            conv.down.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 256;

    #[test]
    fn test_matching_rates_are_exact_passthrough() {
        let mut conv = RateConverter::new(48_000, 48_000, BLOCK).unwrap();
        assert!(conv.is_passthrough());

        let input: Vec<f32> = (0..BLOCK).map(|i| (i as f32 * 0.01).sin()).collect();
        let up = conv.to_model_rate(&input).unwrap().to_vec();
        assert_eq!(up, input);

        let mut out = vec![0.0f32; BLOCK];
        conv.to_host_rate(&up, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_round_trip_preserves_signal_level() {
        let mut conv = RateConverter::new(48_000, 96_000, BLOCK).unwrap();
        assert!(!conv.is_passthrough());

        let mut out = vec![0.0f32; BLOCK];
        let mut input_rms = 0.0;
        let mut output_rms = 0.0;

        // Run enough blocks to flush the converter's startup latency.
        for block_idx in 0..40 {
            let input: Vec<f32> = (0..BLOCK)
                .map(|i| {
                    let t = (block_idx * BLOCK + i) as f32 / 48_000.0;
                    (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
                })
                .collect();

            let up = conv.to_model_rate(&input).unwrap().to_vec();
            conv.to_host_rate(&up, &mut out).unwrap();

            if block_idx >= 20 {
                input_rms += input.iter().map(|x| x * x).sum::<f32>();
                output_rms += out.iter().map(|x| x * x).sum::<f32>();
            }
        }

        let ratio = (output_rms / input_rms).sqrt();
        assert!(
            ratio > 0.9 && ratio < 1.1,
            "signal level not preserved, got ratio {ratio:.4}"
        );
    }

    #[test]
    fn test_upsample_doubles_frame_count() {
        let mut conv = RateConverter::new(48_000, 96_000, BLOCK).unwrap();
        let input = vec![0.0f32; BLOCK];
        let up = conv.to_model_rate(&input).unwrap();
        assert_eq!(up.len(), BLOCK * 2);
    }

    #[test]
    fn test_passthrough_rejects_oversized_block() {
        let mut conv = RateConverter::new(48_000, 48_000, BLOCK).unwrap();

        let oversized = vec![0.0f32; BLOCK * 2];
        assert!(conv.to_model_rate(&oversized).is_err());

        let exact = vec![0.0f32; BLOCK];
        assert!(conv.to_model_rate(&exact).is_ok());
    }

    #[test]
    fn test_ratio_that_cannot_chunk_into_the_block_is_rejected() {
        // 48000:44100 reduces to 160:147, which does not divide 256.
        assert!(RateConverter::new(48_000, 44_100, BLOCK).is_err());
    }

    #[test]
    fn test_block_size_mismatch_is_an_error() {
        let mut conv = RateConverter::new(48_000, 96_000, BLOCK).unwrap();
        let input = vec![0.0f32; BLOCK / 2];
        assert!(conv.to_model_rate(&input).is_err());
    }
}
