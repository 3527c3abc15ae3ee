use anyhow::{Context, Result, anyhow};
use hound::WavReader;
use log::debug;
use std::path::{Path, PathBuf};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const MAX_IR_LENGTH_SECONDS: u64 = 5;

/// Display/bookkeeping info for a successfully loaded impulse response.
#[derive(Debug, Clone)]
pub struct IrInfo {
    pub name: String,
    pub path: PathBuf,
    pub length: usize,
}

/// Reads an impulse response WAV, mixes it to mono, resamples it to the
/// host rate and peak-normalizes it. Control-thread only.
pub fn load_ir(path: &Path, target_sample_rate: u32) -> Result<(Vec<f32>, IrInfo)> {
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open IR file {}", path.display()))?;
    let spec = reader.spec();

    if reader.duration() as u64 > spec.sample_rate as u64 * MAX_IR_LENGTH_SECONDS {
        return Err(anyhow!(
            "IR is too long: {:.1} seconds (max {})",
            reader.duration() as f64 / spec.sample_rate as f64,
            MAX_IR_LENGTH_SECONDS
        ));
    }

    let samples: Vec<f32> = if spec.sample_format == hound::SampleFormat::Float {
        reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read float samples")?
    } else {
        let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
        reader
            .into_samples::<i32>()
            .map(|s| s.map(|v| v as f32 / max_val))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read integer samples")?
    };

    let mono = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|c| c.iter().sum::<f32>() / spec.channels as f32)
            .collect()
    } else {
        samples
    };

    let mut ir = if spec.sample_rate != target_sample_rate {
        debug!(
            "Resampling IR from {} Hz to {} Hz",
            spec.sample_rate, target_sample_rate
        );
        resample(&mono, spec.sample_rate, target_sample_rate)?
    } else {
        mono
    };

    if let Some(max) = ir.iter().fold(None::<f32>, |m, &x| {
        Some(m.map_or(x.abs(), |mm| mm.max(x.abs())))
    }) && max > 0.0
    {
        let g = 0.9 / max;
        for s in &mut ir {
            *s *= g;
        }
    }

    let name = path
        .file_stem()
        .map_or_else(|| "unknown".to_string(), |s| s.to_string_lossy().into_owned());

    let info = IrInfo {
        name,
        path: path.to_path_buf(),
        length: ir.len(),
    };

    Ok((ir, info))
}

/// resample takes input samples at a given sample rate and returns them at the target rate
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)?;

    let input = vec![samples.to_vec()];
    let output = resampler.process(&input, None)?;

    output
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("resampling produced no output"))
}
