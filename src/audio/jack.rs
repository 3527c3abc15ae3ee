use anyhow::{Context, Result};
use jack::{Client, Control, Frames, ProcessScope};
use log::{debug, warn};

use crate::amp::NeuralAmp;
use crate::audio::ports::Ports;

pub struct NotificationHandler;

impl jack::NotificationHandler for NotificationHandler {
    fn sample_rate(&mut self, _: &Client, sample_rate: Frames) -> Control {
        debug!(">> JACK sample_rate changed to {sample_rate}");

        Control::Continue
    }
}

/// Bridges JACK callbacks onto the engine: mono capture in, processed
/// dual-mono stereo out.
pub struct ProcessHandler {
    ports: Ports,
    engine: NeuralAmp,
    left: Vec<f32>,
    right: Vec<f32>,
}

impl ProcessHandler {
    pub fn new(client: &Client, mut engine: NeuralAmp) -> Result<Self> {
        let ports = Ports::new(client).context("failed to create audio ports")?;
        let buffer_size = client.buffer_size() as usize;

        engine.prepare(client.sample_rate() as u32, buffer_size);

        Ok(Self {
            ports,
            engine,
            left: vec![0.0; buffer_size],
            right: vec![0.0; buffer_size],
        })
    }
}

impl jack::ProcessHandler for ProcessHandler {
    fn process(&mut self, _client: &Client, ps: &ProcessScope) -> Control {
        let n = ps.n_frames() as usize;
        if n > self.left.len() {
            warn!("callback of {n} frames exceeds prepared buffers, skipping");
            self.ports.silence_output(ps);
            return Control::Continue;
        }

        let input = self.ports.get_input(ps);
        self.left[..n].copy_from_slice(input);

        {
            let mut channels: [&mut [f32]; 2] = [&mut self.left[..n], &mut self.right[..n]];
            self.engine.process_block(&mut channels);
        }

        self.ports.write_stereo(ps, &self.left[..n], &self.right[..n]);
        Control::Continue
    }

    fn buffer_size(&mut self, client: &Client, frames: Frames) -> Control {
        let new_size = frames as usize;
        warn!("buffer_size changed to {new_size} frames");

        self.left.resize(new_size, 0.0);
        self.right.resize(new_size, 0.0);
        self.engine.prepare(client.sample_rate() as u32, new_size);

        Control::Continue
    }
}
