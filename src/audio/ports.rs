use anyhow::{Context, Result};
use jack::{AudioIn, AudioOut, Client, Port, ProcessScope};

pub struct Ports {
    input: Port<AudioIn>,
    output_left: Port<AudioOut>,
    output_right: Port<AudioOut>,
}

impl Ports {
    pub fn new(client: &Client) -> Result<Self> {
        Ok(Self {
            input: client
                .register_port("in_port", AudioIn::default())
                .context("failed to register in port")?,
            output_left: client
                .register_port("out_port_left", AudioOut::default())
                .context("failed to register out port left")?,
            output_right: client
                .register_port("out_port_right", AudioOut::default())
                .context("failed to register out port right")?,
        })
    }

    pub fn get_input<'a>(&'a self, ps: &'a ProcessScope) -> &'a [f32] {
        self.input.as_slice(ps)
    }

    pub fn write_stereo(&mut self, ps: &ProcessScope, left: &[f32], right: &[f32]) {
        let output_size = ps.n_frames() as usize;
        let out_left = self.output_left.as_mut_slice(ps);
        let out_right = self.output_right.as_mut_slice(ps);

        let left_count = left.len().min(output_size);
        out_left[..left_count].copy_from_slice(&left[..left_count]);
        out_left[left_count..output_size].fill(0.0);

        let right_count = right.len().min(output_size);
        out_right[..right_count].copy_from_slice(&right[..right_count]);
        out_right[right_count..output_size].fill(0.0);
    }

    pub fn silence_output(&mut self, ps: &ProcessScope) {
        let output_size = ps.n_frames() as usize;
        self.output_left.as_mut_slice(ps)[..output_size].fill(0.0);
        self.output_right.as_mut_slice(ps)[..output_size].fill(0.0);
    }
}
