pub mod gate;
pub mod model;
pub mod params;
pub mod resample;
pub mod tonestack;

use anyhow::{Result, anyhow};
use arc_swap::ArcSwap;
use crossbeam::channel::{Receiver, Sender, bounded};
use log::{debug, error, warn};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crate::amp::gate::{GateHandle, GateTrigger};
use crate::amp::model::{Model, ModelInfo};
use crate::amp::params::{ParamTable, db_to_gain};
use crate::amp::resample::RateConverter;
use crate::amp::tonestack::{FirstOrderToneStack, ToneStack};
use crate::ir::{CabConvolver, IrInfo, load_ir};

const CONTROL_QUEUE: usize = 16;
const RECLAIM_QUEUE: usize = 64;

/// Fixed makeup gain applied whenever a cabinet IR is active, compensating
/// for the level the convolution typically eats.
const IR_MAKEUP_DB: f32 = 6.0;

/// Host stream parameters, published by `prepare` and read by the control
/// side when it builds staged payloads.
#[derive(Debug, Clone, Copy)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub max_block: usize,
}

impl Default for StreamSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            max_block: 256,
        }
    }
}

/// A model plus everything the audio thread needs to run it: the rate
/// converter for its native rate, an inference scratch buffer and the
/// loudness compensation gain. Built entirely on the control thread so
/// applying it is nothing but a pointer swap.
///
/// `converter` is `None` when the host/model rate pair could not be
/// serviced; the engine then bypasses inference instead of failing.
pub struct ActiveModel {
    model: Box<dyn Model>,
    converter: Option<RateConverter>,
    model_buf: Vec<f32>,
    norm_gain: f32,
}

enum EngineMessage {
    StageModel(Box<ActiveModel>),
    RemoveModel,
    StageIr(Box<CabConvolver>),
    RemoveIr,
}

/// Superseded DSP units handed off the audio thread for destruction.
pub enum Reclaimed {
    Model(Box<ActiveModel>),
    Ir(Box<CabConvolver>),
}

/// The real-time engine. Lives on the audio thread after construction;
/// all control traffic arrives through the staging channel.
pub struct NeuralAmp {
    rx_control: Receiver<EngineMessage>,
    tx_reclaim: Sender<Reclaimed>,

    params: Arc<ParamTable>,
    gate: GateTrigger,
    tone: Box<dyn ToneStack>,

    active: Option<Box<ActiveModel>>,
    ir: Option<Box<CabConvolver>>,

    spec: Arc<ArcSwap<StreamSpec>>,
    sample_rate: u32,
    max_block: usize,
    prepared: bool,
    converter_warned: bool,
}

/// Control-side face of the engine: loads and clears models/IRs, exposes
/// the parameter table and the gate indicator. Clone-able and cheap.
#[derive(Clone)]
pub struct EngineHandle {
    tx_control: Sender<EngineMessage>,
    params: Arc<ParamTable>,
    gate: GateHandle,
    spec: Arc<ArcSwap<StreamSpec>>,
    model_loaded: Arc<AtomicBool>,
    ir_loaded: Arc<AtomicBool>,
}

impl NeuralAmp {
    pub fn new(params: Arc<ParamTable>) -> (Self, EngineHandle, Receiver<Reclaimed>) {
        let (tx_control, rx_control) = bounded(CONTROL_QUEUE);
        let (tx_reclaim, rx_reclaim) = bounded(RECLAIM_QUEUE);

        let spec = Arc::new(ArcSwap::from_pointee(StreamSpec::default()));
        let initial = StreamSpec::default();

        let (gate, gate_handle) =
            GateTrigger::new(initial.sample_rate as f32, initial.max_block);

        let engine = Self {
            rx_control,
            tx_reclaim,
            params: Arc::clone(&params),
            gate,
            tone: Box::new(FirstOrderToneStack::new(initial.sample_rate as f32)),
            active: None,
            ir: None,
            spec: Arc::clone(&spec),
            sample_rate: initial.sample_rate,
            max_block: initial.max_block,
            prepared: false,
            converter_warned: false,
        };

        let handle = EngineHandle {
            tx_control,
            params,
            gate: gate_handle,
            spec,
            model_loaded: Arc::new(AtomicBool::new(false)),
            ir_loaded: Arc::new(AtomicBool::new(false)),
        };

        (engine, handle, rx_reclaim)
    }

    /// Called on rate/block-size changes. May allocate; must not run
    /// concurrently with `process_block`.
    pub fn prepare(&mut self, sample_rate: u32, max_block: usize) {
        self.sample_rate = sample_rate;
        self.max_block = max_block;
        self.spec.store(Arc::new(StreamSpec {
            sample_rate,
            max_block,
        }));

        self.gate.prepare(sample_rate as f32, max_block);
        self.tone = Box::new(FirstOrderToneStack::new(sample_rate as f32));

        if let Some(active) = self.active.as_deref_mut() {
            match RateConverter::new(sample_rate, active.model.sample_rate(), max_block) {
                Ok(converter) => {
                    active.model_buf = vec![0.0; converter.model_frames_max()];
                    active.converter = Some(converter);
                }
                Err(e) => {
                    warn!("cannot resample for active model: {e}; inference bypassed");
                    active.converter = None;
                }
            }
            active.model.reset();
            self.converter_warned = false;
        }

        if let Some(ir) = self.ir.as_deref_mut() {
            ir.reset();
        }

        self.prepared = true;
        debug!("engine prepared: {sample_rate} Hz, {max_block} frames");
    }

    /// Moves staged DSP units into the active slots. This is the only
    /// point where ownership crosses onto the audio thread, so a model is
    /// never observed half-constructed. Draining the whole queue makes
    /// the newest staging request win.
    fn apply_staging(&mut self) {
        while let Ok(message) = self.rx_control.try_recv() {
            match message {
                EngineMessage::StageModel(staged) => {
                    if let Some(old) = self.active.replace(staged) {
                        self.reclaim(Reclaimed::Model(old));
                    }
                    self.converter_warned = false;
                }
                EngineMessage::RemoveModel => {
                    if let Some(old) = self.active.take() {
                        self.reclaim(Reclaimed::Model(old));
                    }
                }
                EngineMessage::StageIr(convolver) => {
                    if let Some(old) = self.ir.replace(convolver) {
                        self.reclaim(Reclaimed::Ir(old));
                    }
                }
                EngineMessage::RemoveIr => {
                    if let Some(old) = self.ir.take() {
                        self.reclaim(Reclaimed::Ir(old));
                    }
                }
            }
        }
    }

    fn reclaim(&self, item: Reclaimed) {
        // Dropping here would free memory on the audio thread; only the
        // reclaim channel being full (reclaim thread dead) forces that.
        if self.tx_reclaim.try_send(item).is_err() {
            error!("reclaim channel full, dropping superseded DSP unit in place");
        }
    }

    /// Processes one block in place. Channel 0 is the engine's mono path;
    /// every other channel receives a copy of it afterwards (dual mono).
    ///
    /// Never allocates, never blocks, never panics across the boundary:
    /// any internal fault degrades to passing the input through. Calling
    /// before `prepare` is a no-op.
    pub fn process_block(&mut self, channels: &mut [&mut [f32]]) {
        self.apply_staging();

        if !self.prepared {
            return;
        }
        let Some((block, rest)) = channels.split_first_mut() else {
            return;
        };
        let block: &mut [f32] = block;
        let n = block.len();
        if n > self.max_block {
            error!("block of {n} frames exceeds prepared maximum {}", self.max_block);
            return;
        }

        let p = self.params.snapshot();

        let input_gain = db_to_gain(p.input_level_db);
        for s in block.iter_mut() {
            *s *= input_gain;
        }

        // The gate keys off the pre-gate signal; its gain is applied to
        // the post-model signal below.
        self.gate.detect(block, p.gate_threshold_db);

        let mut norm_gain = 1.0;
        if let Some(active) = self.active.as_deref_mut() {
            norm_gain = active.norm_gain;

            let ActiveModel {
                model,
                converter,
                model_buf,
                ..
            } = active;

            if let Some(converter) = converter.as_mut() {
                match converter.to_model_rate(block) {
                    Ok(up) => {
                        let frames = up.len();
                        model.process(up, &mut model_buf[..frames]);
                        if let Err(e) = converter.to_host_rate(&model_buf[..frames], block) {
                            error!("downsampling failed: {e}");
                        }
                    }
                    Err(e) => error!("upsampling failed: {e}"),
                }
            } else if !self.converter_warned {
                warn!(
                    "model rate {} unsupported at host rate {}; inference bypassed",
                    model.sample_rate(),
                    self.sample_rate
                );
                self.converter_warned = true;
            }
        }

        self.gate.apply(block);

        if p.tonestack_enabled {
            self.tone.set_params(p.bass, p.mid, p.treble);
            self.tone.process(block);
        }

        if p.out_norm_enabled && norm_gain != 1.0 {
            for s in block.iter_mut() {
                *s *= norm_gain;
            }
        }

        let output_gain = db_to_gain(p.output_level_db);
        for s in block.iter_mut() {
            *s *= output_gain;
        }

        if let Some(ir) = self.ir.as_deref_mut() {
            ir.process_block(block);
            let makeup = db_to_gain(IR_MAKEUP_DB);
            for s in block.iter_mut() {
                *s *= makeup;
            }
        }

        for ch in rest.iter_mut() {
            let len = ch.len().min(n);
            ch[..len].copy_from_slice(&block[..len]);
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }
}

impl EngineHandle {
    pub fn params(&self) -> &Arc<ParamTable> {
        &self.params
    }

    /// True while the gate is audibly attenuating and the gate feature is
    /// not at its "OFF" threshold. Display only.
    pub fn is_gating(&self) -> bool {
        self.gate.is_gating()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model_loaded.load(Ordering::Relaxed)
    }

    pub fn is_ir_loaded(&self) -> bool {
        self.ir_loaded.load(Ordering::Relaxed)
    }

    /// Loads a model from disk and stages it for the audio thread. On
    /// failure the currently active model keeps running unchanged. A
    /// second call before the swap applies supersedes the first.
    pub fn load_model(&self, path: &Path) -> Result<ModelInfo> {
        let loaded = model::load_model(path)?;
        let spec = **self.spec.load();

        let converter =
            match RateConverter::new(spec.sample_rate, loaded.info.sample_rate, spec.max_block) {
                Ok(converter) => Some(converter),
                Err(e) => {
                    warn!("cannot resample for model '{}': {e}", loaded.info.name);
                    None
                }
            };

        let model_buf = vec![
            0.0;
            converter
                .as_ref()
                .map_or(spec.max_block, RateConverter::model_frames_max)
        ];

        let staged = Box::new(ActiveModel {
            model: loaded.model,
            converter,
            model_buf,
            norm_gain: loaded.info.norm_gain,
        });

        self.stage(EngineMessage::StageModel(staged))?;
        self.model_loaded.store(true, Ordering::Relaxed);
        Ok(loaded.info)
    }

    pub fn clear_model(&self) -> Result<()> {
        self.stage(EngineMessage::RemoveModel)?;
        self.model_loaded.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Loads a cabinet IR and stages a ready-to-run convolver for it.
    pub fn load_ir(&self, path: &Path) -> Result<IrInfo> {
        let spec = **self.spec.load();
        let (samples, info) = load_ir(path, spec.sample_rate)?;

        let mut convolver = Box::new(CabConvolver::new());
        convolver.set_ir(&samples)?;

        self.stage(EngineMessage::StageIr(convolver))?;
        self.ir_loaded.store(true, Ordering::Relaxed);
        Ok(info)
    }

    pub fn clear_ir(&self) -> Result<()> {
        self.stage(EngineMessage::RemoveIr)?;
        self.ir_loaded.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn stage(&self, message: EngineMessage) -> Result<()> {
        self.tx_control
            .try_send(message)
            .map_err(|_| anyhow!("engine staging queue unavailable"))
    }
}

/// Drains the reclaim channel, dropping superseded models and convolvers
/// off the audio thread. Exits when the engine goes away.
pub fn spawn_reclaim_thread(rx_reclaim: Receiver<Reclaimed>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for item in rx_reclaim.iter() {
            match item {
                Reclaimed::Model(_) => debug!("reclaimed superseded model"),
                Reclaimed::Ir(_) => debug!("reclaimed superseded IR convolver"),
            }
        }
    })
}
