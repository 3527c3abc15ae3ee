use anyhow::{Context, Result};
use jack::{AsyncClient, Client, ClientOptions};
use log::{info, warn};
use std::path::Path;
use std::thread::JoinHandle;

use crate::amp::{EngineHandle, NeuralAmp, spawn_reclaim_thread};
use crate::audio::jack::{NotificationHandler, ProcessHandler};
use crate::settings::{AudioSettings, NULL_SENTINEL, Settings};

pub struct Manager {
    active_client: AsyncClient<NotificationHandler, ProcessHandler>,
    engine_handle: EngineHandle,
    settings: Settings,
    _reclaim_thread: JoinHandle<()>,
}

impl Manager {
    pub fn new(settings: Settings) -> Result<Self> {
        let (client, _) = Client::new("namhost", ClientOptions::NO_START_SERVER)
            .context("failed to create JACK client")?;

        let params = std::sync::Arc::new(crate::amp::params::ParamTable::new());
        let (engine, engine_handle, rx_reclaim) = NeuralAmp::new(params);
        let reclaim_thread = spawn_reclaim_thread(rx_reclaim);

        let jack_handler =
            ProcessHandler::new(&client, engine).context("failed to create process handler")?;

        let active_client = client
            .activate_async(NotificationHandler, jack_handler)
            .context("failed to activate async client")?;

        let mut manager = Self {
            active_client,
            engine_handle,
            settings: settings.clone(),
            _reclaim_thread: reclaim_thread,
        };

        manager.connect_ports(&settings.audio);

        Ok(manager)
    }

    /// Connect audio ports based on settings
    fn connect_ports(&mut self, settings: &AudioSettings) {
        let client = self.active_client.as_client();

        if let Err(e) = client.connect_ports_by_name(&settings.input_port, "namhost:in_port") {
            warn!(
                "Failed to connect input port '{}': {}",
                settings.input_port, e
            );
        } else {
            info!("Connected input: {} -> namhost:in_port", settings.input_port);
        }

        if let Err(e) =
            client.connect_ports_by_name("namhost:out_port_left", &settings.output_left_port)
        {
            warn!(
                "Failed to connect left output port '{}': {}",
                settings.output_left_port, e
            );
        } else {
            info!(
                "Connected left output: namhost:out_port_left -> {}",
                settings.output_left_port
            );
        }

        if let Err(e) =
            client.connect_ports_by_name("namhost:out_port_right", &settings.output_right_port)
        {
            warn!(
                "Failed to connect right output port '{}': {}",
                settings.output_right_port, e
            );
        } else {
            info!(
                "Connected right output: namhost:out_port_right -> {}",
                settings.output_right_port
            );
        }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine_handle
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Loads a model and records it in the persisted session info.
    pub fn load_model(&mut self, path: &Path) -> Result<()> {
        let info = self.engine_handle.load_model(path)?;
        info!("Loaded model '{}' ({} Hz)", info.name, info.sample_rate);

        self.settings.session.set_model(path, &info.name);
        if let Err(e) = self.settings.save() {
            warn!("Failed to persist session info: {e}");
        }
        Ok(())
    }

    pub fn clear_model(&mut self) -> Result<()> {
        self.engine_handle.clear_model()?;
        self.settings.session.clear_model();
        if let Err(e) = self.settings.save() {
            warn!("Failed to persist session info: {e}");
        }
        Ok(())
    }

    /// Loads a cabinet IR and records it in the persisted session info.
    pub fn load_ir(&mut self, path: &Path) -> Result<()> {
        let info = self.engine_handle.load_ir(path)?;
        info!("Loaded IR '{}' ({} samples)", info.name, info.length);

        self.settings.session.set_ir(path, &info.name);
        if let Err(e) = self.settings.save() {
            warn!("Failed to persist session info: {e}");
        }
        Ok(())
    }

    pub fn clear_ir(&mut self) -> Result<()> {
        self.engine_handle.clear_ir()?;
        self.settings.session.clear_ir();
        if let Err(e) = self.settings.save() {
            warn!("Failed to persist session info: {e}");
        }
        Ok(())
    }

    /// Re-loads whatever the previous session left active.
    pub fn restore_session(&mut self) {
        let model_path = self.settings.session.last_model_path.clone();
        if model_path != NULL_SENTINEL {
            if let Err(e) = self.load_model(Path::new(&model_path)) {
                warn!("Failed to restore model '{model_path}': {e}");
            }
        }

        let ir_path = self.settings.session.last_ir_path.clone();
        if ir_path != NULL_SENTINEL {
            if let Err(e) = self.load_ir(Path::new(&ir_path)) {
                warn!("Failed to restore IR '{ir_path}': {e}");
            }
        }
    }

    pub fn sample_rate(&self) -> usize {
        self.active_client.as_client().sample_rate() as usize
    }

    pub fn buffer_size(&self) -> usize {
        self.active_client.as_client().buffer_size() as usize
    }
}
