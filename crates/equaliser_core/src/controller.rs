//! EQ Controller - Main Entry Point
//!
//! The controller is what a UI talks to. It owns the current configuration,
//! validates every edit, publishes accepted edits through the
//! [`ParameterBridge`] and drives the stream thread.
//!
//! # Threads
//!
//! ```text
//!   caller ──edits──▶ EqController ──publish──▶ ParameterBridge ──▶ audio callback
//!                          │
//!                          └──Command──▶ stream thread (owns cpal streams)
//! ```
//!
//! cpal streams are not `Send` on every platform, so they live on a
//! dedicated thread for their whole life. Start/stop requests are
//! answered synchronously over a reply channel.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use equaliser_dsp::{
    frequency_response, Band, BandId, BandParameters, DspError, EngineConfig, MeterReading,
    ResponsePoint,
};

use crate::bridge::{ConfigSnapshot, ParameterBridge};
use crate::config::StreamConfig;
use crate::device::{resolve_device, AudioDevice, DeviceType};
use crate::error::{EngineError, EngineResult};
use crate::levels::MeterBank;
use crate::message::{Command, Event, StartRequest};
use crate::stream::{AudioStream, StopHandle, StreamState, StreamStatus};

/// Bound on queued events; audio-side senders drop events when full
const EVENT_CAPACITY: usize = 64;

/// Point-in-time view for the UI
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub input: MeterReading,
    pub output: MeterReading,
    #[serde(serialize_with = "serialize_config")]
    pub config: Arc<ConfigSnapshot>,
    pub active_generation: u64,
    pub state: StreamState,
    pub underruns: u64,
    pub overruns: u64,
    pub design_failures: u64,
    /// The last stream ended because a device went away
    pub device_lost: bool,
}

fn serialize_config<S: serde::Serializer>(
    snapshot: &Arc<ConfigSnapshot>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    snapshot.config.serialize(serializer)
}

/// Control surface of the equaliser
pub struct EqController {
    bridge: ParameterBridge,
    meters: Arc<MeterBank>,
    status: Arc<StreamStatus>,
    stream_config: StreamConfig,
    input_device: Option<String>,
    output_device: Option<String>,
    next_band_id: u32,
    device_loss_reported: bool,

    command_sender: Sender<Command>,
    event_sender: Sender<Event>,
    event_receiver: Receiver<Event>,
    stream_thread: Option<JoinHandle<()>>,
}

impl EqController {
    /// Controller with the default (empty, -3 dB) config and stream settings
    pub fn new() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default(), StreamConfig::default())
    }

    pub fn with_config(config: EngineConfig, stream_config: StreamConfig) -> EngineResult<Self> {
        stream_config.validate().map_err(EngineError::ConfigError)?;
        config.validate_for_rate(stream_config.sample_rate as f64)?;

        let (command_sender, command_receiver) = bounded::<Command>(8);
        let (event_sender, event_receiver) = bounded::<Event>(EVENT_CAPACITY);
        let status = Arc::new(StreamStatus::new());

        let thread_status = Arc::clone(&status);
        let stream_thread = thread::Builder::new()
            .name("equaliser-stream".into())
            .spawn(move || stream_thread_main(command_receiver, thread_status))
            .map_err(|e| EngineError::DeviceError(e.to_string()))?;

        Ok(Self {
            next_band_id: next_id_after(&config),
            device_loss_reported: false,
            bridge: ParameterBridge::new(config),
            meters: Arc::new(MeterBank::new()),
            status,
            stream_config,
            input_device: None,
            output_device: None,
            command_sender,
            event_sender,
            event_receiver,
            stream_thread: Some(stream_thread),
        })
    }

    // ---- Edits -----------------------------------------------------------

    /// Replace the parameters of band `index`, keeping its identity
    pub fn submit_band_edit(
        &mut self,
        index: usize,
        params: BandParameters,
    ) -> EngineResult<Arc<ConfigSnapshot>> {
        self.publish_edit("band edit", |config| config.with_band_replaced(index, params))
    }

    /// Append a band; returns its new id
    pub fn add_band(&mut self, params: BandParameters) -> EngineResult<BandId> {
        let id = BandId(self.next_band_id);
        self.publish_edit("add band", |config| config.with_band(Band::new(id, params)))?;
        self.next_band_id += 1;
        Ok(id)
    }

    pub fn remove_band(&mut self, index: usize) -> EngineResult<Arc<ConfigSnapshot>> {
        self.publish_edit("remove band", |config| config.without_band(index))
    }

    pub fn set_band_enabled(
        &mut self,
        index: usize,
        enabled: bool,
    ) -> EngineResult<Arc<ConfigSnapshot>> {
        self.publish_edit("enable band", |config| {
            config.with_band_enabled(index, enabled)
        })
    }

    pub fn move_band(&mut self, from: usize, to: usize) -> EngineResult<Arc<ConfigSnapshot>> {
        self.publish_edit("move band", |config| config.with_band_moved(from, to))
    }

    pub fn set_global_gain(&mut self, gain_db: f64) -> EngineResult<Arc<ConfigSnapshot>> {
        self.publish_edit("global gain", |config| config.with_global_gain(gain_db))
    }

    pub fn set_bypass(&mut self, bypass: bool) -> EngineResult<Arc<ConfigSnapshot>> {
        self.publish_edit("bypass", |config| Ok(config.with_bypass(bypass)))
    }

    /// Replace the whole configuration (e.g. a preset)
    pub fn load_config(&mut self, config: EngineConfig) -> EngineResult<Arc<ConfigSnapshot>> {
        let next_id = next_id_after(&config);
        let snapshot = self.publish_edit("load config", move |_| Ok(config))?;
        self.next_band_id = self.next_band_id.max(next_id);
        Ok(snapshot)
    }

    /// Validate, then publish. A rejected edit leaves the current config
    /// in effect.
    fn publish_edit<F>(&mut self, what: &str, edit: F) -> EngineResult<Arc<ConfigSnapshot>>
    where
        F: FnOnce(&EngineConfig) -> Result<EngineConfig, DspError>,
    {
        let current = self.bridge.latest();
        let next = edit(&current.config)
            .and_then(|next| {
                next.validate_for_rate(self.stream_config.sample_rate as f64)?;
                Ok(next)
            })
            .map_err(|e| {
                warn!("Rejected {}: {}", what, e);
                EngineError::InvalidParameter(e)
            })?;

        let snapshot = self.bridge.publish(next);
        debug!("Published {} as generation {}", what, snapshot.generation);
        let _ = self.event_sender.try_send(Event::ConfigPublished {
            generation: snapshot.generation,
        });
        Ok(snapshot)
    }

    // ---- Stream ----------------------------------------------------------

    /// Choose devices by id (`None` = system default). Restarts a running
    /// stream on the new devices.
    pub fn select_devices(
        &mut self,
        input_id: Option<String>,
        output_id: Option<String>,
    ) -> EngineResult<()> {
        info!(
            "Selecting devices: input {:?}, output {:?}",
            input_id.as_deref().unwrap_or("<default>"),
            output_id.as_deref().unwrap_or("<default>")
        );
        self.input_device = input_id;
        self.output_device = output_id;
        if self.is_running() {
            self.restart()?;
        }
        Ok(())
    }

    /// Change rate and buffer size. Rejected if any band would sit at or
    /// above the new Nyquist frequency. Restarts a running stream, which
    /// builds a fresh engine with cleared filter state.
    pub fn set_sample_rate_and_buffer(
        &mut self,
        sample_rate: u32,
        buffer_size: u32,
    ) -> EngineResult<()> {
        let next = StreamConfig {
            sample_rate,
            buffer_size,
            ..self.stream_config
        };
        next.validate().map_err(EngineError::ConfigError)?;
        self.bridge
            .latest()
            .config
            .validate_for_rate(sample_rate as f64)
            .map_err(|e| {
                warn!("Rejected rate change to {} Hz: {}", sample_rate, e);
                EngineError::InvalidParameter(e)
            })?;

        self.stream_config = next;
        if self.is_running() {
            self.restart()?;
        }
        Ok(())
    }

    /// Start capture -> EQ -> playback on the selected devices
    pub fn start(&mut self) -> EngineResult<()> {
        if self.status.state() != StreamState::Stopped {
            return Err(EngineError::AlreadyRunning);
        }
        info!("Starting stream");

        let (reply, response) = bounded(1);
        let request = StartRequest {
            input_device: self.input_device.clone(),
            output_device: self.output_device.clone(),
            config: self.stream_config,
            reader: self.bridge.reader(),
            meters: Arc::clone(&self.meters),
            events: self.event_sender.clone(),
            reply,
        };
        self.send_command(Command::Start(Box::new(request)))?;
        response.recv().map_err(|_| EngineError::ChannelRecvError)??;
        self.device_loss_reported = false;

        let _ = self.event_sender.try_send(Event::Started {
            sample_rate: self.stream_config.sample_rate,
            buffer_size: self.stream_config.buffer_size,
        });
        Ok(())
    }

    /// Stop the stream. Safe to call when already stopped.
    pub fn stop(&mut self) -> EngineResult<()> {
        let (reply, response) = bounded(1);
        self.send_command(Command::Stop { reply })?;
        response.recv().map_err(|_| EngineError::ChannelRecvError)?;
        self.meters.clear();
        self.bridge.collect_garbage();
        let _ = self.event_sender.try_send(Event::Stopped);
        Ok(())
    }

    /// Stop and start again with the current devices and stream settings
    pub fn restart(&mut self) -> EngineResult<()> {
        if !self.is_running() {
            return Err(EngineError::NotRunning);
        }
        self.stop()?;
        self.start()
    }

    /// Handle that can cancel a start in progress from another thread
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.status))
    }

    pub fn is_running(&self) -> bool {
        self.status.state() == StreamState::Running
    }

    // ---- Queries ---------------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        let (input, output) = self.meters.read();
        Snapshot {
            input,
            output,
            config: self.bridge.latest(),
            active_generation: self.bridge.active_generation(),
            state: self.status.state(),
            underruns: self.status.underruns(),
            overruns: self.status.overruns(),
            design_failures: self.status.design_failures(),
            device_lost: self.status.device_lost(),
        }
    }

    /// Current (latest published) configuration
    pub fn config(&self) -> Arc<ConfigSnapshot> {
        self.bridge.latest()
    }

    pub fn stream_config(&self) -> &StreamConfig {
        &self.stream_config
    }

    /// Magnitude response of the current config at the stream's rate
    pub fn response_curve(&self, points: usize) -> EngineResult<Vec<ResponsePoint>> {
        let snapshot = self.bridge.latest();
        Ok(frequency_response(
            &snapshot.config,
            self.stream_config.sample_rate as f64,
            points,
        )?)
    }

    /// Next pending event (non-blocking).
    ///
    /// Device loss comes first, whatever is queued: the stream is torn
    /// down and `DeviceLost` is returned once. It is not restarted
    /// automatically.
    pub fn poll_event(&mut self) -> Option<Event> {
        if self.status.device_lost() && !self.device_loss_reported {
            self.device_loss_reported = true;
            error!("Audio device lost, stopping stream");
            if let Err(e) = self.stop() {
                error!("Failed to stop after device loss: {}", e);
            }
            return Some(Event::DeviceLost);
        }

        let event = self.event_receiver.try_recv().ok()?;
        match event {
            Event::BufferUnderrun => self.status.clear_underrun_pending(),
            Event::BufferOverrun => self.status.clear_overrun_pending(),
            _ => {}
        }
        Some(event)
    }

    /// Get all available devices
    pub fn list_devices(&self) -> EngineResult<Vec<AudioDevice>> {
        AudioDevice::enumerate_all()
    }

    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }
}

impl Drop for EqController {
    fn drop(&mut self) {
        let _ = self.command_sender.send(Command::Shutdown);
        if let Some(handle) = self.stream_thread.take() {
            let _ = handle.join();
        }
    }
}

fn next_id_after(config: &EngineConfig) -> u32 {
    config.max_band_id().map_or(0, |id| id.0 + 1)
}

/// Stream thread main loop
fn stream_thread_main(commands: Receiver<Command>, status: Arc<StreamStatus>) {
    info!("Stream thread started");
    let mut stream = AudioStream::new(status);

    for command in commands.iter() {
        match command {
            Command::Start(request) => {
                let StartRequest {
                    input_device,
                    output_device,
                    config,
                    reader,
                    meters,
                    events,
                    reply,
                } = *request;

                let result = resolve_device(DeviceType::Input, input_device.as_deref())
                    .and_then(|input| {
                        let output =
                            resolve_device(DeviceType::Output, output_device.as_deref())?;
                        stream.start(&input, &output, config, reader, meters, events)
                    });
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                stream.stop();
                let _ = reply.send(());
            }
            Command::Shutdown => break,
        }
    }

    stream.stop();
    info!("Stream thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use equaliser_dsp::{FilterType, PRESETS};

    fn peaking(freq: f64, gain: f64) -> BandParameters {
        BandParameters::peaking(freq, gain, 1.0).unwrap()
    }

    #[test]
    fn test_new_controller_defaults() {
        let controller = EqController::new().unwrap();
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, StreamState::Stopped);
        assert_eq!(snapshot.config.generation, 0);
        assert!(snapshot.config.config.is_empty());
        assert_eq!(snapshot.config.config.global_gain_db(), -3.0);
        assert_eq!(snapshot.input, MeterReading::SILENT);
    }

    #[test]
    fn test_add_band_allocates_unique_ids() {
        let mut controller = EqController::new().unwrap();
        let a = controller.add_band(peaking(100.0, 3.0)).unwrap();
        let b = controller.add_band(peaking(1000.0, -3.0)).unwrap();
        assert_ne!(a, b);

        let config = controller.config();
        assert_eq!(config.generation, 2);
        assert_eq!(config.config.len(), 2);
        assert_eq!(config.config.band(1).unwrap().id, b);
    }

    #[test]
    fn test_invalid_edit_leaves_config_unchanged() {
        let mut controller = EqController::new().unwrap();
        controller.add_band(peaking(1000.0, 6.0)).unwrap();
        let before = controller.config();

        assert!(controller.remove_band(5).is_err());
        assert!(controller.set_global_gain(40.0).is_err());
        assert!(controller.move_band(0, 3).is_err());
        // Above Nyquist at the default 48 kHz
        assert!(controller.add_band(peaking(30000.0, 3.0)).is_err());
        assert!(controller
            .submit_band_edit(0, peaking(24000.0, 3.0))
            .is_err());

        let after = controller.config();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_add_then_remove_restores_config() {
        let mut controller = EqController::new().unwrap();
        controller.add_band(peaking(200.0, 2.0)).unwrap();
        let before = controller.config().config.clone();

        controller.add_band(peaking(5000.0, 4.0)).unwrap();
        controller.remove_band(1).unwrap();
        assert_eq!(controller.config().config, before);
    }

    #[test]
    fn test_edits_publish_events() {
        let mut controller = EqController::new().unwrap();
        controller.set_bypass(true).unwrap();
        assert_eq!(
            controller.poll_event(),
            Some(Event::ConfigPublished { generation: 1 })
        );
        assert_eq!(controller.poll_event(), None);
        assert!(controller.config().config.bypass());
    }

    #[test]
    fn test_band_edit_keeps_identity() {
        let mut controller = EqController::new().unwrap();
        let id = controller.add_band(peaking(1000.0, 0.0)).unwrap();
        let edited = BandParameters::new(FilterType::HighShelf, 6000.0, 4.0, 0.7).unwrap();
        controller.submit_band_edit(0, edited).unwrap();
        controller.set_band_enabled(0, false).unwrap();

        let band = *controller.config().config.band(0).unwrap();
        assert_eq!(band.id, id);
        assert_eq!(band.params, edited);
        assert!(!band.enabled);
    }

    #[test]
    fn test_load_config_advances_id_allocator() {
        let mut controller = EqController::new().unwrap();
        let preset = PRESETS[1].to_config().unwrap();
        controller.load_config(preset).unwrap();

        let id = controller.add_band(peaking(3000.0, 1.0)).unwrap();
        assert_eq!(id, BandId(10));
        assert_eq!(controller.config().config.len(), 11);
    }

    #[test]
    fn test_rate_change_rejected_above_nyquist() {
        let mut controller = EqController::new().unwrap();
        controller.add_band(peaking(20000.0, 3.0)).unwrap();

        let err = controller.set_sample_rate_and_buffer(32000, 256).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
        assert_eq!(controller.stream_config().sample_rate, 48000);

        controller.set_sample_rate_and_buffer(96000, 512).unwrap();
        assert_eq!(controller.stream_config().sample_rate, 96000);
        assert_eq!(controller.stream_config().buffer_size, 512);

        assert!(matches!(
            controller.set_sample_rate_and_buffer(96000, 7),
            Err(EngineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_response_curve() {
        let mut controller = EqController::new().unwrap();
        controller.add_band(peaking(1000.0, 6.0)).unwrap();
        let curve = controller.response_curve(256).unwrap();
        assert_eq!(curve.len(), 256);
        let max = curve
            .iter()
            .map(|p| p.magnitude_db)
            .fold(f64::MIN, f64::max);
        assert!((max - 3.0).abs() < 0.2, "max {max}");

        controller.set_bypass(true).unwrap();
        let flat = controller.response_curve(16).unwrap();
        assert!(flat.iter().all(|p| p.magnitude_db == 0.0));
    }

    #[test]
    fn test_device_loss_reported_when_queue_full() {
        let mut controller = EqController::new().unwrap();
        for i in 0..EVENT_CAPACITY {
            controller.set_bypass(i % 2 == 0).unwrap();
        }
        let loud = MeterReading {
            rms_db: -6.0,
            peak_db: -3.0,
            sequence: 7,
        };
        controller.meters.publish(loud, loud);
        controller.status.force_state(StreamState::Running);
        controller.status.mark_device_lost();

        assert_eq!(controller.poll_event(), Some(Event::DeviceLost));
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.state, StreamState::Stopped);
        assert!(snapshot.device_lost);
        // Stopping cleared the meters
        assert_eq!(snapshot.input, MeterReading::SILENT);

        // Reported once, then the queued edits follow
        assert_eq!(
            controller.poll_event(),
            Some(Event::ConfigPublished { generation: 1 })
        );
        assert!(std::iter::from_fn(|| controller.poll_event()).all(|e| e != Event::DeviceLost));
    }

    #[test]
    fn test_polling_xrun_rearms_reporting() {
        let mut controller = EqController::new().unwrap();
        assert!(controller.status.record_underrun());
        controller.event_sender.try_send(Event::BufferUnderrun).unwrap();
        assert!(!controller.status.record_underrun());

        assert_eq!(controller.poll_event(), Some(Event::BufferUnderrun));
        assert!(controller.status.record_underrun());
        assert_eq!(controller.snapshot().underruns, 3);
    }

    #[test]
    fn test_stop_when_stopped_is_ok() {
        let mut controller = EqController::new().unwrap();
        controller.stop().unwrap();
        assert!(!controller.is_running());
        assert!(matches!(controller.restart(), Err(EngineError::NotRunning)));
    }

    #[test]
    fn test_snapshot_serializes() {
        let controller = EqController::new().unwrap();
        let json = serde_json::to_string(&controller.snapshot()).unwrap();
        assert!(json.contains("global_gain_db"));
        assert!(json.contains("Stopped"));
    }

    #[test]
    fn test_rejects_invalid_construction() {
        let bad_stream = StreamConfig {
            channels: 0,
            ..StreamConfig::default()
        };
        assert!(EqController::with_config(EngineConfig::default(), bad_stream).is_err());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_start_stop_on_default_devices() {
        let mut controller = EqController::new().unwrap();
        controller.add_band(peaking(1000.0, 3.0)).unwrap();
        controller.start().unwrap();
        assert!(controller.is_running());
        assert!(matches!(controller.start(), Err(EngineError::AlreadyRunning)));

        std::thread::sleep(std::time::Duration::from_millis(200));
        assert_eq!(controller.snapshot().active_generation, 1);

        controller.stop().unwrap();
        assert!(!controller.is_running());
    }
}
