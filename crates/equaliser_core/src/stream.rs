//! Audio Stream Management
//!
//! Handles the low-level CPAL stream setup and real-time audio callbacks.
//!
//! # Audio Flow
//!
//! ```text
//!   input device ──capture cb──▶ rtrb ring ──playback cb──▶ StreamProcessor ──▶ output device
//! ```
//!
//! # Lifecycle
//!
//! ```text
//!   Stopped ──start──▶ Starting ──play ok──▶ Running
//!      ▲                  │                     │
//!      │              cancel/fail             stop
//!      │                  ▼                     ▼
//!      └──────────────── Stopping ◀─────────────┘
//!      ▲
//!      └──── device lost (from Running)
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, Stream};
use crossbeam_channel::Sender;
use rtrb::{Consumer, Producer, RingBuffer};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bridge::ConfigReader;
use crate::callback::StreamProcessor;
use crate::config::StreamConfig;
use crate::device::{check_support, DeviceType};
use crate::error::{EngineError, EngineResult};
use crate::levels::MeterBank;
use crate::message::Event;

/// Stream lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum StreamState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => StreamState::Starting,
            2 => StreamState::Running,
            3 => StreamState::Stopping,
            _ => StreamState::Stopped,
        }
    }
}

/// Shared state between audio callbacks and control thread
#[derive(Debug)]
pub struct StreamStatus {
    state: AtomicU8,
    underruns: AtomicU64,
    overruns: AtomicU64,
    design_failures: AtomicU64,
    device_lost: AtomicBool,
    // Set while an underrun/overrun event is queued and not yet polled
    underrun_pending: AtomicBool,
    overrun_pending: AtomicBool,
}

impl StreamStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(StreamState::Stopped as u8),
            underruns: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            design_failures: AtomicU64::new(0),
            device_lost: AtomicBool::new(false),
            underrun_pending: AtomicBool::new(false),
            overrun_pending: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `from` -> `to`; false if the state was something else
    pub(crate) fn transition(&self, from: StreamState, to: StreamState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn force_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Configs the audio side could not fully design; failing bands ran
    /// as pass-through
    pub fn design_failures(&self) -> u64 {
        self.design_failures.load(Ordering::Relaxed)
    }

    /// Whether the last stream ended because a device went away. Cleared
    /// by the next start.
    pub fn device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    /// Count an underrun; true if no underrun event is pending yet
    pub(crate) fn record_underrun(&self) -> bool {
        self.underruns.fetch_add(1, Ordering::Relaxed);
        !self.underrun_pending.swap(true, Ordering::AcqRel)
    }

    /// Count an overrun; true if no overrun event is pending yet
    pub(crate) fn record_overrun(&self) -> bool {
        self.overruns.fetch_add(1, Ordering::Relaxed);
        !self.overrun_pending.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn clear_underrun_pending(&self) {
        self.underrun_pending.store(false, Ordering::Release);
    }

    pub(crate) fn clear_overrun_pending(&self) {
        self.overrun_pending.store(false, Ordering::Release);
    }

    pub(crate) fn record_design_failure(&self) {
        self.design_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Fault path: Running -> Stopped. Callbacks output silence from here on.
    pub(crate) fn mark_device_lost(&self) {
        self.device_lost.store(true, Ordering::Release);
        self.force_state(StreamState::Stopped);
    }

    fn reset_counters(&self) {
        self.underruns.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.design_failures.store(0, Ordering::Relaxed);
        self.device_lost.store(false, Ordering::Release);
        self.underrun_pending.store(false, Ordering::Release);
        self.overrun_pending.store(false, Ordering::Release);
    }
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancels a stream that is still starting, from any thread
#[derive(Debug, Clone)]
pub struct StopHandle {
    status: Arc<StreamStatus>,
}

impl StopHandle {
    pub(crate) fn new(status: Arc<StreamStatus>) -> Self {
        Self { status }
    }

    /// Request cancellation. Returns true if a start was in progress.
    pub fn cancel(&self) -> bool {
        self.status
            .transition(StreamState::Starting, StreamState::Stopping)
    }
}

/// Manages the capture/playback stream pair
///
/// The cpal streams are dropped on `stop()`. cpal joins any in-flight
/// callback before the closure (and the buffers it owns) is freed.
pub struct AudioStream {
    capture_stream: Option<Stream>,
    playback_stream: Option<Stream>,
    status: Arc<StreamStatus>,
    config: Option<StreamConfig>,
}

impl AudioStream {
    pub fn new(status: Arc<StreamStatus>) -> Self {
        Self {
            capture_stream: None,
            playback_stream: None,
            status,
            config: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.status.state()
    }

    pub fn status(&self) -> &Arc<StreamStatus> {
        &self.status
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.status))
    }

    /// Configuration of the live stream, if any
    pub fn config(&self) -> Option<&StreamConfig> {
        self.config.as_ref()
    }

    /// Open both devices and start processing.
    ///
    /// On any failure the stream is back in `Stopped` with no device open.
    pub fn start(
        &mut self,
        input: &Device,
        output: &Device,
        config: StreamConfig,
        reader: ConfigReader,
        meters: Arc<MeterBank>,
        events: Sender<Event>,
    ) -> EngineResult<()> {
        if !self
            .status
            .transition(StreamState::Stopped, StreamState::Starting)
        {
            return Err(EngineError::AlreadyRunning);
        }
        self.status.reset_counters();

        match self.open(input, output, config, reader, meters, events) {
            Ok(()) => {
                self.config = Some(config);
                info!(
                    "Stream running: {} Hz, {} ch, {} frames ({:.1} ms)",
                    config.sample_rate,
                    config.channels,
                    config.buffer_size,
                    config.latency_ms()
                );
                Ok(())
            }
            Err(e) => {
                self.release();
                warn!("Stream start failed: {}", e);
                Err(e)
            }
        }
    }

    fn open(
        &mut self,
        input: &Device,
        output: &Device,
        config: StreamConfig,
        reader: ConfigReader,
        meters: Arc<MeterBank>,
        events: Sender<Event>,
    ) -> EngineResult<()> {
        config.validate().map_err(EngineError::ConfigError)?;
        check_support(input, DeviceType::Input, &config)?;
        check_support(output, DeviceType::Output, &config)?;

        let processor = StreamProcessor::new(
            config.process_context()?,
            reader,
            meters,
            Arc::clone(&self.status),
        )?;

        let (mut producer, consumer) = RingBuffer::<f32>::new(config.ring_capacity());
        // One block of silence so playback starts with something to read
        if let Ok(chunk) = producer.write_chunk_uninit(config.block_samples()) {
            chunk.fill_from_iter(std::iter::repeat(0.0));
        }

        let cpal_config = config.to_cpal();
        self.capture_stream = Some(build_capture_stream(
            input,
            &cpal_config,
            producer,
            Arc::clone(&self.status),
            events.clone(),
        )?);
        self.playback_stream = Some(build_playback_stream(
            output,
            &cpal_config,
            consumer,
            processor,
            config.ring_capacity(),
            Arc::clone(&self.status),
            events,
        )?);
        self.check_cancelled()?;

        for stream in [&self.capture_stream, &self.playback_stream]
            .into_iter()
            .flatten()
        {
            stream
                .play()
                .map_err(|e| EngineError::DeviceError(e.to_string()))?;
        }

        if !self
            .status
            .transition(StreamState::Starting, StreamState::Running)
        {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    fn check_cancelled(&self) -> EngineResult<()> {
        match self.status.state() {
            StreamState::Starting => Ok(()),
            _ => Err(EngineError::Cancelled),
        }
    }

    /// Stop processing and close both devices. Safe to call when stopped.
    pub fn stop(&mut self) {
        let was_open = self.capture_stream.is_some() || self.playback_stream.is_some();
        self.release();
        if was_open {
            info!(
                "Stream stopped ({} underruns, {} overruns)",
                self.status.underruns(),
                self.status.overruns()
            );
        }
    }

    fn release(&mut self) {
        let state = self.status.state();
        if state == StreamState::Running || state == StreamState::Starting {
            self.status.force_state(StreamState::Stopping);
        }
        // Dropping the streams waits for in-flight callbacks
        self.playback_stream = None;
        self.capture_stream = None;
        self.config = None;
        self.status.force_state(StreamState::Stopped);
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Device loss is recorded in the status only. The controller turns the
/// flag into a `DeviceLost` event, so a full event queue cannot swallow it.
fn error_callback(
    status: Arc<StreamStatus>,
    events: Sender<Event>,
) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| match err {
        cpal::StreamError::DeviceNotAvailable => status.mark_device_lost(),
        other => {
            let _ = events.try_send(Event::error(other));
        }
    }
}

/// Queue an underrun/overrun event unless one is already pending
fn report_xrun(first: bool, event: Event, events: &Sender<Event>, clear: impl FnOnce()) {
    if first && events.try_send(event).is_err() {
        clear();
    }
}

/// Copy as much of `data` into the ring as fits; returns samples written
///
/// # Real-time Safety
/// No allocations.
fn push_to_ring(producer: &mut Producer<f32>, data: &[f32]) -> usize {
    let room = producer.slots().min(data.len());
    producer
        .write_chunk_uninit(room)
        .map_or(0, |chunk| chunk.fill_from_iter(data.iter().copied()))
}

/// Fill `buffer` from the ring, padding with silence; returns samples read
///
/// # Real-time Safety
/// No allocations.
fn fill_from_ring(consumer: &mut Consumer<f32>, buffer: &mut [f32]) -> usize {
    let available = consumer.slots().min(buffer.len());
    let mut read = 0;
    if let Ok(chunk) = consumer.read_chunk(available) {
        let (first, second) = chunk.as_slices();
        buffer[..first.len()].copy_from_slice(first);
        buffer[first.len()..first.len() + second.len()].copy_from_slice(second);
        read = first.len() + second.len();
        chunk.commit_all();
    }
    buffer[read..].fill(0.0);
    read
}

fn build_capture_stream(
    device: &Device,
    config: &cpal::StreamConfig,
    mut producer: Producer<f32>,
    status: Arc<StreamStatus>,
    events: Sender<Event>,
) -> EngineResult<Stream> {
    let err_callback = error_callback(Arc::clone(&status), events.clone());

    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Real-time audio callback - NO allocations allowed here
                if push_to_ring(&mut producer, data) < data.len() {
                    // Playback is not consuming fast enough
                    report_xrun(status.record_overrun(), Event::BufferOverrun, &events, || {
                        status.clear_overrun_pending()
                    });
                }
            },
            err_callback,
            None, // No timeout
        )
        .map_err(|e| EngineError::DeviceError(e.to_string()))
}

fn build_playback_stream(
    device: &Device,
    config: &cpal::StreamConfig,
    mut consumer: Consumer<f32>,
    mut processor: StreamProcessor,
    scratch_len: usize,
    status: Arc<StreamStatus>,
    events: Sender<Event>,
) -> EngineResult<Stream> {
    let err_callback = error_callback(Arc::clone(&status), events.clone());
    let channels = config.channels as usize;
    // Whole frames only, so every chunk handed to the engine is aligned
    let scratch_len = (scratch_len / channels).max(1) * channels;
    let mut scratch = vec![0.0_f32; scratch_len];

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Real-time audio callback - NO allocations allowed here
                for out in data.chunks_mut(scratch_len) {
                    let input = &mut scratch[..out.len()];

                    if fill_from_ring(&mut consumer, input) < input.len() {
                        // Underrun - already padded with silence
                        report_xrun(status.record_underrun(), Event::BufferUnderrun, &events, || {
                            status.clear_underrun_pending()
                        });
                    }

                    processor.process(input, out);
                }
            },
            err_callback,
            None,
        )
        .map_err(|e| EngineError::DeviceError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_defaults() {
        let status = StreamStatus::new();
        assert_eq!(status.state(), StreamState::Stopped);
        assert_eq!(status.underruns(), 0);
        assert_eq!(status.overruns(), 0);
        assert!(!status.device_lost());
    }

    #[test]
    fn test_transitions_are_guarded() {
        let status = StreamStatus::new();
        assert!(!status.transition(StreamState::Running, StreamState::Stopping));
        assert!(status.transition(StreamState::Stopped, StreamState::Starting));
        assert!(!status.transition(StreamState::Stopped, StreamState::Starting));
        assert!(status.transition(StreamState::Starting, StreamState::Running));
        assert_eq!(status.state(), StreamState::Running);
    }

    #[test]
    fn test_device_loss_faults_to_stopped() {
        let status = StreamStatus::new();
        status.force_state(StreamState::Running);
        assert!(status.record_underrun());
        status.mark_device_lost();
        assert_eq!(status.state(), StreamState::Stopped);
        assert!(status.device_lost());

        status.reset_counters();
        assert_eq!(status.underruns(), 0);
        assert!(!status.device_lost());
    }

    #[test]
    fn test_xrun_events_coalesce_until_polled() {
        let status = StreamStatus::new();
        assert!(status.record_underrun());
        assert!(!status.record_underrun());
        assert!(!status.record_underrun());
        assert_eq!(status.underruns(), 3);

        status.clear_underrun_pending();
        assert!(status.record_underrun());
        // Independent of underruns
        assert!(status.record_overrun());
    }

    #[test]
    fn test_xrun_event_dropped_when_queue_full() {
        let status = StreamStatus::new();
        let (sender, receiver) = crossbeam_channel::bounded(1);
        sender.send(Event::Stopped).unwrap();

        report_xrun(status.record_underrun(), Event::BufferUnderrun, &sender, || {
            status.clear_underrun_pending()
        });
        // Nothing queued, so the next underrun may report again
        assert!(status.record_underrun());
        assert_eq!(receiver.len(), 1);
    }

    #[test]
    fn test_fill_from_ring_pads_with_silence() {
        let (mut producer, mut consumer) = RingBuffer::<f32>::new(8);
        assert_eq!(push_to_ring(&mut producer, &[0.1, 0.2, 0.3]), 3);

        let mut buffer = [9.0_f32; 5];
        assert_eq!(fill_from_ring(&mut consumer, &mut buffer), 3);
        assert_eq!(buffer, [0.1, 0.2, 0.3, 0.0, 0.0]);

        let mut empty = [9.0_f32; 4];
        assert_eq!(fill_from_ring(&mut consumer, &mut empty), 0);
        assert_eq!(empty, [0.0; 4]);
    }

    #[test]
    fn test_ring_wraps_around() {
        let (mut producer, mut consumer) = RingBuffer::<f32>::new(8);
        let mut scratch = [0.0_f32; 6];
        push_to_ring(&mut producer, &[1.0; 6]);
        fill_from_ring(&mut consumer, &mut scratch);

        // Crosses the end of the ring
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(push_to_ring(&mut producer, &data), 5);
        let mut buffer = [0.0_f32; 5];
        assert_eq!(fill_from_ring(&mut consumer, &mut buffer), 5);
        assert_eq!(buffer, data);
    }

    #[test]
    fn test_push_to_full_ring_reports_short_write() {
        let (mut producer, _consumer) = RingBuffer::<f32>::new(4);
        assert_eq!(push_to_ring(&mut producer, &[0.5; 6]), 4);
        assert_eq!(push_to_ring(&mut producer, &[0.5; 2]), 0);
    }

    #[test]
    fn test_stop_handle_cancels_only_starting() {
        let stream = AudioStream::new(Arc::new(StreamStatus::new()));
        let handle = stream.stop_handle();
        assert!(!handle.cancel());

        stream.status().force_state(StreamState::Starting);
        assert!(handle.cancel());
        assert_eq!(stream.state(), StreamState::Stopping);
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let mut stream = AudioStream::new(Arc::new(StreamStatus::new()));
        stream.stop();
        stream.stop();
        assert_eq!(stream.state(), StreamState::Stopped);
        assert!(stream.config().is_none());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&StreamState::Running).unwrap();
        assert_eq!(json, r#""Running""#);
    }

    // Hardware-dependent tests
    #[test]
    #[ignore = "requires audio hardware"]
    fn test_stream_start_stop() {
        use crate::bridge::ParameterBridge;
        use crate::device::resolve_device;
        use equaliser_dsp::EngineConfig;

        let (sender, _receiver) = crossbeam_channel::bounded(64);
        let bridge = ParameterBridge::new(EngineConfig::default());
        let input = resolve_device(DeviceType::Input, None).unwrap();
        let output = resolve_device(DeviceType::Output, None).unwrap();

        let mut stream = AudioStream::new(Arc::new(StreamStatus::new()));
        stream
            .start(
                &input,
                &output,
                StreamConfig::default(),
                bridge.reader(),
                Arc::new(MeterBank::new()),
                sender,
            )
            .unwrap();
        assert_eq!(stream.state(), StreamState::Running);

        stream.stop();
        assert_eq!(stream.state(), StreamState::Stopped);
    }
}
