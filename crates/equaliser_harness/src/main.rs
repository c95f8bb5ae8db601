//! eq-harness - command-line driver for the equaliser
//!
//! - `offline`: run a synthetic signal through one band (or a preset) and
//!   report input/output levels. No audio hardware involved.
//! - `response`: print the magnitude response of the same configuration.
//! - `devices`: list audio devices.
//! - `live`: run capture -> EQ -> playback for a while, printing meters.

use std::thread::sleep;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use equaliser_core::{DeviceType, EqController, Event, StreamConfig};
use equaliser_dsp::signals::{
    sine_wave, sweep, white_noise, DEFAULT_NOISE_AMPLITUDE, DEFAULT_SINE_AMPLITUDE,
    DEFAULT_SWEEP_AMPLITUDE,
};
use equaliser_dsp::{
    find_preset, frequency_response, run_offline, Band, BandId, BandParameters, EngineConfig,
    FilterType, DEFAULT_GLOBAL_GAIN_DB, DEFAULT_RESPONSE_POINTS, PRESETS, RESPONSE_MIN_HZ,
};

#[derive(Parser)]
#[command(name = "eq-harness")]
#[command(about = "Real-time parametric equaliser harness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a synthetic signal offline and print levels
    Offline {
        #[command(flatten)]
        eq: EqArgs,

        /// Seconds of audio to process
        #[arg(long, default_value_t = 2.0)]
        duration: f64,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 48000.0)]
        sample_rate: f64,

        /// Frames per processing block
        #[arg(long, default_value_t = 1024)]
        block_size: usize,

        /// Test signal
        #[arg(long, value_enum, default_value_t = Signal::Sine)]
        signal: Signal,

        /// Interleaved channels (1 or 2)
        #[arg(long, default_value_t = 2)]
        channels: usize,

        /// Noise seed
        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the magnitude response (frequency, dB) of the configuration
    Response {
        #[command(flatten)]
        eq: EqArgs,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 48000.0)]
        sample_rate: f64,

        /// Number of log-spaced points
        #[arg(long, default_value_t = DEFAULT_RESPONSE_POINTS)]
        points: usize,
    },

    /// List available audio devices
    Devices {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the live stream on real devices
    Live {
        #[command(flatten)]
        eq: EqArgs,

        /// Input device name (default device if omitted)
        #[arg(long)]
        input: Option<String>,

        /// Output device name (default device if omitted)
        #[arg(long)]
        output: Option<String>,

        /// Sample rate in Hz
        #[arg(long, default_value_t = 48000)]
        sample_rate: u32,

        /// Device buffer size in frames
        #[arg(long, default_value_t = 256)]
        buffer_size: u32,

        /// How long to run, in seconds
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
    },
}

/// Which EQ to run: a single band, or a named preset
#[derive(Args, Debug, Clone)]
struct EqArgs {
    /// Band centre / corner frequency in Hz
    #[arg(long, default_value_t = 1000.0)]
    freq: f64,

    /// Band gain in dB
    #[arg(long, default_value_t = 6.0, allow_negative_numbers = true)]
    gain: f64,

    /// Band Q
    #[arg(long, default_value_t = 1.5)]
    q: f64,

    /// Band filter type (peaking, low_shelf, high_shelf, low_pass, high_pass, notch)
    #[arg(long, default_value = "peaking")]
    filter: FilterType,

    /// Output gain in dB
    #[arg(long, default_value_t = DEFAULT_GLOBAL_GAIN_DB, allow_negative_numbers = true)]
    global_gain: f64,

    /// Use a built-in preset instead of the single band
    #[arg(long, conflicts_with_all = ["freq", "gain", "q", "filter"])]
    preset: Option<String>,

    /// Pass audio through unchanged
    #[arg(long)]
    bypass: bool,
}

impl EqArgs {
    fn to_config(&self) -> Result<EngineConfig> {
        let config = match &self.preset {
            Some(name) => {
                let Some(preset) = find_preset(name) else {
                    let known: Vec<_> = PRESETS.iter().map(|p| p.name).collect();
                    bail!("unknown preset '{name}' (known: {})", known.join(", "));
                };
                preset.to_config()?
            }
            None => {
                let params = BandParameters::new(self.filter, self.freq, self.gain, self.q)
                    .context("invalid band")?;
                EngineConfig::default().with_band(Band::new(BandId(0), params))?
            }
        };
        Ok(config
            .with_global_gain(self.global_gain)
            .context("invalid global gain")?
            .with_bypass(self.bypass))
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Sine,
    Noise,
    Sweep,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("equaliser_core=info,eq_harness=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Offline {
            eq,
            duration,
            sample_rate,
            block_size,
            signal,
            channels,
            seed,
            json,
        } => run_offline_command(
            &eq,
            duration,
            sample_rate,
            block_size,
            signal,
            channels,
            seed,
            json,
        ),
        Commands::Response {
            eq,
            sample_rate,
            points,
        } => run_response_command(&eq, sample_rate, points),
        Commands::Devices { json } => run_devices_command(json),
        Commands::Live {
            eq,
            input,
            output,
            sample_rate,
            buffer_size,
            seconds,
        } => run_live_command(&eq, input, output, sample_rate, buffer_size, seconds),
    }
}

fn generate(
    signal: Signal,
    eq: &EqArgs,
    duration: f64,
    sample_rate: f64,
    channels: usize,
    seed: u64,
) -> Vec<f32> {
    match signal {
        Signal::Sine => sine_wave(eq.freq, duration, sample_rate, DEFAULT_SINE_AMPLITUDE, channels),
        Signal::Noise => white_noise(duration, sample_rate, DEFAULT_NOISE_AMPLITUDE, channels, seed),
        Signal::Sweep => sweep(
            RESPONSE_MIN_HZ,
            sample_rate / 2.0 * 0.9,
            duration,
            sample_rate,
            DEFAULT_SWEEP_AMPLITUDE,
            channels,
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_offline_command(
    eq: &EqArgs,
    duration: f64,
    sample_rate: f64,
    block_size: usize,
    signal: Signal,
    channels: usize,
    seed: u64,
    json: bool,
) -> Result<()> {
    if !(duration.is_finite() && duration > 0.0) {
        bail!("duration must be positive, got {duration}");
    }
    let config = eq.to_config()?;
    let input = generate(signal, eq, duration, sample_rate, channels, seed);
    info!(
        "Processing {:.2} s of {:?} at {} Hz through {} band(s)",
        duration,
        signal,
        sample_rate,
        config.len()
    );

    let report = run_offline(&input, channels, sample_rate, &config, block_size)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Frames processed:    {}", report.frames);
        println!("Input level (dBFS):  {:.2}", report.input_rms_db);
        println!("Output level (dBFS): {:.2}", report.output_rms_db);
        println!("Input peak (dBFS):   {:.2}", report.input_peak_db);
        println!("Output peak (dBFS):  {:.2}", report.output_peak_db);
        println!("Net gain (dB):       {:.2}", report.gain_db());
    }
    Ok(())
}

fn run_response_command(eq: &EqArgs, sample_rate: f64, points: usize) -> Result<()> {
    let config = eq.to_config()?;
    for point in frequency_response(&config, sample_rate, points)? {
        println!("{:.1}\t{:.3}", point.frequency_hz, point.magnitude_db);
    }
    Ok(())
}

fn run_devices_command(json: bool) -> Result<()> {
    let controller = EqController::new()?;
    let devices = controller.list_devices()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    for device_type in [DeviceType::Input, DeviceType::Output] {
        println!("{:?} devices:", device_type);
        for device in devices.iter().filter(|d| d.device_type == device_type) {
            let marker = if device.is_default { "*" } else { " " };
            println!(
                " {} {} ({} ch, rates {:?})",
                marker, device.name, device.max_channels, device.sample_rates
            );
        }
    }
    Ok(())
}

fn run_live_command(
    eq: &EqArgs,
    input: Option<String>,
    output: Option<String>,
    sample_rate: u32,
    buffer_size: u32,
    seconds: f64,
) -> Result<()> {
    let stream_config = StreamConfig {
        sample_rate,
        buffer_size,
        ..StreamConfig::default()
    };
    let mut controller = EqController::with_config(eq.to_config()?, stream_config)?;
    controller.select_devices(input, output)?;
    controller.start().context("failed to start stream")?;

    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    while Instant::now() < deadline {
        sleep(Duration::from_millis(250));

        while let Some(event) = controller.poll_event() {
            match event {
                Event::BufferUnderrun | Event::BufferOverrun => {}
                Event::DeviceLost => warn!("Device lost"),
                Event::Error { message } => warn!("Stream error: {}", message),
                other => info!("{:?}", other),
            }
        }
        if !controller.is_running() {
            bail!("stream stopped unexpectedly");
        }

        let snapshot = controller.snapshot();
        println!(
            "in {:>7.1} dB (peak {:>7.1})  out {:>7.1} dB (peak {:>7.1})  xruns {}/{}",
            snapshot.input.rms_db,
            snapshot.input.peak_db,
            snapshot.output.rms_db,
            snapshot.output.peak_db,
            snapshot.underruns,
            snapshot.overruns
        );
    }

    controller.stop()?;
    Ok(())
}
