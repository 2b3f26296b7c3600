//! Sine wave playback, mirroring the reference project's `sio_sine.c`.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use waveio::{ChannelId, Context, Format};

#[derive(Args)]
pub struct SineArgs {
    /// Backend to connect with.
    #[arg(long)]
    backend: Option<String>,

    /// Device id to open; defaults to the connected backend's default output.
    #[arg(long)]
    device: Option<String>,

    /// Tone frequency in Hz.
    #[arg(long, default_value_t = 440.0)]
    freq: f64,

    /// How long to play before stopping.
    #[arg(long, default_value_t = 4)]
    seconds: u64,
}

pub fn run(args: SineArgs) -> anyhow::Result<()> {
    let ctx = Context::new("waveio-cli");
    super::connect(&ctx, args.backend.as_deref())?;

    let device = match &args.device {
        Some(id) => ctx
            .output_devices()
            .into_iter()
            .find(|d| d.id() == id)
            .ok_or_else(|| anyhow::anyhow!("no output device with id '{id}'"))?,
        None => ctx.default_output_device().ok_or_else(|| anyhow::anyhow!("no default output device"))?,
    };

    let format = Format::float32_ne();
    let sample_rate = device.sample_rate_current().unwrap_or(48_000);
    let layout = device
        .current_layout()
        .cloned()
        .unwrap_or_else(|| waveio::ChannelLayout::new(vec![ChannelId::FrontLeft, ChannelId::FrontRight]));
    let channel_count = layout.channel_count();

    println!(
        "playing {} Hz sine on '{}' ({} Hz, {} ch) for {}s",
        args.freq,
        device.name(),
        sample_rate,
        channel_count,
        args.seconds
    );

    let phase = Arc::new(AtomicU64::new(0));
    let freq = args.freq;

    let outstream = ctx.open_outstream(
        device,
        format,
        sample_rate,
        layout,
        0.1,
        "waveio-cli sine",
        Box::new(move |stream, _min, max| {
            let (areas, frame_count) = match stream.begin_write(max) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "begin_write failed");
                    return;
                }
            };
            let step = TAU * freq / f64::from(sample_rate);
            let start_phase = f64::from_bits(phase.load(Ordering::Acquire));
            for area in &areas {
                for frame in 0..frame_count as usize {
                    let sample = (start_phase + step * frame as f64).sin() as f32;
                    // SAFETY: `frame` is within the granted transaction.
                    unsafe {
                        let ptr = area.frame_ptr(frame).cast::<f32>();
                        ptr.write(sample);
                    }
                }
            }
            let advanced = start_phase + step * frame_count as f64;
            phase.store(advanced.rem_euclid(TAU).to_bits(), Ordering::Release);
            if let Err(e) = stream.end_write() {
                tracing::warn!(error = %e, "end_write failed");
            }
        }),
    )?;
    outstream.set_underflow_callback(Box::new(|| eprintln!("underflow")));
    outstream.start()?;

    std::thread::sleep(Duration::from_secs(args.seconds));
    outstream.pause(true)?;
    Ok(())
}
