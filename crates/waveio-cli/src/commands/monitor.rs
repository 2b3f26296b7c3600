//! Live input level meter, mirroring the reference project's `sio_microphone.c`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use waveio::{Context, Format};

#[derive(Args)]
pub struct MonitorArgs {
    /// Backend to connect with.
    #[arg(long)]
    backend: Option<String>,

    /// Device id to open; defaults to the connected backend's default input.
    #[arg(long)]
    device: Option<String>,
}

pub fn run(args: MonitorArgs) -> anyhow::Result<()> {
    let ctx = Context::new("waveio-cli");
    super::connect(&ctx, args.backend.as_deref())?;

    let device = match &args.device {
        Some(id) => ctx
            .input_devices()
            .into_iter()
            .find(|d| d.id() == id)
            .ok_or_else(|| anyhow::anyhow!("no input device with id '{id}'"))?,
        None => ctx.default_input_device().ok_or_else(|| anyhow::anyhow!("no default input device"))?,
    };

    let format = Format::float32_ne();
    let sample_rate = device.sample_rate_current().unwrap_or(48_000);
    let layout = device.current_layout().cloned().unwrap_or_else(|| waveio::ChannelLayout::new(vec![
        waveio::ChannelId::FrontLeft,
        waveio::ChannelId::FrontRight,
    ]));

    println!("monitoring '{}' (ctrl-c to stop)", device.name());

    let peak_bits = Arc::new(AtomicU32::new(0));
    let peak_bits_cb = Arc::clone(&peak_bits);

    let instream = ctx.open_instream(
        device,
        format,
        sample_rate,
        layout,
        0.1,
        "waveio-cli monitor",
        Box::new(move |stream, _min, max| {
            let (areas, frame_count) = match stream.begin_read(max) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "begin_read failed");
                    return;
                }
            };
            let mut peak = 0f32;
            for area in &areas {
                for frame in 0..frame_count as usize {
                    // SAFETY: `frame` is within the granted transaction.
                    let sample = unsafe { area.frame_ptr(frame).cast::<f32>().read() };
                    peak = peak.max(sample.abs());
                }
            }
            peak_bits_cb.store(peak.to_bits(), Ordering::Release);
            if let Err(e) = stream.end_read() {
                tracing::warn!(error = %e, "end_read failed");
            }
        }),
    )?;
    instream.start()?;

    loop {
        std::thread::sleep(Duration::from_millis(200));
        let peak = f32::from_bits(peak_bits.load(Ordering::Acquire));
        let db = if peak > 0.0 { 20.0 * peak.log10() } else { f32::NEG_INFINITY };
        let bar_len = ((peak * 40.0).round() as usize).min(40);
        let bar: String = "#".repeat(bar_len);
        print!("\r[{bar:<40}] {db:6.1} dB   ");
        std::io::Write::flush(&mut std::io::stdout()).ok();
    }
}
