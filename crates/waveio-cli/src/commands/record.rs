//! Raw PCM capture to a file, mirroring the reference project's `sio_record.c`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Args;
use waveio::{Context, Format};

#[derive(Args)]
pub struct RecordArgs {
    /// Backend to connect with.
    #[arg(long)]
    backend: Option<String>,

    /// Device id to open; defaults to the connected backend's default input.
    #[arg(long)]
    device: Option<String>,

    /// How long to record.
    #[arg(long, default_value_t = 4)]
    seconds: u64,

    /// Output file of raw interleaved float32 samples.
    out: PathBuf,
}

pub fn run(args: RecordArgs) -> anyhow::Result<()> {
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
    let channel_count = layout.channel_count();

    println!(
        "recording '{}' ({} Hz, {} ch) for {}s into {}",
        device.name(),
        sample_rate,
        channel_count,
        args.seconds,
        args.out.display()
    );

    let file = File::create(&args.out)?;
    let writer = Arc::new(Mutex::new(BufWriter::new(file)));
    let writer_cb = Arc::clone(&writer);
    let mut scratch = vec![0f32; 4096];

    let instream = ctx.open_instream(
        device,
        format,
        sample_rate,
        layout,
        0.1,
        "waveio-cli record",
        Box::new(move |stream, _min, max| {
            let (areas, frame_count) = match stream.begin_read(max) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "begin_read failed");
                    return;
                }
            };
            let needed = frame_count as usize * areas.len();
            if scratch.len() < needed {
                scratch.resize(needed, 0.0);
            }
            for frame in 0..frame_count as usize {
                for (channel, area) in areas.iter().enumerate() {
                    // SAFETY: `frame` is within the granted transaction.
                    let sample = unsafe { area.frame_ptr(frame).cast::<f32>().read() };
                    scratch[frame * areas.len() + channel] = sample;
                }
            }
            if let Ok(mut w) = writer_cb.lock() {
                let bytes = &scratch[..needed];
                let bytes: &[u8] =
                    unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<u8>(), bytes.len() * 4) };
                let _ = w.write_all(bytes);
            }
            if let Err(e) = stream.end_read() {
                tracing::warn!(error = %e, "end_read failed");
            }
        }),
    )?;
    instream.set_overflow_callback(Box::new(|| eprintln!("overflow")));
    instream.start()?;

    std::thread::sleep(Duration::from_secs(args.seconds));
    instream.pause(true)?;
    writer.lock().expect("mutex poisoned").flush()?;
    Ok(())
}
