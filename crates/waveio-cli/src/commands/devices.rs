//! Audio device listing, mirroring the reference project's `sio_list_devices.c`.

use std::time::Duration;

use clap::Args;
use waveio::{Context, Device, DevicesInfo};

#[derive(Args)]
pub struct DevicesArgs {
    /// Backend to connect with (e.g. "pulseaudio", "alsa", "dummy"). Defaults
    /// to the `WAVEIO_BACKEND` environment variable, then priority order.
    #[arg(long)]
    backend: Option<String>,

    /// Keep running and reprint the device list whenever it changes.
    #[arg(long)]
    watch: bool,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let ctx = Context::new("waveio-cli");
    super::connect(&ctx, args.backend.as_deref())?;

    println!("backend: {}\n", ctx.current_backend().expect("connected"));
    print_devices(&ctx.devices_snapshot());

    if args.watch {
        println!("\nwatching for device changes (ctrl-c to stop)...");
        loop {
            ctx.wait_events(Some(Duration::from_secs(5)));
            println!();
            print_devices(&ctx.devices_snapshot());
        }
    }

    Ok(())
}

fn print_devices(devices: &DevicesInfo) {
    println!("input devices:");
    print_device_list(devices.input_devices(), devices.default_input_device());

    println!("\noutput devices:");
    print_device_list(devices.output_devices(), devices.default_output_device());
}

fn print_device_list(list: &[Device], default: Option<&Device>) {
    if list.is_empty() {
        println!("  (none)");
        return;
    }
    for device in list {
        let marker = if default == Some(device) { "*" } else { " " };
        let rate = device.sample_rate_current().map_or("?".to_string(), |r| r.to_string());
        let layout = device.current_layout().and_then(waveio::ChannelLayout::name).unwrap_or("?");
        print!("  {marker} {} [{}]  {} Hz  {}", device.name(), device.id(), rate, layout);
        if let Some(reason) = device.probe_error() {
            print!("  (probe failed: {reason})");
        }
        println!();
    }
}
