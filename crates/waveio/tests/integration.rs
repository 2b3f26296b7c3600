//! Integration tests for `waveio`'s context/device/stream plumbing, run
//! entirely against the `dummy` backend so they need no audio hardware.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use waveio::{Backend, Context, Format};

#[test]
fn connect_dummy_exposes_one_input_and_one_output() {
    let ctx = Context::new("waveio-it");
    ctx.connect_backend(Backend::Dummy).unwrap();
    assert_eq!(ctx.current_backend(), Some(Backend::Dummy));
    assert_eq!(ctx.input_devices().len(), 1);
    assert_eq!(ctx.output_devices().len(), 1);
    assert!(ctx.default_output_device().is_some());
    assert!(ctx.default_input_device().is_some());
    ctx.disconnect();
}

#[test]
fn outstream_runs_write_callback_and_can_be_stopped() {
    let ctx = Context::new("waveio-it");
    ctx.connect_backend(Backend::Dummy).unwrap();

    let device = ctx.default_output_device().unwrap();
    let layout = device.current_layout().cloned().unwrap();
    let sample_rate = device.sample_rate_current().unwrap();
    let invocations = Arc::new(AtomicU32::new(0));
    let invocations_cb = Arc::clone(&invocations);

    let outstream = ctx
        .open_outstream(
            device,
            Format::float32_ne(),
            sample_rate,
            layout,
            0.05,
            "it-outstream",
            Box::new(move |stream, _min, max| {
                invocations_cb.fetch_add(1, Ordering::Relaxed);
                if let Ok((areas, frames)) = stream.begin_write(max) {
                    for area in &areas {
                        for frame in 0..frames as usize {
                            // SAFETY: `frame` is within the granted transaction.
                            unsafe { area.frame_ptr(frame).cast::<f32>().write(0.0) };
                        }
                    }
                    let _ = stream.end_write();
                }
            }),
        )
        .unwrap();

    outstream.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert!(invocations.load(Ordering::Relaxed) > 0, "write callback should have run at least once");
    outstream.pause(true).unwrap();
    drop(outstream);
    ctx.disconnect();
}

#[test]
fn instream_runs_read_callback() {
    let ctx = Context::new("waveio-it");
    ctx.connect_backend(Backend::Dummy).unwrap();

    let device = ctx.default_input_device().unwrap();
    let layout = device.current_layout().cloned().unwrap();
    let sample_rate = device.sample_rate_current().unwrap();
    let frames_seen = Arc::new(AtomicU32::new(0));
    let frames_seen_cb = Arc::clone(&frames_seen);

    let instream = ctx
        .open_instream(
            device,
            Format::float32_ne(),
            sample_rate,
            layout,
            0.05,
            "it-instream",
            Box::new(move |stream, _min, max| {
                if let Ok((_areas, frames)) = stream.begin_read(max) {
                    frames_seen_cb.fetch_add(frames, Ordering::Relaxed);
                    let _ = stream.end_read();
                }
            }),
        )
        .unwrap();

    instream.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    assert!(frames_seen.load(Ordering::Relaxed) > 0, "read callback should have seen captured frames");
    drop(instream);
    ctx.disconnect();
}

#[test]
fn force_device_scan_and_wakeup_unblock_wait_events() {
    let ctx = Context::new("waveio-it");
    ctx.connect_backend(Backend::Dummy).unwrap();

    let waiter = Arc::clone(&ctx);
    let handle = std::thread::spawn(move || waiter.wait_events(Some(Duration::from_secs(5))));
    std::thread::sleep(Duration::from_millis(20));
    ctx.wakeup();
    handle.join().unwrap();

    ctx.force_device_scan().unwrap();
    ctx.disconnect();
}

#[test]
fn unconnected_context_reports_no_backend_and_no_devices() {
    let ctx = Context::new("waveio-it");
    assert!(ctx.current_backend().is_none());
    assert!(ctx.output_devices().is_empty());
    assert!(ctx.input_devices().is_empty());
    assert!(ctx.default_output_device().is_none());
}
