//! Device descriptors and the double-buffered device list snapshot.

use std::fmt;
use std::sync::Arc;

use waveio_core::{ChannelLayout, Format};

/// Which direction a [`Device`] moves audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAim {
    /// Capture device: audio flows from hardware into the process.
    Input,
    /// Playback device: audio flows from the process to hardware.
    Output,
}

/// An inclusive sample-rate range a device supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRateRange {
    pub min: u32,
    pub max: u32,
}

impl SampleRateRange {
    /// A range covering exactly one rate.
    #[must_use]
    pub fn exact(rate: u32) -> Self {
        Self { min: rate, max: rate }
    }

    #[must_use]
    pub fn contains(&self, rate: u32) -> bool {
        rate >= self.min && rate <= self.max
    }
}

struct DeviceInner {
    id: String,
    name: String,
    aim: DeviceAim,
    is_raw: bool,
    layouts: Vec<ChannelLayout>,
    current_layout: Option<ChannelLayout>,
    formats: Vec<Format>,
    current_format: Option<Format>,
    sample_rates: Vec<SampleRateRange>,
    sample_rate_current: Option<u32>,
    software_latency_min: f64,
    software_latency_max: f64,
    software_latency_current: f64,
    /// Set when probing this device's capabilities failed; the device is
    /// still listed (so the user can see it exists) but cannot be opened.
    probe_error: Option<String>,
}

/// A reference-counted description of an audio endpoint.
///
/// Cloning a `Device` is cheap (it bumps a refcount, mirroring
/// `soundio_device_ref`/`unref`) and yields a handle to the same
/// underlying description; the device itself is torn down once the last
/// clone is dropped.
#[derive(Clone)]
pub struct Device(Arc<DeviceInner>);

impl Device {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        aim: DeviceAim,
        is_raw: bool,
        layouts: Vec<ChannelLayout>,
        current_layout: Option<ChannelLayout>,
        formats: Vec<Format>,
        current_format: Option<Format>,
        sample_rates: Vec<SampleRateRange>,
        sample_rate_current: Option<u32>,
    ) -> Self {
        Self(Arc::new(DeviceInner {
            id: id.into(),
            name: name.into(),
            aim,
            is_raw,
            layouts,
            current_layout,
            formats,
            current_format,
            sample_rates,
            sample_rate_current,
            software_latency_min: 0.001,
            software_latency_max: 0.5,
            software_latency_current: 0.1,
            probe_error: None,
        }))
    }

    pub(crate) fn with_probe_error(mut self, error: String) -> Self {
        Arc::get_mut(&mut self.0)
            .expect("device has not been cloned yet")
            .probe_error = Some(error);
        self
    }

    /// Backend-assigned identifier; stable across a single connection but
    /// not guaranteed stable across reboots or reconnects.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0.id
    }

    /// Human-readable name suitable for display.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn aim(&self) -> DeviceAim {
        self.0.aim
    }

    /// `true` if this is an unprocessed "raw" device (ALSA hw device,
    /// exclusive-mode WASAPI endpoint) bypassing OS-level mixing.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.0.is_raw
    }

    #[must_use]
    pub fn layouts(&self) -> &[ChannelLayout] {
        &self.0.layouts
    }

    #[must_use]
    pub fn current_layout(&self) -> Option<&ChannelLayout> {
        self.0.current_layout.as_ref()
    }

    #[must_use]
    pub fn formats(&self) -> &[Format] {
        &self.0.formats
    }

    #[must_use]
    pub fn current_format(&self) -> Option<Format> {
        self.0.current_format
    }

    #[must_use]
    pub fn sample_rates(&self) -> &[SampleRateRange] {
        &self.0.sample_rates
    }

    #[must_use]
    pub fn sample_rate_current(&self) -> Option<u32> {
        self.0.sample_rate_current
    }

    #[must_use]
    pub fn software_latency_min(&self) -> f64 {
        self.0.software_latency_min
    }

    #[must_use]
    pub fn software_latency_max(&self) -> f64 {
        self.0.software_latency_max
    }

    /// If probing this device's capabilities failed, the reason. A device
    /// with a probe error can still be named in a list but cannot be
    /// opened for streaming.
    #[must_use]
    pub fn probe_error(&self) -> Option<&str> {
        self.0.probe_error.as_deref()
    }

    /// `true` if `rate` falls within any of this device's supported ranges.
    #[must_use]
    pub fn supports_sample_rate(&self, rate: u32) -> bool {
        self.0.sample_rates.iter().any(|r| r.contains(rate))
    }

    #[must_use]
    pub fn supports_format(&self, format: Format) -> bool {
        self.0.formats.contains(&format)
    }

    #[must_use]
    pub fn supports_layout(&self, layout: &ChannelLayout) -> bool {
        self.0.layouts.iter().any(|l| l == layout)
    }

    /// Picks the supported rate closest to `target`, the reference
    /// implementation's `soundio_device_nearest_sample_rate` algorithm: each
    /// range contributes the rate within it closest to `target` (`target`
    /// itself, clamped into the range), then the closest rate at or above
    /// `target` wins ties against any rate below it, and among rates on the
    /// same side of `target` the smaller absolute delta wins.
    #[must_use]
    pub fn nearest_sample_rate(&self, target: u32) -> Option<u32> {
        let mut best: Option<(u32, i64)> = None;
        for range in &self.0.sample_rates {
            let candidate = target.clamp(range.min, range.max);
            if candidate == target {
                return Some(target);
            }
            let delta = (i64::from(candidate) - i64::from(target)).abs();
            let candidate_too_small = candidate < target;
            let replace = match best {
                None => true,
                Some((best_rate, best_delta)) => {
                    let best_too_small = best_rate < target;
                    (best_too_small && !candidate_too_small)
                        || ((best_too_small || !candidate_too_small) && delta < best_delta)
                }
            };
            if replace {
                best = Some((candidate, delta));
            }
        }
        best.map(|(rate, _)| rate)
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("aim", &self.0.aim)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id && self.0.aim == other.0.aim
    }
}

/// A snapshot of every known device, published atomically by a backend so
/// that readers never observe a half-updated list.
#[derive(Debug, Clone, Default)]
pub struct DevicesInfo {
    input_devices: Vec<Device>,
    output_devices: Vec<Device>,
    default_input_index: Option<usize>,
    default_output_index: Option<usize>,
}

impl DevicesInfo {
    #[must_use]
    pub fn new(
        input_devices: Vec<Device>,
        output_devices: Vec<Device>,
        default_input_index: Option<usize>,
        default_output_index: Option<usize>,
    ) -> Self {
        Self {
            input_devices,
            output_devices,
            default_input_index,
            default_output_index,
        }
    }

    #[must_use]
    pub fn input_devices(&self) -> &[Device] {
        &self.input_devices
    }

    #[must_use]
    pub fn output_devices(&self) -> &[Device] {
        &self.output_devices
    }

    #[must_use]
    pub fn default_input_device(&self) -> Option<&Device> {
        self.default_input_index.and_then(|i| self.input_devices.get(i))
    }

    #[must_use]
    pub fn default_output_device(&self) -> Option<&Device> {
        self.default_output_index.and_then(|i| self.output_devices.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_with_rates(rates: &[(u32, u32)]) -> Device {
        Device::new(
            "id",
            "name",
            DeviceAim::Output,
            false,
            vec![],
            None,
            vec![],
            None,
            rates.iter().map(|&(min, max)| SampleRateRange { min, max }).collect(),
            None,
        )
    }

    #[test]
    fn clone_shares_identity() {
        let a = device_with_rates(&[(44100, 44100)]);
        let b = a.clone();
        assert_eq!(a, b);
    }

    #[test]
    fn nearest_sample_rate_prefers_closest_among_rates_on_the_same_side() {
        let device = device_with_rates(&[(44100, 44100), (48000, 48000)]);
        assert_eq!(device.nearest_sample_rate(46000), Some(48000));
    }

    #[test]
    fn nearest_sample_rate_prefers_rate_at_or_above_target_over_any_below() {
        // A rate >= target always beats one < target, even when the rate
        // below target sits closer to it.
        let device = device_with_rates(&[(44100, 44100), (48000, 48000)]);
        assert_eq!(device.nearest_sample_rate(45000), Some(48000));

        let device = device_with_rates(&[(44000, 44000), (46000, 46000)]);
        assert_eq!(device.nearest_sample_rate(45000), Some(46000));
    }

    #[test]
    fn nearest_sample_rate_returns_target_when_within_a_range() {
        let device = device_with_rates(&[(44100, 48000), (96000, 96000)]);
        assert_eq!(device.nearest_sample_rate(45000), Some(45000));
    }

    #[test]
    fn nearest_sample_rate_none_without_any_rates() {
        let device = device_with_rates(&[]);
        assert_eq!(device.nearest_sample_rate(44100), None);
    }

    #[test]
    fn supports_sample_rate_checks_ranges() {
        let device = device_with_rates(&[(44100, 96000)]);
        assert!(device.supports_sample_rate(48000));
        assert!(!device.supports_sample_rate(192_000));
    }
}
