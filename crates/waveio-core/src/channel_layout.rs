//! Channel identifiers and the built-in channel layout catalog.

use std::fmt;

/// Maximum channel count any [`ChannelLayout`] can describe.
pub const MAX_CHANNELS: usize = 32;

/// A single loudspeaker or logical channel position.
///
/// This is not exhaustive of every id the reference project names (it omits
/// a long tail of rarely-used wide/high/ambisonic positions), but it covers
/// every channel used by a built-in layout plus the auxiliary and
/// mid-side/XY channels applications reach for when a layout doesn't fit a
/// named speaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ChannelId {
    /// Not a meaningful channel; used as a sentinel.
    Invalid,
    FrontLeft,
    FrontRight,
    FrontCenter,
    Lfe,
    BackLeft,
    BackRight,
    FrontLeftCenter,
    FrontRightCenter,
    BackCenter,
    SideLeft,
    SideRight,
    TopCenter,
    TopFrontLeft,
    TopFrontCenter,
    TopFrontRight,
    TopBackLeft,
    TopBackCenter,
    TopBackRight,
    /// Ambisonic W (zeroth order).
    AmbisonicW,
    /// Ambisonic X (first order).
    AmbisonicX,
    /// Ambisonic Y (first order).
    AmbisonicY,
    /// Ambisonic Z (first order).
    AmbisonicZ,
    /// Mid channel of a mid-side (M/S) pair.
    MsMid,
    /// Side channel of a mid-side (M/S) pair.
    MsSide,
    /// X channel of an X/Y stereo pair.
    XyX,
    /// Y channel of an X/Y stereo pair.
    XyY,
    /// Auxiliary channel, numbered 0 through 15.
    Aux(u8),
}

impl ChannelId {
    /// Human-readable name, matching `soundio_get_channel_name`.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ChannelId::Invalid => "(Invalid Channel)",
            ChannelId::FrontLeft => "Front Left",
            ChannelId::FrontRight => "Front Right",
            ChannelId::FrontCenter => "Front Center",
            ChannelId::Lfe => "LFE",
            ChannelId::BackLeft => "Back Left",
            ChannelId::BackRight => "Back Right",
            ChannelId::FrontLeftCenter => "Front Left Center",
            ChannelId::FrontRightCenter => "Front Right Center",
            ChannelId::BackCenter => "Back Center",
            ChannelId::SideLeft => "Side Left",
            ChannelId::SideRight => "Side Right",
            ChannelId::TopCenter => "Top Center",
            ChannelId::TopFrontLeft => "Top Front Left",
            ChannelId::TopFrontCenter => "Top Front Center",
            ChannelId::TopFrontRight => "Top Front Right",
            ChannelId::TopBackLeft => "Top Back Left",
            ChannelId::TopBackCenter => "Top Back Center",
            ChannelId::TopBackRight => "Top Back Right",
            ChannelId::AmbisonicW => "Ambisonic W",
            ChannelId::AmbisonicX => "Ambisonic X",
            ChannelId::AmbisonicY => "Ambisonic Y",
            ChannelId::AmbisonicZ => "Ambisonic Z",
            ChannelId::MsMid => "Mid/Side Mid",
            ChannelId::MsSide => "Mid/Side Side",
            ChannelId::XyX => "X/Y X",
            ChannelId::XyY => "X/Y Y",
            ChannelId::Aux(_) => "Auxiliary",
        }
    }

    /// Parses a channel id from one of its short (`"FL"`) or snake-cased
    /// (`"front-left"`) aliases, matching `soundio_parse_channel_id`.
    #[must_use]
    pub fn parse(name: &str) -> Option<ChannelId> {
        let normalized = name.trim();
        for id in builtin_channel_ids() {
            if id.name().eq_ignore_ascii_case(normalized) {
                return Some(id);
            }
            if let Some(alias) = id.short_alias() {
                if alias.eq_ignore_ascii_case(normalized) {
                    return Some(id);
                }
            }
        }
        None
    }

    fn short_alias(self) -> Option<&'static str> {
        match self {
            ChannelId::FrontLeft => Some("FL"),
            ChannelId::FrontRight => Some("FR"),
            ChannelId::FrontCenter => Some("FC"),
            ChannelId::Lfe => Some("LFE"),
            ChannelId::BackLeft => Some("BL"),
            ChannelId::BackRight => Some("BR"),
            ChannelId::FrontLeftCenter => Some("FLC"),
            ChannelId::FrontRightCenter => Some("FRC"),
            ChannelId::BackCenter => Some("BC"),
            ChannelId::SideLeft => Some("SL"),
            ChannelId::SideRight => Some("SR"),
            ChannelId::TopCenter => Some("TC"),
            ChannelId::TopFrontLeft => Some("TFL"),
            ChannelId::TopFrontCenter => Some("TFC"),
            ChannelId::TopFrontRight => Some("TFR"),
            ChannelId::TopBackLeft => Some("TBL"),
            ChannelId::TopBackCenter => Some("TBC"),
            ChannelId::TopBackRight => Some("TBR"),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn builtin_channel_ids() -> impl Iterator<Item = ChannelId> {
    [
        ChannelId::FrontLeft,
        ChannelId::FrontRight,
        ChannelId::FrontCenter,
        ChannelId::Lfe,
        ChannelId::BackLeft,
        ChannelId::BackRight,
        ChannelId::FrontLeftCenter,
        ChannelId::FrontRightCenter,
        ChannelId::BackCenter,
        ChannelId::SideLeft,
        ChannelId::SideRight,
        ChannelId::TopCenter,
        ChannelId::TopFrontLeft,
        ChannelId::TopFrontCenter,
        ChannelId::TopFrontRight,
        ChannelId::TopBackLeft,
        ChannelId::TopBackCenter,
        ChannelId::TopBackRight,
    ]
    .into_iter()
}

/// An ordered set of channel positions, optionally carrying a recognized
/// built-in name.
///
/// Two layouts are equal iff their channel counts match and their channel
/// ids match positionally; the `name` field is not part of equality.
#[derive(Debug, Clone)]
pub struct ChannelLayout {
    name: Option<&'static str>,
    channels: Vec<ChannelId>,
}

impl ChannelLayout {
    /// Builds a layout from an explicit channel sequence, running built-in
    /// name detection over it.
    ///
    /// # Panics
    ///
    /// Panics if `channels.len()` exceeds [`MAX_CHANNELS`]; callers validate
    /// channel count before constructing a layout (see `Outstream::open`).
    #[must_use]
    pub fn new(channels: Vec<ChannelId>) -> Self {
        assert!(channels.len() <= MAX_CHANNELS);
        let mut layout = Self {
            name: None,
            channels,
        };
        layout.detect_builtin();
        layout
    }

    /// Number of channels in this layout.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// The channel sequence.
    #[must_use]
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// The recognized built-in name, if any.
    #[must_use]
    pub fn name(&self) -> Option<&'static str> {
        self.name
    }

    /// Index of `id` within this layout's channel sequence, if present.
    #[must_use]
    pub fn find_channel(&self, id: ChannelId) -> Option<usize> {
        self.channels.iter().position(|&c| c == id)
    }

    /// Attaches the built-in name matching this layout's channel sequence,
    /// or clears the name if none matches.
    pub fn detect_builtin(&mut self) {
        self.name = BUILTIN_LAYOUTS
            .iter()
            .find(|builtin| builtin.channels == self.channels.as_slice())
            .map(|builtin| builtin.name);
    }
}

impl PartialEq for ChannelLayout {
    fn eq(&self, other: &Self) -> bool {
        self.channels == other.channels
    }
}
impl Eq for ChannelLayout {}

struct BuiltinLayout {
    name: &'static str,
    channels: &'static [ChannelId],
}

use ChannelId::{
    BackCenter as BC, BackLeft as BL, BackRight as BR, FrontCenter as FC,
    FrontLeftCenter as FLC, FrontLeft as FL, FrontRightCenter as FRC, FrontRight as FR, Lfe,
    SideLeft as SL, SideRight as SR,
};

static BUILTIN_LAYOUTS: &[BuiltinLayout] = &[
    BuiltinLayout { name: "Mono", channels: &[FC] },
    BuiltinLayout { name: "Stereo", channels: &[FL, FR] },
    BuiltinLayout { name: "2.1", channels: &[FL, FR, Lfe] },
    BuiltinLayout { name: "3.0", channels: &[FL, FR, FC] },
    BuiltinLayout { name: "3.0 (back)", channels: &[FL, FR, BC] },
    BuiltinLayout { name: "3.1", channels: &[FL, FR, FC, Lfe] },
    BuiltinLayout { name: "4.0", channels: &[FL, FR, FC, BC] },
    BuiltinLayout { name: "Quad", channels: &[FL, FR, BL, BR] },
    BuiltinLayout { name: "Quad (side)", channels: &[FL, FR, SL, SR] },
    BuiltinLayout { name: "4.1", channels: &[FL, FR, FC, BC, Lfe] },
    BuiltinLayout { name: "5.0 (back)", channels: &[FL, FR, FC, BL, BR] },
    BuiltinLayout { name: "5.0 (side)", channels: &[FL, FR, FC, SL, SR] },
    BuiltinLayout { name: "5.1", channels: &[FL, FR, FC, SL, SR, Lfe] },
    BuiltinLayout { name: "5.1 (back)", channels: &[FL, FR, FC, BL, BR, Lfe] },
    BuiltinLayout { name: "6.0 (side)", channels: &[FL, FR, FC, SL, SR, BC] },
    BuiltinLayout { name: "6.0 (front)", channels: &[FL, FR, SL, SR, FLC, FRC] },
    BuiltinLayout { name: "Hexagonal", channels: &[FL, FR, FC, BL, BR, BC] },
    BuiltinLayout { name: "6.1", channels: &[FL, FR, FC, SL, SR, BC, Lfe] },
    BuiltinLayout { name: "6.1 (back)", channels: &[FL, FR, FC, BL, BR, BC, Lfe] },
    BuiltinLayout { name: "6.1 (front)", channels: &[FL, FR, SL, SR, FLC, FRC, Lfe] },
    BuiltinLayout { name: "7.0", channels: &[FL, FR, FC, SL, SR, BL, BR] },
    BuiltinLayout { name: "7.0 (front)", channels: &[FL, FR, FC, SL, SR, FLC, FRC] },
    BuiltinLayout { name: "7.1", channels: &[FL, FR, FC, SL, SR, BL, BR, Lfe] },
    BuiltinLayout { name: "7.1 (wide)", channels: &[FL, FR, FC, SL, SR, FLC, FRC, Lfe] },
    BuiltinLayout { name: "7.1 (wide) (back)", channels: &[FL, FR, FC, BL, BR, FLC, FRC, Lfe] },
    BuiltinLayout { name: "Octagonal", channels: &[FL, FR, FC, SL, SR, BL, BR, BC] },
];

/// Number of built-in layouts in the catalog.
#[must_use]
pub fn builtin_layout_count() -> usize {
    BUILTIN_LAYOUTS.len()
}

/// Returns the built-in layout at `index`, panicking like the reference
/// implementation's bounds-unchecked array index if `index` is out of range.
#[must_use]
pub fn builtin_layout(index: usize) -> ChannelLayout {
    let builtin = &BUILTIN_LAYOUTS[index];
    ChannelLayout {
        name: Some(builtin.name),
        channels: builtin.channels.to_vec(),
    }
}

/// Returns the default layout the library falls back to for a given channel
/// count: Mono for 1, Stereo for 2, and the first builtin layout of matching
/// count otherwise (falling back to an unnamed sequential layout if no
/// builtin of that exact count exists).
#[must_use]
pub fn default_layout_for_channel_count(channel_count: usize) -> ChannelLayout {
    if let Some(builtin) = BUILTIN_LAYOUTS
        .iter()
        .find(|b| b.channels.len() == channel_count)
    {
        return ChannelLayout {
            name: Some(builtin.name),
            channels: builtin.channels.to_vec(),
        };
    }
    // No builtin of this exact count: synthesize front-left/front-right/aux*.
    let mut channels = Vec::with_capacity(channel_count);
    for i in 0..channel_count {
        channels.push(match i {
            0 => ChannelId::FrontLeft,
            1 => ChannelId::FrontRight,
            n => ChannelId::Aux((n - 2) as u8),
        });
    }
    ChannelLayout::new(channels)
}

/// Returns `true` if `target` occurs (by channel-sequence equality) in
/// `available`.
fn layout_contains(available: &[ChannelLayout], target: &ChannelLayout) -> bool {
    available.iter().any(|layout| layout == target)
}

/// Returns the first of `preferred` that occurs in `available`, or `None`.
#[must_use]
pub fn best_matching_channel_layout<'a>(
    preferred: &'a [ChannelLayout],
    available: &[ChannelLayout],
) -> Option<&'a ChannelLayout> {
    preferred.iter().find(|layout| layout_contains(available, layout))
}

/// Sorts layouts by descending channel count, stable for ties — mirrors
/// `soundio_sort_channel_layouts`, implemented with a stable sort since the
/// reference project's `qsort` on a platform with a stable algorithm and our
/// testable property both expect tie order to be preserved.
pub fn sort_channel_layouts(layouts: &mut [ChannelLayout]) {
    layouts.sort_by(|a, b| b.channel_count().cmp(&a.channel_count()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_every_builtin_layout() {
        for i in 0..builtin_layout_count() {
            let builtin = builtin_layout(i);
            let mut copy = ChannelLayout {
                name: None,
                channels: builtin.channels().to_vec(),
            };
            copy.detect_builtin();
            assert_eq!(copy.name(), builtin.name());
        }
    }

    #[test]
    fn equality_is_positional_and_ignores_name() {
        let a = ChannelLayout::new(vec![ChannelId::FrontLeft, ChannelId::FrontRight]);
        let mut b = ChannelLayout::new(vec![ChannelId::FrontLeft, ChannelId::FrontRight]);
        b.name = None;
        assert_eq!(a, b);

        let c = ChannelLayout::new(vec![ChannelId::FrontRight, ChannelId::FrontLeft]);
        assert_ne!(a, c);
    }

    #[test]
    fn equality_is_reflexive_and_symmetric() {
        let a = ChannelLayout::new(vec![ChannelId::FrontCenter]);
        let b = ChannelLayout::new(vec![ChannelId::FrontCenter]);
        assert_eq!(a, a);
        assert_eq!(a, b);
        assert_eq!(b, a);
    }

    #[test]
    fn best_matching_picks_first_preferred_available() {
        let stereo = builtin_layout(1);
        let mono = builtin_layout(0);
        let preferred = vec![stereo.clone(), mono.clone()];
        let available = vec![mono.clone()];
        let matched = best_matching_channel_layout(&preferred, &available).unwrap();
        assert_eq!(matched, &mono);
    }

    #[test]
    fn best_matching_none_when_nothing_overlaps() {
        let preferred = vec![builtin_layout(1)];
        let available = vec![builtin_layout(0)];
        assert!(best_matching_channel_layout(&preferred, &available).is_none());
    }

    #[test]
    fn sort_is_descending_and_stable_for_ties() {
        let mut layouts = vec![builtin_layout(0), builtin_layout(12), builtin_layout(1)];
        sort_channel_layouts(&mut layouts);
        let counts: Vec<_> = layouts.iter().map(ChannelLayout::channel_count).collect();
        assert!(counts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn parse_accepts_full_name_and_short_alias() {
        assert_eq!(ChannelId::parse("Front Left"), Some(ChannelId::FrontLeft));
        assert_eq!(ChannelId::parse("FL"), Some(ChannelId::FrontLeft));
        assert_eq!(ChannelId::parse("fl"), Some(ChannelId::FrontLeft));
        assert_eq!(ChannelId::parse("nonsense"), None);
    }

    #[test]
    fn default_layout_for_count_matches_builtin_when_present() {
        assert_eq!(default_layout_for_channel_count(2).name(), Some("Stereo"));
        assert_eq!(default_layout_for_channel_count(1).name(), Some("Mono"));
    }
}
