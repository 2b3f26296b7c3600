//! Sample format catalog.

use std::fmt;

/// A concrete sample encoding: bit width, signedness, and byte order.
///
/// There is no separate "native endian" variant; `Format::s16_ne` and its
/// siblings are convenience constructors that resolve directly to whichever
/// concrete `Le`/`Be` variant matches the compilation target, so the enum
/// itself never needs to branch on endianness again once a value exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    S8,
    U8,
    S16Le,
    S16Be,
    U16Le,
    U16Be,
    S24Le,
    S24Be,
    U24Le,
    U24Be,
    S24PackedLe,
    S24PackedBe,
    U24PackedLe,
    U24PackedBe,
    S32Le,
    S32Be,
    U32Le,
    U32Be,
    Float32Le,
    Float32Be,
    Float64Le,
    Float64Be,
    Invalid,
}

impl Format {
    /// `S16` in the host's native byte order.
    #[must_use]
    pub const fn s16_ne() -> Format {
        if cfg!(target_endian = "little") { Format::S16Le } else { Format::S16Be }
    }

    /// `S32` in the host's native byte order.
    #[must_use]
    pub const fn s32_ne() -> Format {
        if cfg!(target_endian = "little") { Format::S32Le } else { Format::S32Be }
    }

    /// `Float32` in the host's native byte order.
    #[must_use]
    pub const fn float32_ne() -> Format {
        if cfg!(target_endian = "little") { Format::Float32Le } else { Format::Float32Be }
    }

    /// `Float64` in the host's native byte order.
    #[must_use]
    pub const fn float64_ne() -> Format {
        if cfg!(target_endian = "little") { Format::Float64Le } else { Format::Float64Be }
    }

    /// Bytes occupied by one sample of this format, including padding for
    /// the unpacked 24-bit variants (which occupy 4 bytes, top byte unused).
    ///
    /// Returns 0 for [`Format::Invalid`].
    #[must_use]
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            Format::S8 | Format::U8 => 1,
            Format::S16Le | Format::S16Be | Format::U16Le | Format::U16Be => 2,
            Format::S24PackedLe | Format::S24PackedBe | Format::U24PackedLe | Format::U24PackedBe => 3,
            Format::S24Le
            | Format::S24Be
            | Format::U24Le
            | Format::U24Be
            | Format::S32Le
            | Format::S32Be
            | Format::U32Le
            | Format::U32Be
            | Format::Float32Le
            | Format::Float32Be => 4,
            Format::Float64Le | Format::Float64Be => 8,
            Format::Invalid => 0,
        }
    }

    /// `true` for the IEEE-754 float formats.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            Format::Float32Le | Format::Float32Be | Format::Float64Le | Format::Float64Be
        )
    }

    /// `true` if this format stores its bytes little-endian. Meaningless
    /// (returns `false`) for [`Format::Invalid`].
    #[must_use]
    pub const fn is_little_endian(self) -> bool {
        matches!(
            self,
            Format::S16Le
                | Format::U16Le
                | Format::S24Le
                | Format::U24Le
                | Format::S24PackedLe
                | Format::U24PackedLe
                | Format::S32Le
                | Format::U32Le
                | Format::Float32Le
                | Format::Float64Le
                | Format::S8
                | Format::U8
        )
    }

    /// Priority used to pick a default format when a device exposes several:
    /// higher is preferred. Mirrors the reference project's fixed
    /// preference order (float over integer, wider over narrower, signed
    /// over unsigned).
    #[must_use]
    pub const fn default_priority(self) -> i32 {
        match self {
            Format::Float32Le | Format::Float32Be => 100,
            Format::Float64Le | Format::Float64Be => 90,
            Format::S32Le | Format::S32Be => 80,
            Format::S24Le | Format::S24Be => 70,
            Format::S24PackedLe | Format::S24PackedBe => 65,
            Format::S16Le | Format::S16Be => 60,
            Format::U32Le | Format::U32Be => 50,
            Format::U24Le | Format::U24Be => 40,
            Format::U24PackedLe | Format::U24PackedBe => 35,
            Format::U16Le | Format::U16Be => 30,
            Format::S8 => 20,
            Format::U8 => 10,
            Format::Invalid => -1,
        }
    }

    /// Display name matching `soundio_format_string`.
    #[must_use]
    pub const fn format_string(self) -> &'static str {
        match self {
            Format::S8 => "signed 8-bit",
            Format::U8 => "unsigned 8-bit",
            Format::S16Le => "signed 16-bit LE",
            Format::S16Be => "signed 16-bit BE",
            Format::U16Le => "unsigned 16-bit LE",
            Format::U16Be => "unsigned 16-bit BE",
            Format::S24Le => "signed 24-bit LE",
            Format::S24Be => "signed 24-bit BE",
            Format::U24Le => "unsigned 24-bit LE",
            Format::U24Be => "unsigned 24-bit BE",
            Format::S24PackedLe => "signed 24-bit packed LE",
            Format::S24PackedBe => "signed 24-bit packed BE",
            Format::U24PackedLe => "unsigned 24-bit packed LE",
            Format::U24PackedBe => "unsigned 24-bit packed BE",
            Format::S32Le => "signed 32-bit LE",
            Format::S32Be => "signed 32-bit BE",
            Format::U32Le => "unsigned 32-bit LE",
            Format::U32Be => "unsigned 32-bit BE",
            Format::Float32Le => "float 32-bit LE",
            Format::Float32Be => "float 32-bit BE",
            Format::Float64Le => "float 64-bit LE",
            Format::Float64Be => "float 64-bit BE",
            Format::Invalid => "(invalid format)",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_sample_matches_known_widths() {
        assert_eq!(Format::S8.bytes_per_sample(), 1);
        assert_eq!(Format::S16Le.bytes_per_sample(), 2);
        assert_eq!(Format::S24PackedLe.bytes_per_sample(), 3);
        assert_eq!(Format::S24Le.bytes_per_sample(), 4);
        assert_eq!(Format::S32Le.bytes_per_sample(), 4);
        assert_eq!(Format::Float32Le.bytes_per_sample(), 4);
        assert_eq!(Format::Float64Le.bytes_per_sample(), 8);
        assert_eq!(Format::Invalid.bytes_per_sample(), 0);
    }

    #[test]
    fn native_endian_resolves_to_concrete_variant() {
        let resolved = Format::s16_ne();
        assert!(matches!(resolved, Format::S16Le | Format::S16Be));
        if cfg!(target_endian = "little") {
            assert_eq!(resolved, Format::S16Le);
        } else {
            assert_eq!(resolved, Format::S16Be);
        }
    }

    #[test]
    fn float_formats_are_flagged() {
        assert!(Format::Float32Le.is_float());
        assert!(Format::Float64Be.is_float());
        assert!(!Format::S32Le.is_float());
    }

    #[test]
    fn default_priority_prefers_float_over_int_and_wider_over_narrower() {
        assert!(Format::Float32Le.default_priority() > Format::S32Le.default_priority());
        assert!(Format::S32Le.default_priority() > Format::S16Le.default_priority());
        assert!(Format::S16Le.default_priority() > Format::U8.default_priority());
        assert_eq!(Format::Invalid.default_priority(), -1);
    }

    #[test]
    fn display_matches_format_string() {
        assert_eq!(format!("{}", Format::Float32Le), "float 32-bit LE");
    }
}
