//! Known-device quirk table
//!
//! Every device-specific behavior in the engine hangs off a [`QuirkFlags`]
//! bit. Supporting a new box means adding a row to [`QUIRK_TABLE`]; no
//! control flow elsewhere changes.

use serde::{Deserialize, Serialize};

use super::PlatformInfo;

/// Boolean quirks derived from device identity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuirkFlags {
    /// Codec fallback inside the modern/legacy engines must stay off
    pub disable_decoder_fallback: bool,

    /// Forced hardware decoding crashes; downgrade to plain hardware decoding
    pub no_forced_hw_decode: bool,

    /// Audio starts before the first video frame is visible
    pub early_audio: bool,

    /// A/V offset persists after the first frame; needs one corrective seek
    pub persistent_av_offset: bool,

    /// Two or fewer CPU cores
    pub low_core_count: bool,

    /// Running on an emulator image
    pub emulator: bool,

    /// OS API level 19 or older
    pub legacy_os: bool,
}

impl QuirkFlags {
    /// Union of two flag sets
    pub fn merge(self, other: QuirkFlags) -> QuirkFlags {
        QuirkFlags {
            disable_decoder_fallback: self.disable_decoder_fallback
                || other.disable_decoder_fallback,
            no_forced_hw_decode: self.no_forced_hw_decode || other.no_forced_hw_decode,
            early_audio: self.early_audio || other.early_audio,
            persistent_av_offset: self.persistent_av_offset || other.persistent_av_offset,
            low_core_count: self.low_core_count || other.low_core_count,
            emulator: self.emulator || other.emulator,
            legacy_os: self.legacy_os || other.legacy_os,
        }
    }
}

/// Which identifier a matcher inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Manufacturer,
    Model,
    Device,
}

/// Case-insensitive substring test against one identifier
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    pub field: Field,
    pub needle: &'static str,
}

/// One row of the quirk table.
///
/// A rule matches when at least one of `any_of` matches, and `manufacturer`
/// (if set) is contained in the manufacturer string. `manufacturer_optional`
/// lets a rule match boxes whose firmware leaves the manufacturer blank.
#[derive(Debug, Clone, Copy)]
pub struct QuirkRule {
    pub name: &'static str,
    pub manufacturer: Option<&'static str>,
    pub manufacturer_optional: bool,
    pub any_of: &'static [Matcher],
    pub flags: QuirkFlags,
}

const NO_FLAGS: QuirkFlags = QuirkFlags {
    disable_decoder_fallback: false,
    no_forced_hw_decode: false,
    early_audio: false,
    persistent_av_offset: false,
    low_core_count: false,
    emulator: false,
    legacy_os: false,
};

/// Known quirky set-top boxes
pub static QUIRK_TABLE: &[QuirkRule] = &[
    QuirkRule {
        name: "huawei-ec6108v9",
        manufacturer: Some("huawei"),
        manufacturer_optional: true,
        any_of: &[Matcher { field: Field::Model, needle: "ec6108" }],
        flags: QuirkFlags {
            disable_decoder_fallback: true,
            no_forced_hw_decode: true,
            ..NO_FLAGS
        },
    },
    QuirkRule {
        name: "zte-b760h",
        manufacturer: Some("zte"),
        manufacturer_optional: false,
        any_of: &[
            Matcher { field: Field::Model, needle: "b760" },
            Matcher { field: Field::Device, needle: "b760" },
        ],
        flags: QuirkFlags {
            early_audio: true,
            persistent_av_offset: true,
            ..NO_FLAGS
        },
    },
];

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack
        .map(|h| h.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()))
        .unwrap_or(false)
}

impl QuirkRule {
    /// Check whether this rule applies to the platform
    pub fn matches(&self, info: &PlatformInfo) -> bool {
        let identity = self.any_of.iter().any(|m| {
            let value = match m.field {
                Field::Manufacturer => info.manufacturer.as_deref(),
                Field::Model => info.model.as_deref(),
                Field::Device => info.device.as_deref(),
            };
            contains_ci(value, m.needle)
        });
        if !identity {
            return false;
        }

        match self.manufacturer {
            None => true,
            Some(maker) => match info.manufacturer.as_deref() {
                Some(actual) if !actual.trim().is_empty() => contains_ci(Some(actual), maker),
                _ => self.manufacturer_optional,
            },
        }
    }
}

/// Heuristic emulator detection from build identifiers
pub fn looks_like_emulator(info: &PlatformInfo) -> bool {
    let fingerprint = info.fingerprint.as_deref().unwrap_or("");
    if fingerprint.contains("generic") || fingerprint.contains("unknown") {
        return true;
    }

    let model = info.model.as_deref().unwrap_or("");
    if ["google_sdk", "Emulator", "Android SDK built for"]
        .iter()
        .any(|needle| model.contains(needle))
    {
        return true;
    }

    if contains_ci(info.manufacturer.as_deref(), "genymotion") {
        return true;
    }

    if let (Some(brand), Some(device)) = (info.brand.as_deref(), info.device.as_deref()) {
        if brand.starts_with("generic") && device.starts_with("generic") {
            return true;
        }
    }

    info.product.as_deref().map(|p| p.contains("sdk")).unwrap_or(false)
}

/// Evaluate every table row and the derived flags
pub fn evaluate(info: &PlatformInfo) -> (QuirkFlags, Vec<&'static str>) {
    let mut flags = QuirkFlags::default();
    let mut matched = Vec::new();

    for rule in QUIRK_TABLE {
        if rule.matches(info) {
            flags = flags.merge(rule.flags);
            matched.push(rule.name);
        }
    }

    let legacy_os = info.api_level <= super::LEGACY_API_LEVEL;
    flags.legacy_os = legacy_os;
    flags.early_audio |= legacy_os;
    flags.low_core_count = info.cpu_cores <= 2;
    flags.emulator = looks_like_emulator(info);

    (flags, matched)
}
