//! Per-variant engine tuning
//!
//! Everything here is a pure function of the device profile and the
//! playback settings. Device dependent numbers live in small tables so a
//! new device class is a new row, not a new branch.

use log::warn;
use serde::Serialize;

use crate::device::DeviceProfile;
use crate::settings::{HwDecodeMode, HwDecoderImpl, PlaybackSettings, VideoOutput};

/// Buffer durations for the modern and legacy engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferDurations {
    pub min_buffer_ms: u32,
    pub max_buffer_ms: u32,
    pub buffer_for_playback_ms: u32,
    pub buffer_for_rebuffer_ms: u32,
}

pub const STB_BUFFERS: BufferDurations = BufferDurations {
    min_buffer_ms: 30_000,
    max_buffer_ms: 120_000,
    buffer_for_playback_ms: 2_500,
    buffer_for_rebuffer_ms: 5_000,
};

/// Back buffer kept by the modern engine
pub const MODERN_BACK_BUFFER_MS: u32 = 10_000;

/// Track selection limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackConstraints {
    pub max_width: u32,
    pub max_height: u32,
    pub force_lowest_bitrate: bool,
}

pub const CAP_480P: TrackConstraints = TrackConstraints {
    max_width: 854,
    max_height: 480,
    force_lowest_bitrate: true,
};

/// How the engine should treat the stream container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContentType {
    Hls,
    Progressive,
    /// Let the engine sniff it
    Detect,
}

impl ContentType {
    /// Guess from the URL path
    pub fn infer(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.to_ascii_lowercase().ends_with(".m3u8") {
            ContentType::Hls
        } else {
            ContentType::Progressive
        }
    }
}

/// Modern/legacy engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExoTuning {
    pub buffers: BufferDurations,
    pub back_buffer_ms: Option<u32>,
    pub prioritize_time_over_size: bool,
    pub track_constraints: Option<TrackConstraints>,
    pub decoder_fallback: bool,
    pub prefer_extension_decoders: bool,
    pub content_type: ContentType,
}

/// Loop filter skipping in the software decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopFilterSkip {
    NonRef,
    All,
}

impl LoopFilterSkip {
    fn as_str(self) -> &'static str {
        match self {
            LoopFilterSkip::NonRef => "nonref",
            LoopFilterSkip::All => "all",
        }
    }
}

/// Alternate engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VlcTuning {
    pub verbose: bool,
    pub caching_ms: u32,
    pub decode_threads: usize,
    pub skip_loop_filter: LoopFilterSkip,
    /// Fast decode plus non-ref frame and IDCT skipping
    pub light_decode: bool,
    pub hw_decoding: bool,
    pub force_hw: bool,
    pub hw_decoder: Option<&'static str>,
    /// Codec restriction when decoding must stay in hardware
    pub codec_restriction: Option<&'static str>,
    pub video_output: &'static str,
    pub chroma: &'static str,
    pub deinterlace: bool,
    pub use_texture: bool,
}

impl VlcTuning {
    /// Engine-instance option list
    pub fn instance_options(&self) -> Vec<String> {
        let mut options = vec![if self.verbose { "-vvv" } else { "-vv" }.to_string()];
        options.extend(self.common_options("--"));
        options.push(format!("--vout={}", self.video_output));
        options.push(format!("--android-display-chroma={}", self.chroma));
        options.extend(self.deinterlace_options("--"));
        options
    }

    /// Per-media option list
    pub fn media_options(&self) -> Vec<String> {
        let mut options = self.common_options(":");
        options.push(format!(":android-display-chroma={}", self.chroma));
        options.extend(self.deinterlace_options(":"));
        if let Some(codec) = self.codec_restriction {
            options.push(format!(":codec={}", codec));
        }
        options
    }

    fn common_options(&self, prefix: &str) -> Vec<String> {
        let mut options = vec![
            format!("{}network-caching={}", prefix, self.caching_ms),
            format!("{}live-caching={}", prefix, self.caching_ms),
            format!("{}file-caching={}", prefix, self.caching_ms),
            format!("{}drop-late-frames", prefix),
            format!("{}skip-frames", prefix),
            format!("{}avcodec-threads={}", prefix, self.decode_threads),
            format!("{}avcodec-skiploopfilter={}", prefix, self.skip_loop_filter.as_str()),
        ];
        if self.light_decode {
            options.push(format!("{}avcodec-fast", prefix));
            options.push(format!("{}avcodec-skip-frame=nonref", prefix));
            options.push(format!("{}avcodec-skip-idct=nonref", prefix));
        }
        options
    }

    fn deinterlace_options(&self, prefix: &str) -> Vec<String> {
        if self.deinterlace {
            vec![format!("{}deinterlace=1", prefix), format!("{}deinterlace-mode=yadif", prefix)]
        } else {
            vec![format!("{}deinterlace=0", prefix)]
        }
    }
}

/// Native engine audio gating windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MuteTimings {
    /// Open the engine muted
    pub start_muted: bool,
    /// Unmute this long after playback starts if no frame shows up
    pub unmute_fallback_ms: u64,
    /// Unmute delay after the first frame
    pub post_render_unmute_ms: u64,
    /// Unmute delay after a rebuffer ends
    pub post_buffer_unmute_ms: u64,
    /// One corrective seek after the first frame
    pub resync_seek: bool,
}

/// Native engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NativeTuning {
    pub mute: MuteTimings,
    pub use_texture: bool,
}

/// Engine configuration, by engine family
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineTuning {
    Exo(ExoTuning),
    Vlc(VlcTuning),
    Native(NativeTuning),
}

/// Device classes with their own timing rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceClass {
    PersistentOffset,
    LegacyOs,
    Standard,
}

impl DeviceClass {
    fn of(profile: &DeviceProfile) -> Self {
        if profile.quirks.persistent_av_offset {
            DeviceClass::PersistentOffset
        } else if profile.quirks.legacy_os {
            DeviceClass::LegacyOs
        } else {
            DeviceClass::Standard
        }
    }
}

/// (class, unmute fallback, post-render delay, post-buffer delay)
const MUTE_WINDOWS: [(DeviceClass, u64, u64, u64); 3] = [
    (DeviceClass::PersistentOffset, 800, 120, 0),
    (DeviceClass::LegacyOs, 600, 80, 0),
    (DeviceClass::Standard, 400, 50, 0),
];

/// Decode thread caps: (legacy OS, max threads)
const DECODE_THREAD_CAPS: [(bool, usize); 2] = [(true, 2), (false, 4)];

/// Legacy OS caching floor: below `threshold`, use `floor`
const LEGACY_CACHING_THRESHOLD_MS: u32 = 3_000;
const LEGACY_CACHING_FLOOR_MS: u32 = 5_000;

/// Mute windows for the native engine on this device
pub fn mute_timings(profile: &DeviceProfile) -> MuteTimings {
    let class = DeviceClass::of(profile);
    let (_, fallback, post_render, post_buffer) = MUTE_WINDOWS
        .iter()
        .copied()
        .find(|row| row.0 == class)
        .unwrap_or(MUTE_WINDOWS[MUTE_WINDOWS.len() - 1]);

    MuteTimings {
        start_muted: profile.quirks.early_audio,
        unmute_fallback_ms: fallback,
        post_render_unmute_ms: post_render,
        post_buffer_unmute_ms: post_buffer,
        resync_seek: profile.quirks.persistent_av_offset,
    }
}

/// Whether video should be capped at 480p
fn wants_480p_cap(
    settings: &PlaybackSettings,
    profile: &DeviceProfile,
    include_emulator: bool,
) -> bool {
    settings.resolution_cap_480p
        || profile.quirks.legacy_os
        || (include_emulator && profile.quirks.emulator)
}

pub fn exo_modern(settings: &PlaybackSettings, profile: &DeviceProfile) -> ExoTuning {
    ExoTuning {
        buffers: STB_BUFFERS,
        back_buffer_ms: Some(MODERN_BACK_BUFFER_MS),
        prioritize_time_over_size: true,
        track_constraints: wants_480p_cap(settings, profile, true).then_some(CAP_480P),
        decoder_fallback: !profile.quirks.disable_decoder_fallback,
        prefer_extension_decoders: true,
        content_type: ContentType::Detect,
    }
}

pub fn exo_legacy(url: &str, settings: &PlaybackSettings, profile: &DeviceProfile) -> ExoTuning {
    ExoTuning {
        buffers: STB_BUFFERS,
        back_buffer_ms: None,
        prioritize_time_over_size: true,
        track_constraints: wants_480p_cap(settings, profile, false).then_some(CAP_480P),
        decoder_fallback: !profile.quirks.disable_decoder_fallback,
        prefer_extension_decoders: true,
        content_type: ContentType::infer(url),
    }
}

pub fn vlc(settings: &PlaybackSettings, profile: &DeviceProfile) -> VlcTuning {
    let legacy = profile.quirks.legacy_os;

    let mut caching_ms = settings.network_caching_ms;
    if legacy && caching_ms < LEGACY_CACHING_THRESHOLD_MS {
        caching_ms = LEGACY_CACHING_FLOOR_MS;
    }

    let cap = DECODE_THREAD_CAPS
        .iter()
        .find(|(is_legacy, _)| *is_legacy == legacy)
        .map(|(_, cap)| *cap)
        .unwrap_or(1);
    let decode_threads = profile.cpu_cores.max(1).min(cap);

    let mut hw_mode = settings.hw_decode_mode;
    if hw_mode == HwDecodeMode::ForceOn && profile.quirks.no_forced_hw_decode {
        warn!("Forced hardware decoding is unstable on this device; using plain hardware decoding");
        hw_mode = HwDecodeMode::On;
    }
    let hw_decoding = hw_mode != HwDecodeMode::Off;

    let hw_decoder = hw_decoding.then(|| match settings.hw_decoder_impl {
        HwDecoderImpl::MediaCodecNdk => "mediacodec_ndk",
        HwDecoderImpl::MediaCodec => "mediacodec_jni",
        HwDecoderImpl::Auto if profile.api_level >= 21 => "mediacodec_ndk",
        HwDecoderImpl::Auto => "mediacodec_jni",
    });

    match settings.video_output {
        VideoOutput::Auto | VideoOutput::Display => {}
        other => warn!("Video output {:?} is not usable here; forcing the display output", other),
    }

    VlcTuning {
        verbose: !legacy,
        caching_ms,
        decode_threads,
        skip_loop_filter: if legacy { LoopFilterSkip::NonRef } else { LoopFilterSkip::All },
        light_decode: legacy,
        hw_decoding,
        force_hw: hw_mode == HwDecodeMode::ForceOn,
        hw_decoder,
        codec_restriction: if settings.hw_force_only { hw_decoder } else { None },
        video_output: "android_display",
        chroma: "RV16",
        deinterlace: settings.deinterlace,
        use_texture: settings.use_texture_surface,
    }
}

pub fn native(settings: &PlaybackSettings, profile: &DeviceProfile) -> NativeTuning {
    NativeTuning {
        mute: mute_timings(profile),
        use_texture: settings.use_texture_surface,
    }
}
