//! Format specifications: encoding choices plus post-processing options.
//!
//! Each encoding choice is a single optional value. A specification is
//! *complete* once every choice is resolved, and *compatible* with an
//! encoder when every resolved choice is in that encoder's
//! [`EncoderCapabilities`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Container/codec identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatId {
    Wav,
    Aiff,
    Flac,
    Ogg,
    Mp3,
    Raw,
}

impl FormatId {
    pub fn default_extension(&self) -> &'static str {
        match self {
            FormatId::Wav => "wav",
            FormatId::Aiff => "aiff",
            FormatId::Flac => "flac",
            FormatId::Ogg => "ogg",
            FormatId::Mp3 => "mp3",
            FormatId::Raw => "raw",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FormatId::Wav => "WAV",
            FormatId::Aiff => "AIFF",
            FormatId::Flac => "FLAC",
            FormatId::Ogg => "Ogg Vorbis",
            FormatId::Mp3 => "MP3",
            FormatId::Raw => "RAW",
        }
    }
}

/// Sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    S8,
    S16,
    S24,
    S32,
    U8,
    Float,
    Double,
}

impl SampleFormat {
    pub fn bits(&self) -> u16 {
        match self {
            SampleFormat::S8 | SampleFormat::U8 => 8,
            SampleFormat::S16 => 16,
            SampleFormat::S24 => 24,
            SampleFormat::S32 | SampleFormat::Float => 32,
            SampleFormat::Double => 64,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, SampleFormat::Float | SampleFormat::Double)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SampleFormat::S8 => "8-bit",
            SampleFormat::S16 => "16-bit",
            SampleFormat::S24 => "24-bit",
            SampleFormat::S32 => "32-bit",
            SampleFormat::U8 => "8-bit unsigned",
            SampleFormat::Float => "float",
            SampleFormat::Double => "double",
        }
    }
}

/// Output sample rate. `Session` resolves to the session's rate at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleRate {
    Session,
    Hz22050,
    Hz44100,
    Hz48000,
    Hz88200,
    Hz96000,
    Hz176400,
    Hz192000,
}

impl SampleRate {
    pub const FIXED: [SampleRate; 7] = [
        SampleRate::Hz22050,
        SampleRate::Hz44100,
        SampleRate::Hz48000,
        SampleRate::Hz88200,
        SampleRate::Hz96000,
        SampleRate::Hz176400,
        SampleRate::Hz192000,
    ];

    pub fn resolve(&self, session_rate: u32) -> u32 {
        match self {
            SampleRate::Session => session_rate,
            SampleRate::Hz22050 => 22050,
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz88200 => 88200,
            SampleRate::Hz96000 => 96000,
            SampleRate::Hz176400 => 176400,
            SampleRate::Hz192000 => 192000,
        }
    }

    /// Map a numeric rate to a fixed rate, if it is one.
    pub fn from_hz(hz: u32) -> Option<Self> {
        Self::FIXED.into_iter().find(|r| r.resolve(0) == hz)
    }
}

/// Codec quality class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    Lossless,
    NearLossless,
    Lossy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    FileDefault,
    Little,
    Big,
    Cpu,
}

/// Sample-rate conversion quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SrcQuality {
    Best,
    #[default]
    Good,
    Quick,
    Fastest,
    ZeroOrderHold,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DitherType {
    #[default]
    None,
    Rectangular,
    Shaped,
    Triangular,
}

/// How an encoder is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EncoderType {
    #[default]
    None,
    /// Encoded in-process.
    Native,
    /// Encoded by spawning an external tool.
    External,
}

/// Duration of silence added before or after the rendered audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SilenceDuration {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
}

impl SilenceDuration {
    pub fn from_seconds(seconds: u32) -> Self {
        Self {
            hours: seconds / 3600,
            minutes: (seconds / 60) % 60,
            seconds: seconds % 60,
            frames: 0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0 && self.frames == 0
    }

    pub fn to_samples(&self, sample_rate: u32, timecode_fps: f64) -> u64 {
        let whole = self.hours as f64 * 3600.0 + self.minutes as f64 * 60.0 + self.seconds as f64;
        let secs = whole + self.frames as f64 / timecode_fps;
        (secs * sample_rate as f64).round() as u64
    }
}

/// What a concrete encoder accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderCapabilities {
    pub format_id: FormatId,
    pub encoder_type: EncoderType,
    pub name: String,
    pub extension: String,
    pub sample_formats: Vec<SampleFormat>,
    pub endiannesses: Vec<Endianness>,
    pub sample_rates: Vec<SampleRate>,
    pub qualities: Vec<Quality>,
    pub channel_limit: u32,
    pub supports_tagging: bool,
    pub has_broadcast_info: bool,
}

impl EncoderCapabilities {
    fn all_rates() -> Vec<SampleRate> {
        let mut rates = vec![SampleRate::Session];
        rates.extend(SampleRate::FIXED);
        rates
    }

    pub fn wav() -> Self {
        Self {
            format_id: FormatId::Wav,
            encoder_type: EncoderType::Native,
            name: FormatId::Wav.name().into(),
            extension: FormatId::Wav.default_extension().into(),
            sample_formats: vec![
                SampleFormat::S16,
                SampleFormat::S24,
                SampleFormat::S32,
                SampleFormat::Float,
                SampleFormat::U8,
            ],
            endiannesses: vec![Endianness::FileDefault, Endianness::Little],
            sample_rates: Self::all_rates(),
            qualities: vec![Quality::Lossless],
            channel_limit: 1024,
            supports_tagging: true,
            has_broadcast_info: true,
        }
    }

    pub fn flac() -> Self {
        Self {
            format_id: FormatId::Flac,
            encoder_type: EncoderType::Native,
            name: FormatId::Flac.name().into(),
            extension: FormatId::Flac.default_extension().into(),
            sample_formats: vec![SampleFormat::S8, SampleFormat::S16, SampleFormat::S24],
            endiannesses: vec![Endianness::FileDefault],
            sample_rates: Self::all_rates(),
            qualities: vec![Quality::Lossless],
            channel_limit: 8,
            supports_tagging: false,
            has_broadcast_info: false,
        }
    }

    /// Builtin capability set for a format, if one is bundled.
    pub fn builtin(format_id: FormatId) -> Option<Self> {
        match format_id {
            FormatId::Wav => Some(Self::wav()),
            FormatId::Flac => Some(Self::flac()),
            _ => None,
        }
    }

    pub fn has_sample_format(&self) -> bool {
        !self.sample_formats.is_empty()
    }
}

/// Complete encoding and post-processing parameter set for one output file type.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSpecification {
    id: Uuid,
    name: String,

    // Encoding
    format_id: Option<FormatId>,
    encoder_type: EncoderType,
    sample_format: Option<SampleFormat>,
    sample_rate: Option<SampleRate>,
    quality: Option<Quality>,
    endianness: Option<Endianness>,
    format_name: String,
    extension: String,
    has_sample_format: bool,
    channel_limit: u32,
    supports_tagging: bool,
    has_broadcast_info: bool,

    // Processing
    src_quality: SrcQuality,
    dither_type: DitherType,
    trim_beginning: bool,
    trim_end: bool,
    add_silence_beginning: bool,
    add_silence_end: bool,
    silence_beginning: SilenceDuration,
    silence_end: SilenceDuration,
    normalize: bool,
    normalize_dbfs: f32,
    normalize_loudness: bool,
    normalize_lufs: f32,
    normalize_dbtp: f32,
    use_true_peak_limiter: bool,

    // Side effects
    with_cue: bool,
    with_toc: bool,
    with_mp4chaps: bool,
    tag: bool,
    analyse: bool,
    command: String,
    upload: bool,
}

impl FormatSpecification {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            format_id: None,
            encoder_type: EncoderType::None,
            sample_format: None,
            sample_rate: None,
            quality: None,
            endianness: None,
            format_name: String::new(),
            extension: String::new(),
            has_sample_format: false,
            channel_limit: 0,
            supports_tagging: false,
            has_broadcast_info: false,
            src_quality: SrcQuality::default(),
            dither_type: DitherType::default(),
            trim_beginning: false,
            trim_end: false,
            add_silence_beginning: false,
            add_silence_end: false,
            silence_beginning: SilenceDuration::default(),
            silence_end: SilenceDuration::default(),
            normalize: false,
            normalize_dbfs: 0.0,
            normalize_loudness: false,
            normalize_lufs: -23.0,
            normalize_dbtp: -1.0,
            use_true_peak_limiter: true,
            with_cue: false,
            with_toc: false,
            with_mp4chaps: false,
            tag: false,
            analyse: false,
            command: String::new(),
            upload: false,
        }
    }

    /// New specification already bound to an encoder, with defaults
    /// picked from its capability set.
    pub fn for_encoder(name: impl Into<String>, caps: &EncoderCapabilities) -> Self {
        let mut spec = Self::new(name);
        spec.apply_encoder(caps);
        spec
    }

    /// Copy under a fresh identity, optionally renamed.
    pub fn duplicate(&self, new_name: Option<&str>) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        if let Some(name) = new_name {
            copy.name = name.to_string();
        }
        copy
    }

    /// True when every single-valued encoding choice is resolved.
    pub fn is_complete(&self) -> bool {
        if self.encoder_type == EncoderType::None {
            return false;
        }
        if self.format_id.is_none()
            || self.sample_rate.is_none()
            || self.quality.is_none()
            || self.endianness.is_none()
        {
            return false;
        }
        if self.has_sample_format && self.sample_format.is_none() {
            return false;
        }
        true
    }

    /// True when every resolved choice is accepted by `caps`.
    pub fn is_compatible_with(&self, caps: &EncoderCapabilities) -> bool {
        if let Some(id) = self.format_id {
            if id != caps.format_id {
                return false;
            }
        }
        if let Some(sf) = self.sample_format {
            if !caps.sample_formats.contains(&sf) {
                return false;
            }
        }
        if let Some(rate) = self.sample_rate {
            if !caps.sample_rates.contains(&rate) {
                return false;
            }
        }
        if let Some(q) = self.quality {
            if !caps.qualities.contains(&q) {
                return false;
            }
        }
        if let Some(e) = self.endianness {
            if !caps.endiannesses.contains(&e) {
                return false;
            }
        }
        true
    }

    /// Bind to an encoder. Choices the encoder rejects, or that are still
    /// unresolved, fall back to the first value it declares.
    pub fn apply_encoder(&mut self, caps: &EncoderCapabilities) {
        self.format_id = Some(caps.format_id);
        self.encoder_type = caps.encoder_type;
        self.format_name = caps.name.clone();
        self.extension = caps.extension.clone();
        self.channel_limit = caps.channel_limit;
        self.supports_tagging = caps.supports_tagging;
        self.has_broadcast_info = caps.has_broadcast_info;
        self.has_sample_format = caps.has_sample_format();

        self.sample_format = pick(self.sample_format, &caps.sample_formats);
        self.endianness = pick(self.endianness, &caps.endiannesses);
        self.quality = pick(self.quality, &caps.qualities);
        self.sample_rate = match self.sample_rate {
            Some(rate) if caps.sample_rates.contains(&rate) => Some(rate),
            _ if caps.sample_rates.contains(&SampleRate::Session) => Some(SampleRate::Session),
            _ => caps.sample_rates.first().copied(),
        };

        if !self.supports_tagging {
            self.tag = false;
        }
    }

    /// Check completeness and compatibility against the bundled encoder.
    pub fn validate(&self) -> Result<()> {
        if !self.is_complete() {
            return Err(Error::IncompleteFormat(self.name.clone()));
        }
        if let Some(caps) = self.format_id.and_then(EncoderCapabilities::builtin) {
            if !self.is_compatible_with(&caps) {
                return Err(Error::IncompatibleFormat {
                    format: self.name.clone(),
                    encoder: caps.name,
                });
            }
        }
        Ok(())
    }

    /// Short human-readable summary, e.g. `"WAV, 24-bit, 48 kHz, normalized"`.
    pub fn description(&self) -> String {
        let mut parts = Vec::new();
        if !self.format_name.is_empty() {
            parts.push(self.format_name.clone());
        }
        if let Some(sf) = self.sample_format {
            parts.push(sf.name().to_string());
        }
        match self.sample_rate {
            Some(SampleRate::Session) => parts.push("session rate".into()),
            Some(rate) => {
                let hz = rate.resolve(0);
                if hz % 1000 == 0 {
                    parts.push(format!("{} kHz", hz / 1000));
                } else {
                    parts.push(format!("{:.1} kHz", hz as f64 / 1000.0));
                }
            }
            None => {}
        }
        if self.normalize {
            parts.push(format!("normalized to {:.1} dBFS", self.normalize_dbfs));
        }
        if self.normalize_loudness {
            parts.push(format!("loudness {:.1} LUFS", self.normalize_lufs));
        }
        if self.trim_beginning || self.trim_end {
            parts.push("trimmed".into());
        }
        parts.join(", ")
    }

    pub fn silence_beginning_samples(&self, sample_rate: u32, timecode_fps: f64) -> u64 {
        if self.add_silence_beginning {
            self.silence_beginning.to_samples(sample_rate, timecode_fps)
        } else {
            0
        }
    }

    pub fn silence_end_samples(&self, sample_rate: u32, timecode_fps: f64) -> u64 {
        if self.add_silence_end {
            self.silence_end.to_samples(sample_rate, timecode_fps)
        } else {
            0
        }
    }

    /// Whether rendering this format needs a second pass over the audio.
    pub fn needs_two_pass(&self) -> bool {
        self.normalize
            || self.normalize_loudness
            || self.trim_beginning
            || self.trim_end
            || self.analyse
    }

    pub fn with_cd_markers(&self) -> bool {
        self.with_cue || self.with_toc || self.with_mp4chaps
    }

    // --- identity ---

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// User-visible name, used for the "format name" filename field.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // --- encoding ---

    pub fn format_id(&self) -> Option<FormatId> {
        self.format_id
    }

    pub fn encoder_type(&self) -> EncoderType {
        self.encoder_type
    }

    pub fn sample_format(&self) -> Option<SampleFormat> {
        self.sample_format
    }

    pub fn set_sample_format(&mut self, sample_format: Option<SampleFormat>) {
        self.sample_format = sample_format;
    }

    pub fn sample_rate(&self) -> Option<SampleRate> {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: Option<SampleRate>) {
        self.sample_rate = sample_rate;
    }

    pub fn quality(&self) -> Option<Quality> {
        self.quality
    }

    pub fn set_quality(&mut self, quality: Option<Quality>) {
        self.quality = quality;
    }

    pub fn endianness(&self) -> Option<Endianness> {
        self.endianness
    }

    pub fn set_endianness(&mut self, endianness: Option<Endianness>) {
        self.endianness = endianness;
    }

    /// Encoder display name.
    pub fn format_name(&self) -> &str {
        &self.format_name
    }

    /// File extension without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn has_sample_format(&self) -> bool {
        self.has_sample_format
    }

    pub fn channel_limit(&self) -> u32 {
        self.channel_limit
    }

    pub fn supports_tagging(&self) -> bool {
        self.supports_tagging
    }

    pub fn has_broadcast_info(&self) -> bool {
        self.has_broadcast_info
    }

    // --- processing ---

    pub fn src_quality(&self) -> SrcQuality {
        self.src_quality
    }

    pub fn set_src_quality(&mut self, quality: SrcQuality) {
        self.src_quality = quality;
    }

    pub fn dither_type(&self) -> DitherType {
        self.dither_type
    }

    pub fn set_dither_type(&mut self, dither: DitherType) {
        self.dither_type = dither;
    }

    pub fn trim_beginning(&self) -> bool {
        self.trim_beginning
    }

    pub fn set_trim_beginning(&mut self, value: bool) {
        self.trim_beginning = value;
    }

    pub fn trim_end(&self) -> bool {
        self.trim_end
    }

    pub fn set_trim_end(&mut self, value: bool) {
        self.trim_end = value;
    }

    pub fn add_silence_beginning(&self) -> bool {
        self.add_silence_beginning
    }

    pub fn silence_beginning(&self) -> SilenceDuration {
        self.silence_beginning
    }

    pub fn set_silence_beginning(&mut self, enabled: bool, duration: SilenceDuration) {
        self.add_silence_beginning = enabled;
        self.silence_beginning = duration;
    }

    pub fn add_silence_end(&self) -> bool {
        self.add_silence_end
    }

    pub fn silence_end(&self) -> SilenceDuration {
        self.silence_end
    }

    pub fn set_silence_end(&mut self, enabled: bool, duration: SilenceDuration) {
        self.add_silence_end = enabled;
        self.silence_end = duration;
    }

    pub fn normalize(&self) -> bool {
        self.normalize
    }

    pub fn normalize_dbfs(&self) -> f32 {
        self.normalize_dbfs
    }

    pub fn set_normalize(&mut self, enabled: bool, target_dbfs: f32) {
        self.normalize = enabled;
        self.normalize_dbfs = target_dbfs;
    }

    pub fn normalize_loudness(&self) -> bool {
        self.normalize_loudness
    }

    pub fn normalize_lufs(&self) -> f32 {
        self.normalize_lufs
    }

    pub fn normalize_dbtp(&self) -> f32 {
        self.normalize_dbtp
    }

    pub fn use_true_peak_limiter(&self) -> bool {
        self.use_true_peak_limiter
    }

    pub fn set_normalize_loudness(
        &mut self,
        enabled: bool,
        target_lufs: f32,
        true_peak_dbtp: f32,
        limit_true_peak: bool,
    ) {
        self.normalize_loudness = enabled;
        self.normalize_lufs = target_lufs;
        self.normalize_dbtp = true_peak_dbtp;
        self.use_true_peak_limiter = limit_true_peak;
    }

    // --- side effects ---

    pub fn with_cue(&self) -> bool {
        self.with_cue
    }

    pub fn set_with_cue(&mut self, value: bool) {
        self.with_cue = value;
    }

    pub fn with_toc(&self) -> bool {
        self.with_toc
    }

    pub fn set_with_toc(&mut self, value: bool) {
        self.with_toc = value;
    }

    pub fn with_mp4chaps(&self) -> bool {
        self.with_mp4chaps
    }

    pub fn set_with_mp4chaps(&mut self, value: bool) {
        self.with_mp4chaps = value;
    }

    pub fn tag(&self) -> bool {
        self.tag && self.supports_tagging
    }

    pub fn set_tag(&mut self, value: bool) {
        self.tag = value;
    }

    pub fn analyse(&self) -> bool {
        self.analyse
    }

    pub fn set_analyse(&mut self, value: bool) {
        self.analyse = value;
    }

    /// Post-export shell command template; empty when unset.
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn set_command(&mut self, command: impl Into<String>) {
        self.command = command.into();
    }

    pub fn upload(&self) -> bool {
        self.upload
    }

    pub fn set_upload(&mut self, value: bool) {
        self.upload = value;
    }

    // --- persistence ---

    pub fn state(&self) -> FormatState {
        let mut options = Vec::new();
        let mut opt = |name: &str, value: serde_json::Value| {
            options.push(EncodingOption {
                name: name.to_string(),
                value,
            })
        };
        opt("sample-format", serde_json::json!(self.sample_format));
        opt("quality", serde_json::json!(self.quality));
        opt("endianness", serde_json::json!(self.endianness));
        opt("dithering", serde_json::json!(self.dither_type));
        opt("tag-metadata", serde_json::json!(self.tag));
        opt("tag-support", serde_json::json!(self.supports_tagging));
        opt("broadcast-info", serde_json::json!(self.has_broadcast_info));
        opt("cue", serde_json::json!(self.with_cue));
        opt("toc", serde_json::json!(self.with_toc));
        opt("chapters", serde_json::json!(self.with_mp4chaps));
        opt("analyse", serde_json::json!(self.analyse));
        opt("command", serde_json::json!(self.command));
        opt("upload", serde_json::json!(self.upload));

        FormatState {
            name: self.name.clone(),
            id: self.id,
            encoding: EncodingState {
                id: self.format_id,
                encoder_type: self.encoder_type,
                extension: self.extension.clone(),
                name: self.format_name.clone(),
                has_sample_format: self.has_sample_format,
                channel_limit: self.channel_limit,
            },
            sample_rate: self.sample_rate,
            src_quality: self.src_quality,
            options,
            normalize: NormalizeState {
                enabled: self.normalize,
                target: self.normalize_dbfs,
                loudness: self.normalize_loudness,
                lufs: self.normalize_lufs,
                dbtp: self.normalize_dbtp,
                true_peak_limiter: self.use_true_peak_limiter,
            },
            silence: SilenceState {
                start: SilenceBlock {
                    trim: self.trim_beginning,
                    add: self.add_silence_beginning,
                    duration: self.silence_beginning,
                },
                end: SilenceBlock {
                    trim: self.trim_end,
                    add: self.add_silence_end,
                    duration: self.silence_end,
                },
            },
        }
    }

    pub fn from_state(state: &FormatState) -> Result<Self> {
        let mut spec = Self::new(state.name.clone());
        spec.id = state.id;
        spec.format_id = state.encoding.id;
        spec.encoder_type = state.encoding.encoder_type;
        spec.extension = state.encoding.extension.clone();
        spec.format_name = state.encoding.name.clone();
        spec.has_sample_format = state.encoding.has_sample_format;
        spec.channel_limit = state.encoding.channel_limit;
        spec.sample_rate = state.sample_rate;
        spec.src_quality = state.src_quality;

        for option in &state.options {
            let value = option.value.clone();
            match option.name.as_str() {
                "sample-format" => spec.sample_format = serde_json::from_value(value)?,
                "quality" => spec.quality = serde_json::from_value(value)?,
                "endianness" => spec.endianness = serde_json::from_value(value)?,
                "dithering" => spec.dither_type = serde_json::from_value(value)?,
                "tag-metadata" => spec.tag = serde_json::from_value(value)?,
                "tag-support" => spec.supports_tagging = serde_json::from_value(value)?,
                "broadcast-info" => spec.has_broadcast_info = serde_json::from_value(value)?,
                "cue" => spec.with_cue = serde_json::from_value(value)?,
                "toc" => spec.with_toc = serde_json::from_value(value)?,
                "chapters" => spec.with_mp4chaps = serde_json::from_value(value)?,
                "analyse" => spec.analyse = serde_json::from_value(value)?,
                "command" => spec.command = serde_json::from_value(value)?,
                "upload" => spec.upload = serde_json::from_value(value)?,
                other => tracing::debug!("Ignoring unknown format option '{}'", other),
            }
        }

        spec.normalize = state.normalize.enabled;
        spec.normalize_dbfs = state.normalize.target;
        spec.normalize_loudness = state.normalize.loudness;
        spec.normalize_lufs = state.normalize.lufs;
        spec.normalize_dbtp = state.normalize.dbtp;
        spec.use_true_peak_limiter = state.normalize.true_peak_limiter;

        spec.trim_beginning = state.silence.start.trim;
        spec.add_silence_beginning = state.silence.start.add;
        spec.silence_beginning = state.silence.start.duration;
        spec.trim_end = state.silence.end.trim;
        spec.add_silence_end = state.silence.end.add;
        spec.silence_end = state.silence.end.duration;

        Ok(spec)
    }
}

fn pick<T: Copy + PartialEq>(current: Option<T>, allowed: &[T]) -> Option<T> {
    match current {
        Some(value) if allowed.contains(&value) => Some(value),
        _ => allowed.first().copied(),
    }
}

/// Persisted form of a [`FormatSpecification`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatState {
    pub name: String,
    pub id: Uuid,
    pub encoding: EncodingState,
    pub sample_rate: Option<SampleRate>,
    pub src_quality: SrcQuality,
    pub options: Vec<EncodingOption>,
    pub normalize: NormalizeState,
    pub silence: SilenceState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingState {
    pub id: Option<FormatId>,
    #[serde(rename = "type")]
    pub encoder_type: EncoderType,
    pub extension: String,
    pub name: String,
    pub has_sample_format: bool,
    pub channel_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingOption {
    pub name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeState {
    pub enabled: bool,
    pub target: f32,
    #[serde(default)]
    pub loudness: bool,
    #[serde(default = "default_lufs")]
    pub lufs: f32,
    #[serde(default = "default_dbtp")]
    pub dbtp: f32,
    #[serde(default)]
    pub true_peak_limiter: bool,
}

fn default_lufs() -> f32 {
    -23.0
}

fn default_dbtp() -> f32 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilenceState {
    pub start: SilenceBlock,
    pub end: SilenceBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SilenceBlock {
    pub trim: bool,
    pub add: bool,
    pub duration: SilenceDuration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav24() -> FormatSpecification {
        let mut spec = FormatSpecification::for_encoder("CD master", &EncoderCapabilities::wav());
        spec.set_sample_format(Some(SampleFormat::S24));
        spec.set_sample_rate(Some(SampleRate::Hz48000));
        spec
    }

    #[test]
    fn test_new_spec_is_incomplete() {
        let spec = FormatSpecification::new("empty");
        assert!(!spec.is_complete());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_for_encoder_is_complete() {
        let spec = FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav());
        assert!(spec.is_complete());
        assert_eq!(spec.extension(), "wav");
        assert_eq!(spec.sample_rate(), Some(SampleRate::Session));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_missing_sample_format_is_incomplete() {
        let mut spec = wav24();
        spec.set_sample_format(None);
        assert!(!spec.is_complete());
    }

    #[test]
    fn test_compatibility_gates_choices() {
        let mut spec = wav24();
        assert!(spec.is_compatible_with(&EncoderCapabilities::wav()));
        // Float is not a FLAC sample format, and the id differs
        spec.set_sample_format(Some(SampleFormat::Float));
        assert!(!spec.is_compatible_with(&EncoderCapabilities::flac()));
    }

    #[test]
    fn test_apply_encoder_replaces_rejected_choices() {
        let mut spec = wav24();
        spec.set_sample_format(Some(SampleFormat::Float));
        spec.apply_encoder(&EncoderCapabilities::flac());
        assert_eq!(spec.format_id(), Some(FormatId::Flac));
        assert_eq!(spec.sample_format(), Some(SampleFormat::S8));
        assert_eq!(spec.sample_rate(), Some(SampleRate::Hz48000));
        assert_eq!(spec.extension(), "flac");
        assert!(spec.is_compatible_with(&EncoderCapabilities::flac()));
    }

    #[test]
    fn test_tagging_requires_support() {
        let mut spec = FormatSpecification::for_encoder("flac", &EncoderCapabilities::flac());
        spec.set_tag(true);
        assert!(!spec.tag());
    }

    #[test]
    fn test_duplicate_gets_new_identity() {
        let spec = wav24();
        let copy = spec.duplicate(Some("copy"));
        assert_ne!(copy.id(), spec.id());
        assert_eq!(copy.name(), "copy");
        assert_eq!(copy.sample_format(), spec.sample_format());

        let same_name = spec.duplicate(None);
        assert_eq!(same_name.name(), spec.name());
        assert_ne!(same_name.id(), spec.id());
    }

    #[test]
    fn test_silence_duration_samples() {
        let d = SilenceDuration {
            hours: 0,
            minutes: 1,
            seconds: 2,
            frames: 15,
        };
        assert_eq!(d.to_samples(48000, 30.0), 62 * 48000 + 24000);
        assert_eq!(SilenceDuration::from_seconds(3661).hours, 1);
    }

    #[test]
    fn test_silence_disabled_contributes_nothing() {
        let mut spec = wav24();
        spec.set_silence_beginning(false, SilenceDuration::from_seconds(2));
        assert_eq!(spec.silence_beginning_samples(48000, 30.0), 0);
        spec.set_silence_beginning(true, SilenceDuration::from_seconds(2));
        assert_eq!(spec.silence_beginning_samples(48000, 30.0), 96000);
    }

    #[test]
    fn test_state_round_trip() {
        let mut spec = wav24();
        spec.set_normalize(true, -0.3);
        spec.set_normalize_loudness(true, -16.0, -1.5, true);
        spec.set_dither_type(DitherType::Shaped);
        spec.set_trim_beginning(true);
        spec.set_silence_end(true, SilenceDuration::from_seconds(3));
        spec.set_with_cue(true);
        spec.set_with_mp4chaps(true);
        spec.set_tag(true);
        spec.set_analyse(true);
        spec.set_command("echo %f");
        spec.set_upload(true);
        spec.set_src_quality(SrcQuality::Best);

        let json = serde_json::to_string(&spec.state()).unwrap();
        let state: FormatState = serde_json::from_str(&json).unwrap();
        let restored = FormatSpecification::from_state(&state).unwrap();

        assert_eq!(restored, spec);
        assert_eq!(restored.id(), spec.id());
        assert_eq!(restored.description(), spec.description());
    }

    #[test]
    fn test_description() {
        let mut spec = wav24();
        spec.set_normalize(true, -1.0);
        assert_eq!(spec.description(), "WAV, 24-bit, 48 kHz, normalized to -1.0 dBFS");
    }
}
