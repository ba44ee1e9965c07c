//! CUE sheet writer.

use super::{cd_frame_string, escape_cdtext, MarkerContext, MarkerStatus, MarkerWriter};
use mixdown_core::{Endianness, FormatId, Location, SampleFormat, SampleRate};
use std::fmt::{self, Write};

pub(crate) struct CueWriter;

impl CueWriter {
    /// File type keyword for the `FILE` line.
    fn file_type(ctx: &MarkerContext<'_>) -> String {
        let format = ctx.format;
        match format.format_id() {
            Some(FormatId::Wav) => "WAVE".into(),
            Some(FormatId::Mp3) => "MP3".into(),
            Some(FormatId::Aiff) => "AIFF".into(),
            Some(FormatId::Raw)
                if format.sample_format() == Some(SampleFormat::S16)
                    && format.sample_rate() == Some(SampleRate::Hz44100) =>
            {
                if format.endianness() == Some(Endianness::Little) {
                    "BINARY".into()
                } else {
                    "MOTOROLA".into()
                }
            }
            _ => format.format_name().to_uppercase(),
        }
    }
}

impl MarkerWriter for CueWriter {
    fn header(&self, out: &mut String, ctx: &MarkerContext<'_>) -> fmt::Result {
        writeln!(out, "REM Cue file generated by {}", ctx.program_name)?;
        let artist = &ctx.session.metadata.artist;
        if !artist.is_empty() {
            writeln!(out, "PERFORMER {}", escape_cdtext(artist))?;
        }
        writeln!(out, "TITLE {}", escape_cdtext(ctx.title()))?;

        let basename = ctx
            .audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writeln!(
            out,
            "FILE {} {}",
            escape_cdtext(&basename),
            Self::file_type(ctx)
        )
    }

    fn track(
        &self,
        out: &mut String,
        ctx: &MarkerContext<'_>,
        status: &mut MarkerStatus,
        marker: &Location,
    ) -> fmt::Result {
        writeln!(out, "  TRACK {:02} AUDIO", status.track_number)?;

        write!(out, "    FLAGS")?;
        if marker.cd_info("scms").is_some() {
            write!(out, " SCMS ")?;
        } else {
            write!(out, " DCP ")?;
        }
        if marker.cd_info("preemph").is_some() {
            write!(out, " PRE")?;
        }
        writeln!(out)?;

        if let Some(isrc) = marker.cd_info("isrc") {
            writeln!(out, "    ISRC {}", isrc)?;
        }
        if !marker.name.is_empty() {
            writeln!(out, "    TITLE {}", escape_cdtext(&marker.name))?;
        }
        if let Some(performer) = marker.cd_info("performer") {
            writeln!(out, "    PERFORMER {}", escape_cdtext(performer))?;
        }
        if let Some(composer) = marker.cd_info("composer") {
            writeln!(out, "    SONGWRITER {}", escape_cdtext(composer))?;
        }

        let rate = ctx.sample_rate();
        if status.track_position != status.track_start_sample {
            writeln!(out, "    INDEX 00{}", cd_frame_string(status.track_position, rate))?;
        }
        writeln!(out, "    INDEX 01{}", cd_frame_string(status.track_start_sample, rate))?;

        status.index_number = 2;
        status.track_number += 1;
        Ok(())
    }

    fn index(
        &self,
        out: &mut String,
        ctx: &MarkerContext<'_>,
        status: &mut MarkerStatus,
        _marker: &Location,
    ) -> fmt::Result {
        writeln!(
            out,
            "    INDEX {:02}{}",
            status.index_number,
            cd_frame_string(status.index_position, ctx.sample_rate())
        )?;
        status.index_number += 1;
        Ok(())
    }
}
