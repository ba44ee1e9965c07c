//! CD marker side files: CUE sheets, TOC files and chapter lists.
//!
//! All three formats share one walk over the session's CD markers. The
//! walk decides where tracks and indices fall; each format only renders
//! them.

mod chapters;
mod cue;
mod toc;

use crate::error::Result;
use mixdown_core::{FormatSpecification, Location, SamplePos, Session, Timespan};
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// CD marker side file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdMarkerFormat {
    Cue,
    Toc,
    Chapters,
}

impl CdMarkerFormat {
    /// Formats requested by `format`, in writing order.
    pub fn requested(format: &FormatSpecification) -> Vec<CdMarkerFormat> {
        let mut formats = Vec::new();
        if format.with_cue() {
            formats.push(CdMarkerFormat::Cue);
        }
        if format.with_toc() {
            formats.push(CdMarkerFormat::Toc);
        }
        if format.with_mp4chaps() {
            formats.push(CdMarkerFormat::Chapters);
        }
        formats
    }

    /// Side file written beside `audio_path`.
    pub fn side_file(&self, audio_path: &Path) -> PathBuf {
        let mut name = audio_path.as_os_str().to_owned();
        match self {
            CdMarkerFormat::Cue => {
                name.push(".cue");
                PathBuf::from(name)
            }
            CdMarkerFormat::Toc => {
                name.push(".toc");
                PathBuf::from(name)
            }
            CdMarkerFormat::Chapters => {
                let stem = audio_path.with_extension("");
                let mut name = stem.into_os_string();
                name.push(".chapters.txt");
                PathBuf::from(name)
            }
        }
    }

    fn writer(&self) -> &'static dyn MarkerWriter {
        match self {
            CdMarkerFormat::Cue => &cue::CueWriter,
            CdMarkerFormat::Toc => &toc::TocWriter,
            CdMarkerFormat::Chapters => &chapters::ChapterWriter,
        }
    }
}

/// Read-only inputs shared by every writer callback.
pub(crate) struct MarkerContext<'a> {
    pub session: &'a Session,
    pub timespan: &'a Timespan,
    pub format: &'a FormatSpecification,
    pub audio_path: &'a Path,
    pub program_name: &'a str,
}

impl MarkerContext<'_> {
    /// Disc title: album, else the timespan name, else the session name.
    pub fn title(&self) -> &str {
        let metadata = &self.session.metadata;
        if !metadata.album.is_empty() {
            &metadata.album
        } else if self.timespan.name() != "Session" && !self.timespan.name().is_empty() {
            self.timespan.name()
        } else {
            &self.session.name
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.session.sample_rate
    }
}

/// Running position of the walk. Offsets are relative to the timespan start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MarkerStatus {
    pub track_number: u32,
    pub index_number: u32,
    /// Where the current track (including its pregap) begins.
    pub track_position: SamplePos,
    pub track_duration: u64,
    /// Where the current track's audible part begins.
    pub track_start_sample: SamplePos,
    pub index_position: SamplePos,
}

impl Default for MarkerStatus {
    fn default() -> Self {
        Self {
            track_number: 1,
            index_number: 1,
            track_position: 0,
            track_duration: 0,
            track_start_sample: 0,
            index_position: 0,
        }
    }
}

/// One CD marker format.
pub(crate) trait MarkerWriter: Sync {
    fn header(&self, out: &mut String, ctx: &MarkerContext<'_>) -> fmt::Result;

    fn track(
        &self,
        out: &mut String,
        ctx: &MarkerContext<'_>,
        status: &mut MarkerStatus,
        marker: &Location,
    ) -> fmt::Result;

    fn index(
        &self,
        out: &mut String,
        ctx: &MarkerContext<'_>,
        status: &mut MarkerStatus,
        marker: &Location,
    ) -> fmt::Result;

    fn footer(&self, _out: &mut String, _ctx: &MarkerContext<'_>) -> fmt::Result {
        Ok(())
    }
}

/// CD markers fully inside `timespan`, sorted by start.
pub fn markers_in<'a>(session: &'a Session, timespan: &Timespan) -> Vec<&'a Location> {
    let mut markers: Vec<&Location> = session
        .locations
        .iter()
        .filter(|l| {
            l.is_cd_marker()
                && !l.is_session_range()
                && l.start >= timespan.start()
                && l.end <= timespan.end()
        })
        .collect();
    markers.sort_by_key(|l| l.start);
    markers
}

fn walk(
    writer: &dyn MarkerWriter,
    ctx: &MarkerContext<'_>,
) -> std::result::Result<String, fmt::Error> {
    let mut out = String::new();
    let mut status = MarkerStatus::default();
    writer.header(&mut out, ctx)?;

    let markers = markers_in(ctx.session, ctx.timespan);
    let origin = ctx.timespan.start();
    let mut last_end = origin;

    for (i, marker) in markers.iter().enumerate() {
        if marker.start < last_end {
            if marker.is_mark() {
                status.index_position = marker.start - origin;
                writer.index(&mut out, ctx, &mut status, marker)?;
            }
            continue;
        }

        status.track_position = last_end - origin;
        status.track_start_sample = marker.start - origin;

        let track_end = if marker.is_mark() {
            markers
                .get(i + 1)
                .map_or(ctx.timespan.end(), |next| next.start)
        } else {
            marker.end
        };
        status.track_duration = track_end - last_end;
        last_end = track_end;

        writer.track(&mut out, ctx, &mut status, marker)?;
    }

    writer.footer(&mut out, ctx)?;
    Ok(out)
}

/// Render the side file contents without touching the filesystem.
pub fn render_cd_markers(
    session: &Session,
    timespan: &Timespan,
    format: &FormatSpecification,
    audio_path: &Path,
    marker_format: CdMarkerFormat,
    program_name: &str,
) -> String {
    let ctx = MarkerContext {
        session,
        timespan,
        format,
        audio_path,
        program_name,
    };
    // Writing into a String cannot fail.
    walk(marker_format.writer(), &ctx).unwrap_or_default()
}

/// Write the side file beside `audio_path`. A partially written file is
/// removed on failure.
pub fn write_cd_marker_file(
    session: &Session,
    timespan: &Timespan,
    format: &FormatSpecification,
    audio_path: &Path,
    marker_format: CdMarkerFormat,
    program_name: &str,
) -> Result<PathBuf> {
    let path = marker_format.side_file(audio_path);
    let contents = render_cd_markers(
        session,
        timespan,
        format,
        audio_path,
        marker_format,
        program_name,
    );

    if let Err(e) = std::fs::write(&path, contents) {
        error!(path = %path.display(), "failed to write CD marker file: {e}");
        let _ = std::fs::remove_file(&path);
        return Err(e.into());
    }

    info!(path = %path.display(), "wrote {:?} marker file", marker_format);
    Ok(path)
}

/// `MM:SS:FF` at 75 frames per second, preceded by a space.
pub(crate) fn cd_frame_string(when: SamplePos, sample_rate: u32) -> String {
    let fr = sample_rate.max(1) as u64;
    let mins = when / (60 * fr);
    let mut remainder = when - mins * 60 * fr;
    let secs = remainder / fr;
    remainder -= secs * fr;
    let frames = remainder / (fr / 75).max(1);
    format!(" {:02}:{:02}:{:02}", mins, secs, frames)
}

/// `HH:MM:SS.mmm`.
pub(crate) fn chapter_mark_string(when: SamplePos, sample_rate: u32) -> String {
    let fr = sample_rate.max(1) as u64;
    let hours = when / (3600 * fr);
    let mut remainder = when - hours * 3600 * fr;
    let mins = remainder / (60 * fr);
    remainder -= mins * 60 * fr;
    let secs = remainder / fr;
    remainder -= secs * fr;
    let msecs = remainder * 1000 / fr;
    format!("{:02}:{:02}:{:02}.{:03}", hours, mins, secs, msecs)
}

fn escape_byte(out: &mut String, byte: u8) {
    match byte {
        b'"' => out.push_str("\\\""),
        b'\\' => out.push_str("\\134"),
        0x20..=0x7e => out.push(byte as char),
        _ => {
            let _ = write!(out, "\\{:03o}", byte);
        }
    }
}

/// Quote CD-TEXT: transliterate to Latin-1 (`_` for anything outside it),
/// octal-escape non-printables, backslash-escape quotes and backslashes.
pub(crate) fn escape_cdtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        let byte = u8::try_from(u32::from(c)).unwrap_or(b'_');
        escape_byte(&mut out, byte);
    }
    out.push('"');
    out
}

/// Quote a filename. Only quotes and backslashes are escaped.
pub(crate) fn escape_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for c in name.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\134"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_core::{EncoderCapabilities, TimespanFactory};
    use tempfile::tempdir;

    pub(super) fn session() -> Session {
        let mut session = Session::new("album", "/sessions/album", 44100);
        session.locations = vec![
            Location::session_range(0, 44100 * 30).with_cd(),
            Location::range("Intro", 44100, 44100 * 10)
                .with_cd()
                .with_cd_info("isrc", "USABC1234567")
                .with_cd_info("performer", "The Band"),
            Location::marker("Hook", 44100 * 5).with_cd(),
            Location::range("Outro", 44100 * 12, 44100 * 20).with_cd(),
            Location::marker("not cd", 44100 * 15),
        ];
        session
    }

    #[test]
    fn test_cd_frame_string() {
        assert_eq!(cd_frame_string(0, 44100), " 00:00:00");
        assert_eq!(cd_frame_string(44100 * 61 + 588 * 3, 44100), " 01:01:03");
    }

    #[test]
    fn test_chapter_mark_string() {
        assert_eq!(chapter_mark_string(44100 * 3661 + 22050, 44100), "01:01:01.500");
    }

    #[test]
    fn test_escape_cdtext() {
        assert_eq!(escape_cdtext("a \"b\" \\c"), "\"a \\\"b\\\" \\134c\"");
        assert_eq!(escape_cdtext("café"), "\"caf\\351\"");
        assert_eq!(escape_cdtext("日本"), "\"__\"");
        assert_eq!(escape_cdtext("tab\t"), "\"tab\\011\"");
    }

    #[test]
    fn test_escape_filename_keeps_utf8() {
        assert_eq!(escape_filename("日本 \"x\".wav"), "\"日本 \\\"x\\\".wav\"");
    }

    #[test]
    fn test_markers_in_filters_and_sorts() {
        let session = session();
        let timespan = TimespanFactory::new()
            .create("all", 0, 44100 * 30)
            .unwrap();
        let names: Vec<&str> = markers_in(&session, &timespan)
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["Intro", "Hook", "Outro"]);

        let short = TimespanFactory::new().create("short", 0, 44100 * 11).unwrap();
        assert_eq!(markers_in(&session, &short).len(), 2);
    }

    #[test]
    fn test_side_file_names() {
        let audio = Path::new("/out/song.wav");
        assert_eq!(CdMarkerFormat::Cue.side_file(audio), PathBuf::from("/out/song.wav.cue"));
        assert_eq!(CdMarkerFormat::Toc.side_file(audio), PathBuf::from("/out/song.wav.toc"));
        assert_eq!(
            CdMarkerFormat::Chapters.side_file(audio),
            PathBuf::from("/out/song.chapters.txt")
        );
    }

    #[test]
    fn test_write_and_failure_cleanup() {
        let dir = tempdir().unwrap();
        let session = session();
        let timespan = TimespanFactory::new().create("all", 0, 44100 * 30).unwrap();
        let mut format = FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav());
        format.set_with_cue(true);

        let audio = dir.path().join("album.wav");
        let path = write_cd_marker_file(
            &session, &timespan, &format, &audio, CdMarkerFormat::Cue, "Mixdown",
        )
        .unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("TRACK 01 AUDIO"));

        let missing = dir.path().join("no-such-dir").join("album.wav");
        let result = write_cd_marker_file(
            &session, &timespan, &format, &missing, CdMarkerFormat::Cue, "Mixdown",
        );
        assert!(result.is_err());
        assert!(!CdMarkerFormat::Cue.side_file(&missing).exists());
    }

    #[test]
    fn test_requested_formats() {
        let mut format = FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav());
        assert!(CdMarkerFormat::requested(&format).is_empty());
        format.set_with_toc(true);
        format.set_with_mp4chaps(true);
        assert_eq!(
            CdMarkerFormat::requested(&format),
            vec![CdMarkerFormat::Toc, CdMarkerFormat::Chapters]
        );
    }
}
