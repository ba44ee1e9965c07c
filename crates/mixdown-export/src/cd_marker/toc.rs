//! cdrdao TOC writer.

use super::{
    cd_frame_string, escape_cdtext, escape_filename, MarkerContext, MarkerStatus, MarkerWriter,
};
use mixdown_core::Location;
use std::fmt::{self, Write};

pub(crate) struct TocWriter;

/// `CCOOOYYSSSSS` as `CC-OOO-YY-SSSSS`.
fn format_isrc(isrc: &str) -> String {
    let part = |from: usize, to: usize| isrc.get(from..to.min(isrc.len())).unwrap_or("");
    format!(
        "{}-{}-{}-{}",
        part(0, 2),
        part(2, 5),
        part(5, 7),
        part(7, 12)
    )
}

impl MarkerWriter for TocWriter {
    fn header(&self, out: &mut String, ctx: &MarkerContext<'_>) -> fmt::Result {
        writeln!(out, "CD_DA")?;
        writeln!(out, "CD_TEXT {{")?;
        writeln!(out, "  LANGUAGE_MAP {{")?;
        writeln!(out, "    0 : EN")?;
        writeln!(out, "  }}")?;
        writeln!(out, "  LANGUAGE 0 {{")?;
        writeln!(out, "    TITLE {}", escape_cdtext(ctx.title()))?;
        writeln!(out, "    PERFORMER {}", escape_cdtext(&ctx.session.metadata.artist))?;
        writeln!(out, "  }}")?;
        writeln!(out, "}}")
    }

    fn track(
        &self,
        out: &mut String,
        ctx: &MarkerContext<'_>,
        status: &mut MarkerStatus,
        marker: &Location,
    ) -> fmt::Result {
        writeln!(out)?;
        writeln!(out, "TRACK AUDIO")?;

        if marker.cd_info("scms").is_some() {
            write!(out, "NO ")?;
        }
        writeln!(out, "COPY")?;

        if marker.cd_info("preemph").is_some() {
            writeln!(out, "PRE_EMPHASIS")?;
        } else {
            writeln!(out, "NO PRE_EMPHASIS")?;
        }

        if let Some(isrc) = marker.cd_info("isrc") {
            writeln!(out, "ISRC \"{}\"", isrc)?;
        }

        writeln!(out, "CD_TEXT {{")?;
        writeln!(out, "  LANGUAGE 0 {{")?;
        writeln!(out, "     TITLE {}", escape_cdtext(&marker.name))?;
        match marker.cd_info("performer") {
            Some(performer) => writeln!(out, "     PERFORMER {}", escape_cdtext(performer))?,
            None => writeln!(out, "     PERFORMER \"\"")?,
        }
        if let Some(composer) = marker.cd_info("composer") {
            writeln!(out, "     SONGWRITER {}", escape_cdtext(composer))?;
        }
        if let Some(isrc) = marker.cd_info("isrc") {
            writeln!(out, "     ISRC \"{}\"", format_isrc(isrc))?;
        }
        writeln!(out, "  }}")?;
        writeln!(out, "}}")?;

        let rate = ctx.sample_rate();
        writeln!(
            out,
            "FILE {}{}{}",
            escape_filename(&ctx.audio_path.to_string_lossy()),
            cd_frame_string(status.track_position, rate),
            cd_frame_string(status.track_duration, rate)
        )?;
        writeln!(
            out,
            "START{}",
            cd_frame_string(status.track_start_sample - status.track_position, rate)
        )?;

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
            "INDEX{}",
            cd_frame_string(
                status.index_position - status.track_position,
                ctx.sample_rate()
            )
        )?;
        status.index_number += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::session;
    use super::super::{render_cd_markers, CdMarkerFormat};
    use super::format_isrc;
    use mixdown_core::{EncoderCapabilities, FormatSpecification, TimespanFactory};
    use std::path::Path;

    #[test]
    fn test_format_isrc() {
        assert_eq!(format_isrc("USABC1234567"), "US-ABC-12-34567");
        assert_eq!(format_isrc("US"), "US---");
    }

    #[test]
    fn test_toc_tracks() {
        let session = session();
        let timespan = TimespanFactory::new().create("Session", 0, 44100 * 30).unwrap();
        let format = FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav());

        let toc = render_cd_markers(
            &session,
            &timespan,
            &format,
            Path::new("/out/my \"album\".wav"),
            CdMarkerFormat::Toc,
            "Mixdown",
        );

        assert!(toc.starts_with("CD_DA\nCD_TEXT {\n  LANGUAGE_MAP {\n"));
        assert!(toc.contains("    TITLE \"album\"\n"));
        assert_eq!(toc.matches("TRACK AUDIO").count(), 2);
        assert!(toc.contains("     ISRC \"US-ABC-12-34567\"\n"));
        assert!(toc.contains("FILE \"/out/my \\\"album\\\".wav\" 00:00:00 00:10:00\nSTART 00:01:00\n"));
        assert!(toc.contains("INDEX 00:05:00\n"));
        assert!(toc.contains("FILE \"/out/my \\\"album\\\".wav\" 00:10:00 00:10:00\nSTART 00:02:00\n"));
    }
}
