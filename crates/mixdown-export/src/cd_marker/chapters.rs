//! Chapter list writer (`HH:MM:SS.mmm name` per track).

use super::{chapter_mark_string, MarkerContext, MarkerStatus, MarkerWriter};
use mixdown_core::Location;
use std::fmt::{self, Write};

pub(crate) struct ChapterWriter;

impl MarkerWriter for ChapterWriter {
    fn header(&self, _out: &mut String, _ctx: &MarkerContext<'_>) -> fmt::Result {
        Ok(())
    }

    fn track(
        &self,
        out: &mut String,
        ctx: &MarkerContext<'_>,
        status: &mut MarkerStatus,
        marker: &Location,
    ) -> fmt::Result {
        writeln!(
            out,
            "{} {}",
            chapter_mark_string(status.track_start_sample, ctx.sample_rate()),
            marker.name
        )?;
        status.track_number += 1;
        Ok(())
    }

    fn index(
        &self,
        _out: &mut String,
        _ctx: &MarkerContext<'_>,
        _status: &mut MarkerStatus,
        _marker: &Location,
    ) -> fmt::Result {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::session;
    use super::super::{render_cd_markers, CdMarkerFormat};
    use mixdown_core::{EncoderCapabilities, FormatSpecification, TimespanFactory};
    use std::path::Path;

    #[test]
    fn test_chapters_relative_to_timespan() {
        let session = session();
        let timespan = TimespanFactory::new().create("t", 44100, 44100 * 30).unwrap();
        let format = FormatSpecification::for_encoder("wav", &EncoderCapabilities::wav());

        let chapters = render_cd_markers(
            &session,
            &timespan,
            &format,
            Path::new("a.wav"),
            CdMarkerFormat::Chapters,
            "Mixdown",
        );
        assert_eq!(chapters, "00:00:00.000 Intro\n00:00:11.000 Outro\n");
    }
}
