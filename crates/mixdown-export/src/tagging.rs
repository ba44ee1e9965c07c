//! Metadata tagging of exported files.

use crate::error::Result;
use mixdown_core::{BroadcastInfo, FormatSpecification, SessionMetadata};
use std::path::Path;

/// Writes session metadata into a finished file.
pub trait Tagger: Send + Sync {
    fn tag(
        &self,
        path: &Path,
        format: &FormatSpecification,
        metadata: &SessionMetadata,
        broadcast_info: Option<&BroadcastInfo>,
    ) -> Result<()>;
}

/// ID3v2.4 chunk tagger for WAV and AIFF files.
#[cfg(feature = "tag")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3Tagger;

#[cfg(feature = "tag")]
impl Id3Tagger {
    fn build(metadata: &SessionMetadata, broadcast_info: Option<&BroadcastInfo>) -> id3::Tag {
        use id3::frame::{Comment, Content, ExtendedText, Frame};
        use id3::TagLike;

        let mut tag = id3::Tag::new();
        let mut text = |id: &str, value: &str| {
            if !value.is_empty() {
                tag.set_text(id, value);
            }
        };
        text("TIT2", &metadata.title);
        text("TPE1", &metadata.artist);
        text("TALB", &metadata.album);
        text("TCOM", &metadata.composer);
        text("TPE3", &metadata.conductor);
        text("TCOP", &metadata.copyright);
        text("TCON", &metadata.genre);
        text("TEXT", &metadata.lyricist);
        text("TPUB", &metadata.organization);
        text("TSST", &metadata.disc_subtitle);

        if metadata.year > 0 {
            tag.set_year(metadata.year as i32);
        }
        if metadata.track_number > 0 {
            tag.set_track(metadata.track_number);
        }
        if metadata.total_tracks > 0 {
            tag.set_total_tracks(metadata.total_tracks);
        }
        if !metadata.comment.is_empty() {
            tag.add_frame(Frame::with_content(
                "COMM",
                Content::Comment(Comment {
                    lang: "eng".into(),
                    description: String::new(),
                    text: metadata.comment.clone(),
                }),
            ));
        }

        let mut extended = |description: &str, value: &str| {
            if !value.is_empty() {
                tag.add_frame(Frame::with_content(
                    "TXXX",
                    Content::ExtendedText(ExtendedText {
                        description: description.into(),
                        value: value.into(),
                    }),
                ));
            }
        };
        extended("ENGINEER", &metadata.engineer);
        extended("MIXER", &metadata.mixer);
        extended("PRODUCER", &metadata.producer);
        extended("COUNTRY", &metadata.country);
        if let Some(bwf) = broadcast_info {
            extended("BWF_DESCRIPTION", &bwf.description);
            extended("BWF_ORIGINATOR", &bwf.originator);
            extended("BWF_ORIGINATOR_REFERENCE", &bwf.originator_reference);
            extended("BWF_ORIGINATION_TIME", &bwf.origination_time);
        }

        tag
    }
}

#[cfg(feature = "tag")]
impl Tagger for Id3Tagger {
    fn tag(
        &self,
        path: &Path,
        format: &FormatSpecification,
        metadata: &SessionMetadata,
        broadcast_info: Option<&BroadcastInfo>,
    ) -> Result<()> {
        use crate::error::ExportError;
        use mixdown_core::FormatId;

        let tag = Self::build(metadata, broadcast_info);
        match format.format_id() {
            Some(FormatId::Wav) => tag.write_to_wav_path(path, id3::Version::Id3v24)?,
            Some(FormatId::Aiff) => tag.write_to_aiff_path(path, id3::Version::Id3v24)?,
            other => {
                return Err(ExportError::UnsupportedFormat(format!(
                    "cannot tag {:?} files",
                    other
                )))
            }
        }
        tracing::debug!(path = %path.display(), "tagged");
        Ok(())
    }
}
