//! Post-export shell command.
//!
//! The command template uses single-character `%x` tokens, `%%` for a
//! literal percent sign. Arguments are split on whitespace except inside
//! double quotes, and the program is spawned directly (no shell).

use crate::error::{ExportError, Result};
use mixdown_core::{Session, Timespan};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

/// Token values for one exported file.
#[derive(Debug, Clone, Default)]
pub struct Substitutions {
    values: BTreeMap<char, String>,
}

impl Substitutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values for `file` rendered from `timespan` of `session`.
    pub fn for_file(session: &Session, timespan: &Timespan, file: &Path) -> Self {
        let meta = &session.metadata;
        let lossy = |p: Option<&std::ffi::OsStr>| {
            p.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
        };
        let number = |n: u32| if n == 0 { String::new() } else { n.to_string() };

        let mut subs = Self::new();
        subs.set('a', &meta.artist);
        subs.set('b', lossy(file.file_stem()));
        subs.set('c', &meta.copyright);
        subs.set(
            'd',
            file.parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        subs.set('f', file.to_string_lossy());
        subs.set('l', &meta.lyricist);
        subs.set('n', &session.name);
        subs.set('o', &meta.conductor);
        subs.set('p', session.path().to_string_lossy());
        subs.set('t', &meta.title);
        subs.set('z', &meta.organization);
        subs.set('A', &meta.album);
        subs.set('C', &meta.comment);
        subs.set('E', &meta.engineer);
        subs.set('G', &meta.genre);
        subs.set('L', number(meta.total_tracks));
        subs.set('M', &meta.mixer);
        subs.set('N', timespan.name());
        subs.set('O', &meta.composer);
        subs.set('P', &meta.producer);
        subs.set('S', &meta.disc_subtitle);
        subs.set('T', number(meta.track_number));
        subs.set('Y', number(meta.year));
        subs.set('Z', &meta.country);
        subs
    }

    pub fn set(&mut self, token: char, value: impl AsRef<str>) {
        self.values.insert(token, value.as_ref().to_string());
    }

    pub fn get(&self, token: char) -> Option<&str> {
        self.values.get(&token).map(String::as_str)
    }

    /// Replace every `%x` in `text`. Unknown tokens are kept verbatim.
    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('%') => out.push('%'),
                Some(token) => match self.values.get(&token) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push('%');
                        out.push(token);
                    }
                },
                None => out.push('%'),
            }
        }
        out
    }
}

/// Split a command line on whitespace, keeping double-quoted runs together.
pub fn split_args(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in command.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Expand `template` and run it, waiting for the process to exit.
pub fn run_command(template: &str, subs: &Substitutions) -> Result<()> {
    let args: Vec<String> = split_args(template)
        .into_iter()
        .map(|arg| subs.apply(&arg))
        .collect();
    let Some((program, rest)) = args.split_first() else {
        return Err(ExportError::Command("empty command".into()));
    };

    info!(command = %args.join(" "), "running post-export command");
    let status = Command::new(program)
        .args(rest)
        .status()
        .map_err(|e| ExportError::Command(format!("{program}: {e}")))?;

    if !status.success() {
        warn!(%status, "post-export command failed");
        return Err(ExportError::Command(format!("{program} exited with {status}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_core::TimespanFactory;

    #[test]
    fn test_split_args_respects_quotes() {
        assert_eq!(
            split_args(r#"cp "%f" "/my dir/"  x"#),
            vec!["cp", "%f", "/my dir/", "x"]
        );
        assert_eq!(split_args(r#"echo """#), vec!["echo", ""]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_apply_tokens() {
        let mut subs = Substitutions::new();
        subs.set('f', "/out/a.wav");
        subs.set('N', "verse");
        assert_eq!(subs.apply("%f-%N 100%% %q%"), "/out/a.wav-verse 100% %q%");
    }

    #[test]
    fn test_for_file() {
        let mut session = Session::new("song", "/sessions/song", 48000);
        session.metadata.artist = "Artist".into();
        session.metadata.year = 2026;
        let timespan = TimespanFactory::new().create("chorus", 0, 10).unwrap();

        let subs = Substitutions::for_file(&session, &timespan, Path::new("/out/song_chorus.wav"));
        assert_eq!(subs.get('a'), Some("Artist"));
        assert_eq!(subs.get('b'), Some("song_chorus"));
        assert_eq!(subs.get('d'), Some("/out"));
        assert_eq!(subs.get('f'), Some("/out/song_chorus.wav"));
        assert_eq!(subs.get('n'), Some("song"));
        assert_eq!(subs.get('p'), Some("/sessions/song"));
        assert_eq!(subs.get('N'), Some("chorus"));
        assert_eq!(subs.get('Y'), Some("2026"));
        assert_eq!(subs.get('T'), Some(""));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_exit_status() {
        let subs = Substitutions::new();
        assert!(run_command("true", &subs).is_ok());
        assert!(matches!(run_command("false", &subs), Err(ExportError::Command(_))));
        assert!(run_command("", &subs).is_err());
        assert!(run_command("/definitely/not/a/program", &subs).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_substitutes_into_args() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("touched file");
        let mut subs = Substitutions::new();
        subs.set('f', target.to_string_lossy());

        run_command(r#"touch "%f""#, &subs).unwrap();
        assert!(target.exists());
    }
}
