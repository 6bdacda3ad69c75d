//! `episode.jk` listing.

use crate::text::{content_lines, unquote, Record, TextError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Episode {
    pub title: String,
    /// Level file names in play order, as written (no `jkl/` prefix).
    pub levels: Vec<String>,
}

/// The first content line is the title; `idx: disc level TYPE file ...`
/// records of type `LEVEL` name the levels. Other lines are ignored.
pub fn parse_episode(text: &str) -> Result<Episode, TextError> {
    let mut lines = content_lines(text);
    let title = lines.next().ok_or(TextError::MissingTitle)?;
    let mut levels = Vec::new();
    for line in lines {
        let Some(mut record) = Record::parse(&line) else {
            continue;
        };
        let (Ok(_disc), Ok(_level), Ok(kind), Ok(file)) = (
            record.int("disc"),
            record.int("level number"),
            record.word("entry type"),
            record.word("entry file"),
        ) else {
            continue;
        };
        if kind == "LEVEL" {
            levels.push(file.to_string());
        }
    }
    Ok(Episode {
        title: unquote(title.text).to_string(),
        levels,
    })
}
