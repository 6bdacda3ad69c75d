//! `misc/models.dat` listing of selectable player models.

use crate::text::{content_lines, unquote, Record};

pub const UNKNOWN_MODEL_NAME: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelEntry {
    /// File name under `3do/`.
    pub model: String,
    /// Display name from the trailing comment.
    pub name: String,
}

/// Records read `idx: file.3do sound`; the display name is the text after
/// the last `#` on the raw line.
pub fn parse_models_dat(text: &str) -> Vec<ModelEntry> {
    let raw: Vec<&str> = text.lines().collect();
    let mut entries = Vec::new();
    for line in content_lines(text) {
        let Some(mut record) = Record::parse(&line) else {
            continue;
        };
        let (Ok(model), Ok(_sound)) = (record.word("model file"), record.word("sound file"))
        else {
            continue;
        };
        let name = raw[line.number - 1]
            .rfind('#')
            .map(|start| unquote(raw[line.number - 1][start + 1..].trim()).to_string())
            .unwrap_or_else(|| UNKNOWN_MODEL_NAME.to_string());
        entries.push(ModelEntry {
            model: model.to_string(),
            name,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_come_from_comments() {
        let text = "\
# player models
0: ky.3do kyle.snd  # \"Kyle Katarn\"
1: mj.3do mara.snd # Mara Jade
2: stormie.3do st.snd
3: broken.3do
";
        let entries = parse_models_dat(text);
        assert_eq!(
            entries,
            vec![
                ModelEntry {
                    model: "ky.3do".to_string(),
                    name: "Kyle Katarn".to_string(),
                },
                ModelEntry {
                    model: "mj.3do".to_string(),
                    name: "Mara Jade".to_string(),
                },
                ModelEntry {
                    model: "stormie.3do".to_string(),
                    name: UNKNOWN_MODEL_NAME.to_string(),
                },
            ]
        );
    }
}
