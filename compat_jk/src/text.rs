//! Line grammar shared by the level, model and listing formats.
//!
//! Lines are stripped of `#` comments and surrounding whitespace; blank lines
//! vanish. `SECTION: name` opens a section (names compare lower-case) which
//! runs until `END` or the next section marker. Inside a section, lines of the
//! form `<label> <count>` head a subsection and `<index>: <fields...>` lines
//! are records.

use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
pub enum TextError {
    MissingSection(String),
    MissingTitle,
    MalformedRecord {
        line: usize,
        reason: &'static str,
    },
    MissingIndex {
        line: usize,
        table: &'static str,
        index: i64,
    },
    NoRootNode,
    MissingGeoset(u32),
}

impl fmt::Display for TextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextError::MissingSection(name) => write!(f, "missing section: {}", name),
            TextError::MissingTitle => write!(f, "missing title line"),
            TextError::MalformedRecord { line, reason } => {
                write!(f, "line {}: malformed record: {}", line, reason)
            }
            TextError::MissingIndex { line, table, index } => {
                write!(f, "line {}: {} index {} not defined", line, table, index)
            }
            TextError::NoRootNode => write!(f, "hierarchy has no root node"),
            TextError::MissingGeoset(id) => write!(f, "geoset {} not defined", id),
        }
    }
}

impl std::error::Error for TextError {}

/// A non-blank, comment-free source line with its 1-based line number.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Line<'a> {
    pub number: usize,
    pub text: &'a str,
}

impl<'a> Line<'a> {
    pub fn tokens(&self) -> std::str::SplitWhitespace<'a> {
        self.text.split_whitespace()
    }

    pub fn malformed(&self, reason: &'static str) -> TextError {
        TextError::MalformedRecord {
            line: self.number,
            reason,
        }
    }
}

#[derive(Debug, Default)]
pub struct Sections<'a> {
    sections: HashMap<String, Vec<Line<'a>>>,
}

impl<'a> Sections<'a> {
    pub fn get(&self, name: &str) -> Option<&[Line<'a>]> {
        self.sections.get(name).map(Vec::as_slice)
    }

    pub fn require(&self, name: &str) -> Result<&[Line<'a>], TextError> {
        self.get(name)
            .ok_or_else(|| TextError::MissingSection(name.to_string()))
    }

    /// Absent sections read as empty.
    pub fn lines(&self, name: &str) -> &[Line<'a>] {
        self.get(name).unwrap_or(&[])
    }
}

/// Maps bytes one-to-one onto chars, so non-UTF-8 files still decode.
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

pub fn strip_comment(line: &str) -> &str {
    let line = match line.find('#') {
        Some(start) => &line[..start],
        None => line,
    };
    line.trim()
}

/// Comment-stripped, non-blank lines.
pub fn content_lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    text.lines().enumerate().filter_map(|(index, raw)| {
        let text = strip_comment(raw);
        (!text.is_empty()).then_some(Line {
            number: index + 1,
            text,
        })
    })
}

pub fn split_sections(text: &str) -> Sections<'_> {
    let mut sections = HashMap::new();
    let mut current: Option<(String, Vec<Line<'_>>)> = None;
    for line in content_lines(text) {
        if let Some(name) = section_name(line.text) {
            if let Some((name, lines)) = current.take() {
                sections.insert(name, lines);
            }
            current = Some((name, Vec::new()));
        } else if line.text.eq_ignore_ascii_case("end") {
            if let Some((name, lines)) = current.take() {
                sections.insert(name, lines);
            }
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((name, lines)) = current {
        sections.insert(name, lines);
    }
    Sections { sections }
}

fn section_name(text: &str) -> Option<String> {
    const MARKER: &str = "section:";
    if text.len() <= MARKER.len() || !text.is_char_boundary(MARKER.len()) {
        return None;
    }
    let (head, rest) = text.split_at(MARKER.len());
    head.eq_ignore_ascii_case(MARKER)
        .then(|| rest.trim().to_ascii_lowercase())
}

/// Groups records under the closest preceding `<label> <count>` header.
/// Labels are lower-cased with single spaces; records before any header and
/// other non-record lines are dropped.
pub fn subsections<'a>(lines: &[Line<'a>]) -> HashMap<String, Vec<Line<'a>>> {
    let mut out: HashMap<String, Vec<Line<'a>>> = HashMap::new();
    let mut current: Option<String> = None;
    for line in lines {
        if split_index(line.text).is_some() {
            if let Some(name) = &current {
                out.entry(name.clone()).or_default().push(*line);
            }
        } else if let Some((label, _)) = count_header(line.text) {
            out.entry(label.clone()).or_default();
            current = Some(label);
        }
    }
    out
}

/// `<label> <integer>`; the label is lower-cased and must not be empty.
pub fn count_header(text: &str) -> Option<(String, i64)> {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    let count = tokens.pop()?.parse::<i64>().ok()?;
    if tokens.is_empty() {
        return None;
    }
    Some((tokens.join(" ").to_ascii_lowercase(), count))
}

fn split_index(text: &str) -> Option<(u32, &str)> {
    let (head, rest) = text.split_once(':')?;
    if head.is_empty() || !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((head.parse().ok()?, rest))
}

/// A numbered `<index>: <fields...>` line. Fields split on whitespace and
/// commas, so `3, 7` and `3,7` both read as two fields.
#[derive(Debug, Clone)]
pub struct Record<'a> {
    pub line: usize,
    pub index: u32,
    fields: Vec<&'a str>,
    pos: usize,
}

impl<'a> Record<'a> {
    pub fn parse(line: &Line<'a>) -> Option<Self> {
        let (index, rest) = split_index(line.text)?;
        let fields = rest
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|field| !field.is_empty())
            .collect();
        Some(Self {
            line: line.number,
            index,
            fields,
            pos: 0,
        })
    }

    pub fn remaining(&self) -> usize {
        self.fields.len() - self.pos
    }

    pub fn rest(&self) -> &[&'a str] {
        &self.fields[self.pos..]
    }

    pub fn malformed(&self, reason: &'static str) -> TextError {
        TextError::MalformedRecord {
            line: self.line,
            reason,
        }
    }

    pub fn missing(&self, table: &'static str, index: i64) -> TextError {
        TextError::MissingIndex {
            line: self.line,
            table,
            index,
        }
    }

    pub fn peek(&self) -> Option<&'a str> {
        self.fields.get(self.pos).copied()
    }

    pub fn word(&mut self, what: &'static str) -> Result<&'a str, TextError> {
        let field = self.peek().ok_or_else(|| self.malformed(what))?;
        self.pos += 1;
        Ok(field)
    }

    pub fn int(&mut self, what: &'static str) -> Result<i32, TextError> {
        let field = self.word(what)?;
        field.parse().map_err(|_| self.malformed(what))
    }

    pub fn float(&mut self, what: &'static str) -> Result<f32, TextError> {
        let field = self.word(what)?;
        parse_float(field).ok_or_else(|| self.malformed(what))
    }

    pub fn hex(&mut self, what: &'static str) -> Result<u32, TextError> {
        let field = self.word(what)?;
        parse_hex(field).ok_or_else(|| self.malformed(what))
    }

    pub fn vec3(&mut self, what: &'static str) -> Result<[f32; 3], TextError> {
        Ok([self.float(what)?, self.float(what)?, self.float(what)?])
    }
}

pub fn parse_float(field: &str) -> Option<f32> {
    field.parse::<f32>().ok().filter(|value| value.is_finite())
}

/// `0x`-prefixed hexadecimal.
pub fn parse_hex(field: &str) -> Option<u32> {
    let digits = field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))?;
    u32::from_str_radix(digits, 16).ok()
}

/// `(x/y/z)` as written in thing fields.
pub fn parse_vector(field: &str) -> Option<[f32; 3]> {
    let inner = field.strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = inner.split('/');
    let x = parse_float(parts.next()?)?;
    let y = parse_float(parts.next()?)?;
    let z = parse_float(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some([x, y, z])
}

/// Drops one pair of surrounding double quotes.
pub fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# header comment
SECTION: HEADER
Version 1   # trailing
end

Section: Materials
World materials 2
0: wall.mat 1 1
1: floor.mat 1 1
Extra stuff here
SECTION: sectors
SECTOR 0
";

    #[test]
    fn sections_split_on_markers_and_end() {
        let sections = split_sections(SAMPLE);
        let header = sections.require("header").expect("header section");
        assert_eq!(header.len(), 1);
        assert_eq!(header[0].text, "Version 1");
        assert_eq!(header[0].number, 3);

        assert_eq!(sections.lines("materials").len(), 4);
        assert_eq!(sections.lines("sectors")[0].text, "SECTOR 0");
        assert!(matches!(
            sections.require("things"),
            Err(TextError::MissingSection(name)) if name == "things"
        ));
    }

    #[test]
    fn subsections_group_records_by_header() {
        let sections = split_sections(SAMPLE);
        let groups = subsections(sections.lines("materials"));
        let materials = &groups["world materials"];
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[1].text, "1: floor.mat 1 1");
        assert!(!groups.contains_key("extra stuff here"));
    }

    #[test]
    fn record_fields_split_on_commas() {
        let line = Line {
            number: 7,
            text: "12: 0x4 3,1 4, 2 -0.5",
        };
        let mut record = Record::parse(&line).expect("record");
        assert_eq!(record.index, 12);
        assert_eq!(record.hex("flags").unwrap(), 4);
        assert_eq!(record.int("a").unwrap(), 3);
        assert_eq!(record.int("b").unwrap(), 1);
        assert_eq!(record.remaining(), 3);
        assert_eq!(record.rest(), &["4", "2", "-0.5"]);
        record.int("c").unwrap();
        record.int("d").unwrap();
        assert_eq!(record.float("e").unwrap(), -0.5);
        let err = record.int("missing").expect_err("should fail");
        assert!(matches!(
            err,
            TextError::MalformedRecord {
                line: 7,
                reason: "missing"
            }
        ));
    }

    #[test]
    fn non_records_are_rejected() {
        for text in ["SECTOR 0", "x1: 2", ": 3", "World vertices 4"] {
            assert!(Record::parse(&Line { number: 1, text }).is_none(), "{}", text);
        }
    }

    #[test]
    fn vectors_and_hex_parse() {
        assert_eq!(parse_vector("(0.5/-1/2e1)"), Some([0.5, -1.0, 20.0]));
        assert_eq!(parse_vector("(1/2)"), None);
        assert_eq!(parse_hex("0x1F"), Some(31));
        assert_eq!(parse_hex("1F"), None);
        assert_eq!(unquote("\"Dark Forces\""), "Dark Forces");
        assert_eq!(unquote("plain"), "plain");
    }

    #[test]
    fn latin1_bytes_decode() {
        assert_eq!(decode_text(b"caf\xe9"), "caf\u{e9}");
        assert_eq!(decode_text(b"plain"), "plain");
    }
}
