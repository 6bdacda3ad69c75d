use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::{read_i32_le, read_u32_le};

/// `"GOB "` read as a little-endian u32.
pub const GOB_MAGIC: u32 = 0x2042_4F47;

const HEADER_LEN: usize = 16;
const ENTRY_LEN: usize = 136;
const ENTRY_NAME_LEN: usize = 128;
const FIRST_FILE_SIZE_OFFSET: i32 = 20;
const FILE_COUNT_OFFSET: i32 = 12;
const MAX_GOB_ENTRIES: usize = 100_000;

#[derive(Debug)]
pub enum GobError {
    Io(std::io::Error),
    InvalidHeader,
    Truncated,
    TooManyEntries { entries: usize },
    EntryOutOfBounds { name: String },
    NotFound(String),
    UnsafePath(String),
}

impl fmt::Display for GobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GobError::Io(err) => write!(f, "io error: {}", err),
            GobError::InvalidHeader => write!(f, "invalid gob header"),
            GobError::Truncated => write!(f, "gob directory is truncated"),
            GobError::TooManyEntries { entries } => {
                write!(f, "gob directory has too many entries: {}", entries)
            }
            GobError::EntryOutOfBounds { name } => {
                write!(f, "gob entry out of bounds: {}", name)
            }
            GobError::NotFound(name) => write!(f, "gob entry not found: {}", name),
            GobError::UnsafePath(name) => write!(f, "gob entry path is unsafe: {}", name),
        }
    }
}

impl std::error::Error for GobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GobError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GobError {
    fn from(err: std::io::Error) -> Self {
        GobError::Io(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GobEntry {
    pub name: String,
    pub offset: u32,
    pub length: u32,
}

/// A parsed GOB/GOO container. Lookups are case-insensitive and accept
/// either slash direction.
#[derive(Debug)]
pub struct GobArchive {
    data: Vec<u8>,
    entries: Vec<GobEntry>,
    lookup: HashMap<String, usize>,
    names: Vec<String>,
}

impl GobArchive {
    /// Directory entries in table order, without the space aliases.
    pub fn entries(&self) -> &[GobEntry] {
        &self.entries
    }

    /// Every resolvable name, space aliases included, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, name: &str) -> Option<&GobEntry> {
        let key = normalize_name(name);
        self.lookup.get(&key).map(|&index| &self.entries[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    pub fn read(&self, name: &str) -> Result<&[u8], GobError> {
        let entry = self
            .entry(name)
            .ok_or_else(|| GobError::NotFound(name.to_string()))?;
        let start = entry.offset as usize;
        let end = start + entry.length as usize;
        Ok(&self.data[start..end])
    }

    pub fn extract_all(&self, out_dir: &Path) -> Result<(), GobError> {
        fs::create_dir_all(out_dir)?;
        for entry in &self.entries {
            let out_path = safe_join(out_dir, &entry.name)?;
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let start = entry.offset as usize;
            let end = start + entry.length as usize;
            fs::write(&out_path, &self.data[start..end])?;
        }
        Ok(())
    }

    fn register(&mut self, name: String, index: usize) {
        if self.lookup.insert(name.clone(), index).is_none() {
            self.names.push(name);
        }
    }

    fn register_alias(&mut self, name: String, index: usize) {
        if !self.lookup.contains_key(&name) {
            self.lookup.insert(name.clone(), index);
            self.names.push(name);
        }
    }
}

pub fn read_gob(path: &Path) -> Result<GobArchive, GobError> {
    let data = fs::read(path)?;
    parse_gob(data)
}

pub fn parse_gob(data: Vec<u8>) -> Result<GobArchive, GobError> {
    if data.len() < HEADER_LEN {
        return Err(GobError::InvalidHeader);
    }
    let magic = read_u32_le(&data[0..4]);
    let first_file_size_offset = read_i32_le(&data[4..8]);
    let file_count_offset = read_i32_le(&data[8..12]);
    if magic != GOB_MAGIC
        || first_file_size_offset != FIRST_FILE_SIZE_OFFSET
        || file_count_offset != FILE_COUNT_OFFSET
    {
        return Err(GobError::InvalidHeader);
    }

    let count = read_i32_le(&data[12..16]);
    let count = usize::try_from(count).map_err(|_| GobError::InvalidHeader)?;
    if count > MAX_GOB_ENTRIES {
        return Err(GobError::TooManyEntries { entries: count });
    }
    let dir_end = HEADER_LEN + count * ENTRY_LEN;
    if dir_end > data.len() {
        return Err(GobError::Truncated);
    }

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let base = HEADER_LEN + i * ENTRY_LEN;
        let offset = read_i32_le(&data[base..base + 4]);
        let length = read_i32_le(&data[base + 4..base + 8]);
        let name_bytes = &data[base + 8..base + 8 + ENTRY_NAME_LEN];
        let name_len = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        let name = normalize_name(&latin1(&name_bytes[..name_len]));

        let (Ok(offset), Ok(length)) = (u32::try_from(offset), u32::try_from(length)) else {
            return Err(GobError::EntryOutOfBounds { name });
        };
        let end = (offset as usize)
            .checked_add(length as usize)
            .ok_or_else(|| GobError::EntryOutOfBounds { name: name.clone() })?;
        if end > data.len() {
            return Err(GobError::EntryOutOfBounds { name });
        }
        entries.push(GobEntry {
            name,
            offset,
            length,
        });
    }

    let mut archive = GobArchive {
        data,
        entries: Vec::new(),
        lookup: HashMap::with_capacity(count),
        names: Vec::with_capacity(count),
    };
    for (index, entry) in entries.iter().enumerate() {
        archive.register(entry.name.clone(), index);
        // The engine truncates names at the first space.
        if let Some((head, _)) = entry.name.split_once(' ') {
            archive.register_alias(head.to_string(), index);
        }
    }
    archive.entries = entries;
    Ok(archive)
}

/// Lower-case ASCII, forward slashes, no NUL padding.
pub fn normalize_name(name: &str) -> String {
    name.trim_matches(char::from(0))
        .replace('\\', "/")
        .to_ascii_lowercase()
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn safe_join(base: &Path, entry: &str) -> Result<PathBuf, GobError> {
    let rel = Path::new(entry);
    let mut safe = PathBuf::from(base);
    for component in rel.components() {
        match component {
            Component::Normal(part) => safe.push(part),
            Component::CurDir => {}
            _ => return Err(GobError::UnsafePath(entry.to_string())),
        }
    }

    if safe.file_name() == Some(OsStr::new("")) {
        return Err(GobError::UnsafePath(entry.to_string()));
    }

    Ok(safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::build_gob;

    #[test]
    fn reads_are_case_and_separator_insensitive() {
        let data = build_gob(&[
            ("MAT\\Wall.MAT", b"wall".as_slice()),
            ("jkl/01narsh.jkl", b"level".as_slice()),
        ]);
        let gob = parse_gob(data).expect("gob parse");
        assert_eq!(gob.len(), 2);
        assert_eq!(gob.read("mat/wall.mat").unwrap(), b"wall");
        assert_eq!(gob.read("MAT\\WALL.mat").unwrap(), b"wall");
        assert_eq!(gob.read("Jkl/01NARSH.jkl").unwrap(), b"level");
        assert_eq!(gob.entries()[0].name, "mat/wall.mat");
    }

    #[test]
    fn space_names_get_truncated_alias() {
        let data = build_gob(&[("mat/door old.mat", b"door")]);
        let gob = parse_gob(data).expect("gob parse");
        assert_eq!(gob.read("mat/door old.mat").unwrap(), b"door");
        assert_eq!(gob.read("mat/door").unwrap(), b"door");
        let names: Vec<&str> = gob.names().collect();
        assert_eq!(names, vec!["mat/door old.mat", "mat/door"]);
    }

    #[test]
    fn space_alias_never_shadows_real_entry() {
        let data = build_gob(&[
            ("mat/door", b"real".as_slice()),
            ("mat/door copy", b"copy".as_slice()),
        ]);
        let gob = parse_gob(data).expect("gob parse");
        assert_eq!(gob.read("mat/door").unwrap(), b"real");
        assert_eq!(gob.read("mat/door copy").unwrap(), b"copy");
    }

    #[test]
    fn missing_entry_is_not_found() {
        let gob = parse_gob(build_gob(&[])).expect("gob parse");
        assert!(gob.is_empty());
        let err = gob.read("jkl/missing.jkl").expect_err("should fail");
        assert!(matches!(err, GobError::NotFound(_)));
    }

    #[test]
    fn rejects_bad_magic_and_offsets() {
        let mut data = build_gob(&[]);
        data[0] = b'X';
        assert!(matches!(parse_gob(data), Err(GobError::InvalidHeader)));

        let mut data = build_gob(&[]);
        data[4..8].copy_from_slice(&24i32.to_le_bytes());
        assert!(matches!(parse_gob(data), Err(GobError::InvalidHeader)));

        let mut data = build_gob(&[]);
        data[8..12].copy_from_slice(&16i32.to_le_bytes());
        assert!(matches!(parse_gob(data), Err(GobError::InvalidHeader)));
    }

    #[test]
    fn rejects_truncated_directory() {
        let mut data = build_gob(&[("a.txt", b"a")]);
        data[12..16].copy_from_slice(&5i32.to_le_bytes());
        assert!(matches!(parse_gob(data), Err(GobError::Truncated)));
    }

    #[test]
    fn rejects_entry_past_end() {
        let mut data = build_gob(&[("a.txt", b"abc")]);
        let length_at = HEADER_LEN + 4;
        data[length_at..length_at + 4].copy_from_slice(&4096i32.to_le_bytes());
        let err = parse_gob(data).expect_err("should fail");
        assert!(matches!(err, GobError::EntryOutOfBounds { name } if name == "a.txt"));
    }

    #[test]
    fn safe_join_rejects_parent_components() {
        let base = Path::new("out");
        assert!(safe_join(base, "mat/a.mat").is_ok());
        assert!(matches!(
            safe_join(base, "../a.mat"),
            Err(GobError::UnsafePath(_))
        ));
    }
}
