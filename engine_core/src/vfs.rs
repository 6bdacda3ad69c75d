use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use std::sync::{Arc, Mutex};

use compat_jk::gob::{self, GobArchive, GobError};
use compat_jk::text::decode_text;
use zip::read::ZipArchive;

use crate::config::ExtractConfig;
use crate::logging;

#[derive(Debug)]
pub enum VfsError {
    Io(std::io::Error),
    NotFound(String),
    Gob { archive: String, error: GobError },
    Zip(String),
    NoArchives(String),
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VfsError::Io(err) => write!(f, "io error: {}", err),
            VfsError::NotFound(path) => write!(f, "path not found: {}", path),
            VfsError::Gob { archive, error } => write!(f, "gob error in {}: {}", archive, error),
            VfsError::Zip(message) => write!(f, "zip error: {}", message),
            VfsError::NoArchives(label) => write!(f, "no usable archives in {}", label),
        }
    }
}

impl std::error::Error for VfsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VfsError::Io(err) => Some(err),
            VfsError::Gob { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VfsError {
    fn from(err: std::io::Error) -> Self {
        VfsError::Io(err)
    }
}

fn zip_error(err: zip::result::ZipError) -> VfsError {
    VfsError::Zip(err.to_string())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveKind {
    /// A GOB/GOO file on disk or in memory.
    Gob,
    /// A GOB/GOO nested inside a ZIP.
    ZipGob,
    /// Loose files of a ZIP filed under their logical folders.
    ZipLoose,
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArchiveKind::Gob => "gob",
            ArchiveKind::ZipGob => "zip-gob",
            ArchiveKind::ZipLoose => "zip-loose",
        };
        write!(f, "{}", label)
    }
}

/// Base-game archives sit in the official layer; level archives override them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layer {
    Official,
    Level,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VfsProvenance {
    pub label: String,
    pub kind: ArchiveKind,
    pub layer: Layer,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountSummary {
    pub label: String,
    pub kind: ArchiveKind,
    pub layer: Layer,
    pub entries: usize,
}

#[derive(Debug)]
enum ZipReader {
    File(fs::File),
    Memory(Cursor<Arc<[u8]>>),
}

impl Read for ZipReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            ZipReader::File(file) => file.read(buf),
            ZipReader::Memory(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for ZipReader {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        match self {
            ZipReader::File(file) => file.seek(pos),
            ZipReader::Memory(cursor) => cursor.seek(pos),
        }
    }
}

#[derive(Debug)]
struct LooseFiles {
    /// Central directory parsed once at mount time.
    zip: Mutex<ZipArchive<ZipReader>>,
    /// Virtual name to the ZIP entry index it came from.
    lookup: HashMap<String, usize>,
    names: Vec<String>,
}

impl LooseFiles {
    fn read_entry(&self, label: &str, index: usize) -> Result<Vec<u8>, VfsError> {
        let mut zip = self
            .zip
            .lock()
            .map_err(|_| VfsError::Zip(format!("{}: archive lock poisoned", label)))?;
        let mut file = zip.by_index(index).map_err(zip_error)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

#[derive(Debug)]
enum Contents {
    Gob(GobArchive),
    Loose(LooseFiles),
}

/// One mountable archive.
#[derive(Debug)]
pub struct Archive {
    label: String,
    kind: ArchiveKind,
    contents: Contents,
}

impl Archive {
    pub fn open_gob(path: &Path) -> Result<Self, VfsError> {
        let data = fs::read(path)?;
        Self::gob_from_bytes(path.display().to_string(), data, ArchiveKind::Gob)
    }

    pub fn from_gob_bytes(label: impl Into<String>, data: Vec<u8>) -> Result<Self, VfsError> {
        Self::gob_from_bytes(label.into(), data, ArchiveKind::Gob)
    }

    fn gob_from_bytes(label: String, data: Vec<u8>, kind: ArchiveKind) -> Result<Self, VfsError> {
        match gob::parse_gob(data) {
            Ok(archive) => Ok(Self {
                label,
                kind,
                contents: Contents::Gob(archive),
            }),
            Err(error) => Err(VfsError::Gob {
                archive: label,
                error,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    pub fn names(&self) -> Vec<&str> {
        match &self.contents {
            Contents::Gob(archive) => archive.names().collect(),
            Contents::Loose(files) => files.names.iter().map(String::as_str).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        let key = gob::normalize_name(name);
        match &self.contents {
            Contents::Gob(archive) => archive.contains(&key),
            Contents::Loose(files) => files.lookup.contains_key(&key),
        }
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, VfsError> {
        let key = gob::normalize_name(name);
        match &self.contents {
            Contents::Gob(archive) => match archive.read(&key) {
                Ok(bytes) => Ok(bytes.to_vec()),
                Err(GobError::NotFound(_)) => Err(VfsError::NotFound(name.to_string())),
                Err(error) => Err(VfsError::Gob {
                    archive: self.label.clone(),
                    error,
                }),
            },
            Contents::Loose(files) => {
                let index = files
                    .lookup
                    .get(&key)
                    .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
                files.read_entry(&self.label, *index)
            }
        }
    }
}

/// Opens a ZIP and mounts what it carries: every nested `.gob`/`.goo` in
/// entry order, or, when there are none, its loose files.
pub fn open_zip(path: &Path) -> Result<Vec<Archive>, VfsError> {
    let label = path.display().to_string();
    let file = fs::File::open(path)?;
    scan_zip(&label, ZipReader::File(file))
}

pub fn open_zip_bytes(label: impl Into<String>, data: Vec<u8>) -> Result<Vec<Archive>, VfsError> {
    let label = label.into();
    let data: Arc<[u8]> = Arc::from(data);
    scan_zip(&label, ZipReader::Memory(Cursor::new(data)))
}

fn scan_zip(label: &str, reader: ZipReader) -> Result<Vec<Archive>, VfsError> {
    let mut zip = ZipArchive::new(reader).map_err(zip_error)?;
    let mut archives = Vec::new();
    let mut loose = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(zip_error)?;
        if entry.is_dir() {
            continue;
        }
        let entry_name = entry.name().to_string();
        let lower = entry_name.to_ascii_lowercase();
        if lower.ends_with(".gob") || lower.ends_with(".goo") {
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            let nested = format!("{}!{}", label, entry_name);
            archives.push(Archive::gob_from_bytes(nested, data, ArchiveKind::ZipGob)?);
        } else {
            loose.push((index, entry_name));
        }
    }
    if !archives.is_empty() {
        return Ok(archives);
    }

    let mut lookup = HashMap::new();
    let mut names = Vec::new();
    for (index, entry_name) in loose {
        let Some(name) = loose_virtual_name(&entry_name) else {
            logging::debug(format!("{}: dropping loose file {}", label, entry_name));
            continue;
        };
        if lookup.insert(name.clone(), index).is_none() {
            names.push(name);
        }
    }
    if names.is_empty() {
        return Err(VfsError::NoArchives(label.to_string()));
    }
    Ok(vec![Archive {
        label: label.to_string(),
        kind: ArchiveKind::ZipLoose,
        contents: Contents::Loose(LooseFiles {
            zip: Mutex::new(zip),
            lookup,
            names,
        }),
    }])
}

/// Folder names a loose file may already sit in, and where they map to.
const LOOSE_FOLDERS: &[(&str, &str)] = &[
    ("3do", "3do"),
    ("mat", "mat"),
    ("jkl", "jkl"),
    ("cmp", "misc/cmp"),
    ("misc", "misc"),
];

const LOOSE_EXTENSIONS: &[(&str, &str)] = &[
    ("3do", "3do"),
    ("mat", "mat"),
    ("jkl", "jkl"),
    ("cmp", "misc/cmp"),
];

/// Logical path for a loose ZIP entry. The innermost folder wins when it is a
/// known one; otherwise the extension decides. Unknown files map to `None`.
pub fn loose_virtual_name(entry_name: &str) -> Option<String> {
    let normalized = gob::normalize_name(entry_name);
    let (dir, file) = match normalized.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", normalized.as_str()),
    };
    if file.is_empty() {
        return None;
    }
    match file {
        "episode.jk" => return Some(file.to_string()),
        "models.dat" => return Some(format!("misc/{}", file)),
        _ => {}
    }
    let innermost = dir.rsplit('/').next().unwrap_or("");
    if let Some((_, folder)) = LOOSE_FOLDERS.iter().find(|(name, _)| *name == innermost) {
        return Some(format!("{}/{}", folder, file));
    }
    let extension = file.rsplit_once('.').map(|(_, ext)| ext)?;
    LOOSE_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, folder)| format!("{}/{}", folder, file))
}

#[derive(Debug)]
struct Mount {
    archive: Archive,
    layer: Layer,
}

/// Archives in priority order with a merged, case-insensitive index.
/// A name resolves to the last archive mounted that owns it; earlier owners
/// stay visible through [`Vfs::providers_of`].
#[derive(Debug, Default)]
pub struct Vfs {
    mounts: Vec<Mount>,
    index: HashMap<String, Vec<usize>>,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mounts `archives` as level archives, lowest priority first.
    pub fn open(archives: impl IntoIterator<Item = Archive>) -> Self {
        let mut vfs = Self::new();
        for archive in archives {
            vfs.mount(archive, Layer::Level);
        }
        vfs
    }

    /// Mounts the configured official archives from `game_dir`, then the
    /// level archives above them. Official archives that are missing or
    /// unreadable are skipped.
    pub fn open_with_official(
        config: &ExtractConfig,
        game_dir: &Path,
        level_archives: impl IntoIterator<Item = Archive>,
    ) -> Self {
        let mut vfs = Self::new();
        for path in &config.official_archives {
            let path = game_dir.join(path);
            match Archive::open_gob(&path) {
                Ok(archive) => vfs.mount(archive, Layer::Official),
                Err(err) => logging::warn(format!(
                    "skipping official archive {}: {}",
                    path.display(),
                    err
                )),
            }
        }
        for archive in level_archives {
            vfs.mount(archive, Layer::Level);
        }
        vfs
    }

    pub fn mount(&mut self, archive: Archive, layer: Layer) {
        let id = self.mounts.len();
        for name in archive.names() {
            self.index.entry(name.to_string()).or_default().push(id);
        }
        logging::debug(format!(
            "mounted {} archive {} ({} names)",
            archive.kind,
            archive.label,
            archive.names().len()
        ));
        self.mounts.push(Mount { archive, layer });
    }

    pub fn mounts(&self) -> Vec<MountSummary> {
        self.mounts
            .iter()
            .map(|mount| MountSummary {
                label: mount.archive.label.clone(),
                kind: mount.archive.kind,
                layer: mount.layer,
                entries: mount.archive.names().len(),
            })
            .collect()
    }

    fn owners(&self, name: &str) -> &[usize] {
        self.index
            .get(&gob::normalize_name(name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn winner(&self, name: &str, layer: Option<Layer>) -> Option<&Mount> {
        self.owners(name)
            .iter()
            .rev()
            .map(|&id| &self.mounts[id])
            .find(|mount| layer.map_or(true, |layer| mount.layer == layer))
    }

    pub fn contains(&self, name: &str) -> bool {
        !self.owners(name).is_empty()
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, VfsError> {
        let mount = self
            .winner(name, None)
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        mount.archive.read(name)
    }

    /// Text files may carry Latin-1 bytes; they decode one char per byte.
    pub fn read_to_string(&self, name: &str) -> Result<String, VfsError> {
        self.read(name).map(|data| decode_text(&data))
    }

    /// Looks only at archives of one layer.
    pub fn read_in_layer(&self, layer: Layer, name: &str) -> Result<Vec<u8>, VfsError> {
        let mount = self
            .winner(name, Some(layer))
            .ok_or_else(|| VfsError::NotFound(name.to_string()))?;
        mount.archive.read(name)
    }

    pub fn contains_in_layer(&self, layer: Layer, name: &str) -> bool {
        self.winner(name, Some(layer)).is_some()
    }

    pub fn source_of(&self, name: &str) -> Option<VfsProvenance> {
        self.winner(name, None).map(provenance)
    }

    /// Every archive owning `name`, lowest priority first.
    pub fn providers_of(&self, name: &str) -> Vec<VfsProvenance> {
        self.owners(name)
            .iter()
            .map(|&id| provenance(&self.mounts[id]))
            .collect()
    }

    /// All resolvable names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.index.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn names_in_layer(&self, layer: Layer) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .index
            .iter()
            .filter(|(_, owners)| owners.iter().any(|&id| self.mounts[id].layer == layer))
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    /// Releases the archives, newest first, and reports their labels in
    /// release order.
    pub fn close(mut self) -> Vec<String> {
        self.release()
    }

    fn release(&mut self) -> Vec<String> {
        self.index.clear();
        let mut released = Vec::with_capacity(self.mounts.len());
        while let Some(mount) = self.mounts.pop() {
            logging::debug(format!("releasing archive {}", mount.archive.label));
            released.push(mount.archive.label);
        }
        released
    }
}

impl Drop for Vfs {
    fn drop(&mut self) {
        self.release();
    }
}

fn provenance(mount: &Mount) -> VfsProvenance {
    VfsProvenance {
        label: mount.archive.label.clone(),
        kind: mount.archive.kind,
        layer: mount.layer,
    }
}
