//! BagIt bag creation and validation.
//!
//! A bag is a directory holding a `data/` payload, one payload manifest per
//! checksum algorithm, a `bagit.txt` declaration, a `bag-info.txt` metadata
//! file and tag manifests covering those tag files.

use crate::{BagError, BagResult};
use chrono::Local;
use sha2::{Digest, Sha256, Sha512};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const BAGIT_VERSION: &str = "0.97";
pub const TAG_FILE_ENCODING: &str = "UTF-8";
pub const BAG_SOFTWARE_AGENT: &str = concat!("bag-builder v", env!("CARGO_PKG_VERSION"));

const DATA_DIR: &str = "data";
const BAGIT_TXT: &str = "bagit.txt";
const BAG_INFO_TXT: &str = "bag-info.txt";
const MANIFEST_PREFIX: &str = "manifest-";
const TAGMANIFEST_PREFIX: &str = "tagmanifest-";

/// Algorithms written by [`make_bag`]
pub const DEFAULT_ALGORITHMS: [ChecksumAlgorithm; 2] =
    [ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Sha512];

/// Checksum algorithms supported in manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Name used in manifest file names
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }

    pub fn from_name(name: &str) -> BagResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha512" => Ok(ChecksumAlgorithm::Sha512),
            _ => Err(BagError::UnsupportedAlgorithm {
                name: name.to_string(),
            }),
        }
    }

    pub fn manifest_name(&self) -> String {
        format!("{}{}.txt", MANIFEST_PREFIX, self.name())
    }

    pub fn tagmanifest_name(&self) -> String {
        format!("{}{}.txt", TAGMANIFEST_PREFIX, self.name())
    }

    fn hasher(&self) -> Hasher {
        match self {
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            ChecksumAlgorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(hasher) => hasher.update(data),
            Hasher::Sha512(hasher) => hasher.update(data),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Hasher::Sha256(hasher) => hex::encode(hasher.finalize()),
            Hasher::Sha512(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Ordered, multi-valued `bag-info.txt` metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BagInfo {
    tags: Vec<(String, String)>,
}

impl BagInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value);
        self
    }

    /// Adds one line per value, keeping the given order.
    pub fn with_tags<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let name = name.into();
        for value in values {
            self.add(name.clone(), value);
        }
        self
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.tags.push((name.into(), value.into()));
    }

    /// Replaces every existing value of `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.tags.retain(|(existing, _)| existing != &name);
        self.tags.push((name, value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.iter().any(|(existing, _)| existing == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Renders tag file text, sorted by tag name. Values of a repeated tag
    /// keep their insertion order.
    pub fn to_text(&self) -> String {
        let mut sorted: Vec<&(String, String)> = self.tags.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut text = String::new();
        for (name, value) in sorted {
            let value: String = value.chars().filter(|c| *c != '\n' && *c != '\r').collect();
            text.push_str(&format!("{}: {}\n", name, value));
        }
        text
    }

    /// Parses tag file text. Indented lines continue the previous value.
    pub fn parse(text: &str) -> BagResult<Self> {
        let mut info = BagInfo::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                match info.tags.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None => {
                        return Err(BagError::InvalidBag {
                            reason: format!("continuation line without a tag: {:?}", line),
                        })
                    }
                }
                continue;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| BagError::InvalidBag {
                reason: format!("malformed tag line: {:?}", line),
            })?;
            info.add(name.trim(), value.trim());
        }
        Ok(info)
    }
}

/// A bag on disk
#[derive(Debug, Clone)]
pub struct Bag {
    path: PathBuf,
    version: String,
    info: BagInfo,
    manifests: BTreeMap<ChecksumAlgorithm, BTreeMap<String, String>>,
}

impl Bag {
    /// Reads the declaration, metadata and payload manifests of an existing bag.
    pub fn open(path: impl AsRef<Path>) -> BagResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(BagError::NotADirectory { path });
        }

        let declaration_path = path.join(BAGIT_TXT);
        if !declaration_path.is_file() {
            return Err(BagError::InvalidBag {
                reason: format!("missing {}", BAGIT_TXT),
            });
        }
        let declaration = BagInfo::parse(&fs::read_to_string(&declaration_path)?)?;
        let version = declaration
            .get("BagIt-Version")
            .ok_or_else(|| BagError::InvalidBag {
                reason: format!("{} does not declare BagIt-Version", BAGIT_TXT),
            })?
            .to_string();

        let info_path = path.join(BAG_INFO_TXT);
        let info = if info_path.is_file() {
            BagInfo::parse(&fs::read_to_string(&info_path)?)?
        } else {
            BagInfo::new()
        };

        let manifests = read_manifests(&path, MANIFEST_PREFIX)?;
        if manifests.is_empty() {
            return Err(BagError::InvalidBag {
                reason: "no payload manifest found".to_string(),
            });
        }

        Ok(Self {
            path,
            version,
            info,
            manifests,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn info(&self) -> &BagInfo {
        &self.info
    }

    pub fn algorithms(&self) -> Vec<ChecksumAlgorithm> {
        self.manifests.keys().copied().collect()
    }

    /// Payload paths (relative to the bag root) listed in the manifests
    pub fn payload_entries(&self) -> Vec<&str> {
        self.manifests
            .values()
            .next()
            .map(|entries| entries.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Checks completeness, Payload-Oxum and every payload and tag checksum.
    pub fn validate(&self) -> BagResult<()> {
        let files = payload_files(&self.path)?;
        let on_disk: BTreeSet<&str> = files.iter().map(|(name, _)| name.as_str()).collect();

        for (algorithm, entries) in &self.manifests {
            for name in &on_disk {
                if !entries.contains_key(*name) {
                    return Err(BagError::UntrackedFile {
                        path: name.to_string(),
                        manifest: algorithm.manifest_name(),
                    });
                }
            }
            for name in entries.keys() {
                if !on_disk.contains(name.as_str()) {
                    return Err(BagError::MissingFile { path: name.clone() });
                }
            }
        }

        self.check_oxum(&files)?;

        let algorithms = self.algorithms();
        for (name, full_path) in &files {
            let (_, digests) = digest_file(full_path, &algorithms)?;
            for (algorithm, actual) in digests {
                let expected = self
                    .manifests
                    .get(&algorithm)
                    .and_then(|entries| entries.get(name))
                    .ok_or_else(|| BagError::UntrackedFile {
                        path: name.clone(),
                        manifest: algorithm.manifest_name(),
                    })?;
                if *expected != actual {
                    return Err(BagError::ChecksumMismatch {
                        path: name.clone(),
                        algorithm,
                        expected: expected.clone(),
                        actual,
                    });
                }
            }
        }

        for (algorithm, entries) in read_manifests(&self.path, TAGMANIFEST_PREFIX)? {
            for (name, expected) in entries {
                let full_path = self.path.join(&name);
                if !full_path.is_file() {
                    return Err(BagError::MissingFile { path: name });
                }
                let (_, mut digests) = digest_file(&full_path, &[algorithm])?;
                let actual = digests.remove(&algorithm).unwrap_or_default();
                if expected != actual {
                    return Err(BagError::ChecksumMismatch {
                        path: name,
                        algorithm,
                        expected,
                        actual,
                    });
                }
            }
        }

        debug!("Bag {} is valid", self.path.display());
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    fn check_oxum(&self, files: &[(String, PathBuf)]) -> BagResult<()> {
        let Some(expected) = self.info.get("Payload-Oxum") else {
            return Ok(());
        };
        let mut bytes = 0u64;
        for (_, full_path) in files {
            bytes += fs::metadata(full_path)?.len();
        }
        let actual = format!("{}.{}", bytes, files.len());
        if expected != actual {
            return Err(BagError::OxumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }
}

/// Creates a bag in place using [`DEFAULT_ALGORITHMS`].
///
/// Everything currently in `bag_dir` becomes the payload under `data/`.
/// `Payload-Oxum` is always recomputed; `Bagging-Date` and
/// `Bag-Software-Agent` are filled in unless `info` already carries them.
pub fn make_bag(bag_dir: &Path, info: &BagInfo) -> BagResult<Bag> {
    make_bag_with_algorithms(bag_dir, info, &DEFAULT_ALGORITHMS)
}

pub fn make_bag_with_algorithms(
    bag_dir: &Path,
    info: &BagInfo,
    algorithms: &[ChecksumAlgorithm],
) -> BagResult<Bag> {
    if !bag_dir.is_dir() {
        return Err(BagError::NotADirectory {
            path: bag_dir.to_path_buf(),
        });
    }
    if algorithms.is_empty() {
        return Err(BagError::InvalidBag {
            reason: "at least one checksum algorithm is required".to_string(),
        });
    }

    move_payload(bag_dir)?;

    let mut manifests: BTreeMap<ChecksumAlgorithm, Vec<(String, String)>> = BTreeMap::new();
    let mut payload_bytes = 0u64;
    let mut payload_count = 0u64;
    for (name, full_path) in payload_files(bag_dir)? {
        let (size, digests) = digest_file(&full_path, algorithms)?;
        payload_bytes += size;
        payload_count += 1;
        for (algorithm, digest) in digests {
            manifests
                .entry(algorithm)
                .or_default()
                .push((name.clone(), digest));
        }
    }

    for algorithm in algorithms {
        let entries = manifests.get(algorithm).map(Vec::as_slice).unwrap_or(&[]);
        write_manifest(&bag_dir.join(algorithm.manifest_name()), entries)?;
    }

    fs::write(
        bag_dir.join(BAGIT_TXT),
        format!(
            "BagIt-Version: {}\nTag-File-Character-Encoding: {}\n",
            BAGIT_VERSION, TAG_FILE_ENCODING
        ),
    )?;

    let mut info = info.clone();
    if !info.contains("Bagging-Date") {
        info.add("Bagging-Date", Local::now().format("%Y-%m-%d").to_string());
    }
    info.set(
        "Payload-Oxum",
        format!("{}.{}", payload_bytes, payload_count),
    );
    if !info.contains("Bag-Software-Agent") {
        info.add("Bag-Software-Agent", BAG_SOFTWARE_AGENT);
    }
    fs::write(bag_dir.join(BAG_INFO_TXT), info.to_text())?;

    write_tag_manifests(bag_dir, algorithms)?;

    debug!(
        "Bagged {} payload files ({} bytes) in {}",
        payload_count,
        payload_bytes,
        bag_dir.display()
    );
    Bag::open(bag_dir)
}

fn move_payload(bag_dir: &Path) -> BagResult<()> {
    let staging = bag_dir.join(format!(".bagging-{}", std::process::id()));
    if staging.exists() {
        return Err(BagError::InvalidBag {
            reason: format!("staging directory {} already exists", staging.display()),
        });
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(bag_dir)? {
        let entry = entry?;
        entries.push((entry.path(), entry.file_name()));
    }

    fs::create_dir(&staging)?;
    for (path, name) in entries {
        fs::rename(&path, staging.join(name))?;
    }
    fs::rename(&staging, bag_dir.join(DATA_DIR))?;
    Ok(())
}

/// Payload files as (manifest path, filesystem path), sorted by name.
fn payload_files(bag_dir: &Path) -> BagResult<Vec<(String, PathBuf)>> {
    let data_dir = bag_dir.join(DATA_DIR);
    if !data_dir.is_dir() {
        return Err(BagError::InvalidBag {
            reason: format!("missing {} directory", DATA_DIR),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&data_dir).sort_by_file_name() {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if file_type.is_symlink() {
            return Err(BagError::InvalidBag {
                reason: format!("payload contains a symlink: {}", entry.path().display()),
            });
        }
        let relative = entry
            .path()
            .strip_prefix(bag_dir)
            .map_err(|_| BagError::InvalidBag {
                reason: format!("payload path outside bag: {}", entry.path().display()),
            })?;
        files.push((manifest_path(relative), entry.path().to_path_buf()));
    }
    Ok(files)
}

fn manifest_path(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-encodes `%`, CR and LF in a manifest path.
fn encode_path(path: &str) -> String {
    path.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn decode_path(path: &str) -> String {
    let mut decoded = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(index) = rest.find('%') {
        decoded.push_str(&rest[..index]);
        let escape = rest.get(index + 1..index + 3).unwrap_or("");
        match escape.to_ascii_uppercase().as_str() {
            "25" => decoded.push('%'),
            "0A" => decoded.push('\n'),
            "0D" => decoded.push('\r'),
            _ => {
                decoded.push('%');
                rest = &rest[index + 1..];
                continue;
            }
        }
        rest = &rest[index + 3..];
    }
    decoded.push_str(rest);
    decoded
}

fn digest_file(
    path: &Path,
    algorithms: &[ChecksumAlgorithm],
) -> BagResult<(u64, BTreeMap<ChecksumAlgorithm, String>)> {
    let mut file = File::open(path)?;
    let mut hashers: Vec<(ChecksumAlgorithm, Hasher)> = algorithms
        .iter()
        .map(|algorithm| (*algorithm, algorithm.hasher()))
        .collect();

    let mut buffer = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        total += read as u64;
        for (_, hasher) in hashers.iter_mut() {
            hasher.update(&buffer[..read]);
        }
    }

    let digests = hashers
        .into_iter()
        .map(|(algorithm, hasher)| (algorithm, hasher.finalize_hex()))
        .collect();
    Ok((total, digests))
}

fn write_manifest(path: &Path, entries: &[(String, String)]) -> BagResult<()> {
    let mut text = String::new();
    for (name, digest) in entries {
        text.push_str(&format!("{}  {}\n", digest, encode_path(name)));
    }
    fs::write(path, text)?;
    Ok(())
}

fn write_tag_manifests(bag_dir: &Path, algorithms: &[ChecksumAlgorithm]) -> BagResult<()> {
    let mut tag_files = vec![BAGIT_TXT.to_string(), BAG_INFO_TXT.to_string()];
    tag_files.extend(algorithms.iter().map(ChecksumAlgorithm::manifest_name));

    for algorithm in algorithms {
        let mut entries = Vec::new();
        for name in &tag_files {
            let (_, mut digests) = digest_file(&bag_dir.join(name), &[*algorithm])?;
            entries.push((name.clone(), digests.remove(algorithm).unwrap_or_default()));
        }
        write_manifest(&bag_dir.join(algorithm.tagmanifest_name()), &entries)?;
    }
    Ok(())
}

fn read_manifests(
    bag_dir: &Path,
    prefix: &str,
) -> BagResult<BTreeMap<ChecksumAlgorithm, BTreeMap<String, String>>> {
    let mut manifests = BTreeMap::new();
    for entry in fs::read_dir(bag_dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(algorithm) = file_name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(".txt"))
        else {
            continue;
        };
        let algorithm = ChecksumAlgorithm::from_name(algorithm)?;
        let entries = parse_manifest(&fs::read_to_string(entry.path())?)?;
        manifests.insert(algorithm, entries);
    }
    Ok(manifests)
}

fn parse_manifest(text: &str) -> BagResult<BTreeMap<String, String>> {
    let mut entries = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let (digest, path) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| BagError::InvalidBag {
                reason: format!("malformed manifest line: {:?}", line),
            })?;
        let path = decode_path(path.trim_start());
        if path.starts_with('/') || path.split('/').any(|segment| segment == "..") {
            return Err(BagError::InvalidBag {
                reason: format!("manifest path escapes the bag: {}", path),
            });
        }
        entries.insert(path, digest.to_ascii_lowercase());
    }
    Ok(entries)
}
