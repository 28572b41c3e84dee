//! Voice samples and per-user voice assignment
//!
//! The catalog is built once at startup from a directory of reference clips
//! used for voice cloning. Each clip gets a unique name derived from its file
//! name. The [`VoiceAssigner`] hands every chatter a voice and remembers the
//! choice for the rest of the session.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while loading voices or assigning them to users
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("failed to read voices directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no voices found in {0}")]
    CatalogEmpty(PathBuf),

    #[error("voice '{voice}' assigned to '{username}' is not in the catalog")]
    VoiceNotFound { username: String, voice: String },

    #[error("every voice is reserved by a predefined assignment, none left for '{0}'")]
    NoAvailableVoice(String),
}

/// A reference clip the synthesizer clones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Path of the sample on disk
    pub file_path: PathBuf,
    /// Unique name within the catalog
    pub name: String,
}

/// All voices available for this session, in discovery order
#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    voices: Vec<Voice>,
}

impl VoiceCatalog {
    /// Load every usable file in `dir` as a voice.
    ///
    /// Directories and hidden files are skipped. Fails with
    /// [`VoiceError::CatalogEmpty`] when nothing usable is left.
    pub fn load(dir: &Path) -> Result<Self, VoiceError> {
        let io_err = |source| VoiceError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if !entry.file_type().map_err(io_err)?.is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            paths.push(entry.path());
        }

        let catalog = Self::from_paths(paths);
        if catalog.is_empty() {
            return Err(VoiceError::CatalogEmpty(dir.to_path_buf()));
        }

        info!(count = catalog.len(), dir = %dir.display(), "available voices:");
        for voice in catalog.iter() {
            info!(name = %voice.name, "  voice");
        }
        Ok(catalog)
    }

    /// Build a catalog from paths in the given order.
    ///
    /// The base name is the file name up to its first `.`. A name already
    /// taken gets `_1`, `_2`, ... appended, counting the occurrences of its
    /// base name.
    pub fn from_paths<I>(paths: I) -> Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut occurrences: HashMap<String, usize> = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();
        let mut voices = Vec::new();

        for file_path in paths {
            let Some(base) = base_name(&file_path) else {
                continue;
            };

            let seen = occurrences.entry(base.clone()).or_insert(0);
            let mut name = if *seen == 0 {
                base.clone()
            } else {
                format!("{base}_{seen}")
            };
            // a suffixed name can collide with a file literally named that way
            while taken.contains(&name) {
                *seen += 1;
                name = format!("{base}_{seen}");
            }
            *seen += 1;

            taken.insert(name.clone());
            voices.push(Voice { file_path, name });
        }

        Self { voices }
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }

    /// Look a voice up by its catalog name
    pub fn get(&self, name: &str) -> Option<&Voice> {
        self.voices.iter().find(|v| v.name == name)
    }

    /// Pick any voice uniformly at random
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&Voice> {
        self.voices.choose(rng)
    }
}

/// File name cut at its first `.`; `None` when nothing is left
fn base_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_string_lossy();
    let base = file_name.split('.').next().unwrap_or_default();
    (!base.is_empty()).then(|| base.to_string())
}

/// A username bound to a voice name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceAssignment {
    pub username: String,
    #[serde(alias = "voice")]
    pub voice_name: String,
}

impl VoiceAssignment {
    pub fn new(username: impl Into<String>, voice_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            voice_name: voice_name.into(),
        }
    }
}

/// Maps chatters to voices.
///
/// Predefined assignments come from configuration and always win. Everyone
/// else gets a random voice on first sight, drawn from the voices no
/// predefined assignment claims, and keeps it for the session.
#[derive(Debug, Clone, Default)]
pub struct VoiceAssigner {
    predefined: Vec<VoiceAssignment>,
    runtime: HashMap<String, String>,
}

impl VoiceAssigner {
    pub fn new(predefined: Vec<VoiceAssignment>) -> Self {
        Self {
            predefined,
            runtime: HashMap::new(),
        }
    }

    /// Resolve the voice for `username`.
    ///
    /// An empty username (announcements) gets a fresh random voice every
    /// time and nothing is recorded.
    pub fn resolve<'c, R: Rng + ?Sized>(
        &mut self,
        username: &str,
        catalog: &'c VoiceCatalog,
        rng: &mut R,
    ) -> Result<&'c Voice, VoiceError> {
        if username.is_empty() {
            return catalog
                .choose(rng)
                .ok_or_else(|| VoiceError::NoAvailableVoice(String::new()));
        }

        let known = self
            .predefined
            .iter()
            .find(|a| a.username == username)
            .map(|a| a.voice_name.as_str())
            .or_else(|| self.runtime.get(username).map(String::as_str));

        if let Some(voice_name) = known {
            return catalog
                .get(voice_name)
                .ok_or_else(|| VoiceError::VoiceNotFound {
                    username: username.to_string(),
                    voice: voice_name.to_string(),
                });
        }

        let claimed: HashSet<&str> = self
            .predefined
            .iter()
            .map(|a| a.voice_name.as_str())
            .collect();
        let candidates: Vec<&Voice> = catalog
            .iter()
            .filter(|v| !claimed.contains(v.name.as_str()))
            .collect();

        let voice = *candidates
            .choose(rng)
            .ok_or_else(|| VoiceError::NoAvailableVoice(username.to_string()))?;

        debug!(username, voice = %voice.name, "assigned voice");
        self.runtime
            .insert(username.to_string(), voice.name.clone());
        Ok(voice)
    }

    /// Voice name recorded for a user during this session, if any
    pub fn runtime_assignment(&self, username: &str) -> Option<&str> {
        self.runtime.get(username).map(String::as_str)
    }

    pub fn runtime_len(&self) -> usize {
        self.runtime.len()
    }
}
