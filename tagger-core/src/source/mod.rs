//! Chunk sources feeding the producer.
//!
//! The `ChunkSource` trait is the seam between the producer task and the
//! audio world: live capture, paced file playback or an in-memory script all
//! look identical to the producer loop.
//!
//! Sources are built by a [`SourceFactory`] *on the producer thread*, because
//! a live capture stream may not leave the thread that opened it.

pub mod file;
pub mod memory;
pub mod microphone;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    buffering::chunk::AudioChunk,
    engine::task::CancelToken,
    error::{Result, TaggerError},
    ipc::events::SourceInfo,
};

pub use file::FileSource;
pub use memory::MemorySource;
pub use microphone::MicrophoneSource;

/// Producer-side audio input.
pub trait ChunkSource {
    /// Rate of the chunks this source delivers (Hz).
    fn sample_rate(&self) -> u32;

    /// Block until the next chunk is available.
    ///
    /// Returns `Ok(None)` at end of stream, or when `cancel` fires while
    /// waiting. Every wait inside must go through `cancel` so a stop request
    /// unblocks the read within one timeout.
    fn read_chunk(&mut self, cancel: &CancelToken) -> Result<Option<AudioChunk>>;
}

/// Everything a factory needs to open a source.
#[derive(Debug, Clone)]
pub struct SourceParams {
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub read_timeout: Duration,
    pub pace_playback: bool,
    pub preferred_input_device: Option<String>,
}

impl SourceParams {
    /// Real-time duration of one chunk.
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_secs_f64(self.chunk_size as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Builds a fresh source for each (re)start.
pub type SourceFactory = Arc<dyn Fn(&SourceParams) -> Result<Box<dyn ChunkSource>> + Send + Sync>;

/// Which input the pipeline is reading from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSelection {
    Live,
    File(u32),
}

struct SourceEntry {
    info: SourceInfo,
    /// Header-checked before a reconfiguration tears anything down.
    path: Option<PathBuf>,
    factory: SourceFactory,
}

/// Live factory plus a catalog of playback sources by id.
pub struct SourceRegistry {
    live: SourceFactory,
    entries: Vec<SourceEntry>,
}

impl SourceRegistry {
    /// Registry whose live input is the system microphone.
    pub fn new() -> Self {
        Self::with_live_factory(Arc::new(|params: &SourceParams| -> Result<Box<dyn ChunkSource>> {
            Ok(Box::new(MicrophoneSource::open(params)?) as Box<dyn ChunkSource>)
        }))
    }

    pub fn with_live_factory(live: SourceFactory) -> Self {
        Self {
            live,
            entries: Vec::new(),
        }
    }

    /// Add a WAV file played back through [`FileSource`].
    pub fn register_file(&mut self, id: u32, display_name: impl Into<String>, path: PathBuf) {
        let open_path = path.clone();
        let factory: SourceFactory = Arc::new(move |params: &SourceParams| -> Result<Box<dyn ChunkSource>> {
            Ok(Box::new(FileSource::open(&open_path, params)?) as Box<dyn ChunkSource>)
        });
        self.insert(SourceEntry {
            info: SourceInfo {
                id,
                display_name: display_name.into(),
            },
            path: Some(path),
            factory,
        });
    }

    /// Add a playback source with a custom factory.
    pub fn register(&mut self, info: SourceInfo, factory: SourceFactory) {
        self.insert(SourceEntry {
            info,
            path: None,
            factory,
        });
    }

    fn insert(&mut self, entry: SourceEntry) {
        self.entries.retain(|e| e.info.id != entry.info.id);
        self.entries.push(entry);
    }

    pub fn list(&self) -> Vec<SourceInfo> {
        self.entries.iter().map(|e| e.info.clone()).collect()
    }

    /// Look up the factory for a selection without opening anything.
    ///
    /// # Errors
    /// `UnknownSource` for an unregistered id, `SourceUnavailable` when the
    /// entry's file is missing, `AudioFile` when it is not a readable WAV.
    pub fn resolve(&self, selection: SourceSelection) -> Result<SourceFactory> {
        match selection {
            SourceSelection::Live => Ok(Arc::clone(&self.live)),
            SourceSelection::File(id) => {
                let entry = self
                    .entries
                    .iter()
                    .find(|e| e.info.id == id)
                    .ok_or(TaggerError::UnknownSource(id))?;
                if let Some(path) = &entry.path {
                    if !path.is_file() {
                        return Err(TaggerError::SourceUnavailable { path: path.clone() });
                    }
                    hound::WavReader::open(path).map_err(|e| {
                        TaggerError::AudioFile(format!("{}: {e}", path.display()))
                    })?;
                }
                Ok(Arc::clone(&entry.factory))
            }
        }
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("entries", &self.list())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SourceParams {
        SourceParams {
            sample_rate: 32_000,
            chunk_size: 1024,
            read_timeout: Duration::from_millis(100),
            pace_playback: false,
            preferred_input_device: None,
        }
    }

    fn memory_factory() -> SourceFactory {
        Arc::new(|p: &SourceParams| -> Result<Box<dyn ChunkSource>> {
            Ok(Box::new(MemorySource::new(Vec::new(), p.sample_rate)) as Box<dyn ChunkSource>)
        })
    }

    #[test]
    fn chunk_interval_matches_rate() {
        assert_eq!(params().chunk_interval(), Duration::from_millis(32));
    }

    #[test]
    fn unknown_id_is_rejected() {
        let registry = SourceRegistry::with_live_factory(memory_factory());
        let err = registry.resolve(SourceSelection::File(9)).err().unwrap();
        assert!(matches!(err, TaggerError::UnknownSource(9)));
        assert!(registry.resolve(SourceSelection::Live).is_ok());
    }

    #[test]
    fn missing_file_is_unavailable() {
        let mut registry = SourceRegistry::with_live_factory(memory_factory());
        registry.register_file(1, "Ghost", PathBuf::from("/nonexistent/ghost.wav"));
        let err = registry.resolve(SourceSelection::File(1)).err().unwrap();
        assert!(matches!(err, TaggerError::SourceUnavailable { .. }));
    }

    #[test]
    fn undecodable_file_is_rejected_at_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.wav");
        std::fs::write(&path, b"definitely not a wav!!").unwrap();
        let mut registry = SourceRegistry::with_live_factory(memory_factory());
        registry.register_file(4, "Notes", path);
        let err = registry.resolve(SourceSelection::File(4)).err().unwrap();
        assert!(matches!(err, TaggerError::AudioFile(_)));
    }

    #[test]
    fn re_registering_an_id_replaces_it() {
        let mut registry = SourceRegistry::with_live_factory(memory_factory());
        registry.register(
            SourceInfo {
                id: 3,
                display_name: "First".into(),
            },
            memory_factory(),
        );
        registry.register(
            SourceInfo {
                id: 3,
                display_name: "Second".into(),
            },
            memory_factory(),
        );
        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].display_name, "Second");
        let mut source = (registry.resolve(SourceSelection::File(3)).unwrap())(&params()).unwrap();
        let (_stop, cancel) = crate::engine::task::cancel_pair();
        assert!(source.read_chunk(&cancel).unwrap().is_none());
    }
}
