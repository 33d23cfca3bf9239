//! Versioned whole-model persistence over the container store.
//!
//! Models are serialized structurally (JSON) in one piece and replaced
//! wholesale on every save. Loading never fails: any decode or parse
//! problem recovers to a default-constructed model, with the reason
//! reported so callers can tell a fresh install from a corrupt file.

use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::store::{MclOptions, MclRegistry, Provenance};

/// Writes within this window of the previous one are coalesced away.
pub const SAVE_DEBOUNCE: Duration = Duration::from_secs(5);

/// A model that can be persisted as one container blob.
pub trait Persistable: Serialize + DeserializeOwned + Default {
    /// Version tag the current schema writes.
    const MODEL_VERSION: &'static str;

    /// The version tag this instance was loaded with.
    fn version(&self) -> &str;
}

/// Why a load produced a default model instead of stored data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoverReason {
    /// No file on disk; first run.
    MissingFile,
    /// The file could not be read or its container decoded.
    UnreadableFile,
    /// The blob decoded but did not parse as the model (schema drift or
    /// truncation).
    ParseFailed,
}

/// Result of a load: either stored data or a usable empty model.
#[derive(Debug)]
pub enum LoadOutcome<T> {
    Loaded(T),
    Recovered(T, RecoverReason),
}

impl<T> LoadOutcome<T> {
    /// The model, whichever way it was produced.
    pub fn model(self) -> T {
        match self {
            LoadOutcome::Loaded(model) | LoadOutcome::Recovered(model, _) => model,
        }
    }

    pub fn recover_reason(&self) -> Option<RecoverReason> {
        match self {
            LoadOutcome::Loaded(_) => None,
            LoadOutcome::Recovered(_, reason) => Some(*reason),
        }
    }
}

/// What a save call actually did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// Skipped: the file was written within [`SAVE_DEBOUNCE`] and the save
    /// was not forced.
    Debounced,
    /// Serialization or I/O failed; logged, state on disk unchanged.
    Failed,
}

/// Load a model from a container file.
///
/// Never returns an error: a missing or unreadable file, or a blob that no
/// longer parses, yields `Recovered(T::default(), reason)`.
pub fn load<T: Persistable>(
    registry: &MclRegistry,
    path: &Path,
    options: MclOptions,
) -> LoadOutcome<T> {
    let file = registry.open(path, options);
    match file.provenance {
        Provenance::Missing => LoadOutcome::Recovered(T::default(), RecoverReason::MissingFile),
        Provenance::Failed => LoadOutcome::Recovered(T::default(), RecoverReason::UnreadableFile),
        Provenance::Disk => match serde_json::from_slice(&file.content) {
            Ok(model) => LoadOutcome::Loaded(model),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    %err,
                    "stored model unparseable, recovering to empty"
                );
                LoadOutcome::Recovered(T::default(), RecoverReason::ParseFailed)
            }
        },
    }
}

/// Serialize and write a model, debouncing rapid repeated saves.
pub fn save<T: Persistable>(
    registry: &MclRegistry,
    path: &Path,
    options: MclOptions,
    model: &T,
    force: bool,
) -> SaveOutcome {
    if !force && written_recently(path) {
        tracing::debug!(path = %path.display(), "save debounced");
        return SaveOutcome::Debounced;
    }

    let content = match serde_json::to_vec(model) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "model serialization failed");
            return SaveOutcome::Failed;
        }
    };

    let mut file = registry.create(path, options);
    file.content = content;
    if registry.save(&file) {
        SaveOutcome::Written
    } else {
        SaveOutcome::Failed
    }
}

fn written_recently(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < SAVE_DEBOUNCE,
        // Clock skew: the file claims to be from the future. Write anyway.
        Err(_) => false,
    }
}
