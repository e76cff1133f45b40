//! Persisted records over a [`StoragePort`].
//!
//! Each record is one blob in the `state` namespace: a format version byte
//! followed by the record in `postcard` encoding.
//!
//! | Key        | Record             |
//! |------------|--------------------|
//! | `general`  | `GeneralSettings`  |
//! | `hardware` | `HardwareSettings` |
//! | `programs` | `Vec<Program>`     |

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::app::ports::{StatePort, StorageError, StoragePort};
use crate::config::{GeneralSettings, HardwareSettings};
use crate::scheduler::Program;

const NAMESPACE: &str = "state";
const KEY_GENERAL: &str = "general";
const KEY_HARDWARE: &str = "hardware";
const KEY_PROGRAMS: &str = "programs";

/// Bumped whenever a persisted record changes shape.
pub const RECORD_VERSION: u8 = 1;

/// Encode a record with its version prefix.
pub fn encode_record<T: Serialize + ?Sized>(record: &T) -> Result<Vec<u8>, StorageError> {
    let mut out = vec![RECORD_VERSION];
    let body = postcard::to_allocvec(record).map_err(|e| StorageError::Encode(e.to_string()))?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a versioned record.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    match bytes.split_first() {
        Some((&RECORD_VERSION, body)) => {
            postcard::from_bytes(body).map_err(|e| StorageError::Decode(e.to_string()))
        }
        Some((v, _)) => Err(StorageError::Decode(format!("unsupported record version {v}"))),
        None => Err(StorageError::Decode("empty record".into())),
    }
}

pub struct StateStore<S> {
    storage: S,
}

impl<S: StoragePort> StateStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.storage.read(NAMESPACE, key) {
            Ok(bytes) => decode_record(&bytes).map(Some),
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save<T: Serialize + ?Sized>(&mut self, key: &str, record: &T) -> Result<(), StorageError> {
        let bytes = encode_record(record)?;
        self.storage.write(NAMESPACE, key, &bytes)
    }
}

impl<S: StoragePort> StatePort for StateStore<S> {
    fn load_general(&self) -> Result<Option<GeneralSettings>, StorageError> {
        self.load(KEY_GENERAL)
    }

    fn save_general(&mut self, settings: &GeneralSettings) -> Result<(), StorageError> {
        self.save(KEY_GENERAL, settings)
    }

    fn load_hardware(&self) -> Result<Option<HardwareSettings>, StorageError> {
        self.load(KEY_HARDWARE)
    }

    fn save_hardware(&mut self, settings: &HardwareSettings) -> Result<(), StorageError> {
        self.save(KEY_HARDWARE, settings)
    }

    fn load_programs(&self) -> Result<Option<Vec<Program>>, StorageError> {
        self.load(KEY_PROGRAMS)
    }

    fn save_programs(&mut self, programs: &[Program]) -> Result<(), StorageError> {
        self.save(KEY_PROGRAMS, programs)
    }
}
