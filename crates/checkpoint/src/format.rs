//! On-disk checkpoint format
//!
//! ```text
//! magic "ZCKP" | version u32 | epoch u64 | metadata_len u32 | metadata JSON
//! | payload_len u64 | bincode payload
//! ```
//!
//! All integers are little-endian. Version 1 payloads store tensors as
//! shape and data only; they are migrated to the version 2 layout when
//! read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tracing::{debug, instrument};
use uuid::Uuid;

use zoo_core::{Epoch, Error, Result, Shape, StateDict, Tensor, TensorData};

use crate::record::{CheckpointRecord, OptimizerState, ProcType};

/// Magic bytes for checkpoint files
pub const CHECKPOINT_MAGIC: [u8; 4] = *b"ZCKP";

/// Format version written by this crate
pub const CHECKPOINT_VERSION: u32 = 2;

/// Oldest readable format version
pub const LEGACY_VERSION: u32 = 1;

/// JSON metadata stored in the header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modelname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proc_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Checkpoint file header
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointHeader {
    pub version: u32,
    pub epoch: Epoch,
    pub metadata: CheckpointMetadata,
    pub payload_len: u64,
}

impl CheckpointHeader {
    pub fn proc_type(&self) -> ProcType {
        ProcType::from_label(self.metadata.proc_type.as_deref())
    }
}

/// Version 2 tensor layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TensorRecord {
    pub shape: Vec<usize>,
    pub strides: Vec<usize>,
    pub storage_offset: usize,
    pub requires_grad: bool,
    pub data: TensorData,
}

/// Version 1 tensor layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LegacyTensorRecord {
    pub shape: Vec<usize>,
    pub data: TensorData,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Payload<T> {
    pub state_dict: Vec<(String, T)>,
    pub optimizer: OptimizerPayload<T>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OptimizerPayload<T> {
    pub hyper_params: BTreeMap<String, f64>,
    pub slots: Vec<(String, T)>,
}

impl TensorRecord {
    fn from_tensor(tensor: &Tensor) -> Self {
        let shape = tensor.shape();
        Self {
            shape: shape.dims().to_vec(),
            strides: shape.contiguous_strides(),
            storage_offset: 0,
            requires_grad: tensor.requires_grad(),
            data: tensor.data().clone(),
        }
    }

    fn into_tensor(self, name: &str, path: &Path) -> Result<Tensor> {
        let shape = Shape::new(self.shape);
        let strides = shape
            .checked_strides()
            .ok_or_else(|| corrupted(path, format!("tensor {}: shape overflows usize", name)))?;
        if self.storage_offset != 0 || self.strides != strides {
            return Err(corrupted(
                path,
                format!("tensor {} is not stored contiguously", name),
            ));
        }
        Tensor::from_parts(shape, self.data, self.requires_grad)
            .map_err(|e| corrupted(path, format!("tensor {}: {}", name, e)))
    }
}

/// Rebuilds the fields version 1 did not store: contiguous strides, zero
/// storage offset, no gradient tracking
pub(crate) fn migrate(legacy: LegacyTensorRecord, name: &str, path: &Path) -> Result<TensorRecord> {
    let strides = Shape::new(legacy.shape.clone())
        .checked_strides()
        .ok_or_else(|| corrupted(path, format!("tensor {}: shape overflows usize", name)))?;
    Ok(TensorRecord {
        shape: legacy.shape,
        strides,
        storage_offset: 0,
        requires_grad: false,
        data: legacy.data,
    })
}

fn migrate_payload(legacy: Payload<LegacyTensorRecord>, path: &Path) -> Result<Payload<TensorRecord>> {
    let migrate_all = |entries: Vec<(String, LegacyTensorRecord)>| -> Result<Vec<(String, TensorRecord)>> {
        entries
            .into_iter()
            .map(|(name, record)| {
                let record = migrate(record, &name, path)?;
                Ok((name, record))
            })
            .collect()
    };
    Ok(Payload {
        state_dict: migrate_all(legacy.state_dict)?,
        optimizer: OptimizerPayload {
            hyper_params: legacy.optimizer.hyper_params,
            slots: migrate_all(legacy.optimizer.slots)?,
        },
    })
}

fn to_records(dict: &StateDict) -> Vec<(String, TensorRecord)> {
    dict.iter()
        .map(|(name, tensor)| (name.to_string(), TensorRecord::from_tensor(tensor)))
        .collect()
}

fn from_records(records: Vec<(String, TensorRecord)>, path: &Path) -> Result<StateDict> {
    let mut dict = StateDict::with_capacity(records.len());
    for (name, record) in records {
        let tensor = record.into_tensor(&name, path)?;
        dict.insert(name, tensor);
    }
    Ok(dict)
}

/// Serializes a record in the current format
pub fn encode(record: &CheckpointRecord) -> Result<Vec<u8>> {
    let payload = Payload {
        state_dict: to_records(&record.model_state),
        optimizer: OptimizerPayload {
            hyper_params: record.optimizer_state.hyper_params.clone(),
            slots: to_records(&record.optimizer_state.slots),
        },
    };
    let metadata = CheckpointMetadata {
        modelname: record.model_name.clone(),
        proc_type: Some(record.proc_type.as_str().to_string()),
        created_at: Some(Utc::now()),
    };
    frame(CHECKPOINT_VERSION, record.epoch, &metadata, &payload)
}

/// Assembles header and payload
pub(crate) fn frame<T: Serialize>(
    version: u32,
    epoch: Epoch,
    metadata: &CheckpointMetadata,
    payload: &T,
) -> Result<Vec<u8>> {
    let metadata_json = serde_json::to_vec(metadata)?;
    let payload = bincode::serialize(payload).map_err(|e| Error::Serialization(e.to_string()))?;

    let mut buf = Vec::with_capacity(32 + metadata_json.len() + payload.len());
    buf.extend_from_slice(&CHECKPOINT_MAGIC);
    buf.extend_from_slice(&version.to_le_bytes());
    buf.extend_from_slice(&epoch.to_le_bytes());
    buf.extend_from_slice(&(metadata_json.len() as u32).to_le_bytes());
    buf.extend_from_slice(&metadata_json);
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Parses a full checkpoint
pub fn decode(bytes: &[u8], path: &Path) -> Result<CheckpointRecord> {
    let mut reader = bytes;
    let header = parse_header(&mut reader, path)?;

    if reader.len() as u64 != header.payload_len {
        return Err(corrupted(
            path,
            format!(
                "payload is {} bytes, header declares {}",
                reader.len(),
                header.payload_len
            ),
        ));
    }

    let payload: Payload<TensorRecord> = match header.version {
        LEGACY_VERSION => {
            debug!(path = %path.display(), "Migrating legacy checkpoint tensors");
            migrate_payload(deserialize(reader, path)?, path)?
        }
        _ => deserialize(reader, path)?,
    };

    Ok(CheckpointRecord {
        epoch: header.epoch,
        model_state: from_records(payload.state_dict, path)?,
        optimizer_state: OptimizerState {
            hyper_params: payload.optimizer.hyper_params,
            slots: from_records(payload.optimizer.slots, path)?,
        },
        proc_type: header.proc_type(),
        model_name: header.metadata.modelname,
    })
}

fn deserialize<T: for<'de> Deserialize<'de>>(bytes: &[u8], path: &Path) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| corrupted(path, format!("payload: {}", e)))
}

/// Reads the header without decoding any tensor
#[instrument(skip(path), fields(path = %path.display()))]
pub fn read_header(path: &Path) -> Result<CheckpointHeader> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::CheckpointNotFound {
            path: path.to_path_buf(),
        },
        _ => Error::Io(e),
    })?;
    parse_header(&mut BufReader::new(file), path)
}

fn parse_header<R: Read>(reader: &mut R, path: &Path) -> Result<CheckpointHeader> {
    let magic: [u8; 4] = read_array(reader, path)?;
    if magic != CHECKPOINT_MAGIC {
        return Err(corrupted(path, "invalid checkpoint magic".to_string()));
    }

    let version = u32::from_le_bytes(read_array(reader, path)?);
    if version > CHECKPOINT_VERSION {
        return Err(Error::UnsupportedVersion {
            path: path.to_path_buf(),
            version,
        });
    }
    if version < LEGACY_VERSION {
        return Err(corrupted(path, format!("invalid version {}", version)));
    }

    let epoch = u64::from_le_bytes(read_array(reader, path)?);
    let metadata_len = u32::from_le_bytes(read_array(reader, path)?) as usize;
    let mut metadata_json = vec![0u8; metadata_len];
    reader
        .read_exact(&mut metadata_json)
        .map_err(|e| corrupted(path, format!("metadata: {}", e)))?;
    let metadata: CheckpointMetadata = serde_json::from_slice(&metadata_json)
        .map_err(|e| corrupted(path, format!("metadata: {}", e)))?;
    let payload_len = u64::from_le_bytes(read_array(reader, path)?);

    Ok(CheckpointHeader {
        version,
        epoch,
        metadata,
        payload_len,
    })
}

fn read_array<R: Read, const N: usize>(reader: &mut R, path: &Path) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|e| corrupted(path, format!("truncated header: {}", e)))?;
    Ok(buf)
}

/// Writes `bytes` to `path` through a uniquely named temporary file and a
/// rename, creating parent directories as needed
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<u64> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "checkpoint".to_string());
    let temp_name = format!(".{}.{}.tmp", file_name, Uuid::new_v4());
    let temp_path = match parent {
        Some(parent) => parent.join(temp_name),
        None => temp_name.into(),
    };

    let result = (|| -> Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result?;

    Ok(bytes.len() as u64)
}

fn corrupted(path: &Path, reason: String) -> Error {
    Error::CheckpointCorrupted {
        path: path.to_path_buf(),
        reason,
    }
}
