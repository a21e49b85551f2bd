/// Snapshot encoding
///
/// Blob layout (all integers little-endian):
///
/// | field        | size        |
/// |--------------|-------------|
/// | magic `PLNS` | 4           |
/// | version      | 4 (u32)     |
/// | fp length    | 2 (u16)     |
/// | fingerprint  | fp length   |
/// | payload len  | 8 (u64)     |
/// | payload      | payload len |
/// | checksum     | 32 (SHA256) |
///
/// The payload is a zstd-compressed JSON `GraphDocument`. Captured values are
/// stored once in a value table and referenced by index, so values shared by
/// several properties are restored as one shared instance. The table is
/// written children-first: a record may only reference lower indices.
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{DecodeError, WriteError};
use crate::fingerprint::Fingerprint;
use crate::graph::{
    ActionSpec, CapturedValue, Graph, Property, PropertyKind, WorkItem, WorkItemPath,
};
use crate::problems::PropertyTrace;

pub const MAGIC: &[u8; 4] = b"PLNS";
pub const FORMAT_VERSION: u32 = 1;

const CHECKSUM_LEN: usize = 32;
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Serialize, Deserialize)]
struct GraphDocument {
    items: Vec<ItemRecord>,
    values: Vec<ValueRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ItemRecord {
    path: WorkItemPath,
    type_name: String,
    #[serde(default)]
    origin: Option<String>,
    dependencies: Vec<WorkItemPath>,
    properties: Vec<PropertyRecord>,
    #[serde(default)]
    action: Option<ActionSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PropertyRecord {
    kind: PropertyKind,
    name: String,
    value: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
enum ValueRecord {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Path(PathBuf),
    List(Vec<u32>),
    Map(Vec<(String, u32)>),
}

/// Decoded fixed header
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u32,
    pub fingerprint: Fingerprint,
    /// Offset of the payload length field
    body_offset: usize,
}

pub fn encode_snapshot(graph: &Graph, fingerprint: &Fingerprint) -> Result<Vec<u8>, WriteError> {
    let document = encode_document(graph)?;

    let json = serde_json::to_vec(&document).map_err(WriteError::Encode)?;
    let payload = zstd::encode_all(json.as_slice(), ZSTD_LEVEL).map_err(WriteError::Compress)?;

    let fp = fingerprint.as_str().as_bytes();
    let fp_len = u16::try_from(fp.len())
        .map_err(|_| WriteError::Encode(serde::ser::Error::custom("fingerprint too long")))?;

    let mut blob = Vec::with_capacity(4 + 4 + 2 + fp.len() + 8 + payload.len() + CHECKSUM_LEN);
    blob.extend_from_slice(MAGIC);
    blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    blob.extend_from_slice(&fp_len.to_le_bytes());
    blob.extend_from_slice(fp);
    blob.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    blob.extend_from_slice(&payload);

    // Trailing integrity marker over everything before it
    let checksum = Sha256::digest(&blob);
    blob.extend_from_slice(&checksum);

    Ok(blob)
}

/// Decode only the header. Version mismatch is detected before anything else
/// after the magic, so older or newer blobs never count as corruption.
pub fn decode_header(bytes: &[u8]) -> Result<Header, DecodeError> {
    let magic = bytes.get(0..4).ok_or(DecodeError::Truncated)?;
    if magic != MAGIC {
        return Err(DecodeError::BadMagic);
    }

    let version = read_u32(bytes, 4)?;
    if version != FORMAT_VERSION {
        return Err(DecodeError::VersionMismatch {
            found: version,
            expected: FORMAT_VERSION,
        });
    }

    let fp_len = read_u16(bytes, 8)? as usize;
    let fp_bytes = bytes.get(10..10 + fp_len).ok_or(DecodeError::Truncated)?;
    if fp_bytes.is_empty() || !fp_bytes.iter().all(u8::is_ascii_hexdigit) {
        return Err(DecodeError::Corrupt("fingerprint is not hex".to_string()));
    }
    let fingerprint = std::str::from_utf8(fp_bytes)
        .map_err(|_| DecodeError::Corrupt("fingerprint is not hex".to_string()))?;

    Ok(Header {
        version,
        fingerprint: Fingerprint::from_hex(fingerprint),
        body_offset: 10 + fp_len,
    })
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<(Graph, Fingerprint), DecodeError> {
    let header = decode_header(bytes)?;

    let payload_len = usize::try_from(read_u64(bytes, header.body_offset)?)
        .map_err(|_| DecodeError::Corrupt("payload length overflow".to_string()))?;
    let payload_start = header.body_offset + 8;
    let payload_end = payload_start
        .checked_add(payload_len)
        .ok_or_else(|| DecodeError::Corrupt("payload length overflow".to_string()))?;
    let expected_len = payload_end
        .checked_add(CHECKSUM_LEN)
        .ok_or_else(|| DecodeError::Corrupt("payload length overflow".to_string()))?;

    if bytes.len() < expected_len {
        return Err(DecodeError::Truncated);
    }
    if bytes.len() > expected_len {
        return Err(DecodeError::Corrupt(format!(
            "{} unexpected trailing bytes",
            bytes.len() - expected_len
        )));
    }

    let checksum = Sha256::digest(&bytes[..payload_end]);
    if checksum.as_slice() != &bytes[payload_end..] {
        return Err(DecodeError::IntegrityMismatch);
    }

    let json = zstd::decode_all(&bytes[payload_start..payload_end])
        .map_err(DecodeError::Decompress)?;
    let document: GraphDocument = serde_json::from_slice(&json).map_err(DecodeError::Payload)?;

    let graph = decode_document(document)?;
    Ok((graph, header.fingerprint))
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, DecodeError> {
    let raw = bytes.get(at..at + 2).ok_or(DecodeError::Truncated)?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32, DecodeError> {
    let raw = bytes.get(at..at + 4).ok_or(DecodeError::Truncated)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(raw);
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(bytes: &[u8], at: usize) -> Result<u64, DecodeError> {
    let raw = bytes.get(at..at + 8).ok_or(DecodeError::Truncated)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Ok(u64::from_le_bytes(buf))
}

/// Interns captured values by identity
#[derive(Default)]
struct ValueTable {
    ids: HashMap<*const CapturedValue, u32>,
    records: Vec<ValueRecord>,
}

impl ValueTable {
    fn intern(
        &mut self,
        value: &Arc<CapturedValue>,
        trace: &PropertyTrace,
    ) -> Result<u32, WriteError> {
        let key = Arc::as_ptr(value);
        if let Some(id) = self.ids.get(&key) {
            return Ok(*id);
        }

        let record = match value.as_ref() {
            CapturedValue::Null => ValueRecord::Null,
            CapturedValue::Bool(b) => ValueRecord::Bool(*b),
            CapturedValue::Int(i) => ValueRecord::Int(*i),
            CapturedValue::Str(s) => ValueRecord::Str(s.clone()),
            CapturedValue::Path(p) => ValueRecord::Path(p.clone()),
            CapturedValue::List(items) => ValueRecord::List(
                items
                    .iter()
                    .map(|item| self.intern(item, trace))
                    .collect::<Result<_, _>>()?,
            ),
            CapturedValue::Map(entries) => ValueRecord::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.intern(v, trace)?)))
                    .collect::<Result<_, WriteError>>()?,
            ),
            CapturedValue::Opaque { type_name } => {
                return Err(WriteError::UnsupportedValue {
                    trace: trace.clone(),
                    type_name: type_name.clone(),
                })
            }
        };

        let id = self.records.len() as u32;
        self.records.push(record);
        self.ids.insert(key, id);
        Ok(id)
    }
}

fn encode_document(graph: &Graph) -> Result<GraphDocument, WriteError> {
    let mut table = ValueTable::default();
    let mut items = Vec::with_capacity(graph.len());

    for item in graph.items() {
        let owner = PropertyTrace::work_item(item);
        let mut properties = Vec::with_capacity(item.properties.len());

        for property in &item.properties {
            let trace = PropertyTrace::property(property.kind, &property.name, owner.clone());
            properties.push(PropertyRecord {
                kind: property.kind,
                name: property.name.clone(),
                value: table.intern(&property.value, &trace)?,
            });
        }

        items.push(ItemRecord {
            path: item.path.clone(),
            type_name: item.type_name.clone(),
            origin: item.origin.clone(),
            dependencies: item.dependencies.clone(),
            properties,
            action: item.action.clone(),
        });
    }

    Ok(GraphDocument {
        items,
        values: table.records,
    })
}

fn decode_document(document: GraphDocument) -> Result<Graph, DecodeError> {
    let mut values: Vec<Arc<CapturedValue>> = Vec::with_capacity(document.values.len());

    for record in document.values {
        // Only already-decoded (lower) indices are visible here
        let lookup = |id: u32| {
            values
                .get(id as usize)
                .cloned()
                .ok_or(DecodeError::DanglingValue(id))
        };

        let value = match record {
            ValueRecord::Null => CapturedValue::Null,
            ValueRecord::Bool(b) => CapturedValue::Bool(b),
            ValueRecord::Int(i) => CapturedValue::Int(i),
            ValueRecord::Str(s) => CapturedValue::Str(s),
            ValueRecord::Path(p) => CapturedValue::Path(p),
            ValueRecord::List(ids) => {
                CapturedValue::List(ids.into_iter().map(lookup).collect::<Result<_, _>>()?)
            }
            ValueRecord::Map(entries) => CapturedValue::Map(
                entries
                    .into_iter()
                    .map(|(k, id)| Ok((k, lookup(id)?)))
                    .collect::<Result<_, DecodeError>>()?,
            ),
        };
        values.push(Arc::new(value));
    }

    let mut graph = Graph::new();
    for record in document.items {
        let properties = record
            .properties
            .into_iter()
            .map(|p| {
                Ok(Property {
                    kind: p.kind,
                    name: p.name,
                    value: values
                        .get(p.value as usize)
                        .cloned()
                        .ok_or(DecodeError::DanglingValue(p.value))?,
                })
            })
            .collect::<Result<Vec<_>, DecodeError>>()?;

        graph.insert(WorkItem {
            path: record.path,
            type_name: record.type_name,
            origin: record.origin,
            dependencies: record.dependencies,
            properties,
            action: record.action,
        })?;
    }

    graph.validate()?;
    Ok(graph)
}
