//! The event data model: the unit of ingestion and storage.
//!
//! Event payloads are opaque attribute bags at the source (a Kubernetes
//! object manifest). Rather than runtime-inspecting that bag the way the
//! source system does, `data` is kept as raw bytes end to end in this
//! core; attribute extraction is limited to the small declared set used
//! by indexes (`kind`, `namespace`, `group`, `uid`, `name`, `timestamp`).
//! Higher layers (outside this core) may parse `data` further.

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::error::SpectreError;

/// The kind of mutation an [`Event`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A resource was created.
    Create,
    /// A resource was updated.
    Update,
    /// A resource was deleted.
    Delete,
}

impl EventType {
    fn tag(self) -> u32 {
        match self {
            Self::Create => 0,
            Self::Update => 1,
            Self::Delete => 2,
        }
    }

    fn from_tag(tag: u32) -> Result<Self, EncodingError> {
        match tag {
            0 => Ok(Self::Create),
            1 => Ok(Self::Update),
            2 => Ok(Self::Delete),
            other => Err(EncodingError::InvalidTag {
                tag: other,
                type_name: "EventType",
            }),
        }
    }
}

impl Encode for EventType {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.tag().encode_to(buf)
    }
}

impl Decode for EventType {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, n) = u32::decode_from(buf)?;
        Ok((Self::from_tag(tag)?, n))
    }
}

/// The identity tuple of a Kubernetes resource.
///
/// `uid` disambiguates resources that share a `group/version/kind/
/// namespace/name` across delete-and-recreate cycles; the *resource key*
/// used by indexes and carry-forward state deliberately excludes `uid`
/// (see [`Resource::key`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    /// API group (empty string for the core group).
    pub group: String,
    /// API version.
    pub version: String,
    /// Resource kind, e.g. `Pod`.
    pub kind: String,
    /// Namespace (empty string for cluster-scoped resources).
    pub namespace: String,
    /// Resource name.
    pub name: String,
    /// Kubernetes UID, stable across the resource's lifetime.
    pub uid: String,
}

impl Resource {
    /// The resource key `group/version/kind/namespace/name`, stable
    /// across CREATE/UPDATE/DELETE events for the same logical resource
    /// even as `uid` changes across a delete-and-recreate cycle.
    pub fn key(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.group, self.version, self.kind, self.namespace, self.name
        )
    }
}

impl Encode for Resource {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::Encode::encode_to(&self.group, buf)?;
        encoding::Encode::encode_to(&self.version, buf)?;
        encoding::Encode::encode_to(&self.kind, buf)?;
        encoding::Encode::encode_to(&self.namespace, buf)?;
        encoding::Encode::encode_to(&self.name, buf)?;
        encoding::Encode::encode_to(&self.uid, buf)?;
        Ok(())
    }
}

impl Decode for Resource {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (group, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (version, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (kind, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (namespace, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (name, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (uid, n) = String::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                group,
                version,
                kind,
                namespace,
                name,
                uid,
            },
            off,
        ))
    }
}

/// The unit of ingestion and storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Opaque unique identifier.
    pub id: String,
    /// Integer nanoseconds since epoch. Represented as `u64` so
    /// non-negativity is an invariant of the type itself.
    pub timestamp: u64,
    /// The kind of mutation this event records.
    pub event_type: EventType,
    /// Identity of the resource this event describes.
    pub resource: Resource,
    /// Opaque payload; empty for DELETE, non-empty for CREATE/UPDATE.
    pub data: Vec<u8>,
}

impl Event {
    /// Byte length of `data`.
    ///
    /// The spec names this as a distinct field (`dataSize`); it is kept
    /// here as a derived accessor rather than a stored field to avoid a
    /// value that could silently drift out of sync with `data`.
    pub fn data_size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Validates the invariants from the data model:
    /// - `type = DELETE ⇒ data` empty
    /// - `type ∈ {CREATE, UPDATE} ⇒ data` non-empty (resolves the open
    ///   question of whether `UPDATE` with empty `data` is legal: it is
    ///   not)
    /// - `id` and resource key fields are non-empty
    pub fn validate(&self) -> Result<(), SpectreError> {
        match self.event_type {
            EventType::Delete => {
                if !self.data.is_empty() {
                    return Err(SpectreError::invalid_argument(
                        "DELETE events must carry empty data",
                    ));
                }
            }
            EventType::Create | EventType::Update => {
                if self.data.is_empty() {
                    return Err(SpectreError::invalid_argument(
                        "CREATE/UPDATE events must carry non-empty data",
                    ));
                }
            }
        }
        if self.id.is_empty() {
            return Err(SpectreError::invalid_argument("event id must not be empty"));
        }
        if self.resource.kind.is_empty() || self.resource.name.is_empty() {
            return Err(SpectreError::invalid_argument(
                "resource kind and name must not be empty",
            ));
        }
        Ok(())
    }
}

impl Encode for Event {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::Encode::encode_to(&self.id, buf)?;
        encoding::Encode::encode_to(&self.timestamp, buf)?;
        encoding::Encode::encode_to(&self.event_type, buf)?;
        encoding::Encode::encode_to(&self.resource, buf)?;
        encoding::Encode::encode_to(&self.data, buf)?;
        Ok(())
    }
}

impl Decode for Event {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut off = 0;
        let (id, n) = String::decode_from(&buf[off..])?;
        off += n;
        let (timestamp, n) = u64::decode_from(&buf[off..])?;
        off += n;
        let (event_type, n) = EventType::decode_from(&buf[off..])?;
        off += n;
        let (resource, n) = Resource::decode_from(&buf[off..])?;
        off += n;
        let (data, n) = Vec::<u8>::decode_from(&buf[off..])?;
        off += n;
        Ok((
            Self {
                id,
                timestamp,
                event_type,
                resource,
                data,
            },
            off,
        ))
    }
}
