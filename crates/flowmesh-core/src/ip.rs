//! The Information Packet (spec §3, §4.1): the unit of data flowing between
//! processes. Every IP is owned by at most one process at a time; ownership
//! transfers atomically at the port boundary (spec §5).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::error::{CoreError, Result};

/// Opaque, unique, stable identifier for an IP across its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpId(u64);

impl IpId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for IpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ip-{}", self.0)
    }
}

/// The four packet kinds of classical FBP (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpKind {
    Normal,
    InitialInformationPacket,
    OpenBracket,
    CloseBracket,
}

impl IpKind {
    /// Brackets carry no payload (spec §3 invariant); normal and initial
    /// packets always do.
    pub fn carries_payload(self) -> bool {
        !matches!(self, IpKind::OpenBracket | IpKind::CloseBracket)
    }
}

/// Metadata values attached to an IP. Opaque to the runtime; processes agree
/// on meaning out of band.
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(SystemTime),
}

/// An Information Packet carrying a payload of element type `T`, or a
/// structural bracket marker.
///
/// Invariants (spec §3):
/// - at most one owner at any instant;
/// - bracket kinds carry no payload; normal/initial kinds always do;
/// - `set_owner` on an immutable IP fails with [`CoreError::ownership_violation`];
/// - `clone` produces a fresh id, a deep-copied metadata map, a shallow-copied
///   payload, and does *not* carry over the owner.
pub struct Ip<T> {
    id: IpId,
    kind: IpKind,
    payload: Option<T>,
    metadata: HashMap<String, MetadataValue>,
    owner: Option<String>,
    immutable: bool,
}

const CREATED_AT_KEY: &str = "created_at";

impl<T> Ip<T> {
    fn new(kind: IpKind, payload: Option<T>, immutable: bool) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(
            CREATED_AT_KEY.to_string(),
            MetadataValue::Timestamp(SystemTime::now()),
        );
        Self {
            id: IpId::next(),
            kind,
            payload,
            metadata,
            owner: None,
            immutable,
        }
    }

    /// A normal, mutable-owner data packet.
    pub fn new_normal(payload: T) -> Self {
        Self::new(IpKind::Normal, Some(payload), false)
    }

    /// An immutable Initial Information Packet, delivered during
    /// `Process::initialize` (spec §4.1, §12 open-question decision).
    pub fn new_initial(payload: T) -> Self {
        Self::new(IpKind::InitialInformationPacket, Some(payload), true)
    }

    pub fn id(&self) -> IpId {
        self.id
    }

    pub fn kind(&self) -> IpKind {
        self.kind
    }

    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<T> {
        self.payload
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Transfer ownership to `process_name`. Fails on an immutable IP without
    /// mutating it (spec §8 property 6).
    pub fn set_owner(&mut self, process_name: impl Into<String>) -> Result<()> {
        if self.immutable {
            return Err(CoreError::ownership_violation(format!(
                "cannot set owner on immutable ip {}",
                self.id
            )));
        }
        self.owner = Some(process_name.into());
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.metadata.insert(key.into(), value);
    }

    /// A structural substream-open marker; carries no payload.
    pub fn new_open_bracket() -> Self {
        Self::new(IpKind::OpenBracket, None, false)
    }

    /// A structural substream-close marker; carries no payload.
    pub fn new_close_bracket() -> Self {
        Self::new(IpKind::CloseBracket, None, false)
    }
}

impl<T: Clone> Ip<T> {
    /// Clone with a fresh id and deep-copied metadata; the payload is
    /// shallow-copied (the runtime does not know how to deep-copy an
    /// arbitrary `T`) and the owner is *not* carried over (spec §4.1).
    pub fn clone_ip(&self) -> Self {
        Self {
            id: IpId::next(),
            kind: self.kind,
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            owner: None,
            immutable: self.immutable,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Ip<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ip")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("owner", &self.owner)
            .field("immutable", &self.immutable)
            .field("payload", &self.payload)
            .finish()
    }
}
