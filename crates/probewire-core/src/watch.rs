//! Watched target-memory locations.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Declared C type of a watched location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// `uint8_t`
    Uint8,
    /// `int8_t`
    Int8,
    /// `uint16_t`
    Uint16,
    /// `int16_t`
    Int16,
    /// `uint32_t`
    Uint32,
    /// `int32_t`
    Int32,
}

impl DataType {
    /// Width in bytes.
    pub fn size(self) -> u8 {
        match self {
            DataType::Uint8 | DataType::Int8 => 1,
            DataType::Uint16 | DataType::Int16 => 2,
            DataType::Uint32 | DataType::Int32 => 4,
        }
    }

    /// Whether the type is two's-complement signed.
    pub fn is_signed(self) -> bool {
        matches!(self, DataType::Int8 | DataType::Int16 | DataType::Int32)
    }

    /// Inclusive range of representable values.
    pub fn range(self) -> (i64, i64) {
        let bits = u32::from(self.size()) * 8;
        if self.is_signed() {
            (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
        } else {
            (0, (1i64 << bits) - 1)
        }
    }

    /// The C spelling of the type.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Uint8 => "uint8_t",
            DataType::Int8 => "int8_t",
            DataType::Uint16 => "uint16_t",
            DataType::Int16 => "int16_t",
            DataType::Uint32 => "uint32_t",
            DataType::Int32 => "int32_t",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uint8_t" | "u8" => Ok(DataType::Uint8),
            "int8_t" | "i8" => Ok(DataType::Int8),
            "uint16_t" | "u16" => Ok(DataType::Uint16),
            "int16_t" | "i16" => Ok(DataType::Int16),
            "uint32_t" | "u32" => Ok(DataType::Uint32),
            "int32_t" | "i32" => Ok(DataType::Int32),
            other => Err(format!("unknown data type '{other}'")),
        }
    }
}

/// Latest value read for a watched location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatchValue {
    /// Not read yet.
    #[default]
    Unread,
    /// Decoded value.
    Value(i64),
    /// The last read failed.
    Error,
}

impl fmt::Display for WatchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchValue::Unread => Ok(()),
            WatchValue::Value(v) => write!(f, "{v}"),
            WatchValue::Error => f.write_str("#ERR"),
        }
    }
}

/// A named target-memory location tracked for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    /// Display name; entries with an empty name are placeholders and are
    /// never polled.
    pub name: String,
    /// Target address.
    pub address: u32,
    /// Byte count to read.
    pub size: u8,
    /// Declared type.
    pub data_type: DataType,
    /// Latest value.
    pub value: WatchValue,
    /// Value typed by the user, pending a write.
    pub new_value: Option<String>,
    /// The user is editing this entry; polling skips it.
    pub edited: bool,
    /// Already read in the current polling cycle.
    pub queried: bool,
}

impl WatchEntry {
    /// Create an entry sized for its data type.
    pub fn new(name: impl Into<String>, address: u32, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            address,
            size: data_type.size(),
            data_type,
            value: WatchValue::Unread,
            new_value: None,
            edited: false,
            queried: false,
        }
    }

    /// Override the byte count.
    pub fn with_size(mut self, size: u8) -> Self {
        self.size = size;
        self
    }

    /// Whether the background poller should consider this entry at all.
    pub fn is_pollable(&self) -> bool {
        !self.name.is_empty() && !self.edited
    }
}

/// Registry key for a watched entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatchId(pub u32);

/// Watched entries in insertion order.
#[derive(Debug, Clone, Default)]
pub struct WatchRegistry {
    entries: BTreeMap<WatchId, WatchEntry>,
    next_id: u32,
}

impl WatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, returning its id.
    pub fn add(&mut self, entry: WatchEntry) -> WatchId {
        let id = WatchId(self.next_id);
        self.next_id += 1;
        self.entries.insert(id, entry);
        id
    }

    /// Remove an entry.
    pub fn remove(&mut self, id: WatchId) -> Option<WatchEntry> {
        self.entries.remove(&id)
    }

    /// Look up an entry.
    pub fn get(&self, id: WatchId) -> Option<&WatchEntry> {
        self.entries.get(&id)
    }

    /// Look up an entry mutably.
    pub fn get_mut(&mut self, id: WatchId) -> Option<&mut WatchEntry> {
        self.entries.get_mut(&id)
    }

    /// Find the first entry with the given name.
    pub fn find_by_name(&self, name: &str) -> Option<WatchId> {
        self.entries
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(id, _)| *id)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (WatchId, &WatchEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }

    /// Iterate entries mutably in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (WatchId, &mut WatchEntry)> {
        self.entries.iter_mut().map(|(id, e)| (*id, e))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
