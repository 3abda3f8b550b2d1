//! Fixed-capacity text fields
//!
//! Every text field in a worker message is stored inline with a fixed
//! byte capacity. Input longer than the capacity is truncated on a UTF-8
//! character boundary at construction; it is never rejected and never
//! grows the record.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Length of a job identifier (canonical UUID text form)
pub const JOB_ID_LEN: usize = 36;

/// Inline UTF-8 text of at most `N` bytes
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedText<const N: usize> {
    buf: [u8; N],
    len: u16,
}

impl<const N: usize> FixedText<N> {
    /// Build from `s`, truncating to the capacity on a char boundary
    pub fn new(s: &str) -> Self {
        let cut = floor_char_boundary(s, N);
        let mut buf = [0u8; N];
        buf[..cut].copy_from_slice(&s.as_bytes()[..cut]);
        Self {
            buf,
            len: cut as u16,
        }
    }

    /// Empty text
    pub const fn empty() -> Self {
        Self { buf: [0u8; N], len: 0 }
    }

    /// Byte capacity of this field
    pub const fn capacity() -> usize {
        N
    }

    /// Would `s` be cut short by this field?
    pub fn truncates(s: &str) -> bool {
        s.len() > N
    }

    pub fn as_str(&self) -> &str {
        // Only whole characters are ever copied in, see `new`.
        std::str::from_utf8(&self.buf[..self.len as usize]).unwrap_or_default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

impl<const N: usize> Default for FixedText<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> From<&str> for FixedText<N> {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> fmt::Debug for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<const N: usize> fmt::Display for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> PartialEq<str> for FixedText<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<const N: usize> PartialEq<&str> for FixedText<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl<const N: usize> Serialize for FixedText<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedText<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

/// Job identifier, always 36 characters when produced from a UUID
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(FixedText<JOB_ID_LEN>);

impl JobId {
    /// Wrap an existing identifier, truncating anything past 36 bytes
    pub fn new(id: &str) -> Self {
        Self(FixedText::new(id))
    }

    /// Fresh random identifier
    pub fn generate() -> Self {
        Self::from(uuid::Uuid::new_v4())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<uuid::Uuid> for JobId {
    fn from(id: uuid::Uuid) -> Self {
        let mut buf = uuid::Uuid::encode_buffer();
        Self::new(id.hyphenated().encode_lower(&mut buf))
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.as_str())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
