use crate::Error;
use core::{fmt, str::FromStr};
use portable_atomic::{AtomicU32, Ordering};
use rand::{Rng, rng};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::{
    sync::OnceLock,
    time::{SystemTime, UNIX_EPOCH},
};

const HEX: &[u8; 16] = b"0123456789abcdef";
const COUNTER_MASK: u32 = 0x00FF_FFFF;

/// A 12-byte record identifier.
///
/// Layout (big-endian):
///
/// ```text
///  0      4            9       12
///  +------+------------+-------+
///  | secs | process    | count |
///  +------+------------+-------+
/// ```
///
/// - 4 bytes of seconds since the Unix epoch
/// - 5 random bytes chosen once per process
/// - a 3-byte counter seeded randomly, wrapping
///
/// Rendered as 24 lowercase hex characters at every external boundary.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

struct ProcessSeed {
    random: [u8; 5],
    counter: AtomicU32,
}

fn seed() -> &'static ProcessSeed {
    static SEED: OnceLock<ProcessSeed> = OnceLock::new();
    SEED.get_or_init(|| {
        let mut rng = rng();
        ProcessSeed {
            random: rng.random(),
            counter: AtomicU32::new(rng.random::<u32>() & COUNTER_MASK),
        }
    })
}

impl ObjectId {
    pub const LEN: usize = 12;
    pub const HEX_LEN: usize = 24;

    /// Generates a fresh identifier.
    pub fn generate() -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as u32);
        let seed = seed();
        let count = seed.counter.fetch_add(1, Ordering::Relaxed) & COUNTER_MASK;

        let mut bytes = [0; Self::LEN];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&seed.random);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub const fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Seconds since the Unix epoch at generation time.
    pub const fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Parses 24 hex characters, accepting either case.
    ///
    /// # Errors
    ///
    /// Returns an [`ObjectIdError`] for a wrong length or a non-hex
    /// character.
    pub fn parse(s: impl AsRef<str>) -> Result<Self, ObjectIdError> {
        let s = s.as_ref().as_bytes();
        if s.len() != Self::HEX_LEN {
            return Err(ObjectIdError::InvalidLen { len: s.len() });
        }
        let mut bytes = [0; Self::LEN];
        for (byte, pair) in bytes.iter_mut().zip(s.chunks_exact(2)) {
            *byte = (nibble(pair[0])? << 4) | nibble(pair[1])?;
        }
        Ok(Self(bytes))
    }

    /// Writes the lowercase hex form into `buf` and returns it as a `&str`.
    pub fn encode_to_buf<'buf>(&self, buf: &'buf mut [u8; 24]) -> &'buf str {
        for (pair, byte) in buf.chunks_exact_mut(2).zip(self.0) {
            pair[0] = HEX[usize::from(byte >> 4)];
            pair[1] = HEX[usize::from(byte & 0x0F)];
        }
        // Every byte written above comes from `HEX`.
        core::str::from_utf8(buf).unwrap_or_default()
    }
}

const fn nibble(c: u8) -> Result<u8, ObjectIdError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(ObjectIdError::InvalidChar { byte: c }),
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0; Self::HEX_LEN];
        f.write_str(self.encode_to_buf(&mut buf))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut buf = [0; Self::HEX_LEN];
        s.serialize_str(self.encode_to_buf(&mut buf))
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

/// Why a string is not a valid [`ObjectId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectIdError {
    InvalidLen { len: usize },
    InvalidChar { byte: u8 },
}

impl fmt::Display for ObjectIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLen { len } => {
                write!(f, "expected {} hex characters, got {len}", ObjectId::HEX_LEN)
            }
            Self::InvalidChar { byte } => write!(f, "invalid hex byte: {byte:#04x}"),
        }
    }
}

impl core::error::Error for ObjectIdError {}

impl From<ObjectIdError> for Error {
    fn from(err: ObjectIdError) -> Self {
        Self::invalid_argument(format!("Cannot parse record id: {err}"))
    }
}
