//! 12-byte document identifiers.
//!
//! Layout is 4 bytes of big-endian unix seconds, 5 bytes unique to the process, then a 3-byte counter.  Stored
//! documents carry ids in extended-JSON form, `{"$oid": "<24 hex chars>"}`; bare hex strings are accepted when reading.
use std::sync::atomic::{AtomicU32, Ordering};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::*;

/// Key used by extended JSON for object ids.
pub const OID_KEY: &str = "$oid";

lazy_static! {
    static ref PROCESS_UNIQUE: [u8; 5] = rand::random();
    static ref COUNTER: AtomicU32 = AtomicU32::new(rand::random::<u32>() & 0x00FF_FFFF);
}

#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Generate a fresh id.
    pub fn new() -> ObjectId {
        let secs = time::OffsetDateTime::now_utc().unix_timestamp() as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed).to_be_bytes();

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&PROCESS_UNIQUE[..]);
        bytes[9..].copy_from_slice(&count[1..]);
        ObjectId(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> ObjectId {
        ObjectId(bytes)
    }

    pub fn get_bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Seconds since the unix epoch at which this id was generated.
    pub fn get_timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Parse the 24-character hex form.  Either case is accepted.
    ///
    /// Returns `None` rather than an error: callers joining on ids treat anything unparseable as "no match".
    pub fn parse_hex(text: &str) -> Option<ObjectId> {
        if text.len() != 24 {
            return None;
        }

        let mut bytes = [0u8; 12];
        hex::decode_to_slice(text, &mut bytes).ok()?;
        Some(ObjectId(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_extended_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(OID_KEY.to_string(), Value::String(self.to_hex()));
        Value::Object(map)
    }

    /// Read `{"$oid": "..."}`.  Objects with any other keys are not ids.
    pub fn from_extended_json(value: &Value) -> Option<ObjectId> {
        let map = value.as_object()?;
        if map.len() != 1 {
            return None;
        }

        ObjectId::parse_hex(map.get(OID_KEY)?.as_str()?)
    }

    /// Read either the extended-JSON form or a bare hex string.
    pub fn from_json(value: &Value) -> Option<ObjectId> {
        match value {
            Value::String(s) => ObjectId::parse_hex(s),
            other => ObjectId::from_extended_json(other),
        }
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        ObjectId::new()
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectId::parse_hex(s).ok_or_else(|| Error::InvalidObjectId(s.to_string()))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ObjectIdRepr {
    Extended {
        #[serde(rename = "$oid")]
        oid: String,
    },
    Hex(String),
}

impl Serialize for ObjectId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ObjectIdRepr::Extended { oid: self.to_hex() }.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = match ObjectIdRepr::deserialize(deserializer)? {
            ObjectIdRepr::Extended { oid } => oid,
            ObjectIdRepr::Hex(h) => h,
        };

        ObjectId::parse_hex(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("{:?} is not a valid ObjectId", text)))
    }
}
