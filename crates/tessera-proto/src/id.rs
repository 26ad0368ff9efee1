//! Strongly typed identifiers.
//!
//! All identifiers are 64-bit and encode big-endian so that sled key order
//! matches numeric order.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::fmt;

use crate::error::Error;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Archive,
            Serialize,
            Deserialize,
            SerdeSerialize,
            SerdeDeserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Big-endian key encoding.
            pub fn to_bytes(self) -> [u8; 8] {
                self.0.to_be_bytes()
            }

            /// Decode from a big-endian key slice.
            pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
                let buf: [u8; 8] = bytes
                    .try_into()
                    .map_err(|_| Error::InvalidId(bytes.len()))?;
                Ok(Self(u64::from_be_bytes(buf)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

define_id!(
    /// Identifier of a schema class (content type).
    ClassId
);
define_id!(
    /// Identifier of a member (typed property slot).
    MemberId
);
define_id!(
    /// Identifier of a data type.
    DataTypeId
);
define_id!(
    /// Identifier of a culture.
    CultureId
);
define_id!(
    /// Identifier of an object (one schema instance).
    ObjectId
);
