use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, ensure};
use uuid::Uuid;

use super::error::{
    InvalidIdSnafu, InvalidMessageIdentitySnafu, InvalidRowIdSnafu, NonPositiveRowIdSnafu, StorageError,
    StorageResult,
};

// Macro keeps all UUID wrappers structurally identical, so future migrations stay predictable.
macro_rules! define_storage_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(raw: Uuid) -> Self {
                Self(raw)
            }

            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn parse(raw: &str) -> StorageResult<Self> {
                let parsed = Uuid::parse_str(raw).context(InvalidIdSnafu {
                    stage: "parse-storage-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }

        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(raw: &str) -> StorageResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

// Row ids mirror sqlite INTEGER PRIMARY KEY columns.
macro_rules! define_row_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(raw: i64) -> Self {
                Self(raw)
            }

            pub fn parse(raw: &str) -> StorageResult<Self> {
                let parsed = raw.trim().parse::<i64>().context(InvalidRowIdSnafu {
                    stage: "parse-row-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                ensure!(
                    parsed > 0,
                    NonPositiveRowIdSnafu {
                        stage: "parse-row-id-range",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(parsed))
            }

            pub fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self::new(value)
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(raw: &str) -> StorageResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_storage_id!(GroupId, "group-id");
define_row_id!(MessageRowId, "message-row-id");
define_row_id!(RecipientId, "recipient-id");

/// Selects the table a message lives in. Only `Media` rows can carry quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageClass {
    Plain,
    Media,
}

impl StorageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Media => "media",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "plain" => Some(Self::Plain),
            "media" => Some(Self::Media),
            _ => None,
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identifies one message: the table it lives in plus its row id there.
///
/// Text form is `<class>:<id>`, e.g. `media:42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageIdentity {
    pub class: StorageClass,
    pub id: MessageRowId,
}

impl MessageIdentity {
    pub fn new(class: StorageClass, id: MessageRowId) -> Self {
        Self { class, id }
    }

    pub fn plain(id: i64) -> Self {
        Self::new(StorageClass::Plain, MessageRowId::new(id))
    }

    pub fn media(id: i64) -> Self {
        Self::new(StorageClass::Media, MessageRowId::new(id))
    }

    pub fn parse(raw: &str) -> StorageResult<Self> {
        let (raw_class, raw_id) = raw.split_once(':').context(InvalidMessageIdentitySnafu {
            stage: "parse-message-identity-split",
            raw: raw.to_string(),
            details: "expected '<class>:<id>'",
        })?;
        let class = StorageClass::parse(raw_class.trim()).context(InvalidMessageIdentitySnafu {
            stage: "parse-message-identity-class",
            raw: raw.to_string(),
            details: "storage class must be 'plain' or 'media'",
        })?;
        let id = MessageRowId::parse(raw_id)?;

        Ok(Self { class, id })
    }
}

impl fmt::Display for MessageIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.class, self.id)
    }
}

impl FromStr for MessageIdentity {
    type Err = StorageError;

    fn from_str(raw: &str) -> StorageResult<Self> {
        Self::parse(raw)
    }
}
