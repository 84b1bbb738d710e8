//! Table pointer stored in a metastore entry's parameter map.
//!
//! The metastore keeps one entry per table. Its parameters name the current
//! Iceberg metadata file and the one it replaced, forming a version chain:
//!
//! ```text
//! table_type                 = ICEBERG
//! metadata_location          = s3://wh/db/t/metadata/00002-<uuid>.metadata.json
//! previous_metadata_location = s3://wh/db/t/metadata/00001-<uuid>.metadata.json
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameter holding the table-format tag.
pub const TABLE_TYPE_PROP: &str = "table_type";

/// Parameter holding the current metadata file location.
pub const METADATA_LOCATION_PROP: &str = "metadata_location";

/// Parameter holding the metadata file location replaced by the last commit.
pub const PREVIOUS_METADATA_LOCATION_PROP: &str = "previous_metadata_location";

/// Parameter marking the entry as an external table.
pub const EXTERNAL_PROP: &str = "EXTERNAL";

/// Table-format tag recognized as an Iceberg pointer (case-insensitive).
pub const ICEBERG_TABLE_TYPE_VALUE: &str = "iceberg";

/// Version used when no metadata file has been cached yet.
pub const NO_VERSION: i64 = -1;

/// String-keyed, string-valued entry parameters.
pub type ParameterMap = BTreeMap<String, String>;

/// Identifies a table inside the metastore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableIdent {
    /// Database (namespace) name.
    pub database: String,
    /// Table name.
    pub table: String,
}

impl TableIdent {
    /// Creates a table identifier.
    #[must_use]
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Returns `catalog.database.table`, the key used for local commit throttling.
    #[must_use]
    pub fn full_name(&self, catalog: &str) -> String {
        format!("{catalog}.{}.{}", self.database, self.table)
    }
}

impl fmt::Display for TableIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// A metastore table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// The table this entry describes.
    pub ident: TableIdent,
    /// Owner recorded when the entry was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Entry parameters, including the pointer keys.
    #[serde(default)]
    pub parameters: ParameterMap,
}

impl TableEntry {
    /// Creates an in-memory entry for a table that does not exist yet.
    ///
    /// The entry is marked external because the metastore does not own the
    /// table's files.
    #[must_use]
    pub fn new_external(ident: TableIdent, owner: Option<String>) -> Self {
        let mut parameters = ParameterMap::new();
        parameters.insert(EXTERNAL_PROP.to_string(), "TRUE".to_string());
        Self {
            ident,
            owner,
            created_at: Utc::now(),
            parameters,
        }
    }

    /// Returns the current metadata location parameter, if set.
    #[must_use]
    pub fn metadata_location(&self) -> Option<&str> {
        self.parameters.get(METADATA_LOCATION_PROP).map(String::as_str)
    }

    /// Returns the previous metadata location parameter, if set.
    #[must_use]
    pub fn previous_metadata_location(&self) -> Option<&str> {
        self.parameters
            .get(PREVIOUS_METADATA_LOCATION_PROP)
            .map(String::as_str)
    }

    /// Decodes the pointer carried by this entry.
    ///
    /// # Errors
    ///
    /// Returns [`PointerError`] when the kind tag is not Iceberg or the
    /// metadata location is missing.
    pub fn pointer(&self) -> Result<TablePointer, PointerError> {
        TablePointer::from_parameters(&self.parameters)
    }

    /// Points the entry at `new_location`, chaining `previous` when it is non-empty.
    pub fn stamp(&mut self, new_location: &str, previous: Option<&str>) {
        self.parameters.insert(
            TABLE_TYPE_PROP.to_string(),
            ICEBERG_TABLE_TYPE_VALUE.to_ascii_uppercase(),
        );
        self.parameters
            .insert(METADATA_LOCATION_PROP.to_string(), new_location.to_string());
        if let Some(previous) = previous.filter(|p| !p.is_empty()) {
            self.parameters.insert(
                PREVIOUS_METADATA_LOCATION_PROP.to_string(),
                previous.to_string(),
            );
        }
    }
}

/// The pointer fields of a recognized Iceberg entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePointer {
    /// Table-format tag as stored.
    pub kind: String,
    /// Current metadata file location.
    pub metadata_location: String,
    /// Metadata file location replaced by the last commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_metadata_location: Option<String>,
}

impl TablePointer {
    /// Decodes a pointer from entry parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PointerError::WrongKind`] when `table_type` is absent or not
    /// Iceberg, and [`PointerError::MissingMetadataLocation`] when the location
    /// parameter is absent.
    pub fn from_parameters(parameters: &ParameterMap) -> Result<Self, PointerError> {
        let kind = parameters.get(TABLE_TYPE_PROP);
        let Some(kind) = kind.filter(|k| k.eq_ignore_ascii_case(ICEBERG_TABLE_TYPE_VALUE)) else {
            return Err(PointerError::WrongKind {
                found: kind.cloned(),
            });
        };
        let metadata_location = parameters
            .get(METADATA_LOCATION_PROP)
            .ok_or(PointerError::MissingMetadataLocation)?;

        Ok(Self {
            kind: kind.clone(),
            metadata_location: metadata_location.clone(),
            previous_metadata_location: parameters.get(PREVIOUS_METADATA_LOCATION_PROP).cloned(),
        })
    }
}

/// Why an entry is not a valid Iceberg pointer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointerError {
    /// The kind tag is missing or names another format.
    #[error("type={}", found.as_deref().unwrap_or("null"))]
    WrongKind {
        /// The tag found on the entry.
        found: Option<String>,
    },
    /// The entry has no metadata location.
    #[error("missing {METADATA_LOCATION_PROP}")]
    MissingMetadataLocation,
}

/// Process-local view of the table's current metadata version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMetadataVersion {
    /// Version parsed from the metadata file name, [`NO_VERSION`] if unknown.
    pub version: i64,
    /// Current metadata location, `None` before the table exists.
    pub metadata_location: Option<String>,
}

impl CachedMetadataVersion {
    /// The state of a table that has no metadata yet.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            version: NO_VERSION,
            metadata_location: None,
        }
    }

    /// Caches `location`, deriving the version from its file name.
    #[must_use]
    pub fn from_location(location: impl Into<String>) -> Self {
        let location = location.into();
        Self {
            version: parse_version(&location),
            metadata_location: Some(location),
        }
    }

    /// Returns `true` when no metadata location is cached.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.metadata_location.is_none()
    }

    /// Version number the next metadata file should carry.
    ///
    /// Saturates at `i64::MAX`; [`parse_version`] never yields a version that
    /// cannot be incremented.
    #[must_use]
    pub const fn next_version(&self) -> i64 {
        if self.version < 0 {
            0
        } else {
            self.version.saturating_add(1)
        }
    }
}

impl Default for CachedMetadataVersion {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parses the version from a `NNNNN-<uuid>.metadata.json` file name.
///
/// Returns [`NO_VERSION`] when the file name has no numeric prefix, or when
/// the prefix is too large to be followed by another version.
#[must_use]
pub fn parse_version(location: &str) -> i64 {
    let file_name = location.rsplit('/').next().unwrap_or(location);
    let Some((prefix, _)) = file_name.split_once('-') else {
        return NO_VERSION;
    };
    prefix
        .parse::<i64>()
        .ok()
        .filter(|v| (0..i64::MAX).contains(v))
        .unwrap_or(NO_VERSION)
}

/// Formats the file name for metadata `version`.
#[must_use]
pub fn metadata_file_name(version: i64, id: &uuid::Uuid) -> String {
    format!("{version:05}-{id}.metadata.json")
}
