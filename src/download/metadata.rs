use std::collections::HashMap;

use serde::Deserialize;

use crate::state::library::SnapshotKind;

/// Response of `POST /CatalogBase/All/`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnapshotMetadata {
    pub status: String,
    pub response: SnapshotUrls,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnapshotUrls {
    #[serde(rename = "url", default)]
    pub urls: HashMap<String, String>,
    #[serde(rename = "md5", default)]
    pub hashes: HashMap<String, String>,
    #[serde(rename = "updatedate", default)]
    pub update_date: String,
}

/// SQLite file format version of the attributes database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqliteMode {
    Sqlite2,
    #[default]
    Sqlite3,
}

impl SqliteMode {
    fn key_part(self) -> &'static str {
        match self {
            SqliteMode::Sqlite2 => "sqlite2",
            SqliteMode::Sqlite3 => "sqlite3",
        }
    }
}

/// Transfer encoding of the published snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// A zip archive holding the database file.
    #[default]
    Zip,
    /// The database file itself.
    Gzip,
}

impl CompressionMode {
    fn key_part(self) -> &'static str {
        match self {
            CompressionMode::Zip => "_zip_url",
            CompressionMode::Gzip => "_url",
        }
    }
}

/// Published datasets. Only the 211x300 image set is installed as the image file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataset {
    Text,
    Images211x300,
    Images180x256,
}

impl From<SnapshotKind> for Dataset {
    fn from(kind: SnapshotKind) -> Self {
        match kind {
            SnapshotKind::Text => Dataset::Text,
            SnapshotKind::Images => Dataset::Images211x300,
        }
    }
}

/// Metadata key for a dataset, e.g. `textdb_sqlite3_zip_url_ssl`.
pub fn url_key(dataset: Dataset, mode: SqliteMode, compression: CompressionMode) -> String {
    match dataset {
        Dataset::Text => format!("textdb_{}{}_ssl", mode.key_part(), compression.key_part()),
        Dataset::Images211x300 => format!("imagedb1{}_ssl", compression.key_part()),
        Dataset::Images180x256 => format!("imagedb2{}_ssl", compression.key_part()),
    }
}

impl SnapshotMetadata {
    pub fn url_for(
        &self,
        dataset: Dataset,
        mode: SqliteMode,
        compression: CompressionMode,
    ) -> Option<&str> {
        self.response
            .urls
            .get(&url_key(dataset, mode, compression))
            .map(String::as_str)
    }

    pub fn hash_for(
        &self,
        dataset: Dataset,
        mode: SqliteMode,
        compression: CompressionMode,
    ) -> Option<&str> {
        self.response
            .hashes
            .get(&url_key(dataset, mode, compression))
            .map(String::as_str)
    }
}
