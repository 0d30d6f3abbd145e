//! Structured tag trees: the container format of world and player files.
//!
//! A file holds one root [`Tag`], CBOR encoded and zstd compressed. Values
//! are addressed by slash-separated paths through compounds, e.g.
//! `/Data/SpawnX`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::codec::{cbor_deserialize, cbor_serialize, zstd_compress, zstd_decompress};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    List(Vec<Tag>),
    Compound(BTreeMap<String, Tag>),
}

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tag decode error: {0}")]
    Decode(String),
    #[error("tag encode error: {0}")]
    Encode(String),
}

impl Tag {
    /// An empty compound.
    pub fn compound() -> Self {
        Tag::Compound(BTreeMap::new())
    }

    /// Builder-style insert into a compound; no-op on other variants.
    pub fn with(mut self, key: &str, value: Tag) -> Self {
        if let Tag::Compound(map) = &mut self {
            map.insert(key.to_owned(), value);
        }
        self
    }

    /// Follow `path` through nested compounds.
    pub fn lookup(&self, path: &str) -> Option<&Tag> {
        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(self, |tag, part| match tag {
                Tag::Compound(map) => map.get(part),
                _ => None,
            })
    }

    /// Integer value of an integral tag.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Tag::Byte(v) => Some(v as i64),
            Tag::Short(v) => Some(v as i64),
            Tag::Int(v) => Some(v as i64),
            Tag::Long(v) => Some(v),
            _ => None,
        }
    }

    /// Value of any numeric tag as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Tag::Float(v) => Some(v as f64),
            Tag::Double(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_list(&self) -> Option<&[Tag]> {
        match self {
            Tag::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, TagError> {
        let cbor = cbor_serialize(self).map_err(TagError::Encode)?;
        Ok(zstd_compress(&cbor)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, TagError> {
        let cbor = zstd_decompress(data).map_err(|e| TagError::Decode(e.to_string()))?;
        cbor_deserialize(&cbor).map_err(TagError::Decode)
    }
}

pub fn read_tag_file(path: impl AsRef<Path>) -> Result<Tag, TagError> {
    let data = std::fs::read(path)?;
    Tag::decode(&data)
}

pub fn write_tag_file(path: impl AsRef<Path>, tag: &Tag) -> Result<(), TagError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, tag.encode()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level() -> Tag {
        Tag::compound().with(
            "Data",
            Tag::compound()
                .with("SpawnX", Tag::Int(12))
                .with("Time", Tag::Long(6000))
                .with(
                    "Player",
                    Tag::compound().with(
                        "Pos",
                        Tag::List(vec![Tag::Double(1.5), Tag::Double(70.0), Tag::Double(-2.5)]),
                    ),
                ),
        )
    }

    #[test]
    fn lookup_follows_paths() {
        let tag = level();
        assert_eq!(tag.lookup("/Data/SpawnX"), Some(&Tag::Int(12)));
        assert_eq!(tag.lookup("Data/Time").and_then(Tag::as_i64), Some(6000));
        assert!(tag.lookup("/Data/SpawnY").is_none());
        assert!(tag.lookup("/Data/SpawnX/Deeper").is_none());
        assert_eq!(tag.lookup("/"), Some(&tag));
    }

    #[test]
    fn numeric_views() {
        assert_eq!(Tag::Short(-4).as_i64(), Some(-4));
        assert_eq!(Tag::Float(2.5).as_i64(), None);
        assert_eq!(Tag::Float(2.5).as_f64(), Some(2.5));
        assert_eq!(Tag::Int(3).as_f64(), Some(3.0));
        assert_eq!(Tag::String("3".into()).as_f64(), None);
    }

    #[test]
    fn file_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("level.dat");
        write_tag_file(&path, &level()).unwrap();
        assert_eq!(read_tag_file(&path).unwrap(), level());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            Tag::decode(b"definitely not zstd"),
            Err(TagError::Decode(_))
        ));
    }
}
