//! Persisted pipeline-state cache file
//!
//! One file per material blueprint. Only the property sets that define each
//! signature are stored; compiled output is rebuilt on load.
//!
//! ```text
//! u32 material_blueprint_id
//! u32 number_of_entries
//! repeated number_of_entries times:
//!     u32 number_of_properties
//!     number_of_properties × { u32 property_id; i32 property_value }
//! ```
//!
//! All words are little-endian.

use std::io::{self, Read, Write};

use crate::errors::{PsoError, Result};
use crate::resources::shader_properties::{ShaderProperties, ShaderPropertyId};

/// Upper bound on speculative preallocation from untrusted counts.
const MAX_PREALLOCATED_ENTRIES: usize = 1024;

/// Decoded contents of a persisted cache file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedPipelineCache {
    pub material_blueprint_id: u32,
    pub property_sets: Vec<ShaderProperties>,
}

impl PersistedPipelineCache {
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_u32(writer, self.material_blueprint_id)?;
        write_u32(writer, encode_count(self.property_sets.len())?)?;
        for properties in &self.property_sets {
            write_u32(writer, encode_count(properties.len())?)?;
            for property in properties {
                write_u32(writer, property.id.raw())?;
                writer.write_all(&property.value.to_le_bytes())?;
            }
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let material_blueprint_id = read_u32(reader, "material blueprint id")?;
        let entry_count = read_u32(reader, "entry count")? as usize;

        let mut property_sets = Vec::with_capacity(entry_count.min(MAX_PREALLOCATED_ENTRIES));
        for _ in 0..entry_count {
            let property_count = read_u32(reader, "property count")? as usize;
            let mut properties =
                ShaderProperties::with_capacity(property_count.min(MAX_PREALLOCATED_ENTRIES));
            for _ in 0..property_count {
                let id = read_u32(reader, "property id")?;
                let value = read_u32(reader, "property value")?.cast_signed();
                properties.set_value(ShaderPropertyId::new(id), value);
            }
            if properties.len() != property_count {
                return Err(PsoError::CorruptCache(format!(
                    "duplicate property ids in entry {}",
                    property_sets.len()
                )));
            }
            property_sets.push(properties);
        }

        Ok(Self {
            material_blueprint_id,
            property_sets,
        })
    }
}

fn encode_count(count: usize) -> Result<u32> {
    u32::try_from(count)
        .map_err(|_| PsoError::CorruptCache(format!("count {count} does not fit in 32 bits")))
}

fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<()> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn read_u32<R: Read>(reader: &mut R, what: &str) -> Result<u32> {
    let mut buf = [0u8; 4];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(u32::from_le_bytes(buf)),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Err(PsoError::CorruptCache(
            format!("truncated while reading {what}"),
        )),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(u32, i32)]) -> ShaderProperties {
        pairs
            .iter()
            .map(|&(id, value)| (ShaderPropertyId::new(id), value))
            .collect()
    }

    #[test]
    fn test_layout_is_little_endian() {
        let cache = PersistedPipelineCache {
            material_blueprint_id: 0x0102_0304,
            property_sets: vec![props(&[(7, -1)])],
        };
        let mut bytes = Vec::new();
        cache.write_to(&mut bytes).unwrap();

        assert_eq!(
            bytes,
            [
                0x04, 0x03, 0x02, 0x01, // material blueprint id
                1, 0, 0, 0, // entries
                1, 0, 0, 0, // properties
                7, 0, 0, 0, // id
                0xFF, 0xFF, 0xFF, 0xFF, // value -1
            ]
        );
    }

    #[test]
    fn test_read_back() {
        let cache = PersistedPipelineCache {
            material_blueprint_id: 42,
            property_sets: vec![props(&[]), props(&[(1, 1), (2, -7), (9, i32::MAX)])],
        };
        let mut bytes = Vec::new();
        cache.write_to(&mut bytes).unwrap();

        let decoded = PersistedPipelineCache::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, cache);
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let cache = PersistedPipelineCache {
            material_blueprint_id: 42,
            property_sets: vec![props(&[(1, 1)])],
        };
        let mut bytes = Vec::new();
        cache.write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 2);

        let err = PersistedPipelineCache::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, PsoError::CorruptCache(_)));
    }

    #[test]
    fn test_huge_entry_count_does_not_preallocate() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());

        let err = PersistedPipelineCache::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, PsoError::CorruptCache(_)));
    }

    #[test]
    fn test_duplicate_ids_are_corrupt() {
        let mut bytes = Vec::new();
        for word in [1u32, 1, 2, 5, 1, 5, 2] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }

        let err = PersistedPipelineCache::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, PsoError::CorruptCache(_)));
    }
}
