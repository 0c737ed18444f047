use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use clustore_types::{ClusterPath, ClusterType, TypeError};

use crate::error::{StoreError, StoreResult};

/// The unit of storage: a value that knows its own full cluster path.
///
/// Because the path travels with the value, writers never pass it
/// separately. The manager only routes stored objects; it never rewrites
/// their bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    path: ClusterPath,
    data: Vec<u8>,
}

impl StoredObject {
    /// Wrap raw bytes stored at `path`.
    pub fn new(path: ClusterPath, data: Vec<u8>) -> Self {
        Self { path, data }
    }

    /// Serialize a record as JSON under `path`.
    pub fn from_json<T: Serialize>(path: ClusterPath, value: &T) -> StoreResult<Self> {
        let data =
            serde_json::to_vec(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self { path, data })
    }

    /// Decode the bytes as a JSON record.
    pub fn to_json<T: DeserializeOwned>(&self) -> StoreResult<T> {
        serde_json::from_slice(&self.data).map_err(|e| StoreError::CorruptObject {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    pub fn path(&self) -> &ClusterPath {
        &self.path
    }

    pub fn cluster_type(&self) -> ClusterType {
        self.path.cluster_type()
    }

    /// The object's own name (last path segment).
    pub fn name(&self) -> &str {
        self.path.name()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

// ---------------------------------------------------------------------------
// Property
// ---------------------------------------------------------------------------

/// A named item property, stored at `Property/<name>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
    pub mutable: bool,
}

impl Property {
    /// A property record.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            mutable: true,
        }
    }

    /// `Property/<name>`.
    pub fn path(&self) -> Result<ClusterPath, TypeError> {
        ClusterPath::of_type(ClusterType::Property).child(&self.name)
    }

    /// Encode as the JSON object stored at [`Self::path`].
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        StoredObject::from_json(self.path()?, self)
    }

    /// Decode a stored property.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        expect_type(obj, ClusterType::Property)?;
        obj.to_json()
    }
}

// ---------------------------------------------------------------------------
// Viewpoint
// ---------------------------------------------------------------------------

/// A named pointer to one outcome of a schema, stored at
/// `ViewPoint/<schema>/<name>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewpoint {
    pub schema: String,
    pub name: String,
    pub schema_version: u32,
    pub event_id: u64,
}

impl Viewpoint {
    /// `ViewPoint/<schema>/<name>`.
    pub fn path(&self) -> Result<ClusterPath, TypeError> {
        ClusterPath::of_type(ClusterType::Viewpoint)
            .child(&self.schema)?
            .child(&self.name)
    }

    /// Path of the outcome this viewpoint references.
    pub fn outcome_path(&self) -> Result<ClusterPath, TypeError> {
        ClusterPath::of_type(ClusterType::Outcome)
            .child(&self.schema)?
            .child(&self.schema_version.to_string())?
            .child(&self.event_id.to_string())
    }

    /// Encode as the JSON object stored at [`Self::path`].
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        StoredObject::from_json(self.path()?, self)
    }

    /// Decode a stored viewpoint.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        expect_type(obj, ClusterType::Viewpoint)?;
        obj.to_json()
    }
}

fn expect_type(obj: &StoredObject, expected: ClusterType) -> StoreResult<()> {
    if obj.cluster_type() != expected {
        return Err(StoreError::CorruptObject {
            path: obj.path().clone(),
            reason: format!("expected {expected}, got {}", obj.cluster_type()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_lands_under_its_name() {
        let prop = Property::new("Name", "Bob");
        let obj = prop.to_stored_object().unwrap();
        assert_eq!(obj.path().as_str(), "Property/Name");
        assert_eq!(obj.cluster_type(), ClusterType::Property);
        assert_eq!(obj.name(), "Name");
        assert_eq!(Property::from_stored_object(&obj).unwrap(), prop);
    }

    #[test]
    fn viewpoint_references_outcome() {
        let vp = Viewpoint {
            schema: "Invoice".into(),
            name: "last".into(),
            schema_version: 2,
            event_id: 17,
        };
        assert_eq!(vp.path().unwrap().as_str(), "ViewPoint/Invoice/last");
        assert_eq!(vp.outcome_path().unwrap().as_str(), "Outcome/Invoice/2/17");
        assert!(vp.outcome_path().unwrap().is_leaf());
    }

    #[test]
    fn decoding_wrong_type_is_corrupt() {
        let obj = Property::new("x", "y").to_stored_object().unwrap();
        let err = Viewpoint::from_stored_object(&obj).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn garbage_bytes_are_corrupt() {
        let path = ClusterPath::parse("Property/x").unwrap();
        let obj = StoredObject::new(path, b"not json".to_vec());
        assert_eq!(obj.size(), 8);
        assert!(matches!(
            Property::from_stored_object(&obj),
            Err(StoreError::CorruptObject { .. })
        ));
    }
}
