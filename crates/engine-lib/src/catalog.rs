//! Shape catalog boundary
//!
//! The catalog is immutable reference data owned by an external service;
//! the engine only lists and looks up. An in-memory implementation
//! loadable from a JSON file backs the scanner and the tests.

use crate::error::EngineError;
use crate::models::{Cloud, ResourceType, Shape};
use std::io::Read;

/// Read-only access to the shape catalog
pub trait ShapeCatalog: Send + Sync {
    fn list(&self, cloud: Cloud, resource_type: ResourceType) -> Vec<Shape>;

    fn get(&self, name: &str) -> Result<Shape, EngineError>;
}

/// Catalog held fully in memory
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    shapes: Vec<Shape>,
}

impl InMemoryCatalog {
    pub fn new(shapes: Vec<Shape>) -> Self {
        Self { shapes }
    }

    /// Load from a JSON array of shape entries
    pub fn from_reader(reader: impl Read) -> Result<Self, EngineError> {
        let shapes: Vec<Shape> = serde_json::from_reader(reader)
            .map_err(|e| EngineError::InvalidConfig(format!("shape catalog: {e}")))?;
        Ok(Self::new(shapes))
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

impl ShapeCatalog for InMemoryCatalog {
    fn list(&self, cloud: Cloud, _resource_type: ResourceType) -> Vec<Shape> {
        self.shapes
            .iter()
            .filter(|s| s.cloud == cloud)
            .cloned()
            .collect()
    }

    fn get(&self, name: &str) -> Result<Shape, EngineError> {
        self.shapes
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownShape(name.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    fn shape(
        name: &str,
        cpu: u32,
        memory_gib: f64,
        family_type: &str,
        series: &str,
    ) -> Shape {
        Shape {
            name: name.into(),
            cloud: Cloud::Aws,
            cpu,
            memory_gib,
            network_gbps: Some(10.0),
            iops: Some(3000.0 * f64::from(cpu)),
            family_type: family_type.into(),
            series: series.into(),
        }
    }

    /// Small AWS-style catalog shared by the matcher and engine tests
    pub fn small_catalog() -> InMemoryCatalog {
        InMemoryCatalog::new(vec![
            shape("m5.large", 2, 8.0, "general", "m5"),
            shape("m5.xlarge", 4, 16.0, "general", "m5"),
            shape("m5.2xlarge", 8, 32.0, "general", "m5"),
            shape("m5.4xlarge", 16, 64.0, "general", "m5"),
            shape("m6i.large", 2, 8.0, "general", "m6i"),
            shape("m6i.xlarge", 4, 16.0, "general", "m6i"),
            shape("m6i.2xlarge", 8, 32.0, "general", "m6i"),
            shape("c5.xlarge", 4, 8.0, "compute", "c5"),
            shape("c5.2xlarge", 8, 16.0, "compute", "c5"),
            shape("r5.xlarge", 4, 32.0, "memory", "r5"),
            shape("r5.2xlarge", 8, 64.0, "memory", "r5"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_filters_by_cloud() {
        let catalog = testing::small_catalog();
        assert_eq!(
            catalog.list(Cloud::Aws, ResourceType::Instance).len(),
            catalog.len()
        );
        assert!(catalog.list(Cloud::Gcp, ResourceType::Instance).is_empty());
    }

    #[test]
    fn test_get_unknown_shape() {
        let catalog = testing::small_catalog();
        assert!(catalog.get("m5.large").is_ok());
        let err = catalog.get("m9.mega").unwrap_err();
        assert!(matches!(err, EngineError::UnknownShape(_)));
    }

    #[test]
    fn test_from_reader() {
        let json = r#"[{
            "name": "m5.large",
            "cloud": "aws",
            "cpu": 2,
            "memory_gib": 8.0,
            "network_gbps": 10.0,
            "iops": 6000.0,
            "family_type": "general",
            "series": "m5"
        }]"#;
        let catalog = InMemoryCatalog::from_reader(json.as_bytes()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("m5.large").unwrap().cpu, 2);
    }
}
