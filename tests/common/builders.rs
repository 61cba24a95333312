//! Test data builders for creating test objects

use visflow::{
    context::EngineContext,
    data::{DataCollection, DataObject, EmptyPayload, PropertyArray},
};

/// Builder for a particles container with property sub-objects
pub struct ParticlesBuilder {
    identifier: String,
    bonds: bool,
    properties: Vec<(String, PropertyArray)>,
}

impl ParticlesBuilder {
    pub fn new() -> Self {
        Self {
            identifier: "particles".to_string(),
            bonds: false,
            properties: Vec::new(),
        }
    }

    /// Build a bonds container instead
    pub fn bonds() -> Self {
        Self {
            identifier: "bonds".to_string(),
            bonds: true,
            properties: Vec::new(),
        }
    }

    pub fn identifier(mut self, identifier: &str) -> Self {
        self.identifier = identifier.to_string();
        self
    }

    pub fn position(self, xyz: &[[f64; 3]]) -> Self {
        let flat = xyz.iter().flatten().copied().collect();
        self.property("Position", PropertyArray::vector(flat, 3))
    }

    pub fn selection(self, flags: &[u8]) -> Self {
        let values = flags.iter().map(|&f| f as f64).collect();
        self.property("Selection", PropertyArray::scalar(values))
    }

    pub fn scalar(self, name: &str, values: &[f64]) -> Self {
        self.property(name, PropertyArray::scalar(values.to_vec()))
    }

    pub fn property(mut self, name: &str, array: PropertyArray) -> Self {
        self.properties.push((name.to_string(), array));
        self
    }

    pub fn build(self, engine: &EngineContext) -> DataObject {
        let c = engine.classes();
        let class = if self.bonds { c.bonds } else { c.particles };
        self.properties.into_iter().fold(
            DataObject::new(class, EmptyPayload).with_identifier(self.identifier),
            |container, (name, array)| {
                container.with_sub_object(DataObject::new(c.property, array).with_identifier(name))
            },
        )
    }

    /// Collection holding only this container
    pub fn collection(self, engine: &EngineContext) -> DataCollection {
        let mut data = DataCollection::new();
        data.add_object(self.build(engine));
        data
    }
}

impl Default for ParticlesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Values of the property at `path` (e.g. `"particles/Position"`)
pub fn property_values(engine: &EngineContext, data: &DataCollection, path: &str) -> Vec<f64> {
    data.get_object(engine.registry(), engine.classes().property, path)
        .and_then(|obj| obj.payload::<PropertyArray>())
        .map(|array| array.values().to_vec())
        .unwrap_or_default()
}
