use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use ahash::AHashMap;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(u32);

/// Immutable instance layout tag. Types that share a layout share the same
/// `Arc<Shape>`, so layout identity is pointer identity.
#[derive(Debug)]
pub struct Shape {
    id: ShapeId,
    name: Arc<str>,
    fields: Box<[Arc<str>]>,
}

impl Shape {
    pub fn id(&self) -> ShapeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed fields every instance of this layout carries.
    pub fn fields(&self) -> &[Arc<str>] {
        &self.fields
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| &**field == name)
    }
}

/// Named shapes shared by the core types.
pub struct ShapeTable {
    next_id: AtomicU32,
    shapes: RwLock<AHashMap<Arc<str>, Arc<Shape>>>,
}

impl ShapeTable {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(0),
            shapes: RwLock::new(AHashMap::new()),
        }
    }

    /// Returns the shape registered under `name`, creating it with `fields`
    /// on first use.
    pub fn define(&self, name: &str, fields: &[&str]) -> Arc<Shape> {
        if let Some(shape) = self.shapes.read().get(name) {
            return shape.clone();
        }
        let mut shapes = self.shapes.write();
        if let Some(shape) = shapes.get(name) {
            return shape.clone();
        }
        let name: Arc<str> = Arc::from(name);
        let shape = Arc::new(Shape {
            id: ShapeId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            name: name.clone(),
            fields: fields.iter().map(|&field| Arc::from(field)).collect(),
        });
        shapes.insert(name, shape.clone());
        shape
    }

    pub fn get(&self, name: &str) -> Option<Arc<Shape>> {
        self.shapes.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.shapes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ShapeTable {
    fn default() -> Self {
        Self::new()
    }
}
