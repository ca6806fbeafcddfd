//! Regularly sampled volumes and their component arrays.

use crate::constants::MAX_COMPONENTS;
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::math::Aabb;
use crate::scalar::{ScalarData, ScalarType};
use crate::version::Version;
use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Where samples of an array live relative to the grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Centering {
    /// One sample per grid point
    #[default]
    Point,
    /// One sample per grid cell (one fewer per axis)
    Cell,
}

impl Centering {
    /// Number of samples along each axis of `extent` for this centering.
    pub fn sample_dims(self, extent: &Extent) -> UVec3 {
        match self {
            Self::Point => extent.point_dims(),
            Self::Cell => extent.cell_dims(),
        }
    }
}

/// A named, tuple-interleaved scalar array attached to a volume.
#[derive(Clone, Debug)]
pub struct ComponentArray {
    name: String,
    data: ScalarData,
    components: usize,
    centering: Centering,
    ranges: Vec<[f64; 2]>,
}

impl ComponentArray {
    /// Wrap `data` as an array of `components`-tuples.
    ///
    /// Per-component finite ranges are computed once here.
    pub fn new(
        name: impl Into<String>,
        data: ScalarData,
        components: usize,
        centering: Centering,
    ) -> Result<Self> {
        let name = name.into();
        if components == 0 {
            return Err(Error::UnsupportedComponents(0));
        }
        if data.len() % components != 0 {
            return Err(Error::InvalidData(format!(
                "array '{name}' has {} elements, not a multiple of {components} components",
                data.len()
            )));
        }
        let ranges = (0..components)
            .map(|c| data.finite_range(c, components).unwrap_or([0.0, 0.0]))
            .collect();
        Ok(Self {
            name,
            data,
            components,
            centering,
            ranges,
        })
    }

    /// Array name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing storage.
    pub fn data(&self) -> &ScalarData {
        &self.data
    }

    /// Element type.
    pub fn scalar_type(&self) -> ScalarType {
        self.data.scalar_type()
    }

    /// Components per tuple.
    pub fn components(&self) -> usize {
        self.components
    }

    /// Point or cell centering.
    pub fn centering(&self) -> Centering {
        self.centering
    }

    /// Number of tuples.
    pub fn tuple_count(&self) -> usize {
        self.data.len() / self.components
    }

    /// Finite `[min, max]` of one component.
    pub fn range(&self, component: usize) -> Result<[f64; 2]> {
        self.ranges
            .get(component)
            .copied()
            .ok_or_else(|| Error::OutOfBounds(format!("component {component} of '{}'", self.name)))
    }

    /// Finite ranges of all components.
    pub fn ranges(&self) -> &[[f64; 2]] {
        &self.ranges
    }

    /// Whether a volume texture can encode this array's tuples.
    pub fn check_texture_components(&self) -> Result<()> {
        if self.components > MAX_COMPONENTS {
            return Err(Error::UnsupportedComponents(self.components));
        }
        Ok(())
    }
}

/// Regularly sampled 3D field with one or more named arrays.
///
/// Holds index-space extent, the origin/spacing mapping to world space and a
/// data version that advances whenever array contents change.
#[derive(Clone, Debug)]
pub struct Volume {
    extent: Extent,
    origin: Vec3,
    spacing: Vec3,
    arrays: Vec<ComponentArray>,
    data_version: Version,
}

impl Volume {
    /// Create an empty volume over `extent`.
    pub fn new(extent: Extent, origin: Vec3, spacing: Vec3) -> Result<Self> {
        if spacing.cmpeq(Vec3::ZERO).any() || !spacing.is_finite() {
            return Err(Error::InvalidData(format!("degenerate spacing {spacing}")));
        }
        Ok(Self {
            extent,
            origin,
            spacing,
            arrays: Vec::new(),
            data_version: Version::next(),
        })
    }

    /// Add or replace an array, validating its tuple count against the extent.
    pub fn set_array(&mut self, array: ComponentArray) -> Result<()> {
        let dims = array.centering().sample_dims(&self.extent);
        let expected = dims.x as usize * dims.y as usize * dims.z as usize;
        if array.tuple_count() != expected {
            return Err(Error::ArrayLength {
                name: array.name().to_string(),
                expected,
                actual: array.tuple_count(),
            });
        }
        match self.arrays.iter_mut().find(|a| a.name() == array.name()) {
            Some(slot) => *slot = array,
            None => self.arrays.push(array),
        }
        self.data_version.touch();
        Ok(())
    }

    /// Builder-style variant of [`Volume::set_array`].
    pub fn with_array(mut self, array: ComponentArray) -> Result<Self> {
        self.set_array(array)?;
        Ok(self)
    }

    /// Look up an array by name.
    pub fn array(&self, name: &str) -> Result<&ComponentArray> {
        self.arrays
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| Error::UnknownArray(name.to_string()))
    }

    /// All arrays in insertion order.
    pub fn arrays(&self) -> &[ComponentArray] {
        &self.arrays
    }

    /// Index-space extent.
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// World position of index (0, 0, 0).
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// World distance between neighboring points.
    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    /// World-space bounds of the point extent.
    pub fn bounds(&self) -> Aabb {
        Aabb::from_extent(&self.extent, self.origin, self.spacing)
    }

    /// Version of the most recent data change.
    pub fn data_version(&self) -> Version {
        self.data_version
    }

    /// Mark array contents as changed without replacing them.
    pub fn mark_modified(&mut self) {
        self.data_version.touch();
    }
}
