//! Per-volume appearance: transfer functions per component.

use volstream_core::constants::MAX_COMPONENTS;

use crate::transfer_function::{ColorTransferFunction, PiecewiseFunction};

/// Transfer functions and settings of one component.
#[derive(Clone, Debug)]
struct ComponentAppearance {
    color: ColorTransferFunction,
    scalar_opacity: PiecewiseFunction,
    gradient_opacity: Option<PiecewiseFunction>,
    unit_distance: f32,
    weight: f32,
    range: Option<[f64; 2]>,
}

impl Default for ComponentAppearance {
    fn default() -> Self {
        Self {
            color: ColorTransferFunction::new(),
            scalar_opacity: PiecewiseFunction::new(),
            gradient_opacity: None,
            unit_distance: 1.0,
            weight: 1.0,
            range: None,
        }
    }
}

/// Appearance of a volume.
///
/// With independent components (the default) every component is classified
/// through its own functions. With dependent components the functions of
/// component 0 classify the whole tuple.
///
/// Component indices must be below [`MAX_COMPONENTS`]; larger indices panic.
#[derive(Clone, Debug)]
pub struct VolumeProperty {
    components: [ComponentAppearance; MAX_COMPONENTS],
    independent_components: bool,
}

impl Default for VolumeProperty {
    fn default() -> Self {
        Self {
            components: Default::default(),
            independent_components: true,
        }
    }
}

impl VolumeProperty {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn independent_components(&self) -> bool {
        self.independent_components
    }

    pub fn set_independent_components(&mut self, independent: bool) {
        self.independent_components = independent;
    }

    /// Index of the functions that classify `component`.
    pub fn table_index(&self, component: usize) -> usize {
        if self.independent_components {
            component
        } else {
            0
        }
    }

    /// Function indices in use for an array with `components` components.
    pub fn active_tables(&self, components: usize) -> std::ops::Range<usize> {
        if self.independent_components {
            0..components.min(MAX_COMPONENTS)
        } else {
            0..1
        }
    }

    pub fn color(&self, component: usize) -> &ColorTransferFunction {
        &self.components[component].color
    }

    pub fn color_mut(&mut self, component: usize) -> &mut ColorTransferFunction {
        &mut self.components[component].color
    }

    pub fn scalar_opacity(&self, component: usize) -> &PiecewiseFunction {
        &self.components[component].scalar_opacity
    }

    pub fn scalar_opacity_mut(&mut self, component: usize) -> &mut PiecewiseFunction {
        &mut self.components[component].scalar_opacity
    }

    /// Gradient-opacity function, if one is configured.
    pub fn gradient_opacity(&self, component: usize) -> Option<&PiecewiseFunction> {
        self.components[component].gradient_opacity.as_ref()
    }

    pub fn gradient_opacity_mut(&mut self, component: usize) -> Option<&mut PiecewiseFunction> {
        self.components[component].gradient_opacity.as_mut()
    }

    /// Enable or disable gradient opacity for a component.
    pub fn set_gradient_opacity(&mut self, component: usize, function: Option<PiecewiseFunction>) {
        self.components[component].gradient_opacity = function;
    }

    /// Distance over which the scalar opacity is defined, in world units.
    pub fn scalar_opacity_unit_distance(&self, component: usize) -> f32 {
        self.components[component].unit_distance
    }

    pub fn set_scalar_opacity_unit_distance(&mut self, component: usize, distance: f32) {
        self.components[component].unit_distance = distance;
    }

    /// Blend weight of a component in independent-component rendering.
    pub fn component_weight(&self, component: usize) -> f32 {
        self.components[component].weight
    }

    pub fn set_component_weight(&mut self, component: usize, weight: f32) {
        self.components[component].weight = weight;
    }

    /// Scalar range the tables of a component span, overriding the array's.
    pub fn range_override(&self, component: usize) -> Option<[f64; 2]> {
        self.components[component].range
    }

    pub fn set_range_override(&mut self, component: usize, range: Option<[f64; 2]>) {
        self.components[component].range = range;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependent_components_share_table_zero() {
        let mut property = VolumeProperty::new();
        assert_eq!(property.table_index(2), 2);
        assert_eq!(property.active_tables(3), 0..3);
        property.set_independent_components(false);
        assert_eq!(property.table_index(2), 0);
        assert_eq!(property.active_tables(3), 0..1);
    }

    #[test]
    fn gradient_opacity_is_optional() {
        let mut property = VolumeProperty::new();
        assert!(property.gradient_opacity(0).is_none());
        property.set_gradient_opacity(0, Some(PiecewiseFunction::new()));
        assert!(property.gradient_opacity_mut(0).is_some());
        assert!(property.gradient_opacity(1).is_none());
    }
}
