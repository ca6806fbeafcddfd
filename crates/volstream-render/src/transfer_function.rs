//! Piecewise-linear transfer functions.
//!
//! Both function kinds keep their nodes sorted by scalar value and evaluate
//! by linear interpolation, clamping to the end nodes outside their span.
//! Every edit advances the function's [`Version`].

use volstream_core::Version;

/// A function that can be resampled into a lookup table.
pub trait TransferFunction {
    /// Values produced per sample.
    fn channels(&self) -> usize;

    /// Version of the last edit.
    fn version(&self) -> Version;

    /// Number of nodes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Smallest distance between two neighboring nodes, if there are two.
    fn min_node_spacing(&self) -> Option<f64>;

    /// Evaluate at `width` evenly spaced positions spanning `range`, writing
    /// `channels()` values per sample into `out`.
    fn sample_into(&self, range: [f64; 2], width: usize, out: &mut [f32]);
}

fn insert_node<T>(nodes: &mut Vec<(f64, T)>, x: f64, value: T) {
    match nodes.binary_search_by(|(nx, _)| nx.total_cmp(&x)) {
        Ok(i) => nodes[i].1 = value,
        Err(i) => nodes.insert(i, (x, value)),
    }
}

fn min_spacing<T>(nodes: &[(f64, T)]) -> Option<f64> {
    nodes
        .windows(2)
        .map(|w| w[1].0 - w[0].0)
        .filter(|&d| d > 0.0)
        .min_by(f64::total_cmp)
}

/// Locate `x` among the nodes: the two neighbors and the blend weight.
fn bracket<T>(nodes: &[(f64, T)], x: f64) -> Option<(usize, usize, f64)> {
    let last = nodes.len().checked_sub(1)?;
    if x <= nodes[0].0 {
        return Some((0, 0, 0.0));
    }
    if x >= nodes[last].0 {
        return Some((last, last, 0.0));
    }
    let hi = nodes.partition_point(|(nx, _)| *nx <= x);
    let lo = hi - 1;
    let span = nodes[hi].0 - nodes[lo].0;
    let t = if span > 0.0 {
        (x - nodes[lo].0) / span
    } else {
        0.0
    };
    Some((lo, hi, t))
}

fn sample_position(range: [f64; 2], width: usize, i: usize) -> f64 {
    if width <= 1 {
        return range[0];
    }
    range[0] + (range[1] - range[0]) * i as f64 / (width - 1) as f64
}

/// Scalar value to RGB color.
#[derive(Clone, Debug)]
pub struct ColorTransferFunction {
    nodes: Vec<(f64, [f64; 3])>,
    version: Version,
}

impl Default for ColorTransferFunction {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            version: Version::next(),
        }
    }
}

impl ColorTransferFunction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, replacing any node at the same value.
    pub fn add_point(&mut self, x: f64, rgb: [f64; 3]) {
        insert_node(&mut self.nodes, x, rgb);
        self.version.touch();
    }

    pub fn remove_all_points(&mut self) {
        self.nodes.clear();
        self.version.touch();
    }

    /// Nodes in increasing value order.
    pub fn nodes(&self) -> &[(f64, [f64; 3])] {
        &self.nodes
    }

    /// Populate an empty function with a black-to-white ramp over `range`.
    ///
    /// Returns whether nodes were added.
    pub fn ensure_default(&mut self, range: [f64; 2]) -> bool {
        if !self.nodes.is_empty() {
            return false;
        }
        self.add_point(range[0], [0.0; 3]);
        self.add_point(range[1], [1.0; 3]);
        true
    }

    /// Color at `x`; black when the function has no nodes.
    pub fn color(&self, x: f64) -> [f64; 3] {
        let Some((lo, hi, t)) = bracket(&self.nodes, x) else {
            return [0.0; 3];
        };
        let (a, b) = (self.nodes[lo].1, self.nodes[hi].1);
        [
            (b[0] - a[0]).mul_add(t, a[0]),
            (b[1] - a[1]).mul_add(t, a[1]),
            (b[2] - a[2]).mul_add(t, a[2]),
        ]
    }
}

impl TransferFunction for ColorTransferFunction {
    /// RGBA texels with opaque alpha.
    fn channels(&self) -> usize {
        4
    }

    fn version(&self) -> Version {
        self.version
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn min_node_spacing(&self) -> Option<f64> {
        min_spacing(&self.nodes)
    }

    fn sample_into(&self, range: [f64; 2], width: usize, out: &mut [f32]) {
        for (i, texel) in out.chunks_exact_mut(4).take(width).enumerate() {
            let [r, g, b] = self.color(sample_position(range, width, i));
            texel.copy_from_slice(&[r as f32, g as f32, b as f32, 1.0]);
        }
    }
}

/// Scalar value to a single value, used for opacities.
#[derive(Clone, Debug)]
pub struct PiecewiseFunction {
    nodes: Vec<(f64, f64)>,
    version: Version,
}

impl Default for PiecewiseFunction {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            version: Version::next(),
        }
    }
}

impl PiecewiseFunction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, replacing any node at the same value.
    pub fn add_point(&mut self, x: f64, y: f64) {
        insert_node(&mut self.nodes, x, y);
        self.version.touch();
    }

    pub fn remove_all_points(&mut self) {
        self.nodes.clear();
        self.version.touch();
    }

    /// Nodes in increasing value order.
    pub fn nodes(&self) -> &[(f64, f64)] {
        &self.nodes
    }

    /// Populate an empty function with a ramp from 0 to 0.5 over `range`.
    ///
    /// Returns whether nodes were added.
    pub fn ensure_default(&mut self, range: [f64; 2]) -> bool {
        if !self.nodes.is_empty() {
            return false;
        }
        self.add_point(range[0], 0.0);
        self.add_point(range[1], 0.5);
        true
    }

    /// Value at `x`; zero when the function has no nodes.
    pub fn value(&self, x: f64) -> f64 {
        bracket(&self.nodes, x).map_or(0.0, |(lo, hi, t)| {
            let (a, b) = (self.nodes[lo].1, self.nodes[hi].1);
            (b - a).mul_add(t, a)
        })
    }
}

impl TransferFunction for PiecewiseFunction {
    fn channels(&self) -> usize {
        1
    }

    fn version(&self) -> Version {
        self.version
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn min_node_spacing(&self) -> Option<f64> {
        min_spacing(&self.nodes)
    }

    fn sample_into(&self, range: [f64; 2], width: usize, out: &mut [f32]) {
        for (i, value) in out.iter_mut().take(width).enumerate() {
            *value = self.value(sample_position(range, width, i)) as f32;
        }
    }
}
