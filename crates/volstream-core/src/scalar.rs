//! Scalar element types and typed storage.

use serde::{Deserialize, Serialize};

/// Element type of a component array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl ScalarType {
    /// Size of one element in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }

    /// Returns true for signed integer types.
    pub const fn is_signed_integer(self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Returns true for floating-point types.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Lowercase type name, used in log output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::I8 => "i8",
            Self::U16 => "u16",
            Self::I16 => "i16",
            Self::U32 => "u32",
            Self::I32 => "i32",
            Self::U64 => "u64",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }

    /// Parse a name produced by [`ScalarType::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "u8" => Self::U8,
            "i8" => Self::I8,
            "u16" => Self::U16,
            "i16" => Self::I16,
            "u32" => Self::U32,
            "i32" => Self::I32,
            "u64" => Self::U64,
            "i64" => Self::I64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            _ => return None,
        })
    }
}

/// Flat, tuple-interleaved element storage.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarData {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! dispatch {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            ScalarData::U8($v) => $body,
            ScalarData::I8($v) => $body,
            ScalarData::U16($v) => $body,
            ScalarData::I16($v) => $body,
            ScalarData::U32($v) => $body,
            ScalarData::I32($v) => $body,
            ScalarData::U64($v) => $body,
            ScalarData::I64($v) => $body,
            ScalarData::F32($v) => $body,
            ScalarData::F64($v) => $body,
        }
    };
}

impl ScalarData {
    /// Element type of the storage.
    pub const fn scalar_type(&self) -> ScalarType {
        match self {
            Self::U8(_) => ScalarType::U8,
            Self::I8(_) => ScalarType::I8,
            Self::U16(_) => ScalarType::U16,
            Self::I16(_) => ScalarType::I16,
            Self::U32(_) => ScalarType::U32,
            Self::I32(_) => ScalarType::I32,
            Self::U64(_) => ScalarType::U64,
            Self::I64(_) => ScalarType::I64,
            Self::F32(_) => ScalarType::F32,
            Self::F64(_) => ScalarType::F64,
        }
    }

    /// Number of elements (not tuples).
    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    /// Returns true if no elements are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw little-endian bytes of the storage, for direct texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        dispatch!(self, v => bytemuck::cast_slice(v.as_slice()))
    }

    /// Element at `index` widened to `f64`.
    #[inline]
    pub fn get_f64(&self, index: usize) -> f64 {
        dispatch!(self, v => v[index] as f64)
    }

    /// Widen the contiguous run starting at `start` into `out`.
    ///
    /// Panics if the run extends past the end of the storage.
    pub fn read_f64(&self, start: usize, out: &mut [f64]) {
        let len = out.len();
        dispatch!(self, v => {
            for (dst, src) in out.iter_mut().zip(&v[start..start + len]) {
                *dst = *src as f64;
            }
        })
    }

    /// Finite `[min, max]` of every `stride`-th element starting at `offset`.
    ///
    /// Non-finite values are skipped; returns `None` if nothing finite remains.
    pub fn finite_range(&self, offset: usize, stride: usize) -> Option<[f64; 2]> {
        let mut range: Option<[f64; 2]> = None;
        let mut i = offset;
        while i < self.len() {
            let value = self.get_f64(i);
            if value.is_finite() {
                range = Some(match range {
                    Some([lo, hi]) => [lo.min(value), hi.max(value)],
                    None => [value, value],
                });
            }
            i += stride;
        }
        range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_view_matches_element_size() {
        let data = ScalarData::U16(vec![1, 2, 3]);
        assert_eq!(data.as_bytes().len(), 3 * ScalarType::U16.size_bytes());
        assert_eq!(data.scalar_type(), ScalarType::U16);
    }

    #[test]
    fn type_names_parse_back() {
        assert_eq!(ScalarType::from_name(ScalarType::I16.name()), Some(ScalarType::I16));
        assert_eq!(ScalarType::from_name("half"), None);
    }

    #[test]
    fn finite_range_skips_nan_and_inf() {
        let data = ScalarData::F32(vec![f32::NAN, 2.0, -1.0, f32::INFINITY, 5.0]);
        assert_eq!(data.finite_range(0, 1), Some([-1.0, 5.0]));
    }

    #[test]
    fn finite_range_per_component() {
        // Two interleaved components
        let data = ScalarData::I16(vec![0, 100, -5, 200, 7, 150]);
        assert_eq!(data.finite_range(0, 2), Some([-5.0, 7.0]));
        assert_eq!(data.finite_range(1, 2), Some([100.0, 200.0]));
    }

    #[test]
    fn read_run_widens_to_f64() {
        let data = ScalarData::I64(vec![-4, 8, 15, 16, 23]);
        let mut out = [0.0; 3];
        data.read_f64(1, &mut out);
        assert_eq!(out, [8.0, 15.0, 16.0]);
    }

    #[test]
    fn all_nan_has_no_range() {
        let data = ScalarData::F64(vec![f64::NAN; 4]);
        assert_eq!(data.finite_range(0, 1), None);
    }
}
