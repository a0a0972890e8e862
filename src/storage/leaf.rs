#![forbid(unsafe_code)]

//! Decoded, contiguously indexable runs of column values.

use crate::types::Value;

/// Borrowed run of fixed-width values with an optional null map.
#[derive(Clone, Copy, Debug)]
pub struct Slab<'a, T> {
    /// Decoded values; null cells hold an unspecified placeholder.
    pub values: &'a [T],
    /// `true` marks a null cell. `None` means the run has no nulls.
    pub nulls: Option<&'a [bool]>,
}

impl<'a, T: Copy> Slab<'a, T> {
    /// Wraps a run without nulls.
    pub fn dense(values: &'a [T]) -> Self {
        Self {
            values,
            nulls: None,
        }
    }

    /// Number of cells in the run.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the run is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `i`, or `None` for a null cell.
    #[inline]
    pub fn get(&self, i: usize) -> Option<T> {
        match self.nulls {
            Some(nulls) if nulls[i] => None,
            _ => Some(self.values[i]),
        }
    }
}

/// One storage leaf: a segment of a larger paged column.
#[derive(Clone, Copy, Debug)]
pub enum Leaf<'a> {
    /// Integer-encoded values (int, bool, datetime).
    Int {
        /// Cell values.
        values: Slab<'a, i64>,
        /// Bits per element the leaf would need when packed (0 for all-zero leaves).
        bit_width: u8,
    },
    /// Single-precision values.
    Float(Slab<'a, f32>),
    /// Double-precision values.
    Double(Slab<'a, f64>),
    /// Plain strings.
    String(&'a [String]),
    /// Dictionary-coded strings; `codes[i]` indexes `keys`.
    StringEnum {
        /// Column-wide dictionary.
        keys: &'a [String],
        /// Per-row dictionary positions.
        codes: &'a [u32],
    },
    /// Byte blobs.
    Binary(&'a [Vec<u8>]),
    /// Raw single-link cells: `0` is unset, `n + 1` links to row `n`.
    Link(&'a [u64]),
}

impl<'a> Leaf<'a> {
    /// Number of rows covered by the leaf.
    pub fn len(&self) -> usize {
        match self {
            Leaf::Int { values, .. } => values.len(),
            Leaf::Float(values) => values.len(),
            Leaf::Double(values) => values.len(),
            Leaf::String(values) => values.len(),
            Leaf::StringEnum { codes, .. } => codes.len(),
            Leaf::Binary(values) => values.len(),
            Leaf::Link(values) => values.len(),
        }
    }

    /// Whether the leaf covers no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric value at leaf-relative position `i`; `None` for nulls and
    /// non-numeric leaves.
    #[inline]
    pub fn value(&self, i: usize) -> Option<Value> {
        match self {
            Leaf::Int { values, .. } => values.get(i).map(Value::Int),
            Leaf::Float(values) => values.get(i).map(Value::Float),
            Leaf::Double(values) => values.get(i).map(Value::Double),
            _ => None,
        }
    }

    /// String at leaf-relative position `i` for string leaves.
    #[inline]
    pub fn str_at(&self, i: usize) -> Option<&'a str> {
        match *self {
            Leaf::String(values) => Some(values[i].as_str()),
            Leaf::StringEnum { keys, codes } => Some(keys[codes[i] as usize].as_str()),
            _ => None,
        }
    }

    /// Bytes at leaf-relative position `i` for binary leaves.
    #[inline]
    pub fn bytes_at(&self, i: usize) -> Option<&'a [u8]> {
        match *self {
            Leaf::Binary(values) => Some(values[i].as_slice()),
            _ => None,
        }
    }
}

/// Packed width an adaptive-width integer array would use for `values`.
///
/// Widths step through 0, 1, 2, 4, 8, 16, 32 and 64 bits; negative values
/// force a signed width of at least 8.
pub fn bit_width(values: &[i64]) -> u8 {
    let (mut min, mut max) = (0i64, 0i64);
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }
    if min == 0 && max == 0 {
        return 0;
    }
    if min >= 0 {
        if max <= 1 {
            return 1;
        }
        if max <= 3 {
            return 2;
        }
        if max <= 15 {
            return 4;
        }
    }
    if min >= i8::MIN as i64 && max <= i8::MAX as i64 {
        8
    } else if min >= i16::MIN as i64 && max <= i16::MAX as i64 {
        16
    } else if min >= i32::MIN as i64 && max <= i32::MAX as i64 {
        32
    } else {
        64
    }
}
