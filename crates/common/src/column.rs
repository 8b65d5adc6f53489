//! The column-type registry: a closed set of column kinds, each carrying its
//! own ordinal, element width, and (de)serializer into/out of a byte span.
//!
//! The source system resolves this mapping by reflection at runtime; here it
//! is a closed sum expressed as a trait plus a handful of concrete kinds,
//! monomorphized into each column file at compile time rather than boxed.

/// A column kind: fixed-width scalar, fixed-width vector, or (for variable
/// columns only) a dynamically-sized byte blob.
pub trait ColumnType: Copy + Send + Sync + 'static {
    /// The Rust value this column stores, read from / written to the page.
    type Value: Clone + PartialEq + Send + Sync;

    /// Stable ordinal persisted in the column header.
    fn ordinal(&self) -> u32;

    /// Element count for vector types, or `-1` for scalars.
    fn logical_size(&self) -> i32;

    /// Width in bytes of a single element (the whole value, for scalars).
    fn element_width(&self) -> usize;

    /// Width in bytes of the full physical value (fixed columns only; for
    /// variable columns see [`ColumnType::encoded_len`]).
    fn physical_width(&self) -> usize {
        match self.logical_size() {
            n if n > 0 => n as usize * self.element_width(),
            _ => self.element_width(),
        }
    }

    /// Length in bytes this particular value will occupy once encoded.
    /// Equal to [`ColumnType::physical_width`] for every fixed-width kind;
    /// overridden by variable-length kinds such as [`Bytes`].
    fn encoded_len(&self, value: &Self::Value) -> usize {
        self.physical_width()
    }

    /// Encodes `value` into `out`, which is exactly `encoded_len(value)` bytes.
    fn encode(&self, value: &Self::Value, out: &mut [u8]);

    /// Decodes a value previously written by [`ColumnType::encode`].
    fn decode(&self, buf: &[u8]) -> Self::Value;
}

macro_rules! scalar_column {
    ($name:ident, $ordinal:expr, $ty:ty, $width:expr, $to_bytes:ident, $from_bytes:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name;

        impl ColumnType for $name {
            type Value = $ty;

            fn ordinal(&self) -> u32 {
                $ordinal
            }

            fn logical_size(&self) -> i32 {
                -1
            }

            fn element_width(&self) -> usize {
                $width
            }

            fn encode(&self, value: &Self::Value, out: &mut [u8]) {
                out.copy_from_slice(&value.$to_bytes());
            }

            fn decode(&self, buf: &[u8]) -> Self::Value {
                let mut array = [0u8; $width];
                array.copy_from_slice(buf);
                <$ty>::$from_bytes(array)
            }
        }
    };
}

scalar_column!(I32Scalar, 1, i32, 4, to_le_bytes, from_le_bytes);
scalar_column!(I64Scalar, 2, i64, 8, to_le_bytes, from_le_bytes);
scalar_column!(F32Scalar, 3, f32, 4, to_le_bytes, from_le_bytes);
scalar_column!(F64Scalar, 4, f64, 8, to_le_bytes, from_le_bytes);

/// Fixed-dimension vector of `f32` elements (e.g. embeddings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct F32Vector {
    pub dims: u32,
}

impl ColumnType for F32Vector {
    type Value = Vec<f32>;

    fn ordinal(&self) -> u32 {
        5
    }

    fn logical_size(&self) -> i32 {
        self.dims as i32
    }

    fn element_width(&self) -> usize {
        4
    }

    fn encode(&self, value: &Self::Value, out: &mut [u8]) {
        debug_assert_eq!(value.len(), self.dims as usize);
        for (chunk, v) in out.chunks_exact_mut(4).zip(value.iter()) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
    }

    fn decode(&self, buf: &[u8]) -> Self::Value {
        buf.chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }
}

/// Fixed-dimension vector of `f64` elements (e.g. embeddings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct F64Vector {
    pub dims: u32,
}

impl ColumnType for F64Vector {
    type Value = Vec<f64>;

    fn ordinal(&self) -> u32 {
        6
    }

    fn logical_size(&self) -> i32 {
        self.dims as i32
    }

    fn element_width(&self) -> usize {
        8
    }

    fn encode(&self, value: &Self::Value, out: &mut [u8]) {
        debug_assert_eq!(value.len(), self.dims as usize);
        for (chunk, v) in out.chunks_exact_mut(8).zip(value.iter()) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
    }

    fn decode(&self, buf: &[u8]) -> Self::Value {
        buf.chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }
}

/// Variable-length opaque byte blob. Only meaningful in a variable column
/// file; a fixed column file built on this kind would have no sensible
/// constant stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bytes;

impl ColumnType for Bytes {
    type Value = Vec<u8>;

    fn ordinal(&self) -> u32 {
        7
    }

    fn logical_size(&self) -> i32 {
        -1
    }

    fn element_width(&self) -> usize {
        1
    }

    fn physical_width(&self) -> usize {
        0
    }

    fn encoded_len(&self, value: &Self::Value) -> usize {
        value.len()
    }

    fn encode(&self, value: &Self::Value, out: &mut [u8]) {
        out.copy_from_slice(value);
    }

    fn decode(&self, buf: &[u8]) -> Self::Value {
        buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        let col = F64Scalar;
        let mut buf = [0u8; 8];
        col.encode(&3.5, &mut buf);
        assert_eq!(col.decode(&buf), 3.5);
    }

    #[test]
    fn vector_round_trip() {
        let col = F32Vector { dims: 3 };
        let mut buf = vec![0u8; col.physical_width()];
        let value = vec![1.0, 2.0, 3.0];
        col.encode(&value, &mut buf);
        assert_eq!(col.decode(&buf), value);
    }

    #[test]
    fn bytes_encoded_len_tracks_value() {
        let col = Bytes;
        let value = vec![1u8, 2, 3, 4, 5];
        assert_eq!(col.encoded_len(&value), 5);
    }
}
