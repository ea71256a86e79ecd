//! Static `Encode` / `Decode` for plain Rust types.
//!
//! The dynamic [`Codec`](crate::Codec) handles types only known at runtime;
//! these traits cover the fixed schema structures (metadata envelopes and
//! friends) whose shape is known at compile time.

use crate::compact::{decode_compact_bits, decode_length, encode_compact};
use crate::error::CodecError;
use crate::input::Input;

pub trait Encode {
    fn encode_to(&self, out: &mut Vec<u8>);

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_to(&mut out);
        out
    }
}

pub trait Decode: Sized {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError>;

    /// Decode `bytes`, failing if anything is left over.
    fn decode_all(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut input = Input::new(bytes);
        let value = Self::decode(&mut input)?;
        input.finish()?;
        Ok(value)
    }
}

/// A value carried in compact form on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Compact<T>(pub T);

macro_rules! impl_fixed_int {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode_to(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }

        impl Decode for $ty {
            fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
                Ok(<$ty>::from_le_bytes(input.read_array()?))
            }
        }

        impl Encode for Compact<$ty> {
            fn encode_to(&self, out: &mut Vec<u8>) {
                encode_compact(self.0 as u128, out);
            }
        }

        impl Decode for Compact<$ty> {
            fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
                let value = decode_compact_bits(input, <$ty>::BITS as u16)?;
                Ok(Compact(value as $ty))
            }
        }
    )*};
}

impl_fixed_int!(u8, u16, u32, u64, u128);

impl Encode for bool {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }
}

impl Decode for bool {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        match input.read_byte()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(CodecError::InvalidBool(b)),
        }
    }
}

impl Encode for str {
    fn encode_to(&self, out: &mut Vec<u8>) {
        encode_compact(self.len() as u128, out);
        out.extend_from_slice(self.as_bytes());
    }
}

impl Encode for String {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.as_str().encode_to(out);
    }
}

impl Decode for String {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        let len = decode_length(input)?;
        let bytes = input.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode_to(&self, out: &mut Vec<u8>) {
        encode_compact(self.len() as u128, out);
        for item in self {
            item.encode_to(out);
        }
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        let len = decode_length(input)?;
        // every element takes at least one byte
        if len > input.remaining() {
            return Err(CodecError::Truncated {
                needed: len,
                remaining: input.remaining(),
            });
        }
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(T::decode(input)?);
        }
        Ok(out)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode_to(&self, out: &mut Vec<u8>) {
        match self {
            None => out.push(0),
            Some(v) => {
                out.push(1);
                v.encode_to(out);
            }
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        match input.read_byte()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(input)?)),
            index => Err(CodecError::UnknownDiscriminant {
                ty: "Option".into(),
                index,
            }),
        }
    }
}

impl<A: Encode, B: Encode> Encode for (A, B) {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.0.encode_to(out);
        self.1.encode_to(out);
    }
}

impl<A: Decode, B: Decode> Decode for (A, B) {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        Ok((A::decode(input)?, B::decode(input)?))
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(input: &mut Input<'_>) -> Result<Self, CodecError> {
        input.read_array()
    }
}

/// Implement [`Encode`] and [`Decode`] for a struct by encoding its fields
/// in the listed order.
#[macro_export]
macro_rules! scale_struct {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::Encode for $ty {
            fn encode_to(&self, out: &mut Vec<u8>) {
                $( $crate::Encode::encode_to(&self.$field, out); )*
            }
        }

        impl $crate::Decode for $ty {
            fn decode(input: &mut $crate::Input<'_>) -> Result<Self, $crate::CodecError> {
                Ok(Self {
                    $( $field: $crate::Decode::decode(input)?, )*
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Entry {
        name: String,
        index: u8,
        docs: Vec<String>,
        weight: Option<Compact<u64>>,
    }

    crate::scale_struct!(Entry { name, index, docs, weight });

    #[test]
    fn struct_fields_encode_in_order() {
        let entry = Entry {
            name: "Balances".into(),
            index: 5,
            docs: vec!["doc".into()],
            weight: Some(Compact(1)),
        };
        let bytes = entry.encode();
        assert_eq!(&bytes[..9], b"\x20Balances");
        assert_eq!(bytes[9], 5);
        assert_eq!(Entry::decode_all(&bytes).unwrap(), entry);
    }

    #[test]
    fn compact_respects_target_width() {
        let bytes = Compact(300u32).encode();
        assert!(matches!(
            Compact::<u8>::decode_all(&bytes),
            Err(CodecError::CompactOverflow { bits: 8 })
        ));
        assert_eq!(Compact::<u16>::decode_all(&bytes).unwrap(), Compact(300));
    }

    #[test]
    fn rejects_invalid_bool_and_option_tags() {
        assert_eq!(bool::decode_all(&[2]), Err(CodecError::InvalidBool(2)));
        assert!(matches!(
            Option::<u8>::decode_all(&[3, 0]),
            Err(CodecError::UnknownDiscriminant { index: 3, .. })
        ));
    }

    #[test]
    fn oversized_vec_length_fails_before_allocating() {
        let mut bytes = Vec::new();
        encode_compact(1 << 40, &mut bytes);
        assert!(matches!(
            Vec::<u32>::decode_all(&bytes),
            Err(CodecError::Truncated { .. })
        ));
    }
}
