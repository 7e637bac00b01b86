// Distributed under The MIT License (MIT)
//
// Copyright (c) 2019 The `image-rs` developers
use core::{fmt, ops, str::FromStr};

/// The closed set of sample kinds an image can store.
///
/// Every image carries exactly one of these tags. Generic code is instantiated for a concrete
/// sample type by matching on the tag, see [`dispatch!`](crate::dispatch!) and
/// [`DataType::dispatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataType {
    /// A binary sample, stored in one byte as `0` or `1`.
    Bin = 0,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    SInt8,
    SInt16,
    SInt32,
    SInt64,
    /// An IEEE single precision float.
    SFloat,
    /// An IEEE double precision float.
    DFloat,
    /// A pair of single precision floats, real part first.
    SComplex,
    /// A pair of double precision floats, real part first.
    DComplex,
}

/// A raw tag or a name that does not denote any [`DataType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown data type")]
pub struct UnknownDataType {
    _private: (),
}

impl DataType {
    /// All data types, ordered by their tag.
    pub const ALL: [DataType; 13] = [
        DataType::Bin,
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
        DataType::SInt8,
        DataType::SInt16,
        DataType::SInt32,
        DataType::SInt64,
        DataType::SFloat,
        DataType::DFloat,
        DataType::SComplex,
        DataType::DComplex,
    ];

    /// The number of bytes occupied by one sample.
    pub const fn size_of(self) -> usize {
        use DataType::*;
        match self {
            Bin | UInt8 | SInt8 => 1,
            UInt16 | SInt16 => 2,
            UInt32 | SInt32 | SFloat => 4,
            UInt64 | SInt64 | DFloat | SComplex => 8,
            DComplex => 16,
        }
    }

    /// The canonical upper-case name, as accepted by `FromStr`.
    pub const fn name(self) -> &'static str {
        use DataType::*;
        match self {
            Bin => "BIN",
            UInt8 => "UINT8",
            UInt16 => "UINT16",
            UInt32 => "UINT32",
            UInt64 => "UINT64",
            SInt8 => "SINT8",
            SInt16 => "SINT16",
            SInt32 => "SINT32",
            SInt64 => "SINT64",
            SFloat => "SFLOAT",
            DFloat => "DFLOAT",
            SComplex => "SCOMPLEX",
            DComplex => "DCOMPLEX",
        }
    }

    pub const fn is_binary(self) -> bool {
        matches!(self, DataType::Bin)
    }

    pub const fn is_unsigned(self) -> bool {
        use DataType::*;
        matches!(self, UInt8 | UInt16 | UInt32 | UInt64)
    }

    pub const fn is_signed_integer(self) -> bool {
        use DataType::*;
        matches!(self, SInt8 | SInt16 | SInt32 | SInt64)
    }

    pub const fn is_integer(self) -> bool {
        self.is_unsigned() || self.is_signed_integer()
    }

    pub const fn is_float(self) -> bool {
        matches!(self, DataType::SFloat | DataType::DFloat)
    }

    pub const fn is_complex(self) -> bool {
        matches!(self, DataType::SComplex | DataType::DComplex)
    }

    /// Floats and complex types, the types that can hold fractional values.
    pub const fn is_flex(self) -> bool {
        self.is_float() || self.is_complex()
    }

    /// Everything except the complex types.
    pub const fn is_real(self) -> bool {
        !self.is_complex()
    }

    /// Types that can represent negative values.
    pub const fn is_signed(self) -> bool {
        self.is_signed_integer() || self.is_flex()
    }

    /// The smallest value representable by the type.
    ///
    /// For complex types this is the range of each of the two components.
    pub fn min_value(self) -> f64 {
        use DataType::*;
        match self {
            Bin | UInt8 | UInt16 | UInt32 | UInt64 => 0.0,
            SInt8 => i8::MIN.into(),
            SInt16 => i16::MIN.into(),
            SInt32 => i32::MIN.into(),
            SInt64 => i64::MIN as f64,
            SFloat | SComplex => f32::MIN.into(),
            DFloat | DComplex => f64::MIN,
        }
    }

    /// The largest value representable by the type.
    pub fn max_value(self) -> f64 {
        use DataType::*;
        match self {
            Bin => 1.0,
            UInt8 => u8::MAX.into(),
            UInt16 => u16::MAX.into(),
            UInt32 => u32::MAX.into(),
            UInt64 => u64::MAX as f64,
            SInt8 => i8::MAX.into(),
            SInt16 => i16::MAX.into(),
            SInt32 => i32::MAX.into(),
            SInt64 => i64::MAX as f64,
            SFloat | SComplex => f32::MAX.into(),
            DFloat | DComplex => f64::MAX,
        }
    }

    /// Integers of 32 bits and wider, and double precision types, need double precision to be
    /// represented by a float.
    const fn needs_double(self) -> bool {
        use DataType::*;
        matches!(
            self,
            UInt32 | SInt32 | UInt64 | SInt64 | DFloat | DComplex
        )
    }

    /// The real type matching a complex one; other types are returned unchanged.
    pub const fn real(self) -> DataType {
        match self {
            DataType::SComplex => DataType::SFloat,
            DataType::DComplex => DataType::DFloat,
            other => other,
        }
    }

    /// A float type able to hold the values of `self`.
    pub const fn suggest_float(self) -> DataType {
        if self.needs_double() {
            DataType::DFloat
        } else {
            DataType::SFloat
        }
    }

    /// A complex type able to hold the values of `self`.
    pub const fn suggest_complex(self) -> DataType {
        if self.needs_double() {
            DataType::DComplex
        } else {
            DataType::SComplex
        }
    }

    /// Complex types stay, everything else maps to a float.
    pub const fn suggest_flex(self) -> DataType {
        if self.is_complex() {
            self
        } else {
            self.suggest_float()
        }
    }

    /// Like [`DataType::suggest_flex`] but binary stays binary.
    pub const fn suggest_flex_bin(self) -> DataType {
        if self.is_binary() {
            self
        } else {
            self.suggest_flex()
        }
    }

    /// Integer types stay, other types map to an integer type of similar capacity.
    pub const fn suggest_integer(self) -> DataType {
        use DataType::*;
        match self {
            Bin => UInt8,
            SFloat | SComplex => SInt32,
            DFloat | DComplex => SInt64,
            other => other,
        }
    }

    /// A type that can represent negative values and all values of `self`.
    ///
    /// `UInt64` maps to `SInt64`, the only signed type that comes close.
    pub const fn suggest_signed(self) -> DataType {
        use DataType::*;
        match self {
            Bin => SInt8,
            UInt8 => SInt16,
            UInt16 => SInt32,
            UInt32 | UInt64 => SInt64,
            other => other,
        }
    }

    /// Complex types map to their real counterpart.
    pub const fn suggest_real(self) -> DataType {
        self.real()
    }

    /// The type to use for the result of arithmetic between samples of `a` and `b`.
    ///
    /// Complex dominates float, float dominates the integers. Two integer types promote to a
    /// common integer type whose range contains both, doubling the width of the unsigned operand
    /// when the signedness differs. Binary acts as a one bit unsigned integer. Where no integer
    /// type is wide enough (`UInt64` with a signed type) the result is `DFloat`.
    pub const fn suggest_arithmetic(a: DataType, b: DataType) -> DataType {
        use DataType::*;
        if a.is_complex() || b.is_complex() {
            return if a.needs_double() || b.needs_double() {
                DComplex
            } else {
                SComplex
            };
        }

        if a.is_float() || b.is_float() {
            return if a.needs_double() || b.needs_double() {
                DFloat
            } else {
                SFloat
            };
        }

        match (a, b) {
            (Bin, other) | (other, Bin) => other,
            _ => Self::common_integer(a, b),
        }
    }

    /// The result type of a dyadic operation: identical operand types are kept as they are.
    pub const fn suggest_dyadic_operation(a: DataType, b: DataType) -> DataType {
        if a as u8 == b as u8 {
            a
        } else {
            Self::suggest_arithmetic(a, b)
        }
    }

    const fn integer_bits(self) -> u32 {
        (self.size_of() * 8) as u32
    }

    const fn signed_with_bits(bits: u32) -> Option<DataType> {
        match bits {
            8 => Some(DataType::SInt8),
            16 => Some(DataType::SInt16),
            32 => Some(DataType::SInt32),
            64 => Some(DataType::SInt64),
            _ => None,
        }
    }

    const fn common_integer(a: DataType, b: DataType) -> DataType {
        let wider = if a.integer_bits() >= b.integer_bits() {
            a
        } else {
            b
        };

        if a.is_unsigned() == b.is_unsigned() {
            return wider;
        }

        let (unsigned, signed) = if a.is_unsigned() { (a, b) } else { (b, a) };
        if signed.integer_bits() > unsigned.integer_bits() {
            return signed;
        }

        match Self::signed_with_bits(unsigned.integer_bits() * 2) {
            Some(ty) => ty,
            None => DataType::DFloat,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = UnknownDataType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|ty| ty.name().eq_ignore_ascii_case(s))
            .ok_or(UnknownDataType { _private: () })
    }
}

impl TryFrom<u8> for DataType {
    type Error = UnknownDataType;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        DataType::ALL
            .get(usize::from(tag))
            .copied()
            .ok_or(UnknownDataType { _private: () })
    }
}

/// A set of data types, used to restrict which types an operation accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct DataTypeSet(u16);

impl DataTypeSet {
    pub const EMPTY: Self = DataTypeSet(0);
    pub const BINARY: Self = Self::of(&[DataType::Bin]);
    pub const UNSIGNED: Self = Self::of(&[
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
    ]);
    pub const SIGNED: Self = Self::of(&[
        DataType::SInt8,
        DataType::SInt16,
        DataType::SInt32,
        DataType::SInt64,
    ]);
    pub const INTEGER: Self = Self::UNSIGNED.union(Self::SIGNED);
    pub const FLOAT: Self = Self::of(&[DataType::SFloat, DataType::DFloat]);
    pub const COMPLEX: Self = Self::of(&[DataType::SComplex, DataType::DComplex]);
    pub const FLEX: Self = Self::FLOAT.union(Self::COMPLEX);
    pub const REAL: Self = Self::BINARY.union(Self::INTEGER).union(Self::FLOAT);
    pub const NON_COMPLEX: Self = Self::REAL;
    pub const NON_BINARY: Self = Self::INTEGER.union(Self::FLEX);
    pub const ALL: Self = Self::BINARY.union(Self::NON_BINARY);

    /// Build a set from a list of types.
    pub const fn of(types: &[DataType]) -> Self {
        let mut bits = 0u16;
        let mut idx = 0;
        while idx < types.len() {
            bits |= 1 << types[idx] as u8;
            idx += 1;
        }
        DataTypeSet(bits)
    }

    pub const fn union(self, other: Self) -> Self {
        DataTypeSet(self.0 | other.0)
    }

    pub const fn contains(self, ty: DataType) -> bool {
        self.0 & (1 << ty as u8) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate the members, in tag order.
    pub fn iter(self) -> impl Iterator<Item = DataType> {
        DataType::ALL.into_iter().filter(move |&ty| self.contains(ty))
    }
}

impl ops::BitOr for DataTypeSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl From<DataType> for DataTypeSet {
    fn from(ty: DataType) -> Self {
        DataTypeSet::of(&[ty])
    }
}

#[cfg(test)]
mod tests {
    use super::{DataType, DataTypeSet};

    #[test]
    fn sizes_and_names() {
        assert_eq!(DataType::Bin.size_of(), 1);
        assert_eq!(DataType::SComplex.size_of(), 8);
        assert_eq!(DataType::DComplex.size_of(), 16);

        for ty in DataType::ALL {
            assert_eq!(ty.name().parse::<DataType>(), Ok(ty));
            assert_eq!(DataType::try_from(ty as u8), Ok(ty));
        }

        assert!("uint8".parse::<DataType>().is_ok());
        assert!("UINT128".parse::<DataType>().is_err());
        assert!(DataType::try_from(13u8).is_err());
    }

    #[test]
    fn arithmetic_is_commutative() {
        for a in DataType::ALL {
            for b in DataType::ALL {
                assert_eq!(
                    DataType::suggest_arithmetic(a, b),
                    DataType::suggest_arithmetic(b, a),
                    "{a} with {b}"
                );
            }
        }
    }

    #[test]
    fn arithmetic_contains_operand_ranges() {
        for a in DataType::ALL {
            for b in DataType::ALL {
                let result = DataType::suggest_arithmetic(a, b);
                assert!(result.min_value() <= a.min_value().min(b.min_value()));
                assert!(result.max_value() >= a.max_value().max(b.max_value()));
                if a.is_complex() || b.is_complex() {
                    assert!(result.is_complex(), "{a} with {b} dropped the imaginary part");
                }
            }
        }
    }

    #[test]
    fn arithmetic_promotions() {
        use DataType::*;
        assert_eq!(DataType::suggest_arithmetic(Bin, Bin), Bin);
        assert_eq!(DataType::suggest_arithmetic(Bin, UInt16), UInt16);
        assert_eq!(DataType::suggest_arithmetic(UInt8, UInt16), UInt16);
        assert_eq!(DataType::suggest_arithmetic(UInt8, SInt8), SInt16);
        assert_eq!(DataType::suggest_arithmetic(UInt8, SInt16), SInt16);
        assert_eq!(DataType::suggest_arithmetic(UInt32, SInt8), SInt64);
        assert_eq!(DataType::suggest_arithmetic(UInt64, SInt8), DFloat);
        assert_eq!(DataType::suggest_arithmetic(UInt8, SFloat), SFloat);
        assert_eq!(DataType::suggest_arithmetic(SInt32, SFloat), DFloat);
        assert_eq!(DataType::suggest_arithmetic(SComplex, DFloat), DComplex);
        assert_eq!(DataType::suggest_arithmetic(SComplex, UInt8), SComplex);
        assert_eq!(DataType::suggest_dyadic_operation(UInt8, UInt8), UInt8);
    }

    #[test]
    fn sets() {
        assert!(DataTypeSet::REAL.contains(DataType::Bin));
        assert!(!DataTypeSet::REAL.contains(DataType::SComplex));
        assert!(DataTypeSet::FLEX.contains(DataType::DComplex));
        assert_eq!(DataTypeSet::ALL.iter().count(), 13);
        assert_eq!(DataTypeSet::INTEGER.iter().count(), 8);
        assert_eq!(
            DataTypeSet::from(DataType::UInt8) | DataTypeSet::from(DataType::SInt8),
            DataTypeSet::of(&[DataType::UInt8, DataType::SInt8])
        );
    }
}
