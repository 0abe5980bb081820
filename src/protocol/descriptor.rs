//! The field-descriptor byte: a single byte packing a value's type class,
//! array shape, and sub-type.
//!
//! The bit-packing technique mirrors packing a protocol version and two
//! capability flags into one `u32`, as an auth handshake command might; here
//! the same idea applies to a single `u8`.

use super::error::ProtocolError;

/// The coarse type class occupying the top three bits of a descriptor byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TypeClass {
    /// A boolean.
    Bool,
    /// A signed or unsigned integer of some width.
    Integer,
    /// A 32- or 64-bit float.
    Float,
    /// A UTF-8 string, plain or bounded.
    String,
    /// A structure, union, variant union, or bounded string (legacy major).
    Complex,
}

/// The array shape occupying bits 4-3 of a descriptor byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArrayKind {
    /// A single value.
    Scalar,
    /// A variable-length array, size-prefixed on the wire.
    VarArray,
    /// An array bounded by a maximum size, itself size-prefixed.
    BoundedArray,
    /// A fixed-size array whose length is part of the type, not the wire value.
    FixedArray,
}

/// Integer width and signedness, valid when [`TypeClass::Integer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IntegerWidth {
    /// 8 bits.
    Byte,
    /// 16 bits.
    Short,
    /// 32 bits.
    Int,
    /// 64 bits.
    Long,
}

/// Float width, valid when [`TypeClass::Float`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FloatWidth {
    /// IEEE-754 binary32.
    Single,
    /// IEEE-754 binary64.
    Double,
}

/// The complex sub-kind, valid when [`TypeClass::Complex`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ComplexKind {
    /// A fixed-field-order aggregate.
    Structure,
    /// A tagged choice among a fixed set of field types.
    Union,
    /// A choice among any registered type, chosen at encode time.
    VariantUnion,
    /// A string bounded by a maximum length.
    BoundedString,
}

/// The decoded, typed meaning of a field-descriptor byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DataType {
    /// The coarse type class.
    pub class: TypeClass,
    /// The array shape.
    pub array: ArrayKind,
    /// Present when `class` is `Integer`.
    pub integer_width: Option<IntegerWidth>,
    /// Present when `class` is `Integer`: true if unsigned.
    pub unsigned: bool,
    /// Present when `class` is `Float`.
    pub float_width: Option<FloatWidth>,
    /// Present when `class` is `Complex`.
    pub complex_kind: Option<ComplexKind>,
}

impl DataType {
    /// Decodes a field-descriptor byte.
    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        let major = (byte >> 5) & 0b111;
        let array_bits = (byte >> 3) & 0b11;
        let sub = byte & 0b111;

        let array = match array_bits {
            0b00 => ArrayKind::Scalar,
            0b01 => ArrayKind::VarArray,
            0b10 => ArrayKind::BoundedArray,
            0b11 => ArrayKind::FixedArray,
            _ => unreachable!("2-bit field"),
        };

        let (class, integer_width, unsigned, float_width, complex_kind) = match major {
            0b000 => (TypeClass::Bool, None, false, None, None),
            0b001 => {
                let unsigned = sub & 0b100 != 0;
                let width = match sub & 0b011 {
                    0b00 => IntegerWidth::Byte,
                    0b01 => IntegerWidth::Short,
                    0b10 => IntegerWidth::Int,
                    0b11 => IntegerWidth::Long,
                    _ => unreachable!("2-bit field"),
                };
                (TypeClass::Integer, Some(width), unsigned, None, None)
            }
            0b010 => {
                let width = match sub {
                    0b010 => FloatWidth::Single,
                    0b011 => FloatWidth::Double,
                    _ => return Err(ProtocolError::InvalidFieldDescriptor(byte)),
                };
                (TypeClass::Float, None, false, Some(width), None)
            }
            0b011 => (TypeClass::String, None, false, None, None),
            0b100 => {
                let kind = match sub {
                    0b000 => ComplexKind::Structure,
                    0b001 => ComplexKind::Union,
                    0b010 => ComplexKind::VariantUnion,
                    0b011 => ComplexKind::BoundedString,
                    _ => return Err(ProtocolError::InvalidFieldDescriptor(byte)),
                };
                (TypeClass::Complex, None, false, None, Some(kind))
            }
            _ => return Err(ProtocolError::InvalidFieldDescriptor(byte)),
        };

        Ok(DataType {
            class,
            array,
            integer_width,
            unsigned,
            float_width,
            complex_kind,
        })
    }

    /// Encodes this type back into its single descriptor byte.
    pub fn to_byte(self) -> u8 {
        let array_bits = match self.array {
            ArrayKind::Scalar => 0b00,
            ArrayKind::VarArray => 0b01,
            ArrayKind::BoundedArray => 0b10,
            ArrayKind::FixedArray => 0b11,
        };

        let (major, sub) = match self.class {
            TypeClass::Bool => (0b000, 0b000),
            TypeClass::Integer => {
                let width_bits = match self.integer_width.expect("integer width required") {
                    IntegerWidth::Byte => 0b00,
                    IntegerWidth::Short => 0b01,
                    IntegerWidth::Int => 0b10,
                    IntegerWidth::Long => 0b11,
                };
                let unsigned_bit = if self.unsigned { 0b100 } else { 0b000 };
                (0b001, unsigned_bit | width_bits)
            }
            TypeClass::Float => {
                let width_bits = match self.float_width.expect("float width required") {
                    FloatWidth::Single => 0b010,
                    FloatWidth::Double => 0b011,
                };
                (0b010, width_bits)
            }
            TypeClass::String => (0b011, 0b000),
            TypeClass::Complex => {
                let kind_bits = match self.complex_kind.expect("complex kind required") {
                    ComplexKind::Structure => 0b000,
                    ComplexKind::Union => 0b001,
                    ComplexKind::VariantUnion => 0b010,
                    ComplexKind::BoundedString => 0b011,
                };
                (0b100, kind_bits)
            }
        };

        (major << 5) | (array_bits << 3) | sub
    }
}
