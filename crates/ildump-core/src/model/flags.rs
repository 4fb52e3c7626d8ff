//! Attribute words carried by the resolved metadata model.
//!
//! The layouts follow ECMA-335 §II.23.1. Type visibility and member access
//! occupy a 3-bit field rather than independent bits, so they are decoded
//! into [`TypeVisibility`] and [`Accessibility`] instead of being tested
//! with `contains`.

use bitflags::bitflags;

bitflags! {
    /// Type definition attributes (`TypeAttributes`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeAttributes: u32 {
        /// 3-bit visibility field, see [`TypeVisibility`]
        const VISIBILITY_MASK = 0x0000_0007;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type cannot be instantiated
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Name has special meaning to the runtime
        const SPECIAL_NAME = 0x0000_0400;
        /// Type is imported (COM import)
        const IMPORT = 0x0000_1000;
        /// Type is serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Runtime should check the name encoding
        const RT_SPECIAL_NAME = 0x0000_0800;
        /// Initialize the type before the first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

impl TypeAttributes {
    /// Attributes holding only the given visibility
    #[must_use]
    pub fn from_visibility(visibility: TypeVisibility) -> Self {
        Self::from_bits_retain(visibility.bits())
    }

    /// Decode the visibility field
    #[must_use]
    pub fn visibility(self) -> TypeVisibility {
        TypeVisibility::from_bits(self.bits())
    }
}

bitflags! {
    /// Field definition attributes (`FieldAttributes`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAttributes: u32 {
        /// 3-bit access field, see [`Accessibility`]
        const ACCESS_MASK = 0x0007;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Field can only be initialized, not written to after init
        const INIT_ONLY = 0x0020;
        /// Value is compile time constant
        const LITERAL = 0x0040;
        /// Field should not be serialized when the type is remoted
        const NOT_SERIALIZED = 0x0080;
        /// Field has RVA
        const HAS_FIELD_RVA = 0x0100;
        /// Field is special
        const SPECIAL_NAME = 0x0200;
        /// Runtime provides special behavior depending on the name
        const RT_SPECIAL_NAME = 0x0400;
        /// Field has marshalling information
        const HAS_FIELD_MARSHAL = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
        /// Field has a default value
        const HAS_DEFAULT = 0x8000;
    }
}

impl FieldAttributes {
    /// Attributes holding only the given access
    #[must_use]
    pub fn from_access(access: Accessibility) -> Self {
        Self::from_bits_retain(access.bits())
    }

    /// Decode the access field
    #[must_use]
    pub fn access(self) -> Accessibility {
        Accessibility::from_bits(self.bits())
    }
}

bitflags! {
    /// Method definition attributes (`MethodAttributes`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAttributes: u32 {
        /// 3-bit access field, see [`Accessibility`]
        const ACCESS_MASK = 0x0007;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method can only be overridden if also accessible
        const STRICT = 0x0200;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime provides special behavior depending on the name
        const RT_SPECIAL_NAME = 0x1000;
        /// Implementation is forwarded through PInvoke
        const PINVOKE_IMPL = 0x2000;
        /// Method has security associated with it
        const HAS_SECURITY = 0x4000;
        /// Method calls another method containing security code
        const REQUIRE_SEC_OBJECT = 0x8000;
    }
}

impl MethodAttributes {
    /// Attributes holding only the given access
    #[must_use]
    pub fn from_access(access: Accessibility) -> Self {
        Self::from_bits_retain(access.bits())
    }

    /// Decode the access field
    #[must_use]
    pub fn access(self) -> Accessibility {
        Accessibility::from_bits(self.bits())
    }
}

bitflags! {
    /// Parameter attributes (`ParamAttributes`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParamAttributes: u32 {
        /// Parameter is [In]
        const IN = 0x0001;
        /// Parameter is [Out]
        const OUT = 0x0002;
        /// Parameter is optional
        const OPTIONAL = 0x0010;
        /// Parameter has a default value
        const HAS_DEFAULT = 0x1000;
        /// Parameter has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

/// Decoded type visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeVisibility {
    /// Top-level type without public scope
    NotPublic,
    /// Top-level public type
    Public,
    /// Nested public type
    NestedPublic,
    /// Nested private type
    NestedPrivate,
    /// Nested type visible to derived types
    NestedFamily,
    /// Nested type visible inside the assembly
    NestedAssembly,
    /// Nested type visible to derived types inside the assembly
    NestedFamAndAssem,
    /// Nested type visible to derived types or inside the assembly
    NestedFamOrAssem,
}

impl TypeVisibility {
    /// Decode from a raw attribute word (only the low 3 bits are used)
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        match bits & TypeAttributes::VISIBILITY_MASK.bits() {
            0 => Self::NotPublic,
            1 => Self::Public,
            2 => Self::NestedPublic,
            3 => Self::NestedPrivate,
            4 => Self::NestedFamily,
            5 => Self::NestedAssembly,
            6 => Self::NestedFamAndAssem,
            _ => Self::NestedFamOrAssem,
        }
    }

    /// Raw value of the visibility field
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::NotPublic => 0,
            Self::Public => 1,
            Self::NestedPublic => 2,
            Self::NestedPrivate => 3,
            Self::NestedFamily => 4,
            Self::NestedAssembly => 5,
            Self::NestedFamAndAssem => 6,
            Self::NestedFamOrAssem => 7,
        }
    }

    /// Keyword text including the trailing space
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Public | Self::NestedPublic => "public ",
            Self::NestedPrivate => "private ",
            Self::NestedFamily => "protected ",
            Self::NestedAssembly | Self::NotPublic => "internal ",
            Self::NestedFamOrAssem => "protected internal ",
            Self::NestedFamAndAssem => FAMILY_AND_ASSEMBLY,
        }
    }
}

/// Marker emitted for family-and-assembly access, which has no C# keyword
pub const FAMILY_AND_ASSEMBLY: &str = "[family and assembly] ";

/// Decoded member access (shared by fields and methods)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessibility {
    /// Member not referenceable
    CompilerControlled,
    /// Accessible only by the parent type
    Private,
    /// Accessible by sub-types only in this assembly
    FamAndAssem,
    /// Accessible by anyone in the assembly
    Assembly,
    /// Accessible only by type and sub-types
    Family,
    /// Accessible by sub-types anywhere, plus anyone in the assembly
    FamOrAssem,
    /// Accessible by anyone
    Public,
}

impl Accessibility {
    /// Decode from a raw attribute word (only the low 3 bits are used)
    #[must_use]
    pub fn from_bits(bits: u32) -> Self {
        match bits & 0x0007 {
            1 => Self::Private,
            2 => Self::FamAndAssem,
            3 => Self::Assembly,
            4 => Self::Family,
            5 => Self::FamOrAssem,
            6 => Self::Public,
            _ => Self::CompilerControlled,
        }
    }

    /// Raw value of the access field
    #[must_use]
    pub fn bits(self) -> u32 {
        match self {
            Self::CompilerControlled => 0,
            Self::Private => 1,
            Self::FamAndAssem => 2,
            Self::Assembly => 3,
            Self::Family => 4,
            Self::FamOrAssem => 5,
            Self::Public => 6,
        }
    }

    /// Keyword text including the trailing space; empty for compiler-controlled
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::CompilerControlled => "",
            Self::Private => "private ",
            Self::Public => "public ",
            Self::Family => "protected ",
            Self::Assembly => "internal ",
            Self::FamOrAssem => "protected internal ",
            Self::FamAndAssem => FAMILY_AND_ASSEMBLY,
        }
    }
}
