//! Resolved metadata model.
//!
//! This is the read-only view of an IL2CPP image after ingestion: every
//! module (assembly image) with its type definitions, and every member with
//! the binary provenance that the dump annotates (type index, field offset,
//! method virtual address). Type references are already resolved into their
//! display names.
//!
//! Accessor methods of properties and events are referenced by
//! [`MethodIndex`], a position in the owning type's declared-method list.
//! That keeps "has this method already been rendered" a plain set lookup.
//!
//! The model is usually produced by decoding the interchange form (see
//! [`wire`]) but can also be assembled directly with the `with_*` builders.

mod flags;
pub mod wire;

use crate::error::Result;
use std::cmp::Ordering;
use std::fmt;

pub use flags::{
    Accessibility, FieldAttributes, MethodAttributes, ParamAttributes, TypeAttributes,
    TypeVisibility, FAMILY_AND_ASSEMBLY,
};

/// Fully qualified name of the root object type
pub const OBJECT_TYPE: &str = "System.Object";

/// Fully qualified name of the implicit base of all value types
pub const VALUE_TYPE: &str = "System.ValueType";

/// Fully qualified name of the base of every delegate type
pub const MULTICAST_DELEGATE: &str = "System.MulticastDelegate";

/// Enum underlying type that is left implicit in the base list
pub const DEFAULT_ENUM_ELEMENT: &str = "int";

/// Name of the method carrying a delegate's signature
pub const DELEGATE_INVOKE: &str = "Invoke";

/// All modules of a resolved image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Modules in image order
    pub modules: Vec<Module>,
}

impl Metadata {
    /// Creates metadata from already resolved modules
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// Decodes the interchange form from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::decode(data)
    }

    /// Decodes the interchange form from any buffer
    pub fn decode(buf: impl bytes::Buf) -> Result<Self> {
        let proto = <wire::MetadataProto as prost::Message>::decode(buf)?;
        Self::try_from(proto)
    }

    /// Total number of type definitions across all modules
    pub fn type_count(&self) -> usize {
        self.modules.iter().map(|m| m.types.len()).sum()
    }
}

/// One originating assembly image and the types it defines
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    /// Image index
    pub index: u32,
    /// Fully qualified image name, e.g. `Assembly-CSharp.dll`
    pub name: String,
    /// TypeDefIndex of the first type defined by this image
    pub type_start: u32,
    /// Type definitions in declaration order
    pub types: Vec<TypeDefinition>,
}

impl Module {
    /// Creates an empty module
    pub fn new(index: u32, name: impl Into<String>, type_start: u32) -> Self {
        Self {
            index,
            name: name.into(),
            type_start,
            types: Vec::new(),
        }
    }

    /// Appends a type definition
    pub fn with_type(mut self, type_def: TypeDefinition) -> Self {
        self.types.push(type_def);
        self
    }
}

/// Reference to another type, as needed for base type checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeRef {
    /// Display name (`List<int>`, `object`)
    pub name: String,
    /// Fully qualified name (`System.Collections.Generic.List`1`)
    pub full_name: String,
}

impl TypeRef {
    /// Creates a type reference
    pub fn new(name: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_name: full_name.into(),
        }
    }
}

/// Index into a type's declared-method list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodIndex(pub usize);

/// The declaration keyword a type renders with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// `interface`
    Interface,
    /// `struct`
    Struct,
    /// `enum`
    Enum,
    /// `class`
    Class,
}

impl TypeKind {
    /// Keyword text including the trailing space
    pub fn keyword(self) -> &'static str {
        match self {
            TypeKind::Interface => "interface ",
            TypeKind::Struct => "struct ",
            TypeKind::Enum => "enum ",
            TypeKind::Class => "class ",
        }
    }
}

/// A resolved class, struct, interface or enum declaration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeDefinition {
    /// TypeDefIndex
    pub index: u32,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple type name
    pub name: String,
    /// Raw type attributes
    pub attributes: TypeAttributes,
    /// Type is a non-enum value type
    pub is_value_type: bool,
    /// Type is an enumeration
    pub is_enum: bool,
    /// Base type, if any
    pub base_type: Option<TypeRef>,
    /// Display names of implemented interfaces, in declaration order
    pub interfaces: Vec<String>,
    /// Underlying type display name for enumerations
    pub element_type: Option<String>,
    /// Enumeration constants in declaration order
    pub enum_values: Vec<EnumValue>,
    /// Declared fields
    pub fields: Vec<Field>,
    /// Declared properties
    pub properties: Vec<Property>,
    /// Declared events
    pub events: Vec<Event>,
    /// Declared methods, including property and event accessors
    pub methods: Vec<Method>,
}

impl TypeDefinition {
    /// Creates a type with no attributes and no members
    pub fn new(index: u32, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            namespace: namespace.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the raw attributes
    pub fn with_attributes(mut self, attributes: TypeAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Marks the type as a (non-enum) value type
    pub fn value_type(mut self) -> Self {
        self.is_value_type = true;
        self
    }

    /// Marks the type as an enumeration with the given underlying type
    pub fn enumeration(mut self, element_type: impl Into<String>) -> Self {
        self.is_enum = true;
        self.element_type = Some(element_type.into());
        self
    }

    /// Sets the base type
    pub fn with_base(mut self, base: TypeRef) -> Self {
        self.base_type = Some(base);
        self
    }

    /// Adds an implemented interface
    pub fn with_interface(mut self, name: impl Into<String>) -> Self {
        self.interfaces.push(name.into());
        self
    }

    /// Adds an enumeration constant
    pub fn with_enum_value(mut self, name: impl Into<String>, value: impl Into<EnumConstant>) -> Self {
        self.enum_values.push(EnumValue::new(name, value));
        self
    }

    /// Adds a field
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a property
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Adds an event
    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Adds a method
    pub fn with_method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    /// Namespace-qualified name
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Decoded visibility
    pub fn visibility(&self) -> TypeVisibility {
        self.attributes.visibility()
    }

    /// Type is an interface
    pub fn is_interface(&self) -> bool {
        self.attributes.contains(TypeAttributes::INTERFACE)
    }

    /// Type is a reference type that is not an interface
    pub fn is_class(&self) -> bool {
        !self.is_interface() && !self.is_value_type && !self.is_enum
    }

    /// Type is abstract
    pub fn is_abstract(&self) -> bool {
        self.attributes.contains(TypeAttributes::ABSTRACT)
    }

    /// Type is sealed
    pub fn is_sealed(&self) -> bool {
        self.attributes.contains(TypeAttributes::SEALED)
    }

    /// Type is a COM import
    pub fn is_import(&self) -> bool {
        self.attributes.contains(TypeAttributes::IMPORT)
    }

    /// Type is serializable
    pub fn is_serializable(&self) -> bool {
        self.attributes.contains(TypeAttributes::SERIALIZABLE)
    }

    /// Declaration keyword; interface takes precedence over struct over enum
    pub fn kind(&self) -> TypeKind {
        if self.is_interface() {
            TypeKind::Interface
        } else if self.is_value_type {
            TypeKind::Struct
        } else if self.is_enum {
            TypeKind::Enum
        } else {
            TypeKind::Class
        }
    }

    /// Sealed class deriving directly from `System.MulticastDelegate`
    pub fn is_delegate(&self) -> bool {
        self.is_class()
            && self.is_sealed()
            && self
                .base_type
                .as_ref()
                .is_some_and(|base| base.full_name == MULTICAST_DELEGATE)
    }

    /// Method at the given declared position
    pub fn method(&self, index: MethodIndex) -> Option<&Method> {
        self.methods.get(index.0)
    }

    /// First declared method with the given name
    pub fn find_method(&self, name: &str) -> Option<(MethodIndex, &Method)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
            .map(|(i, m)| (MethodIndex(i), m))
    }
}

/// A declared field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field type display name
    pub type_name: String,
    /// Raw field attributes
    pub attributes: FieldAttributes,
    /// Default value, already rendered as literal text
    pub default_value: Option<String>,
    /// Byte offset inside the instance (or static storage)
    pub offset: u32,
}

impl Field {
    /// Creates a field
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        attributes: FieldAttributes,
        offset: u32,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            attributes,
            default_value: None,
            offset,
        }
    }

    /// Sets the default value literal
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Compile-time constant
    pub fn is_literal(&self) -> bool {
        self.attributes.contains(FieldAttributes::LITERAL)
    }

    /// Static field
    pub fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }

    /// Readonly field
    pub fn is_init_only(&self) -> bool {
        self.attributes.contains(FieldAttributes::INIT_ONLY)
    }

    /// Excluded from serialization
    pub fn is_not_serialized(&self) -> bool {
        self.attributes.contains(FieldAttributes::NOT_SERIALIZED)
    }

    /// Forwarded through PInvoke
    pub fn is_pinvoke_impl(&self) -> bool {
        self.attributes.contains(FieldAttributes::PINVOKE_IMPL)
    }
}

/// A declared property
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Property {
    /// Property name
    pub name: String,
    /// Property type display name
    pub type_name: String,
    /// Getter accessor
    pub getter: Option<MethodIndex>,
    /// Setter accessor
    pub setter: Option<MethodIndex>,
}

impl Property {
    /// Creates a property without accessors
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            getter: None,
            setter: None,
        }
    }

    /// Sets the getter
    pub fn with_getter(mut self, index: usize) -> Self {
        self.getter = Some(MethodIndex(index));
        self
    }

    /// Sets the setter
    pub fn with_setter(mut self, index: usize) -> Self {
        self.setter = Some(MethodIndex(index));
        self
    }

    /// Present accessors, getter first
    pub fn accessors(&self) -> impl Iterator<Item = MethodIndex> {
        self.getter.into_iter().chain(self.setter)
    }
}

/// A declared event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    /// Event name
    pub name: String,
    /// Handler delegate display name
    pub handler_type: String,
    /// `add` accessor
    pub add: Option<MethodIndex>,
    /// `remove` accessor
    pub remove: Option<MethodIndex>,
    /// `raise` accessor
    pub raise: Option<MethodIndex>,
}

impl Event {
    /// Creates an event without accessors
    pub fn new(name: impl Into<String>, handler_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handler_type: handler_type.into(),
            ..Self::default()
        }
    }

    /// Sets the `add` accessor
    pub fn with_add(mut self, index: usize) -> Self {
        self.add = Some(MethodIndex(index));
        self
    }

    /// Sets the `remove` accessor
    pub fn with_remove(mut self, index: usize) -> Self {
        self.remove = Some(MethodIndex(index));
        self
    }

    /// Sets the `raise` accessor
    pub fn with_raise(mut self, index: usize) -> Self {
        self.raise = Some(MethodIndex(index));
        self
    }

    /// Present accessors labelled with their keyword, in add/remove/raise order
    pub fn accessors(&self) -> impl Iterator<Item = (&'static str, MethodIndex)> {
        [("add", self.add), ("remove", self.remove), ("raise", self.raise)]
            .into_iter()
            .filter_map(|(label, index)| index.map(|i| (label, i)))
    }
}

/// A declared method or accessor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Method {
    /// Method name
    pub name: String,
    /// Return type display name
    pub return_type: String,
    /// Raw method attributes
    pub attributes: MethodAttributes,
    /// Address of the native body; 0 when there is none
    pub virtual_address: u64,
    /// Parameters in declaration order
    pub parameters: Vec<Parameter>,
}

impl Method {
    /// Creates a method without parameters or native body
    pub fn new(
        name: impl Into<String>,
        return_type: impl Into<String>,
        attributes: MethodAttributes,
    ) -> Self {
        Self {
            name: name.into(),
            return_type: return_type.into(),
            attributes,
            virtual_address: 0,
            parameters: Vec::new(),
        }
    }

    /// Sets the native body address
    pub fn at(mut self, virtual_address: u64) -> Self {
        self.virtual_address = virtual_address;
        self
    }

    /// Adds a parameter
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Method has a native body
    pub fn has_body(&self) -> bool {
        self.virtual_address != 0
    }

    /// C# modifier keywords, each followed by a space
    ///
    /// Interface implementations are emitted by the compiler as
    /// `virtual final newslot` and get no virtual/sealed keyword.
    pub fn modifier_string(&self) -> String {
        let attrs = self.attributes;
        let mut modifiers = String::from(attrs.access().keyword());

        let is_abstract = attrs.contains(MethodAttributes::ABSTRACT);
        let is_final = attrs.contains(MethodAttributes::FINAL);
        let new_slot = attrs.contains(MethodAttributes::NEW_SLOT);

        if is_abstract {
            modifiers.push_str("abstract ");
        }
        if is_final && !new_slot {
            modifiers.push_str("sealed override ");
        }
        if attrs.contains(MethodAttributes::VIRTUAL) && !is_abstract && !is_final {
            modifiers.push_str(if new_slot { "virtual " } else { "override " });
        }
        if attrs.contains(MethodAttributes::STATIC) {
            modifiers.push_str("static ");
        }
        if attrs.contains(MethodAttributes::PINVOKE_IMPL) {
            modifiers.push_str("extern ");
        }
        modifiers
    }
}

/// A method parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter type display name
    pub type_name: String,
    /// Raw parameter attributes
    pub attributes: ParamAttributes,
}

impl Parameter {
    /// Creates a parameter
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        attributes: ParamAttributes,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            attributes,
        }
    }

    /// Parameter is optional
    pub fn is_optional(&self) -> bool {
        self.attributes.contains(ParamAttributes::OPTIONAL)
    }

    /// Parameter is an out parameter
    pub fn is_out(&self) -> bool {
        self.attributes.contains(ParamAttributes::OUT)
    }
}

/// A named enumeration constant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    /// Constant name
    pub name: String,
    /// Constant value
    pub value: EnumConstant,
}

impl EnumValue {
    /// Creates an enumeration constant
    pub fn new(name: impl Into<String>, value: impl Into<EnumConstant>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Value of an enumeration constant
///
/// `ulong` enums can hold values above `i64::MAX`, so both signednesses are
/// kept and compared numerically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumConstant {
    /// Signed underlying type
    Signed(i64),
    /// Unsigned underlying type
    Unsigned(u64),
}

impl EnumConstant {
    fn widen(self) -> i128 {
        match self {
            EnumConstant::Signed(v) => i128::from(v),
            EnumConstant::Unsigned(v) => i128::from(v),
        }
    }
}

impl Ord for EnumConstant {
    fn cmp(&self, other: &Self) -> Ordering {
        self.widen().cmp(&other.widen())
    }
}

impl PartialOrd for EnumConstant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EnumConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumConstant::Signed(v) => write!(f, "{}", v),
            EnumConstant::Unsigned(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for EnumConstant {
    fn from(value: i64) -> Self {
        EnumConstant::Signed(value)
    }
}

impl From<i32> for EnumConstant {
    fn from(value: i32) -> Self {
        EnumConstant::Signed(i64::from(value))
    }
}

impl From<u64> for EnumConstant {
    fn from(value: u64) -> Self {
        EnumConstant::Unsigned(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(attrs: MethodAttributes) -> Method {
        Method::new("M", "void", attrs)
    }

    #[test]
    fn test_kind_precedence() {
        let iface = TypeDefinition::new(0, "", "I").with_attributes(TypeAttributes::INTERFACE);
        assert_eq!(iface.kind(), TypeKind::Interface);

        let both = TypeDefinition::new(1, "", "S").value_type().enumeration("int");
        assert_eq!(both.kind(), TypeKind::Struct);

        let e = TypeDefinition::new(2, "", "E").enumeration("int");
        assert_eq!(e.kind(), TypeKind::Enum);
        assert!(!e.is_class());

        assert_eq!(TypeDefinition::new(3, "", "C").kind(), TypeKind::Class);
    }

    #[test]
    fn test_is_delegate() {
        let delegate = TypeDefinition::new(5, "Game", "OnHit")
            .with_attributes(
                TypeAttributes::from_visibility(TypeVisibility::Public) | TypeAttributes::SEALED,
            )
            .with_base(TypeRef::new("MulticastDelegate", MULTICAST_DELEGATE));
        assert!(delegate.is_delegate());

        let unsealed = TypeDefinition::new(6, "Game", "OnHit")
            .with_base(TypeRef::new("MulticastDelegate", MULTICAST_DELEGATE));
        assert!(!unsealed.is_delegate());

        let struct_like = TypeDefinition::new(7, "Game", "OnHit")
            .with_attributes(TypeAttributes::SEALED)
            .value_type()
            .with_base(TypeRef::new("MulticastDelegate", MULTICAST_DELEGATE));
        assert!(!struct_like.is_delegate());
    }

    #[test]
    fn test_full_name() {
        assert_eq!(TypeDefinition::new(0, "Game.Core", "Player").full_name(), "Game.Core.Player");
        assert_eq!(TypeDefinition::new(0, "", "<Module>").full_name(), "<Module>");
    }

    #[test]
    fn test_find_method() {
        let public = MethodAttributes::from_access(Accessibility::Public);
        let t = TypeDefinition::new(0, "", "D")
            .with_method(method(public))
            .with_method(Method::new("Invoke", "void", public));
        let (index, found) = t.find_method("Invoke").unwrap();
        assert_eq!(index, MethodIndex(1));
        assert_eq!(found.name, "Invoke");
        assert!(t.find_method("BeginInvoke").is_none());
    }

    #[test]
    fn test_modifier_string() {
        let public = MethodAttributes::from_access(Accessibility::Public);
        assert_eq!(method(public).modifier_string(), "public ");
        assert_eq!(
            method(public | MethodAttributes::STATIC).modifier_string(),
            "public static "
        );
        assert_eq!(
            method(public | MethodAttributes::VIRTUAL | MethodAttributes::NEW_SLOT)
                .modifier_string(),
            "public virtual "
        );
        assert_eq!(
            method(public | MethodAttributes::VIRTUAL).modifier_string(),
            "public override "
        );
        assert_eq!(
            method(public | MethodAttributes::VIRTUAL | MethodAttributes::FINAL).modifier_string(),
            "public sealed override "
        );
        // interface implementation
        assert_eq!(
            method(
                public
                    | MethodAttributes::VIRTUAL
                    | MethodAttributes::FINAL
                    | MethodAttributes::NEW_SLOT
            )
            .modifier_string(),
            "public "
        );
        assert_eq!(
            method(
                public
                    | MethodAttributes::ABSTRACT
                    | MethodAttributes::VIRTUAL
                    | MethodAttributes::NEW_SLOT
            )
            .modifier_string(),
            "public abstract "
        );
        assert_eq!(
            method(MethodAttributes::PINVOKE_IMPL | MethodAttributes::STATIC).modifier_string(),
            "static extern "
        );
    }

    #[test]
    fn test_event_accessor_order() {
        let evt = Event::new("Changed", "Action").with_raise(4).with_add(2);
        let accessors: Vec<_> = evt.accessors().collect();
        assert_eq!(accessors, vec![("add", MethodIndex(2)), ("raise", MethodIndex(4))]);
    }

    #[test]
    fn test_enum_constant_ordering() {
        let mut values = vec![
            EnumConstant::Unsigned(u64::MAX),
            EnumConstant::Signed(-1),
            EnumConstant::Unsigned(0),
            EnumConstant::Signed(i64::MAX),
        ];
        values.sort();
        assert_eq!(
            values,
            vec![
                EnumConstant::Signed(-1),
                EnumConstant::Unsigned(0),
                EnumConstant::Signed(i64::MAX),
                EnumConstant::Unsigned(u64::MAX),
            ]
        );
        assert_eq!(EnumConstant::Unsigned(u64::MAX).to_string(), "18446744073709551615");
    }
}
