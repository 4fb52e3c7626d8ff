//! Interchange form of the resolved metadata model.
//!
//! The ingestion stage (binary + global-metadata parsing) runs out of process
//! and hands over its result as a protobuf message. The messages below are
//! declared directly with `prost` derives; [`TryFrom`] conversions turn them
//! into the [`crate::model`] types and check the cross references that the
//! renderer relies on.
//!
//! Attribute words are carried raw and truncated to the bits this crate
//! knows about.

#![allow(missing_docs)]

use super::{
    EnumConstant, EnumValue, Event, Field, FieldAttributes, Metadata, Method, MethodAttributes,
    MethodIndex, Module, ParamAttributes, Parameter, Property, TypeAttributes, TypeDefinition,
    TypeRef,
};
use crate::error::{Error, Result};

/// Root message: every module of one image
#[derive(Clone, PartialEq, prost::Message)]
pub struct MetadataProto {
    /// Modules in image order
    #[prost(message, repeated, tag = "1")]
    pub modules: Vec<ModuleProto>,
}

/// One assembly image
#[derive(Clone, PartialEq, prost::Message)]
pub struct ModuleProto {
    #[prost(uint32, tag = "1")]
    pub index: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(uint32, tag = "3")]
    pub type_start: u32,
    #[prost(message, repeated, tag = "4")]
    pub types: Vec<TypeProto>,
}

/// Resolved reference to another type
#[derive(Clone, PartialEq, prost::Message)]
pub struct TypeRefProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub full_name: String,
}

/// One type definition
#[derive(Clone, PartialEq, prost::Message)]
pub struct TypeProto {
    #[prost(uint32, tag = "1")]
    pub index: u32,
    #[prost(string, tag = "2")]
    pub namespace: String,
    #[prost(string, tag = "3")]
    pub name: String,
    /// Raw `TypeAttributes`
    #[prost(uint32, tag = "4")]
    pub flags: u32,
    #[prost(bool, tag = "5")]
    pub is_value_type: bool,
    #[prost(bool, tag = "6")]
    pub is_enum: bool,
    #[prost(message, optional, tag = "7")]
    pub base_type: Option<TypeRefProto>,
    #[prost(string, repeated, tag = "8")]
    pub interfaces: Vec<String>,
    #[prost(string, optional, tag = "9")]
    pub element_type: Option<String>,
    #[prost(message, repeated, tag = "10")]
    pub enum_values: Vec<EnumValueProto>,
    #[prost(message, repeated, tag = "11")]
    pub fields: Vec<FieldProto>,
    #[prost(message, repeated, tag = "12")]
    pub properties: Vec<PropertyProto>,
    #[prost(message, repeated, tag = "13")]
    pub events: Vec<EventProto>,
    #[prost(message, repeated, tag = "14")]
    pub methods: Vec<MethodProto>,
}

/// Enumeration constant; `value` holds the raw bits when `is_unsigned`
#[derive(Clone, PartialEq, prost::Message)]
pub struct EnumValueProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(sint64, tag = "2")]
    pub value: i64,
    #[prost(bool, tag = "3")]
    pub is_unsigned: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FieldProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub type_name: String,
    /// Raw `FieldAttributes`
    #[prost(uint32, tag = "3")]
    pub flags: u32,
    #[prost(string, optional, tag = "4")]
    pub default_value: Option<String>,
    #[prost(uint32, tag = "5")]
    pub offset: u32,
}

/// Property; accessors are indices into the owning type's `methods`
#[derive(Clone, PartialEq, prost::Message)]
pub struct PropertyProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub type_name: String,
    #[prost(uint32, optional, tag = "3")]
    pub getter: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub setter: Option<u32>,
}

/// Event; accessors are indices into the owning type's `methods`
#[derive(Clone, PartialEq, prost::Message)]
pub struct EventProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub handler_type: String,
    #[prost(uint32, optional, tag = "3")]
    pub add: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub remove: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub raise: Option<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MethodProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub return_type: String,
    /// Raw `MethodAttributes`
    #[prost(uint32, tag = "3")]
    pub flags: u32,
    #[prost(uint64, tag = "4")]
    pub virtual_address: u64,
    #[prost(message, repeated, tag = "5")]
    pub parameters: Vec<ParameterProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ParameterProto {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub type_name: String,
    /// Raw `ParamAttributes`
    #[prost(uint32, tag = "3")]
    pub flags: u32,
}

impl TryFrom<MetadataProto> for Metadata {
    type Error = Error;

    fn try_from(proto: MetadataProto) -> Result<Self> {
        let modules = proto
            .modules
            .into_iter()
            .map(Module::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Metadata::new(modules))
    }
}

impl TryFrom<ModuleProto> for Module {
    type Error = Error;

    fn try_from(proto: ModuleProto) -> Result<Self> {
        let types = proto
            .types
            .into_iter()
            .map(TypeDefinition::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Module {
            index: proto.index,
            name: proto.name,
            type_start: proto.type_start,
            types,
        })
    }
}

impl TryFrom<TypeProto> for TypeDefinition {
    type Error = Error;

    fn try_from(proto: TypeProto) -> Result<Self> {
        let method_count = proto.methods.len();
        let accessor = |slot: Option<u32>, what: &str| -> Result<Option<MethodIndex>> {
            match slot {
                None => Ok(None),
                Some(i) if (i as usize) < method_count => Ok(Some(MethodIndex(i as usize))),
                Some(i) => Err(Error::invalid_model(
                    proto.index,
                    proto.name.as_str(),
                    format!(
                        "{} index {} out of range ({} declared methods)",
                        what, i, method_count
                    ),
                )),
            }
        };

        if !proto.is_enum && !proto.enum_values.is_empty() {
            return Err(Error::invalid_model(
                proto.index,
                proto.name.as_str(),
                format!(
                    "{} enum constants on a non-enum type",
                    proto.enum_values.len()
                ),
            ));
        }

        let mut properties = Vec::with_capacity(proto.properties.len());
        for p in &proto.properties {
            properties.push(Property {
                name: p.name.clone(),
                type_name: p.type_name.clone(),
                getter: accessor(p.getter, "getter")?,
                setter: accessor(p.setter, "setter")?,
            });
        }

        let mut events = Vec::with_capacity(proto.events.len());
        for e in &proto.events {
            events.push(Event {
                name: e.name.clone(),
                handler_type: e.handler_type.clone(),
                add: accessor(e.add, "add accessor")?,
                remove: accessor(e.remove, "remove accessor")?,
                raise: accessor(e.raise, "raise accessor")?,
            });
        }

        Ok(TypeDefinition {
            index: proto.index,
            attributes: TypeAttributes::from_bits_truncate(proto.flags),
            is_value_type: proto.is_value_type,
            is_enum: proto.is_enum,
            base_type: proto.base_type.map(|b| TypeRef::new(b.name, b.full_name)),
            interfaces: proto.interfaces,
            element_type: proto.element_type,
            enum_values: proto.enum_values.into_iter().map(EnumValue::from).collect(),
            fields: proto.fields.into_iter().map(Field::from).collect(),
            properties,
            events,
            methods: proto.methods.into_iter().map(Method::from).collect(),
            namespace: proto.namespace,
            name: proto.name,
        })
    }
}

impl From<EnumValueProto> for EnumValue {
    fn from(proto: EnumValueProto) -> Self {
        let value = if proto.is_unsigned {
            EnumConstant::Unsigned(proto.value as u64)
        } else {
            EnumConstant::Signed(proto.value)
        };
        EnumValue::new(proto.name, value)
    }
}

impl From<FieldProto> for Field {
    fn from(proto: FieldProto) -> Self {
        Field {
            name: proto.name,
            type_name: proto.type_name,
            attributes: FieldAttributes::from_bits_truncate(proto.flags),
            default_value: proto.default_value,
            offset: proto.offset,
        }
    }
}

impl From<MethodProto> for Method {
    fn from(proto: MethodProto) -> Self {
        Method {
            name: proto.name,
            return_type: proto.return_type,
            attributes: MethodAttributes::from_bits_truncate(proto.flags),
            virtual_address: proto.virtual_address,
            parameters: proto.parameters.into_iter().map(Parameter::from).collect(),
        }
    }
}

impl From<ParameterProto> for Parameter {
    fn from(proto: ParameterProto) -> Self {
        Parameter::new(
            proto.name,
            proto.type_name,
            ParamAttributes::from_bits_truncate(proto.flags),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Accessibility;
    use prost::Message;

    fn method_proto(name: &str, va: u64) -> MethodProto {
        MethodProto {
            name: name.to_string(),
            return_type: "int".to_string(),
            flags: 0x0006,
            virtual_address: va,
            parameters: vec![],
        }
    }

    fn player_proto() -> TypeProto {
        TypeProto {
            index: 12,
            namespace: "Game.Core".to_string(),
            name: "Player".to_string(),
            flags: 0x0000_2001,
            base_type: Some(TypeRefProto {
                name: "MonoBehaviour".to_string(),
                full_name: "UnityEngine.MonoBehaviour".to_string(),
            }),
            properties: vec![PropertyProto {
                name: "Health".to_string(),
                type_name: "int".to_string(),
                getter: Some(0),
                setter: None,
            }],
            methods: vec![method_proto("get_Health", 0x1000)],
            ..TypeProto::default()
        }
    }

    #[test]
    fn test_decode_round_trip_through_bytes() {
        let proto = MetadataProto {
            modules: vec![ModuleProto {
                index: 0,
                name: "Assembly-CSharp.dll".to_string(),
                type_start: 12,
                types: vec![player_proto()],
            }],
        };
        let bytes = proto.encode_to_vec();

        let metadata = Metadata::from_bytes(&bytes).unwrap();
        assert_eq!(metadata.modules.len(), 1);
        assert_eq!(metadata.type_count(), 1);

        let player = &metadata.modules[0].types[0];
        assert!(player.is_serializable());
        assert_eq!(player.base_type.as_ref().unwrap().name, "MonoBehaviour");
        assert_eq!(player.properties[0].getter, Some(MethodIndex(0)));
        assert_eq!(player.methods[0].attributes.access(), Accessibility::Public);
        assert_eq!(player.methods[0].virtual_address, 0x1000);
    }

    #[test]
    fn test_accessor_out_of_range() {
        let mut proto = player_proto();
        proto.properties[0].setter = Some(3);

        let err = TypeDefinition::try_from(proto).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("setter index 3 out of range"));
        assert!(msg.contains("'Player'"));
    }

    #[test]
    fn test_enum_constants_require_enum_type() {
        let mut proto = player_proto();
        proto.enum_values.push(EnumValueProto {
            name: "All".to_string(),
            value: -1,
            is_unsigned: true,
        });

        let err = TypeDefinition::try_from(proto.clone()).unwrap_err();
        assert!(matches!(err, Error::InvalidModel { type_index: 12, .. }));
        assert!(err.to_string().contains("enum constants on a non-enum type"));

        proto.is_enum = true;
        proto.element_type = Some("ulong".to_string());
        let flags = TypeDefinition::try_from(proto).unwrap();
        assert_eq!(flags.enum_values[0].value, EnumConstant::Unsigned(u64::MAX));
    }

    #[test]
    fn test_unsigned_enum_value() {
        let value = EnumValue::from(EnumValueProto {
            name: "All".to_string(),
            value: -1,
            is_unsigned: true,
        });
        assert_eq!(value.value, EnumConstant::Unsigned(u64::MAX));
    }

    #[test]
    fn test_garbage_input_is_decode_error() {
        let err = Metadata::from_bytes(&[0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, Error::ModelDecode(_)));
    }
}
