//! Extensible declaration visiting.
//!
//! This module provides the [`DeclarationVisitor`] trait for walking the
//! same categorized view of a module that the text renderer prints, without
//! producing text.

use super::layout::{categorize, Diagnostic, Member};
use super::ReconstructorConfig;
use crate::model::{EnumValue, Event, Field, Method, Module, Property, TypeDefinition};

/// Trait for observing the declarations of a module.
///
/// Every hook has a no-op default, so implementors only override what they
/// need. Members arrive in output order and accessors are never reported as
/// methods.
///
/// # Example
///
/// ```ignore
/// use ildump_core::render::DeclarationVisitor;
///
/// struct AddressCollector {
///     addresses: Vec<u64>,
/// }
///
/// impl DeclarationVisitor for AddressCollector {
///     fn visit_method(&mut self, _owner: &TypeDefinition, method: &Method) {
///         if method.has_body() {
///             self.addresses.push(method.virtual_address);
///         }
///     }
/// }
/// ```
pub trait DeclarationVisitor {
    /// Called once per module before any type
    fn visit_module(&mut self, module: &Module) {
        let _ = module;
    }

    /// Called for each type that passes the namespace filter
    fn visit_type(&mut self, type_def: &TypeDefinition) {
        let _ = type_def;
    }

    /// Called for each type excluded by the namespace filter
    fn visit_filtered(&mut self, type_def: &TypeDefinition) {
        let _ = type_def;
    }

    /// Called instead of member hooks when a type collapses to a delegate
    fn visit_delegate(&mut self, type_def: &TypeDefinition, invoke: &Method) {
        let _ = (type_def, invoke);
    }

    /// Field
    fn visit_field(&mut self, owner: &TypeDefinition, field: &Field) {
        let _ = (owner, field);
    }

    /// Enumeration constant
    fn visit_enum_value(&mut self, owner: &TypeDefinition, value: &EnumValue) {
        let _ = (owner, value);
    }

    /// Property
    fn visit_property(&mut self, owner: &TypeDefinition, property: &Property) {
        let _ = (owner, property);
    }

    /// Event
    fn visit_event(&mut self, owner: &TypeDefinition, event: &Event) {
        let _ = (owner, event);
    }

    /// Method that is not a property or event accessor
    fn visit_method(&mut self, owner: &TypeDefinition, method: &Method) {
        let _ = (owner, method);
    }

    /// Model inconsistency found in a type
    fn visit_diagnostic(&mut self, owner: &TypeDefinition, diagnostic: &Diagnostic) {
        let _ = (owner, diagnostic);
    }
}

/// Walk a module in output order, honoring the configured namespace filter
pub fn walk_module<V: DeclarationVisitor + ?Sized>(
    module: &Module,
    config: &ReconstructorConfig,
    visitor: &mut V,
) {
    visitor.visit_module(module);

    for type_def in &module.types {
        if !config.matches(type_def) {
            visitor.visit_filtered(type_def);
            continue;
        }
        visitor.visit_type(type_def);

        let layout = categorize(type_def);
        for diagnostic in &layout.diagnostics {
            visitor.visit_diagnostic(type_def, diagnostic);
        }
        if let Some(invoke) = layout.delegate_invoke {
            visitor.visit_delegate(type_def, invoke);
            continue;
        }

        for section in &layout.sections {
            for member in &section.members {
                match *member {
                    Member::Field(f) => visitor.visit_field(type_def, f),
                    Member::EnumValue(v) => visitor.visit_enum_value(type_def, v),
                    Member::Property(p) => visitor.visit_property(type_def, p),
                    Member::Event(e) => visitor.visit_event(type_def, e),
                    Member::Method(_, m) => visitor.visit_method(type_def, m),
                }
            }
        }
    }
}

/// A no-op visitor
pub struct NullVisitor;

impl DeclarationVisitor for NullVisitor {}

/// A visitor that counts what a dump would contain
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsVisitor {
    /// Number of modules
    pub module_count: usize,
    /// Number of rendered types (delegates included)
    pub type_count: usize,
    /// Number of types excluded by the filter
    pub filtered_count: usize,
    /// Number of delegate roll-ups
    pub delegate_count: usize,
    /// Number of fields
    pub field_count: usize,
    /// Number of enumeration constants
    pub enum_value_count: usize,
    /// Number of properties
    pub property_count: usize,
    /// Number of events
    pub event_count: usize,
    /// Number of standalone methods
    pub method_count: usize,
    /// Number of model inconsistencies
    pub diagnostic_count: usize,
}

impl DeclarationVisitor for StatsVisitor {
    fn visit_module(&mut self, _module: &Module) {
        self.module_count += 1;
    }

    fn visit_type(&mut self, _type_def: &TypeDefinition) {
        self.type_count += 1;
    }

    fn visit_filtered(&mut self, _type_def: &TypeDefinition) {
        self.filtered_count += 1;
    }

    fn visit_delegate(&mut self, _type_def: &TypeDefinition, _invoke: &Method) {
        self.delegate_count += 1;
    }

    fn visit_field(&mut self, _owner: &TypeDefinition, _field: &Field) {
        self.field_count += 1;
    }

    fn visit_enum_value(&mut self, _owner: &TypeDefinition, _value: &EnumValue) {
        self.enum_value_count += 1;
    }

    fn visit_property(&mut self, _owner: &TypeDefinition, _property: &Property) {
        self.property_count += 1;
    }

    fn visit_event(&mut self, _owner: &TypeDefinition, _event: &Event) {
        self.event_count += 1;
    }

    fn visit_method(&mut self, _owner: &TypeDefinition, _method: &Method) {
        self.method_count += 1;
    }

    fn visit_diagnostic(&mut self, _owner: &TypeDefinition, _diagnostic: &Diagnostic) {
        self.diagnostic_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Accessibility, FieldAttributes, MethodAttributes, TypeAttributes, TypeRef,
        MULTICAST_DELEGATE,
    };

    fn module() -> Module {
        let public = MethodAttributes::from_access(Accessibility::Public);
        Module::new(0, "Assembly-CSharp.dll", 0)
            .with_type(
                TypeDefinition::new(0, "Game.Core", "Player")
                    .with_field(Field::new("hp", "int", FieldAttributes::empty(), 0x10))
                    .with_method(Method::new("get_Hp", "int", public).at(0x1000))
                    .with_method(Method::new("Update", "void", public).at(0x2000))
                    .with_property(Property::new("Hp", "int").with_getter(0))
                    .with_property(Property::new("Broken", "int")),
            )
            .with_type(
                TypeDefinition::new(1, "Game.Core", "OnDeath")
                    .with_attributes(TypeAttributes::SEALED)
                    .with_base(TypeRef::new("MulticastDelegate", MULTICAST_DELEGATE))
                    .with_method(Method::new("Invoke", "void", public).at(0x3000)),
            )
            .with_type(
                TypeDefinition::new(2, "Game.UI", "Hud")
                    .with_method(Method::new("Show", "void", public).at(0x4000)),
            )
    }

    #[test]
    fn test_null_visitor() {
        let mut visitor = NullVisitor;
        walk_module(&module(), &ReconstructorConfig::default(), &mut visitor);
    }

    #[test]
    fn test_stats_visitor() {
        let mut stats = StatsVisitor::default();
        walk_module(&module(), &ReconstructorConfig::default(), &mut stats);

        assert_eq!(stats.module_count, 1);
        assert_eq!(stats.type_count, 3);
        assert_eq!(stats.delegate_count, 1);
        assert_eq!(stats.field_count, 1);
        assert_eq!(stats.property_count, 1);
        assert_eq!(stats.method_count, 2);
        assert_eq!(stats.diagnostic_count, 1);
    }

    #[test]
    fn test_stats_visitor_with_filter() {
        let config = ReconstructorConfig::new().filter("Game.Core");
        let mut stats = StatsVisitor::default();
        walk_module(&module(), &config, &mut stats);

        assert_eq!(stats.type_count, 2);
        assert_eq!(stats.filtered_count, 1);
        assert_eq!(stats.method_count, 1);
    }
}
