//! Member categorization.
//!
//! Splits a type definition into the sections the dump prints, in their fixed
//! order (fields or enum constants, properties, events, methods), and works
//! out which declared methods are already covered by a property or event.

use crate::model::{EnumValue, Event, Field, Method, MethodIndex, Property, TypeDefinition, DELEGATE_INVOKE};
use std::collections::BTreeSet;
use std::fmt;

/// One renderable member of a type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Member<'a> {
    /// Instance or static field
    Field(&'a Field),
    /// Enumeration constant
    EnumValue(&'a EnumValue),
    /// Property with at least one accessor
    Property(&'a Property),
    /// Event with at least one accessor
    Event(&'a Event),
    /// Method not already rendered as an accessor
    Method(MethodIndex, &'a Method),
}

/// Section a member is printed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// `// Fields`
    Fields,
    /// Enumeration constants (untitled)
    EnumValues,
    /// `// Properties`
    Properties,
    /// `// Events`
    Events,
    /// `// Methods`
    Methods,
}

impl SectionKind {
    /// Comment line opening the section, if it has one
    pub fn title(self) -> Option<&'static str> {
        match self {
            SectionKind::Fields => Some("// Fields"),
            SectionKind::EnumValues => None,
            SectionKind::Properties => Some("// Properties"),
            SectionKind::Events => Some("// Events"),
            SectionKind::Methods => Some("// Methods"),
        }
    }

    /// Whether a blank line follows the section
    pub fn trailing_blank_line(self) -> bool {
        matches!(
            self,
            SectionKind::Fields | SectionKind::Properties | SectionKind::Events
        )
    }
}

/// A non-empty run of members of one kind
#[derive(Debug, Clone, PartialEq)]
pub struct Section<'a> {
    /// Section kind
    pub kind: SectionKind,
    /// Members in output order
    pub members: Vec<Member<'a>>,
}

/// Model inconsistency found while categorizing a type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Property with neither getter nor setter; skipped
    PropertyWithoutAccessors {
        /// Property name
        name: String,
    },
    /// Event with no add, remove or raise accessor; skipped
    EventWithoutAccessors {
        /// Event name
        name: String,
    },
    /// Delegate type without an `Invoke` method; rendered as a class
    DelegateWithoutInvoke,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::PropertyWithoutAccessors { name } => {
                write!(f, "property '{}' has no accessors, skipped", name)
            }
            Diagnostic::EventWithoutAccessors { name } => {
                write!(f, "event '{}' has no accessors, skipped", name)
            }
            Diagnostic::DelegateWithoutInvoke => {
                write!(f, "delegate has no Invoke method, rendered as class")
            }
        }
    }
}

/// How one type definition is going to be printed
#[derive(Debug, Clone, PartialEq)]
pub struct TypeLayout<'a> {
    /// The categorized type
    pub type_def: &'a TypeDefinition,
    /// Set when the type collapses into a one-line delegate signature
    pub delegate_invoke: Option<&'a Method>,
    /// Non-empty sections in output order; empty for delegates
    pub sections: Vec<Section<'a>>,
    /// Methods consumed by properties and events
    pub accessors: BTreeSet<MethodIndex>,
    /// Skipped members and other inconsistencies
    pub diagnostics: Vec<Diagnostic>,
}

impl<'a> TypeLayout<'a> {
    /// Section of the given kind, if present
    pub fn section(&self, kind: SectionKind) -> Option<&Section<'a>> {
        self.sections.iter().find(|s| s.kind == kind)
    }
}

/// Categorize the members of a type definition
pub fn categorize(type_def: &TypeDefinition) -> TypeLayout<'_> {
    let mut layout = TypeLayout {
        type_def,
        delegate_invoke: None,
        sections: Vec::new(),
        accessors: BTreeSet::new(),
        diagnostics: Vec::new(),
    };

    if type_def.is_delegate() {
        match type_def.find_method(DELEGATE_INVOKE) {
            Some((_, invoke)) => {
                layout.delegate_invoke = Some(invoke);
                return layout;
            }
            None => layout.diagnostics.push(Diagnostic::DelegateWithoutInvoke),
        }
    }

    if type_def.is_enum {
        let mut values: Vec<&EnumValue> = type_def.enum_values.iter().collect();
        // stable: equal values keep declaration order
        values.sort_by_key(|v| v.value);
        push_section(
            &mut layout.sections,
            SectionKind::EnumValues,
            values.into_iter().map(Member::EnumValue).collect(),
        );
    } else {
        push_section(
            &mut layout.sections,
            SectionKind::Fields,
            type_def.fields.iter().map(Member::Field).collect(),
        );
    }

    let mut properties = Vec::with_capacity(type_def.properties.len());
    for property in &type_def.properties {
        if property.getter.is_none() && property.setter.is_none() {
            layout.diagnostics.push(Diagnostic::PropertyWithoutAccessors {
                name: property.name.clone(),
            });
            continue;
        }
        layout.accessors.extend(property.accessors());
        properties.push(Member::Property(property));
    }
    push_section(&mut layout.sections, SectionKind::Properties, properties);

    let mut events = Vec::with_capacity(type_def.events.len());
    for event in &type_def.events {
        let mut accessors = event.accessors().map(|(_, index)| index).peekable();
        if accessors.peek().is_none() {
            layout.diagnostics.push(Diagnostic::EventWithoutAccessors {
                name: event.name.clone(),
            });
            continue;
        }
        layout.accessors.extend(accessors);
        events.push(Member::Event(event));
    }
    push_section(&mut layout.sections, SectionKind::Events, events);

    let methods = type_def
        .methods
        .iter()
        .enumerate()
        .map(|(i, m)| (MethodIndex(i), m))
        .filter(|(index, _)| !layout.accessors.contains(index))
        .map(|(index, m)| Member::Method(index, m))
        .collect();
    push_section(&mut layout.sections, SectionKind::Methods, methods);

    layout
}

fn push_section<'a>(sections: &mut Vec<Section<'a>>, kind: SectionKind, members: Vec<Member<'a>>) {
    if !members.is_empty() {
        sections.push(Section { kind, members });
    }
}
