//! Declaration reconstruction.
//!
//! This module turns a resolved [`Module`] into C#-like pseudo source, one
//! declaration block per type, with every declaration annotated with where it
//! lives in the binary.
//!
//! ## Architecture
//!
//! Rendering a type happens in two steps:
//!
//! 1. [`categorize`] splits the type into ordered sections and works out
//!    which methods are property or event accessors
//! 2. [`DeclarationWriter`] prints the declaration head and each section
//!
//! The [`DeclarationVisitor`] trait walks the same categorized view without
//! producing text, e.g. to count what a dump would contain.
//!
//! ## Output format
//!
//! ```text
//! // Image 0: Assembly-CSharp.dll - 1200
//!
//! // Namespace: Game.Core
//! [Serializable]
//! public class Player : MonoBehaviour // TypeDefIndex: 1201
//! {
//! 	// Fields
//! 	private int hp; // 0x18
//!
//! 	// Properties
//! 	public int Hp { get; } // 0x00A1B2C0
//!
//! 	// Methods
//! 	public void .ctor(); // 0x00A1B300
//! }
//! ```

mod layout;
mod visitor;

use crate::model::{
    Field, Method, Module, Parameter, Property, TypeDefinition, DEFAULT_ENUM_ELEMENT,
    OBJECT_TYPE, VALUE_TYPE,
};
use std::io::{self, Write};
use tracing::{trace, warn};

pub use layout::{categorize, Diagnostic, Member, Section, SectionKind, TypeLayout};
pub use visitor::{walk_module, DeclarationVisitor, NullVisitor, StatsVisitor};

/// Configuration for declaration reconstruction
#[derive(Debug, Clone)]
pub struct ReconstructorConfig {
    /// Indentation string (default: one tab)
    pub indent_str: String,
    /// Only render types whose namespace contains this substring
    pub filter: Option<String>,
}

impl Default for ReconstructorConfig {
    fn default() -> Self {
        Self {
            indent_str: "\t".to_string(),
            filter: None,
        }
    }
}

impl ReconstructorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the indentation string
    pub fn indent_str(mut self, s: impl Into<String>) -> Self {
        self.indent_str = s.into();
        self
    }

    /// Sets the namespace filter
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Sets or clears the namespace filter
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    /// Whether a type passes the namespace filter (case-sensitive substring)
    pub fn matches(&self, type_def: &TypeDefinition) -> bool {
        match &self.filter {
            Some(filter) => type_def.namespace.contains(filter.as_str()),
            None => true,
        }
    }
}

/// Counts collected while rendering one module
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Types written (delegates included)
    pub types_rendered: usize,
    /// Types excluded by the namespace filter
    pub types_filtered: usize,
    /// Model inconsistencies reported while rendering
    pub diagnostics: usize,
}

/// Renders modules as declaration text
#[derive(Debug, Clone, Default)]
pub struct ModuleRenderer {
    config: ReconstructorConfig,
}

impl ModuleRenderer {
    /// Creates a renderer with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a renderer with custom config
    pub fn with_config(config: ReconstructorConfig) -> Self {
        Self { config }
    }

    /// Returns the active configuration
    pub fn config(&self) -> &ReconstructorConfig {
        &self.config
    }

    /// Render a module into a string
    pub fn render(&self, module: &Module) -> String {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_to(module, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Render a module into any writer
    pub fn write_to(&self, module: &Module, w: &mut impl Write) -> io::Result<RenderStats> {
        DeclarationWriter::new(w, &self.config).write_module(module)
    }
}

/// Streams declarations for one module into a writer
pub struct DeclarationWriter<'a, W: Write> {
    writer: &'a mut W,
    config: &'a ReconstructorConfig,
    stats: RenderStats,
}

impl<'a, W: Write> DeclarationWriter<'a, W> {
    /// Creates a writer over the given sink
    pub fn new(writer: &'a mut W, config: &'a ReconstructorConfig) -> Self {
        Self {
            writer,
            config,
            stats: RenderStats::default(),
        }
    }

    /// Write the module header and every type passing the filter
    pub fn write_module(mut self, module: &Module) -> io::Result<RenderStats> {
        writeln!(
            self.writer,
            "// Image {}: {} - {}",
            module.index, module.name, module.type_start
        )?;

        for type_def in &module.types {
            if !self.config.matches(type_def) {
                trace!("Filtered out {}", type_def.full_name());
                self.stats.types_filtered += 1;
                continue;
            }
            self.write_type(type_def)?;
        }

        self.writer.flush()?;
        Ok(self.stats)
    }

    /// Write one type's declaration block
    pub fn write_type(&mut self, type_def: &TypeDefinition) -> io::Result<()> {
        let layout = categorize(type_def);
        for diagnostic in &layout.diagnostics {
            warn!(
                "TypeDefIndex {} ({}): {}",
                type_def.index,
                type_def.full_name(),
                diagnostic
            );
        }
        self.stats.diagnostics += layout.diagnostics.len();
        self.stats.types_rendered += 1;

        writeln!(self.writer, "\n// Namespace: {}", type_def.namespace)?;
        write!(self.writer, "{}", declaration_prefix(type_def))?;

        if let Some(invoke) = layout.delegate_invoke {
            writeln!(
                self.writer,
                "delegate {} {}({}); // TypeDefIndex: {}; 0x{:08X}",
                invoke.return_type,
                type_def.name,
                format_parameters(&invoke.parameters),
                type_def.index,
                invoke.virtual_address
            )?;
            return Ok(());
        }

        let bases = base_list(type_def);
        let base_text = if bases.is_empty() {
            String::new()
        } else {
            format!(" : {}", bases.join(", "))
        };
        writeln!(
            self.writer,
            "{}{}{}{} // TypeDefIndex: {}\n{{",
            type_modifiers(type_def),
            type_def.kind().keyword(),
            type_def.name,
            base_text,
            type_def.index
        )?;

        for section in &layout.sections {
            self.write_section(type_def, section)?;
        }

        writeln!(self.writer, "}}")
    }

    fn write_section(&mut self, type_def: &TypeDefinition, section: &Section<'_>) -> io::Result<()> {
        let indent = self.config.indent_str.as_str();

        if let Some(title) = section.kind.title() {
            writeln!(self.writer, "{}{}", indent, title)?;
        }

        if section.kind == SectionKind::EnumValues {
            let lines: Vec<String> = section
                .members
                .iter()
                .filter_map(|m| match m {
                    Member::EnumValue(v) => Some(format!("{}{} = {}", indent, v.name, v.value)),
                    _ => None,
                })
                .collect();
            writeln!(self.writer, "{}", lines.join(",\n"))?;
        } else {
            for member in &section.members {
                match *member {
                    Member::Field(field) => {
                        writeln!(self.writer, "{}{}", indent, field_declaration(field))?;
                    }
                    Member::Property(property) => {
                        writeln!(
                            self.writer,
                            "{}{}",
                            indent,
                            property_declaration(type_def, property)
                        )?;
                    }
                    Member::Event(event) => {
                        let add = event.add.and_then(|i| type_def.method(i));
                        let modifiers = add.map(Method::modifier_string).unwrap_or_default();
                        writeln!(
                            self.writer,
                            "{}{}event {} {} {{",
                            indent, modifiers, event.handler_type, event.name
                        )?;
                        let accessors: Vec<String> = event
                            .accessors()
                            .filter_map(|(label, i)| type_def.method(i).map(|m| (label, m)))
                            .map(|(label, m)| {
                                format!("{0}{0}{1}; // 0x{2:08X}", indent, label, m.virtual_address)
                            })
                            .collect();
                        writeln!(self.writer, "{}\n{}}}", accessors.join("\n"), indent)?;
                    }
                    Member::Method(_, method) => {
                        writeln!(self.writer, "{}{}", indent, method_declaration(method))?;
                    }
                    Member::EnumValue(_) => {}
                }
            }
        }

        if section.kind.trailing_blank_line() {
            writeln!(self.writer)?;
        }
        Ok(())
    }
}

/// Attribute markers and visibility keyword that start every declaration
pub fn declaration_prefix(type_def: &TypeDefinition) -> String {
    let mut prefix = String::new();
    if type_def.is_import() {
        prefix.push_str("[ComImport]");
    }
    if type_def.is_serializable() {
        prefix.push_str("[Serializable]\n");
    }
    prefix.push_str(type_def.visibility().keyword());
    prefix
}

/// `static`, `abstract` and `sealed` keywords of a non-delegate type
pub fn type_modifiers(type_def: &TypeDefinition) -> &'static str {
    let is_abstract = type_def.is_abstract();
    let is_sealed = type_def.is_sealed();

    if is_abstract && is_sealed {
        return "static ";
    }
    let abstract_kw = is_abstract && !type_def.is_interface();
    let sealed_kw = is_sealed && !type_def.is_value_type && !type_def.is_enum;
    match (abstract_kw, sealed_kw) {
        (true, true) => "abstract sealed ",
        (true, false) => "abstract ",
        (false, true) => "sealed ",
        (false, false) => "",
    }
}

/// Names following the `:` of a declaration head
///
/// Implemented interfaces come first in declaration order; a meaningful base
/// class or a non-`int` enum underlying type is put in front of them.
pub fn base_list(type_def: &TypeDefinition) -> Vec<String> {
    let mut bases = type_def.interfaces.clone();

    if let Some(base) = &type_def.base_type {
        if base.full_name != OBJECT_TYPE && base.full_name != VALUE_TYPE && !type_def.is_enum {
            bases.insert(0, base.name.clone());
        }
    }
    if type_def.is_enum {
        if let Some(element) = &type_def.element_type {
            if element != DEFAULT_ENUM_ELEMENT {
                bases.insert(0, element.clone());
            }
        }
    }
    bases
}

/// A field declaration line, without indentation
pub fn field_declaration(field: &Field) -> String {
    let mut line = String::new();
    if field.is_not_serialized() {
        line.push_str("[NonSerialized]\t");
    }
    line.push_str(field.attributes.access().keyword());
    if field.is_literal() {
        line.push_str("const ");
    } else if field.is_static() {
        line.push_str("static ");
    }
    if field.is_init_only() {
        line.push_str("readonly ");
    }
    if field.is_pinvoke_impl() {
        line.push_str("extern ");
    }
    line.push_str(&field.type_name);
    line.push(' ');
    line.push_str(&field.name);
    if let Some(value) = &field.default_value {
        line.push_str(" = ");
        line.push_str(value);
    }
    line.push_str(&format!("; // 0x{:02X}", field.offset));
    line
}

/// A property declaration line, without indentation
///
/// Modifiers come from the getter when there is one, else the setter.
pub fn property_declaration(owner: &TypeDefinition, property: &Property) -> String {
    let getter = property.getter.and_then(|i| owner.method(i));
    let setter = property.setter.and_then(|i| owner.method(i));
    let modifiers = getter
        .or(setter)
        .map(Method::modifier_string)
        .unwrap_or_default();

    let mut line = format!("{}{} {} {{ ", modifiers, property.type_name, property.name);
    if getter.is_some() {
        line.push_str("get; ");
    }
    if setter.is_some() {
        line.push_str("set; ");
    }
    line.push('}');

    let addresses: Vec<String> = [getter, setter]
        .into_iter()
        .flatten()
        .filter(|m| m.has_body())
        .map(|m| format!("0x{:08X}", m.virtual_address))
        .collect();
    if !addresses.is_empty() {
        line.push_str(" // ");
        line.push_str(&addresses.join(" "));
    }
    line
}

/// A standalone method declaration line, without indentation
pub fn method_declaration(method: &Method) -> String {
    let mut line = format!(
        "{}{} {}({});",
        method.modifier_string(),
        method.return_type,
        method.name,
        format_parameters(&method.parameters)
    );
    if method.has_body() {
        line.push_str(&format!(" // 0x{:08X}", method.virtual_address));
    }
    line
}

/// Comma-separated parameter list, without parentheses
pub fn format_parameters(parameters: &[Parameter]) -> String {
    parameters
        .iter()
        .map(|p| {
            let mut text = String::new();
            if p.is_optional() {
                text.push_str("optional ");
            }
            if p.is_out() {
                text.push_str("out ");
            }
            text.push_str(&p.type_name);
            text.push(' ');
            text.push_str(&p.name);
            text
        })
        .collect::<Vec<_>>()
        .join(", ")
}
