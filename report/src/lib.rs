//! Validation results shared by the box and codestream parsers.
//!
//! A [`Report`] collects three things while a file is parsed: whether the
//! file is well-formed (structurally parseable), whether it is valid
//! (additionally conforms to the normative constraints), and an ordered tree
//! of named [`Property`] values. Errors and informational messages are kept in
//! the order they were raised, each with the byte offset it was raised at.

use log::{info, warn};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Info => write!(f, "INFO"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    severity: Severity,
    text: String,
    offset: u64,
}

impl Message {
    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {} (offset {})", self.severity, self.text, self.offset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Integer(i64),
    Boolean(bool),
    Text(String),
    Integers(Vec<i64>),
    List(Vec<Property>),
}

/// A named value, or a named subtree of further properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    name: String,
    value: PropertyValue,
}

impl Property {
    pub fn new(name: &str, value: PropertyValue) -> Property {
        Property {
            name: name.to_string(),
            value,
        }
    }

    pub fn integer<T: Into<i64>>(name: &str, value: T) -> Property {
        Property::new(name, PropertyValue::Integer(value.into()))
    }

    pub fn boolean(name: &str, value: bool) -> Property {
        Property::new(name, PropertyValue::Boolean(value))
    }

    pub fn text<T: Into<String>>(name: &str, value: T) -> Property {
        Property::new(name, PropertyValue::Text(value.into()))
    }

    pub fn integers<T: Into<i64> + Copy>(name: &str, values: &[T]) -> Property {
        Property::new(
            name,
            PropertyValue::Integers(values.iter().map(|v| (*v).into()).collect()),
        )
    }

    pub fn list(name: &str, properties: Vec<Property>) -> Property {
        Property::new(name, PropertyValue::List(properties))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self.value {
            PropertyValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            PropertyValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn children(&self) -> &[Property] {
        match &self.value {
            PropertyValue::List(children) => children,
            _ => &[],
        }
    }

    /// Depth-first search of this property and its subtree.
    pub fn find(&self, name: &str) -> Option<&Property> {
        if self.name == name {
            return Some(self);
        }
        find_in(self.children(), name)
    }

    fn write_indented(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match &self.value {
            PropertyValue::Integer(value) => writeln!(f, "{}{}: {}", indent, self.name, value),
            PropertyValue::Boolean(value) => writeln!(f, "{}{}: {}", indent, self.name, value),
            PropertyValue::Text(value) => writeln!(f, "{}{}: {:?}", indent, self.name, value),
            PropertyValue::Integers(values) => {
                let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                writeln!(f, "{}{}: [{}]", indent, self.name, values.join(", "))
            }
            PropertyValue::List(children) => {
                writeln!(f, "{}{}:", indent, self.name)?;
                for child in children {
                    child.write_indented(f, depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

fn find_in<'a>(properties: &'a [Property], name: &str) -> Option<&'a Property> {
    properties.iter().find_map(|property| property.find(name))
}

/// Validation sink threaded by reference through every parse call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    well_formed: bool,
    valid: bool,
    messages: Vec<Message>,
    properties: Vec<Property>,
}

impl Default for Report {
    fn default() -> Self {
        Report {
            well_formed: true,
            valid: true,
            messages: Vec::new(),
            properties: Vec::new(),
        }
    }
}

impl Report {
    pub fn new() -> Report {
        Report::default()
    }

    pub fn report_error<T: Into<String>>(&mut self, message: T, offset: u64) {
        let text = message.into();
        warn!("{} at byte offset {}", text, offset);
        self.messages.push(Message {
            severity: Severity::Error,
            text,
            offset,
        });
    }

    pub fn report_info<T: Into<String>>(&mut self, message: T, offset: u64) {
        let text = message.into();
        info!("{} at byte offset {}", text, offset);
        self.messages.push(Message {
            severity: Severity::Info,
            text,
            offset,
        });
    }

    /// A file that is not well-formed cannot be valid, so clearing this flag
    /// also clears `valid`.
    pub fn set_well_formed(&mut self, well_formed: bool) {
        self.well_formed = well_formed;
        if !well_formed {
            self.valid = false;
        }
    }

    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// Records a structural failure: the message plus `well_formed = false`.
    pub fn malformed<T: Into<String>>(&mut self, message: T, offset: u64) {
        self.report_error(message, offset);
        self.set_well_formed(false);
    }

    /// Records a conformance failure: the message plus `valid = false`.
    pub fn invalid<T: Into<String>>(&mut self, message: T, offset: u64) {
        self.report_error(message, offset);
        self.set_valid(false);
    }

    pub fn add_property(&mut self, property: Property) {
        self.properties.push(property);
    }

    pub fn is_well_formed(&self) -> bool {
        self.well_formed
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    pub fn find(&self, name: &str) -> Option<&Property> {
        find_in(&self.properties, name)
    }

    pub fn has_message(&self, fragment: &str) -> bool {
        self.messages
            .iter()
            .any(|message| message.text.contains(fragment))
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Well-formed: {}", self.well_formed)?;
        writeln!(f, "Valid: {}", self.valid)?;
        if !self.messages.is_empty() {
            writeln!(f, "Messages:")?;
            for message in &self.messages {
                writeln!(f, "  {}", message)?;
            }
        }
        if !self.properties.is_empty() {
            writeln!(f, "Properties:")?;
            for property in &self.properties {
                property.write_indented(f, 1)?;
            }
        }
        Ok(())
    }
}
