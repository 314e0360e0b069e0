//! Web form model: the fields a user fills in to submit a job.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::values::ValueMap;

/// HTML input element type.
///
/// See <https://developer.mozilla.org/en-US/docs/Web/HTML/Element/input>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ElementType {
    Checkbox,
    Color,
    Date,
    #[serde(rename = "datetime-local")]
    DateTimeLocal,
    Email,
    File,
    Hidden,
    Image,
    Month,
    Number,
    Password,
    Radio,
    Range,
    Search,
    Tel,
    #[default]
    Text,
    Time,
    Url,
    Week,
    #[serde(rename = "textarea")]
    TextArea,
    Select,
}

impl ElementType {
    pub const ALL: [ElementType; 21] = [
        ElementType::Checkbox,
        ElementType::Color,
        ElementType::Date,
        ElementType::DateTimeLocal,
        ElementType::Email,
        ElementType::File,
        ElementType::Hidden,
        ElementType::Image,
        ElementType::Month,
        ElementType::Number,
        ElementType::Password,
        ElementType::Radio,
        ElementType::Range,
        ElementType::Search,
        ElementType::Tel,
        ElementType::Text,
        ElementType::Time,
        ElementType::Url,
        ElementType::Week,
        ElementType::TextArea,
        ElementType::Select,
    ];

    /// Value of the HTML `type` attribute (or tag name for textarea/select).
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Checkbox => "checkbox",
            ElementType::Color => "color",
            ElementType::Date => "date",
            ElementType::DateTimeLocal => "datetime-local",
            ElementType::Email => "email",
            ElementType::File => "file",
            ElementType::Hidden => "hidden",
            ElementType::Image => "image",
            ElementType::Month => "month",
            ElementType::Number => "number",
            ElementType::Password => "password",
            ElementType::Radio => "radio",
            ElementType::Range => "range",
            ElementType::Search => "search",
            ElementType::Tel => "tel",
            ElementType::Text => "text",
            ElementType::Time => "time",
            ElementType::Url => "url",
            ElementType::Week => "week",
            ElementType::TextArea => "textarea",
            ElementType::Select => "select",
        }
    }

    /// Whether the element renders one control per entry of `value_list`.
    pub fn is_choice_group(&self) -> bool {
        matches!(self, ElementType::Checkbox | ElementType::Radio)
    }
}

impl core::fmt::Display for ElementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single form field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Element {
    /// HTML id; unique within the form.
    pub id: String,
    /// Key under which the submitted value is stored.
    pub name: String,
    /// Text of the field label.
    pub label: String,
    /// Pre-filled value (or selected option).
    pub value: String,
    pub required: bool,
    /// Help text shown under the field.
    pub description: String,
    pub element_type: ElementType,
    /// Options for select/checkbox/radio, suggestions (datalist) for inputs.
    pub value_list: Vec<String>,
    pub read_only: bool,
}

impl Element {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, element_type: ElementType) -> Self {
        self.element_type = element_type;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// One page of a multi-page form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    /// Shown under the form description; explains the page's elements.
    pub description: String,
    pub elements: Vec<Element>,
}

/// Top-level form definition. The last page carries the submit button.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Form {
    /// Shown at the top of every page and in the HTML title.
    pub name: String,
    pub description: String,
    pub pages: Vec<Page>,
}

impl Form {
    pub fn new(name: impl Into<String>, pages: Vec<Page>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            pages,
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.pages.iter().flat_map(|p| p.elements.iter())
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.pages.iter_mut().flat_map(|p| p.elements.iter_mut())
    }

    /// Names of all fields, in page order, without duplicates.
    pub fn field_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.elements()
            .map(|e| e.name.as_str())
            .filter(|n| !n.is_empty() && seen.insert(*n))
            .collect()
    }

    /// A form is usable when it has at least one element and no two elements
    /// share an id.
    pub fn validate(&self) -> DomainResult<()> {
        if self.elements().next().is_none() {
            return Err(DomainError::validation("form has no elements"));
        }
        let mut ids = HashSet::new();
        for element in self.elements().filter(|e| !e.id.is_empty()) {
            if !ids.insert(element.id.as_str()) {
                return Err(DomainError::validation(format!(
                    "duplicate element id {:?}",
                    element.id
                )));
            }
        }
        Ok(())
    }

    /// Read-only copy of the form filled with submitted values.
    ///
    /// Single-value fields get the value in `value`; multi-value fields keep all
    /// of them joined with ", " so nothing submitted is hidden.
    pub fn with_values(&self, values: &ValueMap) -> Form {
        let mut form = self.clone();
        for element in form.elements_mut() {
            if let Some(submitted) = values.get(&element.name) {
                element.value = submitted.join(", ");
            }
            element.read_only = true;
        }
        form
    }
}
