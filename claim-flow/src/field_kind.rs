use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::model::{Field, FieldType};

/// Presentation-neutral description of how a field should be shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub name: String,
    pub hint: String,
    pub mandatory: bool,
    pub read_only: bool,
    pub value: Option<Value>,
    pub input: WidgetInput,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WidgetInput {
    Text,
    TextArea,
    Number,
    Date,
    Select { options: Vec<String> },
    Radio { options: Vec<String> },
    Checkbox,
}

/// Renderer/validator pair for one field type
pub trait FieldKind: Send + Sync {
    fn field_type(&self) -> FieldType;

    fn requires_options(&self) -> bool {
        self.field_type().requires_options()
    }

    fn input(&self, field: &Field) -> WidgetInput;

    /// Checks a non-empty value, returning the message to show when it is wrong.
    fn check_value(&self, field: &Field, value: &Value) -> Option<String>;

    fn widget(&self, field: &Field, value: Option<&Value>, read_only: bool) -> Widget {
        Widget {
            name: field.name.clone(),
            hint: field.validation_hint.clone(),
            mandatory: field.mandatory,
            read_only,
            value: value.cloned(),
            input: self.input(field),
        }
    }
}

fn as_text(value: &Value) -> Option<&str> {
    value.as_str()
}

pub struct TextKind;

impl FieldKind for TextKind {
    fn field_type(&self) -> FieldType {
        FieldType::Text
    }

    fn input(&self, _field: &Field) -> WidgetInput {
        WidgetInput::Text
    }

    fn check_value(&self, field: &Field, value: &Value) -> Option<String> {
        as_text(value)
            .is_none()
            .then(|| format!("{} must be text", field.name))
    }
}

pub struct TextareaKind;

impl FieldKind for TextareaKind {
    fn field_type(&self) -> FieldType {
        FieldType::Textarea
    }

    fn input(&self, _field: &Field) -> WidgetInput {
        WidgetInput::TextArea
    }

    fn check_value(&self, field: &Field, value: &Value) -> Option<String> {
        as_text(value)
            .is_none()
            .then(|| format!("{} must be text", field.name))
    }
}

pub struct NumberKind;

impl FieldKind for NumberKind {
    fn field_type(&self) -> FieldType {
        FieldType::Number
    }

    fn input(&self, _field: &Field) -> WidgetInput {
        WidgetInput::Number
    }

    fn check_value(&self, field: &Field, value: &Value) -> Option<String> {
        let numeric = match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        };
        (!numeric).then(|| format!("{} must be a number", field.name))
    }
}

pub struct DateKind;

impl DateKind {
    pub const FORMAT: &'static str = "%Y-%m-%d";
}

impl FieldKind for DateKind {
    fn field_type(&self) -> FieldType {
        FieldType::Date
    }

    fn input(&self, _field: &Field) -> WidgetInput {
        WidgetInput::Date
    }

    fn check_value(&self, field: &Field, value: &Value) -> Option<String> {
        let valid = as_text(value)
            .map(|s| NaiveDate::parse_from_str(s.trim(), Self::FORMAT).is_ok())
            .unwrap_or(false);
        (!valid).then(|| format!("{} must be a date (YYYY-MM-DD)", field.name))
    }
}

fn check_option(field: &Field, value: &Value) -> Option<String> {
    let chosen = as_text(value).unwrap_or_default();
    (!field.options.iter().any(|o| o == chosen))
        .then(|| format!("{} must be one of: {}", field.name, field.options.join(", ")))
}

pub struct DropdownKind;

impl FieldKind for DropdownKind {
    fn field_type(&self) -> FieldType {
        FieldType::Dropdown
    }

    fn input(&self, field: &Field) -> WidgetInput {
        WidgetInput::Select {
            options: field.options.clone(),
        }
    }

    fn check_value(&self, field: &Field, value: &Value) -> Option<String> {
        check_option(field, value)
    }
}

pub struct RadioKind;

impl FieldKind for RadioKind {
    fn field_type(&self) -> FieldType {
        FieldType::Radio
    }

    fn input(&self, field: &Field) -> WidgetInput {
        WidgetInput::Radio {
            options: field.options.clone(),
        }
    }

    fn check_value(&self, field: &Field, value: &Value) -> Option<String> {
        check_option(field, value)
    }
}

pub struct CheckboxKind;

impl FieldKind for CheckboxKind {
    fn field_type(&self) -> FieldType {
        FieldType::Checkbox
    }

    fn input(&self, _field: &Field) -> WidgetInput {
        WidgetInput::Checkbox
    }

    fn check_value(&self, field: &Field, value: &Value) -> Option<String> {
        let valid = match value {
            Value::Bool(_) => true,
            Value::String(s) => matches!(s.as_str(), "true" | "false"),
            _ => false,
        };
        (!valid).then(|| format!("{} must be checked or unchecked", field.name))
    }
}

/// Lookup table from field type to its kind
#[derive(Clone)]
pub struct FieldKindRegistry {
    kinds: HashMap<FieldType, Arc<dyn FieldKind>>,
}

impl FieldKindRegistry {
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// Registry with the seven built-in kinds
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register(Arc::new(TextKind))
            .register(Arc::new(NumberKind))
            .register(Arc::new(DateKind))
            .register(Arc::new(TextareaKind))
            .register(Arc::new(DropdownKind))
            .register(Arc::new(RadioKind))
            .register(Arc::new(CheckboxKind));
        registry
    }

    /// Adds a kind, replacing any kind already registered for its type.
    pub fn register(&mut self, kind: Arc<dyn FieldKind>) -> &mut Self {
        self.kinds.insert(kind.field_type(), kind);
        self
    }

    pub fn kind(&self, field_type: FieldType) -> Option<Arc<dyn FieldKind>> {
        self.kinds.get(&field_type).cloned()
    }

    /// Renders a field, falling back to a plain text input for unregistered types.
    pub fn widget(&self, field: &Field, value: Option<&Value>, read_only: bool) -> Widget {
        match self.kinds.get(&field.field_type) {
            Some(kind) => kind.widget(field, value, read_only),
            None => TextKind.widget(field, value, read_only),
        }
    }

    /// Unregistered types accept any value.
    pub fn check_value(&self, field: &Field, value: &Value) -> Option<String> {
        self.kinds
            .get(&field.field_type)
            .and_then(|kind| kind.check_value(field, value))
    }
}

impl Default for FieldKindRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
