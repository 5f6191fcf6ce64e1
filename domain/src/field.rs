//! The closed catalog of customer attributes that segment rules may reference.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Number,
    String,
    Boolean,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberField {
    TotalBookings,
    TotalMessages,
    DaysSinceLastSeen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    /// Multi-valued
    Tags,
    Source,
    Email,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagField {
    HasEmail,
    IsSubscriber,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    Number(NumberField),
    Text(TextField),
    Flag(FlagField),
}

pub const NUMBER_OPERATORS: &[&str] = &["eq", "neq", "gt", "lt", "gte", "lte", "between"];
pub const TEXT_OPERATORS: &[&str] = &["eq", "neq", "contains", "not_contains"];
pub const FLAG_OPERATORS: &[&str] = &["eq"];

/// Registry order is the order a UI lists the fields in.
pub const FIELDS: [Field; 8] = [
    Field::Number(NumberField::TotalBookings),
    Field::Number(NumberField::TotalMessages),
    Field::Number(NumberField::DaysSinceLastSeen),
    Field::Text(TextField::Tags),
    Field::Text(TextField::Source),
    Field::Text(TextField::Email),
    Field::Flag(FlagField::HasEmail),
    Field::Flag(FlagField::IsSubscriber),
];

impl Field {
    pub fn parse(name: &str) -> Option<Field> {
        FIELDS.into_iter().find(|field| field.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Number(NumberField::TotalBookings) => "total_bookings",
            Field::Number(NumberField::TotalMessages) => "total_messages",
            Field::Number(NumberField::DaysSinceLastSeen) => "days_since_last_seen",
            Field::Text(TextField::Tags) => "tags",
            Field::Text(TextField::Source) => "source",
            Field::Text(TextField::Email) => "email",
            Field::Flag(FlagField::HasEmail) => "has_email",
            Field::Flag(FlagField::IsSubscriber) => "is_subscriber",
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Number(_) => FieldType::Number,
            Field::Text(_) => FieldType::String,
            Field::Flag(_) => FieldType::Boolean,
        }
    }

    pub fn operators(&self) -> &'static [&'static str] {
        match self.field_type() {
            FieldType::Number => NUMBER_OPERATORS,
            FieldType::String => TEXT_OPERATORS,
            FieldType::Boolean => FLAG_OPERATORS,
        }
    }
}

/// One registry entry as a UI needs it to render legal operator choices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub operators: &'static [&'static str],
}

pub fn available_fields() -> Vec<FieldDescriptor> {
    FIELDS
        .iter()
        .map(|field| FieldDescriptor {
            name: field.name(),
            field_type: field.field_type(),
            operators: field.operators(),
        })
        .collect()
}
