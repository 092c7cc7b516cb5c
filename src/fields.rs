//! Declarative field rules.
//!
//! A [`FieldSpec`] binds a field name to presence rules (`required`,
//! `nullable`) and a [`FieldKind`] that checks the type and format of a
//! non-empty value. Schemas are ordered tables of these specs.

use chrono::{Local, NaiveDate};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

/// Date format accepted by date fields (`day.month.year`).
pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// Oldest accepted age for a birthday, in years.
pub const MAX_AGE_YEARS: f64 = 70.0;

/// Gender codes. `FEMALE` is a defined code but the gender validator only
/// accepts `UNKNOWN` and `MALE`.
pub const UNKNOWN: i64 = 0;
pub const MALE: i64 = 1;
pub const FEMALE: i64 = 2;

static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^7[0-9]{10}$").expect("phone pattern is valid"));

/// Reason a request failed schema or composite validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is absent from the input mapping.
    #[error("field '{field}' is required")]
    MissingField { field: &'static str },
    /// A non-nullable field carries null or an empty value.
    #[error("field '{field}' must not be empty")]
    EmptyValue { field: &'static str },
    /// The value has the wrong primitive type.
    #[error("field '{field}': {reason}")]
    WrongType {
        field: &'static str,
        reason: &'static str,
    },
    /// The value has the right type but an invalid format.
    #[error("field '{field}': {reason}")]
    InvalidFormat { field: &'static str, reason: String },
    /// None of the required field pairs is fully present.
    #[error(
        "missing pair values (phone & email) | (first_name & last_name) | (gender & birthday)"
    )]
    MissingCombination,
}

impl ValidationError {
    /// Stable tag used in 422 payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingField { .. } => "missing_field",
            ValidationError::EmptyValue { .. } => "empty_value",
            ValidationError::WrongType { .. } => "wrong_type",
            ValidationError::InvalidFormat { .. } => "invalid_format",
            ValidationError::MissingCombination => "missing_combination",
        }
    }

    /// Name of the offending field, when the failure is tied to one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::EmptyValue { field }
            | ValidationError::WrongType { field, .. }
            | ValidationError::InvalidFormat { field, .. } => Some(*field),
            ValidationError::MissingCombination => None,
        }
    }
}

/// Type and format check applied to a non-empty field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Any string.
    Char,
    /// A JSON object.
    Arguments,
    /// A string containing `@`.
    Email,
    /// An 11 digit string starting with `7`.
    Phone,
    /// A string containing at least one letter.
    Name,
    /// A `DD.MM.YYYY` date string.
    Date,
    /// A date no more than 70 years in the past.
    BirthDay,
    /// A gender code in `{0, 1}`.
    Gender,
    /// An integer client id.
    ClientId,
}

impl FieldKind {
    /// Checks a single value; `field` is only used to label the error.
    pub fn check(self, field: &'static str, value: &Value) -> Result<(), ValidationError> {
        match self {
            FieldKind::Char => expect_str(field, value).map(|_| ()),
            FieldKind::Arguments => match value {
                Value::Object(_) => Ok(()),
                _ => Err(ValidationError::WrongType {
                    field,
                    reason: "arguments should be an object",
                }),
            },
            FieldKind::Email => {
                let email = expect_str(field, value)?;
                if email.contains('@') {
                    Ok(())
                } else {
                    Err(format_error(field, "value is not an email"))
                }
            }
            FieldKind::Phone => check_phone(field, expect_str(field, value)?),
            FieldKind::Name => {
                let name = expect_str(field, value)?;
                if name.chars().any(char::is_alphabetic) {
                    Ok(())
                } else {
                    Err(format_error(field, "value is not a name"))
                }
            }
            FieldKind::Date => parse_date(field, expect_str(field, value)?).map(|_| ()),
            FieldKind::BirthDay => {
                let date = parse_date(field, expect_str(field, value)?)?;
                check_age(field, date, Local::now().date_naive())
            }
            FieldKind::Gender => match value.as_i64() {
                Some(UNKNOWN | MALE) => Ok(()),
                Some(_) => Err(format_error(field, "gender must be 0 or 1")),
                None => Err(ValidationError::WrongType {
                    field,
                    reason: "gender must be an integer",
                }),
            },
            FieldKind::ClientId => match value {
                Value::Number(n) if n.is_i64() => Ok(()),
                _ => Err(ValidationError::WrongType {
                    field,
                    reason: "all ids should be integers",
                }),
            },
        }
    }
}

/// A single named validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub required: bool,
    pub nullable: bool,
    /// Accepts a list of values, each checked against `kind`.
    pub sequence: bool,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            required: true,
            nullable: true,
            sequence: false,
            kind,
        }
    }

    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub const fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub const fn sequence(mut self) -> Self {
        self.sequence = true;
        self
    }

    /// Validates the value bound to this field, `None` meaning the key is absent.
    ///
    /// Presence rules run first. The kind check only sees non-empty values;
    /// sequence fields are checked element by element, other fields reject lists.
    pub fn validate(&self, value: Option<&Value>) -> Result<(), ValidationError> {
        let Some(value) = value else {
            return if self.required {
                Err(ValidationError::MissingField { field: self.name })
            } else {
                Ok(())
            };
        };

        if is_empty(value) {
            return if self.nullable {
                Ok(())
            } else {
                Err(ValidationError::EmptyValue { field: self.name })
            };
        }

        match value {
            Value::Array(items) if self.sequence => items
                .iter()
                .try_for_each(|item| self.kind.check(self.name, item)),
            other => self.kind.check(self.name, other),
        }
    }
}

/// Null, `""`, `[]` and `{}` count as empty.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Parses a `DD.MM.YYYY` string.
pub fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| format_error(field, "value is not a date in DD.MM.YYYY format"))
}

fn check_age(field: &'static str, birthday: NaiveDate, today: NaiveDate) -> Result<(), ValidationError> {
    let age_years = (today - birthday).num_days() as f64 / 365.0;
    if age_years > MAX_AGE_YEARS {
        Err(format_error(field, "age is over 70 years"))
    } else {
        Ok(())
    }
}

fn check_phone(field: &'static str, phone: &str) -> Result<(), ValidationError> {
    if !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(format_error(field, "not all symbols are digits"));
    }
    if !PHONE_PATTERN.is_match(phone) {
        return Err(format_error(
            field,
            "phone must be 11 digits starting with 7",
        ));
    }
    Ok(())
}

fn expect_str<'v>(field: &'static str, value: &'v Value) -> Result<&'v str, ValidationError> {
    value.as_str().ok_or(ValidationError::WrongType {
        field,
        reason: "value is not a string",
    })
}

fn format_error(field: &'static str, reason: &str) -> ValidationError {
    ValidationError::InvalidFormat {
        field,
        reason: reason.to_string(),
    }
}
