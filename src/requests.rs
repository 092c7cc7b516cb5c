//! Request shapes: the method envelope and the two method argument schemas.
//!
//! Each type exposes a static [`Schema`] and a `parse` constructor that runs
//! the schema (plus any cross-field rule) before building the typed value.

use crate::fields::{parse_date, FieldKind, FieldSpec, ValidationError};
use crate::schema::{RequestModel, Schema};
use chrono::NaiveDate;
use serde_json::{Map, Value};

pub const ADMIN_LOGIN: &str = "admin";

pub static METHOD_REQUEST: Schema = Schema {
    name: "method_request",
    fields: &[
        FieldSpec::new("account", FieldKind::Char).required(false),
        FieldSpec::new("login", FieldKind::Char),
        FieldSpec::new("token", FieldKind::Char),
        FieldSpec::new("arguments", FieldKind::Arguments),
        FieldSpec::new("method", FieldKind::Char).nullable(false),
    ],
};

pub static CLIENTS_INTERESTS_REQUEST: Schema = Schema {
    name: "clients_interests",
    fields: &[
        FieldSpec::new("client_ids", FieldKind::ClientId).sequence(),
        FieldSpec::new("date", FieldKind::Date).required(false),
    ],
};

pub static ONLINE_SCORE_REQUEST: Schema = Schema {
    name: "online_score",
    fields: &[
        FieldSpec::new("first_name", FieldKind::Name).required(false),
        FieldSpec::new("last_name", FieldKind::Name).required(false),
        FieldSpec::new("email", FieldKind::Email).required(false),
        FieldSpec::new("phone", FieldKind::Phone).required(false),
        FieldSpec::new("birthday", FieldKind::BirthDay).required(false),
        FieldSpec::new("gender", FieldKind::Gender).required(false),
    ],
};

/// Field pairs of which at least one must be fully present in a score request.
pub const SCORE_FIELD_PAIRS: [(&str, &str); 3] = [
    ("phone", "email"),
    ("first_name", "last_name"),
    ("gender", "birthday"),
];

/// Outer request carrying the caller identity and the method arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRequest {
    pub account: Option<String>,
    pub login: Option<String>,
    pub token: Option<String>,
    pub arguments: Map<String, Value>,
    pub method: String,
}

impl MethodRequest {
    pub fn parse(body: Value) -> Result<Self, ValidationError> {
        let model = RequestModel::from_value(&METHOD_REQUEST, body)?;
        model.validate()?;

        let mut values = model.into_values();
        Ok(Self {
            account: take_string(&mut values, "account"),
            login: take_string(&mut values, "login"),
            token: take_string(&mut values, "token"),
            arguments: match values.remove("arguments") {
                Some(Value::Object(arguments)) => arguments,
                _ => Map::new(),
            },
            method: take_string(&mut values, "method").unwrap_or_default(),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.login.as_deref() == Some(ADMIN_LOGIN)
    }
}

/// Arguments of the `clients_interests` method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientsInterestsRequest {
    pub client_ids: Vec<i64>,
    pub date: Option<NaiveDate>,
}

impl ClientsInterestsRequest {
    pub fn parse(arguments: &Map<String, Value>) -> Result<Self, ValidationError> {
        let model = RequestModel::new(&CLIENTS_INTERESTS_REQUEST, arguments.clone());
        model.validate()?;

        // A scalar id is accepted as a one-element list.
        let client_ids = match model.get("client_ids") {
            Some(Value::Array(ids)) => ids.iter().filter_map(Value::as_i64).collect(),
            Some(value) => value.as_i64().into_iter().collect(),
            None => Vec::new(),
        };
        let date = optional_date(&model, "date")?;

        Ok(Self { client_ids, date })
    }
}

/// Arguments of the `online_score` method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnlineScoreRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub gender: Option<i64>,
}

impl OnlineScoreRequest {
    /// Validates the fields, then requires one complete pair from [`SCORE_FIELD_PAIRS`].
    pub fn parse(arguments: &Map<String, Value>) -> Result<Self, ValidationError> {
        let model = RequestModel::new(&ONLINE_SCORE_REQUEST, arguments.clone());
        model.validate()?;

        let has_pair = SCORE_FIELD_PAIRS
            .iter()
            .any(|(left, right)| model.is_present(left) && model.is_present(right));
        if !has_pair {
            return Err(ValidationError::MissingCombination);
        }

        let text = |name: &str| {
            model
                .get_str(name)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        Ok(Self {
            first_name: text("first_name"),
            last_name: text("last_name"),
            email: text("email"),
            phone: text("phone"),
            birthday: optional_date(&model, "birthday")?,
            gender: model.get("gender").and_then(Value::as_i64),
        })
    }
}

fn take_string(values: &mut Map<String, Value>, name: &str) -> Option<String> {
    match values.remove(name) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn optional_date(
    model: &RequestModel,
    name: &'static str,
) -> Result<Option<NaiveDate>, ValidationError> {
    match model.get_str(name).filter(|s| !s.is_empty()) {
        Some(raw) => parse_date(name, raw).map(Some),
        None => Ok(None),
    }
}
