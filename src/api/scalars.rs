//! Scalar types that are part of every schema.

use chrono::{NaiveDate, NaiveTime, SecondsFormat, Utc};
use juniper::{GraphQLScalar, InputValue, ScalarValue};
use serde::{Deserialize, Serialize};

use crate::prelude::*;


/// A point in time, e.g. `1970-01-01T00:00:00.000Z`. Always UTC with
/// millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, GraphQLScalar)]
#[graphql(
    name = "DateTime",
    description = "An RFC 3339 date time in UTC, e.g. `1970-01-01T00:00:00.000Z`",
    with = Self,
    parse_token(String),
)]
pub(crate) struct DateTime(pub(crate) chrono::DateTime<Utc>);

impl DateTime {
    pub(crate) fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn to_output<S: ScalarValue>(&self) -> juniper::Value<S> {
        juniper::Value::scalar(self.to_rfc3339())
    }

    fn from_input<S: ScalarValue>(input: &InputValue<S>) -> Result<Self, String> {
        let s = input.as_string_value()
            .ok_or_else(|| format!("expected string for DateTime, found: {input}"))?;
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| format!("invalid DateTime '{s}': {e}"))
    }
}

/// A calendar date without time, e.g. `1970-01-01`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, GraphQLScalar)]
#[graphql(
    name = "Date",
    description = "A date in the format `YYYY-MM-DD`",
    with = Self,
    parse_token(String),
)]
pub(crate) struct Date(pub(crate) NaiveDate);

impl Date {
    const FORMAT: &'static str = "%Y-%m-%d";

    fn to_output<S: ScalarValue>(&self) -> juniper::Value<S> {
        juniper::Value::scalar(self.0.format(Self::FORMAT).to_string())
    }

    fn from_input<S: ScalarValue>(input: &InputValue<S>) -> Result<Self, String> {
        let s = input.as_string_value()
            .ok_or_else(|| format!("expected string for Date, found: {input}"))?;
        NaiveDate::parse_from_str(s, Self::FORMAT)
            .map(Self)
            .map_err(|e| format!("invalid Date '{s}': {e}"))
    }
}

/// A time of day in UTC, e.g. `00:00:00.000Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, GraphQLScalar)]
#[graphql(
    name = "Time",
    description = "A time of day in UTC, e.g. `13:37:00.000Z`",
    with = Self,
    parse_token(String),
)]
pub(crate) struct Time(pub(crate) NaiveTime);

impl Time {
    fn to_output<S: ScalarValue>(&self) -> juniper::Value<S> {
        juniper::Value::scalar(format!("{}Z", self.0.format("%H:%M:%S%.3f")))
    }

    fn from_input<S: ScalarValue>(input: &InputValue<S>) -> Result<Self, String> {
        let s = input.as_string_value()
            .ok_or_else(|| format!("expected string for Time, found: {input}"))?;
        let naive = s.strip_suffix('Z')
            .ok_or_else(|| format!("invalid Time '{s}': has to end with 'Z'"))?;
        NaiveTime::parse_from_str(naive, "%H:%M:%S%.f")
            .map(Self)
            .map_err(|e| format!("invalid Time '{s}': {e}"))
    }
}

impl From<chrono::DateTime<Utc>> for DateTime {
    fn from(src: chrono::DateTime<Utc>) -> Self {
        Self(src)
    }
}

impl From<chrono::DateTime<Utc>> for Date {
    fn from(src: chrono::DateTime<Utc>) -> Self {
        Self(src.date_naive())
    }
}

impl From<chrono::DateTime<Utc>> for Time {
    fn from(src: chrono::DateTime<Utc>) -> Self {
        Self(src.time())
    }
}


/// Arbitrary JSON value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, GraphQLScalar)]
#[serde(transparent)]
#[graphql(
    name = "JSON",
    description = "Arbitrary JSON value",
    with = Self,
    parse_token(String, i32, f64, bool),
)]
pub(crate) struct Json(pub(crate) serde_json::Value);

impl Json {
    fn to_output<S: ScalarValue>(&self) -> juniper::Value<S> {
        json_to_graphql(&self.0)
    }

    fn from_input<S: ScalarValue>(input: &InputValue<S>) -> Result<Self, String> {
        graphql_to_json(input).map(Self)
    }
}

fn json_to_graphql<S: ScalarValue>(value: &serde_json::Value) -> juniper::Value<S> {
    use serde_json::Value as J;

    match value {
        J::Null => juniper::Value::null(),
        J::Bool(b) => juniper::Value::scalar(*b),
        J::Number(n) => match n.as_i64().and_then(|n| i32::try_from(n).ok()) {
            Some(i) => juniper::Value::scalar(i),
            // Every JSON number has an `f64` representation.
            None => juniper::Value::scalar(n.as_f64().unwrap_or(f64::NAN)),
        },
        J::String(s) => juniper::Value::scalar(s.clone()),
        J::Array(items) => items.iter().map(json_to_graphql).collect::<Vec<_>>().pipe(juniper::Value::list),
        J::Object(fields) => fields.iter()
            .map(|(k, v)| (k.as_str(), json_to_graphql(v)))
            .collect::<juniper::Object<S>>()
            .pipe(juniper::Value::Object),
    }
}

fn graphql_to_json<S: ScalarValue>(input: &InputValue<S>) -> Result<serde_json::Value, String> {
    use serde_json::Value as J;

    let out = match input {
        InputValue::Null => J::Null,
        InputValue::Scalar(s) => {
            if let Some(b) = s.as_bool() {
                J::Bool(b)
            } else if let Some(i) = s.as_int() {
                J::from(i)
            } else if let Some(f) = s.as_float() {
                J::from(f)
            } else if let Some(s) = s.as_str() {
                J::String(s.to_owned())
            } else {
                return Err(format!("unsupported scalar value in JSON: {s}"));
            }
        }
        InputValue::Enum(e) => J::String(e.clone()),
        InputValue::Variable(v) => return Err(format!("unresolved variable '{v}' in JSON")),
        InputValue::List(items) => items.iter()
            .map(|item| graphql_to_json(&item.item))
            .collect::<Result<Vec<_>, _>>()?
            .pipe(J::Array),
        InputValue::Object(fields) => fields.iter()
            .map(|(k, v)| Ok((k.item.clone(), graphql_to_json(&v.item)?)))
            .collect::<Result<serde_json::Map<_, _>, String>>()?
            .pipe(J::Object),
    };

    Ok(out)
}
