use crate::error::{Result, RuntimeError};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Number {
    #[serde(rename = "i")]
    Int(i64),
    #[serde(rename = "f")]
    Float(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliderScalar {
    Int(i64),
    Float(f64),
    Datetime(NaiveDateTime),
}

impl fmt::Display for SliderScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliderScalar::Int(value) => write!(f, "{value}"),
            SliderScalar::Float(value) => write!(f, "{value}"),
            SliderScalar::Datetime(value) => write!(f, "{}", value.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliderValue {
    Single(SliderScalar),
    Range(SliderScalar, SliderScalar),
}

impl fmt::Display for SliderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliderValue::Single(value) => write!(f, "{value}"),
            SliderValue::Range(from, to) => write!(f, "{from}..{to}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SliderStep {
    Int(i64),
    Float(f64),
    Seconds(u64),
}

/// Current value of a date input: nothing, a single date, or a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSelection {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateSelection {
    pub fn is_range(&self) -> bool {
        self.from.is_some() && self.to.is_some()
    }
}

pub fn parse_date(message: &'static str, field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>> {
    match raw.filter(|raw| !raw.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(Some)
            .map_err(|_| RuntimeError::InvalidField {
                message,
                field,
                value: raw.to_string(),
            }),
    }
}

pub fn parse_time(message: &'static str, field: &'static str, raw: Option<&str>) -> Result<Option<NaiveTime>> {
    match raw.filter(|raw| !raw.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveTime::parse_from_str(raw, TIME_FORMAT)
            .map(Some)
            .map_err(|_| RuntimeError::InvalidField {
                message,
                field,
                value: raw.to_string(),
            }),
    }
}
