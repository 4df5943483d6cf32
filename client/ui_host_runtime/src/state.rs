use crate::action::WidgetValue;
use crate::value::{DATE_FORMAT, DateSelection, Number, SliderValue, TIME_FORMAT};
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;
use std::collections::BTreeMap;

/// Per-session key/value store owned by the host. Widget values live here
/// between rounds.
pub trait SessionState {
    fn get(&self, key: &str) -> Option<&Value>;

    fn set(&mut self, key: &str, value: Value);

    fn delete(&mut self, key: &str) -> Option<Value>;

    fn keys(&self) -> Vec<String>;

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn clear(&mut self) {
        for key in self.keys() {
            self.delete(&key);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySessionState {
    values: BTreeMap<String, Value>,
}

impl MemorySessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SessionState for MemorySessionState {
    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn delete(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// Records a widget's new value so the next round renders it.
pub fn remember(state: &mut impl SessionState, key: &str, value: &WidgetValue) {
    let encoded = match value {
        WidgetValue::Clicked => return,
        WidgetValue::Bool(value) => Value::Bool(*value),
        WidgetValue::Text(text) => Value::String(text.clone()),
        WidgetValue::Number(number) => number_value(*number),
        WidgetValue::Selected(selected) => Value::String(selected.clone().unwrap_or_default()),
        WidgetValue::SelectedMany(selected) => {
            Value::Array(selected.iter().cloned().map(Value::String).collect())
        }
        WidgetValue::SelectedRange(lower, upper) => match upper {
            Some(upper) => Value::Array(vec![Value::String(lower.clone()), Value::String(upper.clone())]),
            None => Value::String(lower.clone()),
        },
        WidgetValue::Slider(value) => slider_value(*value),
        WidgetValue::Dates(dates) => date_value(*dates),
        WidgetValue::Time(time) => time_value(*time),
    };
    state.set(key, encoded);
}

pub(crate) fn number_value(number: Option<Number>) -> Value {
    number
        .and_then(|number| serde_json::to_value(number).ok())
        .unwrap_or(Value::Null)
}

pub(crate) fn read_number(value: &Value) -> Option<Number> {
    serde_json::from_value(value.clone()).ok()
}

pub(crate) fn slider_value(value: SliderValue) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

pub(crate) fn read_slider(value: &Value) -> Option<SliderValue> {
    serde_json::from_value(value.clone()).ok()
}

pub(crate) fn date_value(dates: DateSelection) -> Value {
    let format = |date: NaiveDate| Value::String(date.format(DATE_FORMAT).to_string());
    match (dates.from, dates.to) {
        (Some(from), Some(to)) => Value::Array(vec![format(from), format(to)]),
        (Some(from), None) => format(from),
        _ => Value::Null,
    }
}

pub(crate) fn read_dates(value: &Value) -> DateSelection {
    let parse = |value: &Value| {
        value
            .as_str()
            .and_then(|raw| NaiveDate::parse_from_str(raw, DATE_FORMAT).ok())
    };
    match value {
        Value::Array(items) => DateSelection {
            from: items.first().and_then(parse),
            to: items.get(1).and_then(parse),
        },
        other => DateSelection {
            from: parse(other),
            to: None,
        },
    }
}

pub(crate) fn time_value(time: Option<NaiveTime>) -> Value {
    time.map(|time| Value::String(time.format(TIME_FORMAT).to_string()))
        .unwrap_or(Value::Null)
}

pub(crate) fn read_time(value: &Value) -> Option<NaiveTime> {
    value
        .as_str()
        .and_then(|raw| NaiveTime::parse_from_str(raw, TIME_FORMAT).ok())
}
