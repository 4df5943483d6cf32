use crate::value::{DateSelection, Number, SliderValue};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// A user interaction reported to the server on the next round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Button {
        key: String,
    },
    Checkbox {
        key: String,
        value: bool,
    },
    Toggle {
        key: String,
        value: bool,
    },
    Radio {
        key: String,
        index: i32,
    },
    Selectbox {
        key: String,
        index: i32,
    },
    Multiselect {
        key: String,
        selected_indices: Vec<i32>,
    },
    SelectSlider {
        key: String,
        lower_index: i32,
        upper_index: i32,
    },
    Slider {
        key: String,
        value: SliderValue,
    },
    DateInput {
        key: String,
        from_date: Option<NaiveDate>,
        to_date: Option<NaiveDate>,
    },
    TimeInput {
        key: String,
        value: Option<NaiveTime>,
    },
    NumberInput {
        key: String,
        value: Option<Number>,
    },
    TextInput {
        key: String,
        value: String,
    },
}

impl Action {
    pub fn key(&self) -> &str {
        match self {
            Action::Button { key }
            | Action::Checkbox { key, .. }
            | Action::Toggle { key, .. }
            | Action::Radio { key, .. }
            | Action::Selectbox { key, .. }
            | Action::Multiselect { key, .. }
            | Action::SelectSlider { key, .. }
            | Action::Slider { key, .. }
            | Action::DateInput { key, .. }
            | Action::TimeInput { key, .. }
            | Action::NumberInput { key, .. }
            | Action::TextInput { key, .. } => key,
        }
    }
}

/// Ordered per-round buffer of actions. Duplicates are kept.
#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    inner: Arc<Mutex<Vec<Action>>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push-only handle for host callbacks.
    pub fn sink(&self) -> ActionSink {
        ActionSink {
            inner: self.inner.clone(),
        }
    }

    pub fn snapshot(&self) -> Vec<Action> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Action>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone)]
pub struct ActionSink {
    inner: Arc<Mutex<Vec<Action>>>,
}

impl ActionSink {
    pub fn push(&self, action: Action) {
        debug!(key = action.key(), "queued action: {action:?}");
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Button,
    Checkbox,
    Toggle,
    Radio,
    Selectbox,
    Multiselect,
    SelectSlider,
    Slider,
    DateInput,
    TimeInput,
    NumberInput,
    TextInput,
}

/// New value of a widget, as reported by the host when it fires a callback.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetValue {
    Clicked,
    Bool(bool),
    Text(String),
    Number(Option<Number>),
    Selected(Option<String>),
    SelectedMany(Vec<String>),
    SelectedRange(String, Option<String>),
    Slider(SliderValue),
    Dates(DateSelection),
    Time(Option<NaiveTime>),
}

/// What a callback needs to turn a widget value into an [`Action`]:
/// the widget key, plus the option list for option widgets.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionTemplate {
    Button { key: String },
    Checkbox { key: String },
    Toggle { key: String },
    Radio { key: String, options: Vec<String> },
    Selectbox { key: String, options: Vec<String> },
    Multiselect { key: String, options: Vec<String> },
    SelectSlider { key: String, options: Vec<String> },
    Slider { key: String },
    DateInput { key: String },
    TimeInput { key: String },
    NumberInput { key: String },
    TextInput { key: String },
}

impl ActionTemplate {
    pub fn kind(&self) -> WidgetKind {
        match self {
            ActionTemplate::Button { .. } => WidgetKind::Button,
            ActionTemplate::Checkbox { .. } => WidgetKind::Checkbox,
            ActionTemplate::Toggle { .. } => WidgetKind::Toggle,
            ActionTemplate::Radio { .. } => WidgetKind::Radio,
            ActionTemplate::Selectbox { .. } => WidgetKind::Selectbox,
            ActionTemplate::Multiselect { .. } => WidgetKind::Multiselect,
            ActionTemplate::SelectSlider { .. } => WidgetKind::SelectSlider,
            ActionTemplate::Slider { .. } => WidgetKind::Slider,
            ActionTemplate::DateInput { .. } => WidgetKind::DateInput,
            ActionTemplate::TimeInput { .. } => WidgetKind::TimeInput,
            ActionTemplate::NumberInput { .. } => WidgetKind::NumberInput,
            ActionTemplate::TextInput { .. } => WidgetKind::TextInput,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            ActionTemplate::Button { key }
            | ActionTemplate::Checkbox { key }
            | ActionTemplate::Toggle { key }
            | ActionTemplate::Radio { key, .. }
            | ActionTemplate::Selectbox { key, .. }
            | ActionTemplate::Multiselect { key, .. }
            | ActionTemplate::SelectSlider { key, .. }
            | ActionTemplate::Slider { key }
            | ActionTemplate::DateInput { key }
            | ActionTemplate::TimeInput { key }
            | ActionTemplate::NumberInput { key }
            | ActionTemplate::TextInput { key } => key,
        }
    }

    /// Returns `None` when the value does not fit this widget.
    pub fn build(&self, value: WidgetValue) -> Option<Action> {
        let key = self.key().to_string();

        let action = match (self, value) {
            (ActionTemplate::Button { .. }, WidgetValue::Clicked) => Action::Button { key },
            (ActionTemplate::Checkbox { .. }, WidgetValue::Bool(value)) => {
                Action::Checkbox { key, value }
            }
            (ActionTemplate::Toggle { .. }, WidgetValue::Bool(value)) => Action::Toggle { key, value },
            (ActionTemplate::Radio { options, .. }, WidgetValue::Selected(selected)) => Action::Radio {
                key,
                index: index_of(options, selected.as_deref()),
            },
            (ActionTemplate::Selectbox { options, .. }, WidgetValue::Selected(selected)) => {
                Action::Selectbox {
                    key,
                    index: index_of(options, selected.as_deref()),
                }
            }
            (ActionTemplate::Multiselect { options, .. }, WidgetValue::SelectedMany(selected)) => {
                Action::Multiselect {
                    key,
                    selected_indices: selected
                        .iter()
                        .map(|option| index_of(options, Some(option)))
                        .filter(|index| *index >= 0)
                        .collect(),
                }
            }
            (ActionTemplate::SelectSlider { options, .. }, WidgetValue::SelectedRange(lower, upper)) => {
                Action::SelectSlider {
                    key,
                    lower_index: index_of(options, Some(&lower)),
                    upper_index: index_of(options, upper.as_deref()),
                }
            }
            (ActionTemplate::Slider { .. }, WidgetValue::Slider(value)) => Action::Slider { key, value },
            (ActionTemplate::DateInput { .. }, WidgetValue::Dates(dates)) => {
                let (from_date, to_date) = match (dates.from, dates.to) {
                    (Some(from), Some(to)) if from > to => {
                        warn!(key, %from, %to, "date range reversed; swapping");
                        (Some(to), Some(from))
                    }
                    (from, to) => (from, to),
                };
                Action::DateInput {
                    key,
                    from_date,
                    to_date,
                }
            }
            (ActionTemplate::TimeInput { .. }, WidgetValue::Time(value)) => Action::TimeInput { key, value },
            (ActionTemplate::NumberInput { .. }, WidgetValue::Number(value)) => {
                Action::NumberInput { key, value }
            }
            (ActionTemplate::TextInput { .. }, WidgetValue::Text(value)) => Action::TextInput { key, value },
            _ => return None,
        };

        Some(action)
    }
}

fn index_of(options: &[String], selected: Option<&str>) -> i32 {
    selected
        .and_then(|selected| options.iter().position(|option| option == selected))
        .and_then(|index| i32::try_from(index).ok())
        .unwrap_or(-1)
}

/// Change/click callback handed to the host. Firing it only appends to the
/// action queue.
#[derive(Debug, Clone)]
pub struct WidgetCallback {
    template: ActionTemplate,
    sink: ActionSink,
}

impl WidgetCallback {
    pub fn new(template: ActionTemplate, sink: ActionSink) -> Self {
        Self { template, sink }
    }

    pub fn kind(&self) -> WidgetKind {
        self.template.kind()
    }

    pub fn key(&self) -> &str {
        self.template.key()
    }

    pub fn fire(&self, value: WidgetValue) {
        match self.template.build(value.clone()) {
            Some(action) => self.sink.push(action),
            None => warn!(
                key = self.template.key(),
                "ignoring {value:?} for {:?} widget",
                self.template.kind()
            ),
        }
    }
}
