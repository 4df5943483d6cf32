use crate::error::{Result, RuntimeError};
use crate::value::{Number, SliderScalar, SliderStep, SliderValue};
use serde::{Deserialize, Serialize};

/// One server-issued instruction, decoded from the `op` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    InnerContainer(InnerContainerOp),
    ExpandableContainer(ExpandableContainerOp),
    PlaceholderContainer(PlaceholderContainerOp),
    TabContainers(TabContainersOp),
    ColumnContainers(ColumnContainersOp),

    Title(TitleOp),
    Header(HeaderOp),
    Subheader(HeaderOp),
    Caption(CaptionOp),
    Code(CodeOp),
    Divider(DividerOp),
    Latex(LatexOp),
    Text(TextOp),
    Markdown(MarkdownOp),
    WriteStreamChunk(WriteStreamChunkOp),

    Button(ButtonOp),
    Checkbox(CheckboxOp),
    Toggle(CheckboxOp),
    Radio(RadioOp),
    Selectbox(SelectboxOp),
    Multiselect(MultiselectOp),
    SelectSlider(SelectSliderOp),
    Slider(SliderOp),
    DateInput(DateInputOp),
    TimeInput(TimeInputOp),
    NumberInput(NumberInputOp),
    TextInput(TextInputOp),
    PageLink(PageLinkOp),

    Rerun,
    SwitchPage(SwitchPageOp),
    Stop(StopOp),
    End(EndOp),
    TerminateSession,

    #[serde(other)]
    Unknown,
}

impl Operation {
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::InnerContainer(_) => "inner_container",
            Operation::ExpandableContainer(_) => "expandable_container",
            Operation::PlaceholderContainer(_) => "placeholder_container",
            Operation::TabContainers(_) => "tab_containers",
            Operation::ColumnContainers(_) => "column_containers",
            Operation::Title(_) => "title",
            Operation::Header(_) => "header",
            Operation::Subheader(_) => "subheader",
            Operation::Caption(_) => "caption",
            Operation::Code(_) => "code",
            Operation::Divider(_) => "divider",
            Operation::Latex(_) => "latex",
            Operation::Text(_) => "text",
            Operation::Markdown(_) => "markdown",
            Operation::WriteStreamChunk(_) => "write_stream_chunk",
            Operation::Button(_) => "button",
            Operation::Checkbox(_) => "checkbox",
            Operation::Toggle(_) => "toggle",
            Operation::Radio(_) => "radio",
            Operation::Selectbox(_) => "selectbox",
            Operation::Multiselect(_) => "multiselect",
            Operation::SelectSlider(_) => "select_slider",
            Operation::Slider(_) => "slider",
            Operation::DateInput(_) => "date_input",
            Operation::TimeInput(_) => "time_input",
            Operation::NumberInput(_) => "number_input",
            Operation::TextInput(_) => "text_input",
            Operation::PageLink(_) => "page_link",
            Operation::Rerun => "rerun",
            Operation::SwitchPage(_) => "switch_page",
            Operation::Stop(_) => "stop",
            Operation::End(_) => "end",
            Operation::TerminateSession => "terminate_session",
            Operation::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelVisibility {
    #[default]
    Visible,
    Hidden,
    Collapsed,
}

/// Properties shared by every input widget.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetProps {
    pub key: Option<String>,
    pub container: Option<String>,
    pub label: String,
    pub help: Option<String>,
    pub disabled: bool,
    pub label_visibility: LabelVisibility,
    pub use_container_width: bool,
}

impl WidgetProps {
    pub fn require_key(&self, message: &'static str) -> Result<&str> {
        require(self.key.as_deref(), message, "key")
    }
}

pub(crate) fn require<'a>(value: Option<&'a str>, message: &'static str, field: &'static str) -> Result<&'a str> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(RuntimeError::MissingField { message, field })
}

// Containers

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InnerContainerOp {
    pub parent: Option<String>,
    pub key: Option<String>,
    pub height: u32,
    pub border: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandableContainerOp {
    pub parent: Option<String>,
    pub key: Option<String>,
    pub label: String,
    pub expanded: bool,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderContainerOp {
    pub parent: Option<String>,
    pub key: Option<String>,
    /// Clears the existing placeholder at `key` instead of creating one.
    pub empty: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabContainersOp {
    pub parent: Option<String>,
    pub tabs: Vec<String>,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnGap {
    #[default]
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlignment {
    #[default]
    Top,
    Center,
    Bottom,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnContainersOp {
    pub parent: Option<String>,
    pub widths: Vec<f64>,
    pub keys: Vec<String>,
    pub gap: ColumnGap,
    pub vertical_alignment: VerticalAlignment,
}

// Leaf renders

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleOp {
    pub container: Option<String>,
    pub body: String,
    pub anchor: Option<String>,
    pub help: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderOp {
    pub container: Option<String>,
    pub body: String,
    pub anchor: Option<String>,
    pub help: Option<String>,
    pub divider: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionOp {
    pub container: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeOp {
    pub container: Option<String>,
    pub body: String,
    pub language: Option<String>,
    pub line_numbers: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DividerOp {
    pub container: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatexOp {
    pub container: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOp {
    pub container: Option<String>,
    pub body: String,
    pub help: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkdownOp {
    pub container: Option<String>,
    pub body: String,
    pub unsafe_allow_html: bool,
    pub help: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteStreamChunkOp {
    pub container: Option<String>,
    pub key: String,
    pub body: String,
    pub is_last: bool,
}

// Input widgets

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonKind {
    Primary,
    #[default]
    Secondary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonOp {
    pub widget_props: WidgetProps,
    #[serde(rename = "type")]
    pub kind: ButtonKind,
    /// Renders a link button instead of a click-reporting button.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckboxOp {
    pub widget_props: WidgetProps,
    pub value: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioOp {
    pub widget_props: WidgetProps,
    pub options: Vec<String>,
    pub captions: Vec<String>,
    pub index: i32,
    pub horizontal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectboxOp {
    pub widget_props: WidgetProps,
    pub options: Vec<String>,
    pub index: i32,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiselectOp {
    pub widget_props: WidgetProps,
    pub options: Vec<String>,
    pub selected_indices: Vec<i32>,
    pub placeholder: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectSliderOp {
    pub widget_props: WidgetProps,
    pub options: Vec<String>,
    pub lower_index: i32,
    pub upper_index: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderOp {
    pub widget_props: WidgetProps,
    pub value: Option<SliderValue>,
    pub min: Option<SliderScalar>,
    pub max: Option<SliderScalar>,
    pub step: Option<SliderStep>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    #[default]
    Yyyymmdd,
    Ddmmyyyy,
    Mmddyyyy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSeparator {
    #[default]
    Slash,
    Dash,
    Dot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DateInputOp {
    pub widget_props: WidgetProps,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub min_date: Option<String>,
    pub max_date: Option<String>,
    pub today: bool,
    pub date_format: DateFormat,
    pub date_separator: DateSeparator,
}

impl DateInputOp {
    /// Display format understood by the host, e.g. `DD.MM.YYYY`.
    pub fn display_format(&self) -> String {
        let pattern = match self.date_format {
            DateFormat::Yyyymmdd => "YYYY/MM/DD",
            DateFormat::Ddmmyyyy => "DD/MM/YYYY",
            DateFormat::Mmddyyyy => "MM/DD/YYYY",
        };
        let separator = match self.date_separator {
            DateSeparator::Slash => "/",
            DateSeparator::Dash => "-",
            DateSeparator::Dot => ".",
        };
        pattern.replace('/', separator)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeInputOp {
    pub widget_props: WidgetProps,
    pub value: Option<String>,
    pub step_seconds: u32,
}

impl Default for TimeInputOp {
    fn default() -> Self {
        Self {
            widget_props: WidgetProps::default(),
            value: None,
            step_seconds: 900,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumberInputOp {
    pub widget_props: WidgetProps,
    pub value: Option<Number>,
    pub min: Option<Number>,
    pub max: Option<Number>,
    pub step: Option<Number>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextInputKind {
    #[default]
    Default,
    Password,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextInputOp {
    pub widget_props: WidgetProps,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: TextInputKind,
    pub autocomplete: Option<String>,
    pub placeholder: Option<String>,
    pub max_chars: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLinkOp {
    pub widget_props: WidgetProps,
    pub page: String,
    pub icon: Option<String>,
}

impl PageLinkOp {
    pub fn is_external(&self) -> bool {
        self.page.starts_with("http://") || self.page.starts_with("https://")
    }
}

// Flow control

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchPageOp {
    pub page: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopOp {
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndOp {
    pub terminate_session: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_tagged_operations() {
        let ops: Vec<Operation> = serde_json::from_value(json!([
            {"op": "title", "body": "Hello", "container": "sidebar"},
            {"op": "tab_containers", "parent": "root", "tabs": ["a", "b"], "keys": ["ta", "tb"]},
            {"op": "end", "terminate_session": true},
            {"op": "rerun"}
        ]))
        .expect("decode operations");

        match &ops[0] {
            Operation::Title(op) => {
                assert_eq!(op.body, "Hello");
                assert_eq!(op.container.as_deref(), Some("sidebar"));
            }
            other => panic!("expected title, got {other:?}"),
        }
        assert_eq!(ops[1].kind(), "tab_containers");
        assert_eq!(ops[2], Operation::End(EndOp { terminate_session: true }));
        assert_eq!(ops[3], Operation::Rerun);
    }

    #[test]
    fn unrecognized_kinds_decode_as_unknown() {
        let op: Operation =
            serde_json::from_value(json!({"op": "balloons", "count": 3})).expect("decode unknown op");
        assert_eq!(op, Operation::Unknown);
    }

    #[test]
    fn button_type_and_widget_props_decode() {
        let op: Operation = serde_json::from_value(json!({
            "op": "button",
            "type": "primary",
            "widget_props": {"key": "go", "label": "Go", "label_visibility": "collapsed"}
        }))
        .expect("decode button");

        match op {
            Operation::Button(button) => {
                assert_eq!(button.kind, ButtonKind::Primary);
                assert_eq!(button.widget_props.require_key("ButtonOp").expect("key"), "go");
                assert_eq!(button.widget_props.label_visibility, LabelVisibility::Collapsed);
                assert!(button.url.is_none());
            }
            other => panic!("expected button, got {other:?}"),
        }
    }

    #[test]
    fn missing_widget_key_is_a_validation_error() {
        let props = WidgetProps::default();
        let err = props.require_key("CheckboxOp").expect_err("key is absent");
        assert_eq!(err.to_string(), "missing required field 'key' in message 'CheckboxOp'");
    }

    #[test]
    fn date_display_format_applies_separator() {
        let op = DateInputOp {
            date_format: DateFormat::Ddmmyyyy,
            date_separator: DateSeparator::Dot,
            ..DateInputOp::default()
        };
        assert_eq!(op.display_format(), "DD.MM.YYYY");
        assert_eq!(DateInputOp::default().display_format(), "YYYY/MM/DD");
    }

    #[test]
    fn time_input_defaults_to_fifteen_minute_steps() {
        let op: TimeInputOp = serde_json::from_value(json!({"value": "10:00:00"})).expect("decode");
        assert_eq!(op.step_seconds, 900);
    }
}
