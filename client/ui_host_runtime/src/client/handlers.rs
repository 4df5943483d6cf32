use super::{Flow, RemoteUiClient, RoundOutcome};
use crate::action::ActionTemplate;
use crate::connection::Connector;
use crate::error::{Result, RuntimeError};
use crate::host::{Element, Host, PageTarget, Widget};
use crate::operation::*;
use crate::state::{self, SessionState};
use crate::value::{self, DateSelection};
use serde_json::Value;
use std::ops::ControlFlow;
use tracing::{debug, info};

impl<C: Connector, H: Host> RemoteUiClient<C, H> {
    pub(super) fn apply(&mut self, operation: &Operation, host: &mut H) -> Result<Flow> {
        match operation {
            Operation::InnerContainer(op) => self.inner_container(op, host)?,
            Operation::ExpandableContainer(op) => self.expandable_container(op, host)?,
            Operation::PlaceholderContainer(op) => self.placeholder_container(op, host)?,
            Operation::TabContainers(op) => self.tab_containers(op, host)?,
            Operation::ColumnContainers(op) => self.column_containers(op, host)?,

            Operation::Title(op) => self.element(op.container.as_deref(), Element::Title(op), host)?,
            Operation::Header(op) => self.element(op.container.as_deref(), Element::Header(op), host)?,
            Operation::Subheader(op) => self.element(op.container.as_deref(), Element::Subheader(op), host)?,
            Operation::Caption(op) => self.element(op.container.as_deref(), Element::Caption(op), host)?,
            Operation::Code(op) => self.element(op.container.as_deref(), Element::Code(op), host)?,
            Operation::Divider(op) => self.element(op.container.as_deref(), Element::Divider(op), host)?,
            Operation::Latex(op) => self.element(op.container.as_deref(), Element::Latex(op), host)?,
            Operation::Text(op) => self.element(op.container.as_deref(), Element::Text(op), host)?,
            Operation::Markdown(op) => self.element(op.container.as_deref(), Element::Markdown(op), host)?,
            Operation::WriteStreamChunk(op) => self.write_stream_chunk(op, host)?,

            Operation::Button(op) => self.button(op, host)?,
            Operation::Checkbox(op) => self.checkbox(op, false, host)?,
            Operation::Toggle(op) => self.checkbox(op, true, host)?,
            Operation::Radio(op) => self.radio(op, host)?,
            Operation::Selectbox(op) => self.selectbox(op, host)?,
            Operation::Multiselect(op) => self.multiselect(op, host)?,
            Operation::SelectSlider(op) => self.select_slider(op, host)?,
            Operation::Slider(op) => self.slider(op, host)?,
            Operation::DateInput(op) => self.date_input(op, host)?,
            Operation::TimeInput(op) => self.time_input(op, host)?,
            Operation::NumberInput(op) => self.number_input(op, host)?,
            Operation::TextInput(op) => self.text_input(op, host)?,
            Operation::PageLink(op) => self.page_link(op, host)?,

            Operation::Rerun => {
                host.rerun();
                return Ok(ControlFlow::Break(RoundOutcome::Rerun));
            }
            Operation::SwitchPage(op) => return self.switch_page(op, host),
            Operation::Stop(op) => return self.stop(op, host),
            Operation::End(op) => {
                if op.terminate_session {
                    self.terminate(host);
                    host.rerun();
                    return Ok(ControlFlow::Break(RoundOutcome::Terminated));
                }
                return Ok(ControlFlow::Break(RoundOutcome::Ended));
            }
            Operation::TerminateSession => {
                info!("server requested session termination");
                self.terminate(host);
                return Ok(ControlFlow::Break(RoundOutcome::Terminated));
            }

            Operation::Unknown => debug!("skipping unknown operation"),
        }

        Ok(ControlFlow::Continue(()))
    }

    // Containers

    fn inner_container(&mut self, op: &InnerContainerOp, host: &mut H) -> Result<()> {
        let key = require(op.key.as_deref(), "InnerContainerOp", "key")?;
        let height = (op.height > 0).then_some(op.height);
        let surface = host.container(self.contexts.resolve(op.parent.as_deref())?, height, op.border)?;
        self.contexts.insert(key, surface);
        Ok(())
    }

    fn expandable_container(&mut self, op: &ExpandableContainerOp, host: &mut H) -> Result<()> {
        let key = require(op.key.as_deref(), "ExpandableContainerOp", "key")?;
        let icon = op.icon.as_deref().filter(|icon| !icon.is_empty());
        let parent = self.contexts.resolve(op.parent.as_deref())?;
        let surface = host.expander(parent, &op.label, op.expanded, icon)?;
        self.contexts.insert(key, surface);
        Ok(())
    }

    fn placeholder_container(&mut self, op: &PlaceholderContainerOp, host: &mut H) -> Result<()> {
        let key = require(op.key.as_deref(), "PlaceholderContainerOp", "key")?;

        if op.empty {
            host.clear(self.contexts.resolve(Some(key))?)?;
            debug!(key, "emptied placeholder");
            return Ok(());
        }

        let surface = host.placeholder(self.contexts.resolve(op.parent.as_deref())?)?;
        self.contexts.insert(key, surface);
        Ok(())
    }

    fn tab_containers(&mut self, op: &TabContainersOp, host: &mut H) -> Result<()> {
        check_slots("TabContainersOp", op.tabs.len(), &op.keys)?;
        let surfaces = host.tabs(self.contexts.resolve(op.parent.as_deref())?, &op.tabs)?;
        self.contexts.insert_all("TabContainersOp", &op.keys, surfaces)
    }

    fn column_containers(&mut self, op: &ColumnContainersOp, host: &mut H) -> Result<()> {
        check_slots("ColumnContainersOp", op.widths.len(), &op.keys)?;
        let parent = self.contexts.resolve(op.parent.as_deref())?;
        let surfaces = host.columns(parent, &op.widths, op.gap, op.vertical_alignment)?;
        self.contexts.insert_all("ColumnContainersOp", &op.keys, surfaces)
    }

    // Leaf renders

    fn element(&mut self, container: Option<&str>, element: Element<'_>, host: &mut H) -> Result<()> {
        host.element(self.contexts.resolve(container)?, element)?;
        Ok(())
    }

    fn write_stream_chunk(&mut self, op: &WriteStreamChunkOp, host: &mut H) -> Result<()> {
        let key = require(Some(&op.key), "WriteStreamChunkOp", "key")?;
        let surface = self.contexts.resolve(op.container.as_deref())?;
        self.streams.push(key, op.body.clone(), op.is_last, |stream| {
            host.write_stream(surface, stream).map_err(RuntimeError::from)
        })
    }

    // Widgets

    fn button(&mut self, op: &ButtonOp, host: &mut H) -> Result<()> {
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;

        if let Some(url) = op.url.as_deref().filter(|url| !url.is_empty()) {
            host.widget(surface, Widget::LinkButton { op, url }, None)?;
            return Ok(());
        }

        let key = op.widget_props.require_key("ButtonOp")?;
        let callback = self.callback(ActionTemplate::Button { key: key.to_string() });
        host.widget(surface, Widget::Button(op), Some(callback))?;
        Ok(())
    }

    fn checkbox(&mut self, op: &CheckboxOp, toggle: bool, host: &mut H) -> Result<()> {
        let (message, template, widget) = if toggle {
            let key = op.widget_props.require_key("ToggleOp")?.to_string();
            ("ToggleOp", ActionTemplate::Toggle { key }, Widget::Toggle(op))
        } else {
            let key = op.widget_props.require_key("CheckboxOp")?.to_string();
            ("CheckboxOp", ActionTemplate::Checkbox { key }, Widget::Checkbox(op))
        };
        debug!(message, key = template.key(), value = op.value, "rendering checkbox");

        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, widget, Some(self.callback(template)))?;
        Ok(())
    }

    fn radio(&mut self, op: &RadioOp, host: &mut H) -> Result<()> {
        let key = op.widget_props.require_key("RadioOp")?;
        let index = option_index(op.index, &op.options);
        host.session_state().set(key, selected_option(&op.options, index));

        let template = ActionTemplate::Radio {
            key: key.to_string(),
            options: op.options.clone(),
        };
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, Widget::Radio { op, index }, Some(self.callback(template)))?;
        Ok(())
    }

    fn selectbox(&mut self, op: &SelectboxOp, host: &mut H) -> Result<()> {
        let key = op.widget_props.require_key("SelectboxOp")?;
        let index = option_index(op.index, &op.options);
        host.session_state().set(key, selected_option(&op.options, index));

        let template = ActionTemplate::Selectbox {
            key: key.to_string(),
            options: op.options.clone(),
        };
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, Widget::Selectbox { op, index }, Some(self.callback(template)))?;
        Ok(())
    }

    fn multiselect(&mut self, op: &MultiselectOp, host: &mut H) -> Result<()> {
        let key = op.widget_props.require_key("MultiselectOp")?;
        let selected: Vec<usize> = op
            .selected_indices
            .iter()
            .filter_map(|index| option_index(*index, &op.options))
            .collect();
        let values = selected
            .iter()
            .map(|index| Value::String(op.options[*index].clone()))
            .collect();
        host.session_state().set(key, Value::Array(values));

        let template = ActionTemplate::Multiselect {
            key: key.to_string(),
            options: op.options.clone(),
        };
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, Widget::Multiselect { op, selected }, Some(self.callback(template)))?;
        Ok(())
    }

    fn select_slider(&mut self, op: &SelectSliderOp, host: &mut H) -> Result<()> {
        let key = op.widget_props.require_key("SelectSliderOp")?;
        let lower = option_index(op.lower_index, &op.options);
        let upper = option_index(op.upper_index, &op.options);

        let seeded = match (lower, upper) {
            (Some(lower), Some(upper)) => Value::Array(vec![
                Value::String(op.options[lower].clone()),
                Value::String(op.options[upper].clone()),
            ]),
            (Some(lower), None) => Value::String(op.options[lower].clone()),
            (None, _) => Value::Null,
        };
        host.session_state().set(key, seeded);

        let template = ActionTemplate::SelectSlider {
            key: key.to_string(),
            options: op.options.clone(),
        };
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, Widget::SelectSlider { op, lower, upper }, Some(self.callback(template)))?;
        Ok(())
    }

    fn slider(&mut self, op: &SliderOp, host: &mut H) -> Result<()> {
        let key = op.widget_props.require_key("SliderOp")?;
        let initial = op.value.ok_or(RuntimeError::MissingField {
            message: "SliderOp",
            field: "value",
        })?;

        let value = seed_or_read(host.session_state(), key, state::slider_value(initial), state::read_slider)
            .unwrap_or(initial);

        let template = ActionTemplate::Slider { key: key.to_string() };
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, Widget::Slider { op, value }, Some(self.callback(template)))?;
        Ok(())
    }

    fn date_input(&mut self, op: &DateInputOp, host: &mut H) -> Result<()> {
        const MESSAGE: &str = "DateInputOp";
        let key = op.widget_props.require_key(MESSAGE)?;
        let min = value::parse_date(MESSAGE, "min_date", op.min_date.as_deref())?;
        let max = value::parse_date(MESSAGE, "max_date", op.max_date.as_deref())?;

        if !host.session_state().contains(key) {
            let from = value::parse_date(MESSAGE, "from_date", op.from_date.as_deref())?;
            let to = value::parse_date(MESSAGE, "to_date", op.to_date.as_deref())?;
            let initial = match (from, to) {
                (None, None) if op.today => DateSelection {
                    from: Some(chrono::Local::now().date_naive()),
                    to: None,
                },
                (Some(from), to) => DateSelection { from: Some(from), to },
                (None, _) => DateSelection::default(),
            };
            host.session_state().set(key, state::date_value(initial));
        }

        let value = host
            .session_state()
            .get(key)
            .map(state::read_dates)
            .unwrap_or_default();

        let template = ActionTemplate::DateInput { key: key.to_string() };
        let widget = Widget::DateInput {
            op,
            value,
            min,
            max,
            format: op.display_format(),
        };
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, widget, Some(self.callback(template)))?;
        Ok(())
    }

    fn time_input(&mut self, op: &TimeInputOp, host: &mut H) -> Result<()> {
        let key = op.widget_props.require_key("TimeInputOp")?;
        let initial = value::parse_time("TimeInputOp", "value", op.value.as_deref())?;

        let value = seed_or_read(host.session_state(), key, state::time_value(initial), state::read_time);

        let template = ActionTemplate::TimeInput { key: key.to_string() };
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, Widget::TimeInput { op, value }, Some(self.callback(template)))?;
        Ok(())
    }

    fn number_input(&mut self, op: &NumberInputOp, host: &mut H) -> Result<()> {
        let key = op.widget_props.require_key("NumberInputOp")?;

        let value = seed_or_read(host.session_state(), key, state::number_value(op.value), state::read_number);

        let template = ActionTemplate::NumberInput { key: key.to_string() };
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, Widget::NumberInput { op, value }, Some(self.callback(template)))?;
        Ok(())
    }

    fn text_input(&mut self, op: &TextInputOp, host: &mut H) -> Result<()> {
        let key = op.widget_props.require_key("TextInputOp")?;

        let value = seed_or_read(host.session_state(), key, Value::String(op.value.clone()), |stored| {
            stored.as_str().map(str::to_string)
        })
        .unwrap_or_else(|| op.value.clone());

        let template = ActionTemplate::TextInput { key: key.to_string() };
        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, Widget::TextInput { op, value }, Some(self.callback(template)))?;
        Ok(())
    }

    fn page_link(&mut self, op: &PageLinkOp, host: &mut H) -> Result<()> {
        let target = if op.is_external() {
            PageTarget::Url(&op.page)
        } else {
            let page = require(Some(&op.page), "PageLinkOp", "page")?;
            PageTarget::Page(self.pages.binding(page))
        };

        let surface = self.contexts.resolve(op.widget_props.container.as_deref())?;
        host.widget(surface, Widget::PageLink { op, target }, None)?;
        Ok(())
    }

    // Flow control

    fn switch_page(&mut self, op: &SwitchPageOp, host: &mut H) -> Result<Flow> {
        let page = require(Some(&op.page), "SwitchPageOp", "page")?;
        let binding = self.pages.binding(page);
        host.switch_page(&binding)?;
        Ok(ControlFlow::Break(RoundOutcome::SwitchedPage))
    }

    fn stop(&mut self, op: &StopOp, host: &mut H) -> Result<Flow> {
        if let Some(message) = op.message.as_deref().filter(|message| !message.is_empty()) {
            host.element(self.contexts.resolve(None)?, Element::Warning(message))?;
        }
        host.stop();
        Ok(ControlFlow::Break(RoundOutcome::Stopped))
    }
}

fn check_slots(message: &'static str, slots: usize, keys: &[String]) -> Result<()> {
    if slots != keys.len() {
        return Err(RuntimeError::SlotMismatch {
            message,
            slots,
            keys: keys.len(),
        });
    }
    Ok(())
}

/// Server index → option position; out of range means nothing selected.
fn option_index(index: i32, options: &[String]) -> Option<usize> {
    usize::try_from(index).ok().filter(|index| *index < options.len())
}

fn selected_option(options: &[String], index: Option<usize>) -> Value {
    Value::String(index.map(|index| options[index].clone()).unwrap_or_default())
}

/// Stores `initial` when the key is new, then reads whatever is stored.
fn seed_or_read<S, T, F>(state: &mut S, key: &str, initial: Value, read: F) -> Option<T>
where
    S: SessionState,
    F: FnOnce(&Value) -> Option<T>,
{
    if !state.contains(key) {
        state.set(key, initial);
    }
    state.get(key).and_then(read)
}
