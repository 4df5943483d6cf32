//! Line-oriented terminal host: renders each round as indented text and
//! turns typed commands into widget callbacks.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use remote_ui_host_runtime::navigation::PageRegistry;
use remote_ui_host_runtime::operation::{ColumnGap, VerticalAlignment};
use remote_ui_host_runtime::state::{self, MemorySessionState, SessionState};
use remote_ui_host_runtime::value::{DATE_FORMAT, DateSelection, Number, SliderScalar, SliderValue, TIME_FORMAT};
use remote_ui_host_runtime::{
    ChunkStream, Element, Host, HostError, NavLocation, NavigationMenu, PageBinding, PageTarget, Widget,
    WidgetCallback, WidgetKind, WidgetValue,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, warn};

const INDENT: &str = "  ";
const RANGE_SEPARATOR: &str = "..";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    path: String,
    depth: usize,
}

impl Surface {
    fn top(path: &str) -> Self {
        Self {
            path: path.to_string(),
            depth: 0,
        }
    }

    fn child(&self, name: &str) -> Self {
        Self {
            path: format!("{}/{name}", self.path),
            depth: self.depth + 1,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Empty line: render again without new input.
    Rerun,
    Click(String),
    Set { key: String, value: String },
    Page(String),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'; type 'help' for the list")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("no widget with key '{0}' on this page")]
    NoWidget(String),
    #[error("'{0}' cannot be clicked; use 'set'")]
    NotClickable(String),
    #[error("'{value}' is not a valid value for {kind:?} '{key}'")]
    InvalidValue {
        key: String,
        kind: WidgetKind,
        value: String,
    },
}

pub const HELP: &str = "\
commands:
  <enter>            render again
  click KEY          press a button, flip a checkbox or toggle
  set KEY VALUE      change a widget (ranges as LOW..HIGH, lists as a,b,c)
  page NAME          open a page from the menu (name or get_NAME)
  help               show this list
  quit               leave";

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Rerun);
    }

    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();

    match verb {
        "click" if !rest.is_empty() => Ok(Command::Click(rest.to_string())),
        "click" => Err(CommandError::Usage("click KEY")),
        "set" => {
            let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            if key.is_empty() {
                return Err(CommandError::Usage("set KEY VALUE"));
            }
            Ok(Command::Set {
                key: key.to_string(),
                value: value.trim().to_string(),
            })
        }
        "page" if !rest.is_empty() => Ok(Command::Page(rest.to_string())),
        "page" => Err(CommandError::Usage("page NAME")),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Accepts a page name or its registered binding name (`get_<page>`).
pub fn resolve_page(pages: &PageRegistry, name: String) -> String {
    match pages.by_name(&name) {
        Some(binding) => binding.page().to_string(),
        None => name,
    }
}

/// Host that writes to `out`. Stream drains share the writer from their
/// own threads, so it lives behind a mutex.
pub struct ConsoleHost<W: Write + Send + 'static> {
    out: Arc<Mutex<W>>,
    state: MemorySessionState,
    callbacks: HashMap<String, WidgetCallback>,
    drains: Vec<JoinHandle<()>>,
    selected_page: Option<String>,
    rerun_requested: bool,
    next_child: usize,
}

impl ConsoleHost<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> ConsoleHost<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            state: MemorySessionState::new(),
            callbacks: HashMap::new(),
            drains: Vec::new(),
            selected_page: None,
            rerun_requested: false,
            next_child: 0,
        }
    }

    /// Callbacks from the previous round are dropped; their widgets are gone.
    pub fn begin_round(&mut self) {
        self.callbacks.clear();
        self.rerun_requested = false;
        self.next_child = 0;
        let _ = self.line(0, "----");
    }

    /// Reaps drain threads whose stream has ended. A stream still waiting
    /// for its last chunk keeps its thread; it is checked again next round.
    pub fn finish_round(&mut self) {
        let (finished, pending): (Vec<_>, Vec<_>) =
            self.drains.drain(..).partition(|handle| handle.is_finished());

        for handle in finished {
            if handle.join().is_err() {
                warn!("stream drain thread panicked");
            }
        }

        if !pending.is_empty() {
            debug!(pending = pending.len(), "streams still open; skipping join");
        }
        self.drains = pending;
    }

    pub fn open_streams(&self) -> usize {
        self.drains.len()
    }

    /// Whether the last round asked to be rendered again. Clears the flag.
    pub fn take_rerun(&mut self) -> bool {
        std::mem::take(&mut self.rerun_requested)
    }

    pub fn selected_page(&self) -> Option<&str> {
        self.selected_page.as_deref()
    }

    pub fn notice(&mut self, message: &str) {
        let _ = self.line(0, message);
    }

    pub fn execute(&mut self, command: Command) -> Result<(), CommandError> {
        match command {
            Command::Click(key) => self.click(&key),
            Command::Set { key, value } => self.set(&key, &value),
            Command::Page(page) => {
                self.selected_page = Some(page);
                Ok(())
            }
            Command::Help => {
                self.notice(HELP);
                Ok(())
            }
            Command::Rerun | Command::Quit => Ok(()),
        }
    }

    fn click(&mut self, key: &str) -> Result<(), CommandError> {
        let callback = self.callback(key)?;
        let value = match callback.kind() {
            WidgetKind::Button => WidgetValue::Clicked,
            WidgetKind::Checkbox | WidgetKind::Toggle => {
                let current = self.state.get(key).and_then(|value| value.as_bool()).unwrap_or(false);
                WidgetValue::Bool(!current)
            }
            _ => return Err(CommandError::NotClickable(key.to_string())),
        };
        self.fire(&callback, value);
        Ok(())
    }

    fn set(&mut self, key: &str, raw: &str) -> Result<(), CommandError> {
        let callback = self.callback(key)?;
        let kind = callback.kind();
        let value = parse_value(kind, raw).ok_or_else(|| CommandError::InvalidValue {
            key: key.to_string(),
            kind,
            value: raw.to_string(),
        })?;
        self.fire(&callback, value);
        Ok(())
    }

    fn callback(&self, key: &str) -> Result<WidgetCallback, CommandError> {
        self.callbacks
            .get(key)
            .cloned()
            .ok_or_else(|| CommandError::NoWidget(key.to_string()))
    }

    fn fire(&mut self, callback: &WidgetCallback, value: WidgetValue) {
        state::remember(&mut self.state, callback.key(), &value);
        callback.fire(value);
    }

    fn line(&self, depth: usize, text: &str) -> io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let indent = INDENT.repeat(depth);
        for line in text.lines() {
            writeln!(out, "{indent}{line}")?;
        }
        out.flush()
    }

    fn print(&self, surface: &Surface, text: &str) -> Result<(), HostError> {
        self.line(surface.depth, text)
            .map_err(|err| HostError::new(format!("console write failed: {err}")))
    }

    fn nested(&mut self, parent: &Surface, header: String) -> Result<Surface, HostError> {
        self.print(parent, &header)?;
        let child = parent.child(&self.next_child.to_string());
        self.next_child += 1;
        Ok(child)
    }
}

impl<W: Write + Send + 'static> Host for ConsoleHost<W> {
    type Surface = Surface;
    type State = MemorySessionState;

    fn root(&mut self) -> Surface {
        Surface::top("main")
    }

    fn sidebar(&mut self) -> Surface {
        Surface::top("sidebar")
    }

    fn container(&mut self, parent: &Surface, height: Option<u32>, border: bool) -> Result<Surface, HostError> {
        let mut header = String::from("[container");
        if let Some(height) = height {
            header.push_str(&format!(" height={height}"));
        }
        if border {
            header.push_str(" bordered");
        }
        header.push(']');
        self.nested(parent, header)
    }

    fn expander(
        &mut self,
        parent: &Surface,
        label: &str,
        expanded: bool,
        icon: Option<&str>,
    ) -> Result<Surface, HostError> {
        let marker = if expanded { "v" } else { ">" };
        let icon = icon.map(|icon| format!("{icon} ")).unwrap_or_default();
        self.nested(parent, format!("{marker} {icon}{label}"))
    }

    fn tabs(&mut self, parent: &Surface, labels: &[String]) -> Result<Vec<Surface>, HostError> {
        labels
            .iter()
            .map(|label| self.nested(parent, format!("[tab {label}]")))
            .collect()
    }

    fn columns(
        &mut self,
        parent: &Surface,
        widths: &[f64],
        _gap: ColumnGap,
        _vertical_alignment: VerticalAlignment,
    ) -> Result<Vec<Surface>, HostError> {
        let total: f64 = widths.iter().sum();
        widths
            .iter()
            .enumerate()
            .map(|(index, width)| {
                let share = if total > 0.0 { width / total * 100.0 } else { 0.0 };
                self.nested(parent, format!("[column {} {share:.0}%]", index + 1))
            })
            .collect()
    }

    fn placeholder(&mut self, parent: &Surface) -> Result<Surface, HostError> {
        self.nested(parent, "[slot]".to_string())
    }

    fn clear(&mut self, surface: &Surface) -> Result<(), HostError> {
        self.print(surface, "(cleared)")
    }

    fn element(&mut self, surface: &Surface, element: Element<'_>) -> Result<(), HostError> {
        let text = match element {
            Element::Title(op) => format!("# {}", op.body),
            Element::Header(op) if op.divider => format!("## {}\n{}", op.body, "-".repeat(op.body.len().max(3))),
            Element::Header(op) => format!("## {}", op.body),
            Element::Subheader(op) => format!("### {}", op.body),
            Element::Caption(op) => format!("({})", op.body),
            Element::Code(op) => {
                let language = op.language.as_deref().unwrap_or("");
                format!("```{language}\n{}\n```", op.body)
            }
            Element::Divider(_) => "----------------".to_string(),
            Element::Latex(op) => format!("$$ {} $$", op.body),
            Element::Text(op) => op.body.clone(),
            Element::Markdown(op) => op.body.clone(),
            Element::Warning(message) => format!("! {message}"),
        };
        self.print(surface, &text)
    }

    fn write_stream(&mut self, surface: &Surface, stream: ChunkStream) -> Result<(), HostError> {
        let out = self.out.clone();
        let indent = INDENT.repeat(surface.depth);
        let key = stream.key().to_string();

        let handle = thread::Builder::new()
            .name(format!("stream-{key}"))
            .spawn(move || {
                for chunk in stream {
                    let mut out = out.lock().unwrap_or_else(PoisonError::into_inner);
                    if writeln!(out, "{indent}> {chunk}").and_then(|()| out.flush()).is_err() {
                        break;
                    }
                }
                debug!(key, "stream drained");
            })
            .map_err(|err| HostError::new(format!("failed to start stream writer: {err}")))?;

        self.drains.push(handle);
        Ok(())
    }

    fn widget(
        &mut self,
        surface: &Surface,
        widget: Widget<'_>,
        callback: Option<WidgetCallback>,
    ) -> Result<(), HostError> {
        let key = callback
            .as_ref()
            .map(|callback| format!(" <{}>", callback.key()))
            .unwrap_or_default();
        self.print(surface, &format!("{}{key}", describe(&widget)))?;

        if let Some(callback) = callback {
            self.callbacks.insert(callback.key().to_string(), callback);
        }
        Ok(())
    }

    fn navigation(
        &mut self,
        menu: &NavigationMenu,
        location: NavLocation,
    ) -> Result<Option<Arc<PageBinding>>, HostError> {
        let chosen = self
            .selected_page
            .as_deref()
            .and_then(|page| menu.find(page))
            .or_else(|| menu.default_page())
            .map(|page| page.binding.clone());

        if self.selected_page.is_some() && chosen.as_ref().map(|page| page.page()) != self.selected_page.as_deref() {
            warn!(page = ?self.selected_page, "selected page is not in the menu; using the default");
        }
        self.selected_page = chosen.as_ref().map(|page| page.page().to_string());

        if location == NavLocation::Hidden {
            return Ok(chosen);
        }

        let sidebar = self.sidebar();
        let current = self.selected_page.clone();
        let entry = |page: &remote_ui_host_runtime::navigation::MenuPage| {
            let marker = if current.as_deref() == Some(page.binding.page()) { "*" } else { " " };
            let icon = page.icon.as_deref().map(|icon| format!("{icon} ")).unwrap_or_default();
            format!("{marker} {icon}{} ({})", page.title, page.binding.page())
        };

        self.print(&sidebar, "[pages]")?;
        match menu {
            NavigationMenu::Flat(pages) => {
                for page in pages {
                    self.print(&sidebar.child("pages"), &entry(page))?;
                }
            }
            NavigationMenu::Grouped(groups) => {
                for (header, pages) in groups {
                    let group = sidebar.child("pages");
                    if let Some(header) = header {
                        self.print(&group, header)?;
                    }
                    for page in pages {
                        self.print(&group.child("group"), &entry(page))?;
                    }
                }
            }
        }

        Ok(chosen)
    }

    fn switch_page(&mut self, page: &Arc<PageBinding>) -> Result<(), HostError> {
        self.selected_page = Some(page.page().to_string());
        self.rerun_requested = true;
        self.print(&Surface::top("main"), &format!("-> {}", page.page()))
    }

    fn rerun(&mut self) {
        self.rerun_requested = true;
    }

    fn stop(&mut self) {
        let _ = self.line(0, "(stopped)");
    }

    fn show_error(&mut self, message: &str) {
        let _ = self.line(0, &format!("error: {message}"));
    }

    fn session_state(&mut self) -> &mut MemorySessionState {
        &mut self.state
    }
}

fn describe(widget: &Widget<'_>) -> String {
    match widget {
        Widget::Button(op) => format!("[ {} ]", op.widget_props.label),
        Widget::LinkButton { op, url } => format!("[ {} ] -> {url}", op.widget_props.label),
        Widget::Checkbox(op) => {
            let mark = if op.value { "x" } else { " " };
            format!("[{mark}] {}", op.widget_props.label)
        }
        Widget::Toggle(op) => {
            let mark = if op.value { "on" } else { "off" };
            format!("({mark}) {}", op.widget_props.label)
        }
        Widget::Radio { op, index } => choice(&op.widget_props.label, &op.options, *index),
        Widget::Selectbox { op, index } => choice(&op.widget_props.label, &op.options, *index),
        Widget::Multiselect { op, selected } => {
            let picked: Vec<&str> = selected
                .iter()
                .filter_map(|index| op.options.get(*index).map(String::as_str))
                .collect();
            format!("{}: [{}] of {}", op.widget_props.label, picked.join(", "), op.options.join("|"))
        }
        Widget::SelectSlider { op, lower, upper } => {
            let option = |index: &Option<usize>| index.and_then(|index| op.options.get(index)).cloned();
            let value = match (option(lower), option(upper)) {
                (Some(lower), Some(upper)) => format!("{lower}{RANGE_SEPARATOR}{upper}"),
                (Some(lower), None) => lower,
                _ => "-".to_string(),
            };
            format!("{}: {value} of {}", op.widget_props.label, op.options.join("|"))
        }
        Widget::Slider { op, value } => {
            let bounds = match (&op.min, &op.max) {
                (Some(min), Some(max)) => format!(" [{min}{RANGE_SEPARATOR}{max}]"),
                _ => String::new(),
            };
            format!("{}: {value}{bounds}", op.widget_props.label)
        }
        Widget::DateInput { op, value, format, .. } => {
            let show = |date: Option<NaiveDate>| {
                date.map(|date| date.format(format).to_string()).unwrap_or_default()
            };
            let rendered = if value.is_range() {
                format!("{}{RANGE_SEPARATOR}{}", show(value.from), show(value.to))
            } else {
                show(value.from)
            };
            format!("{}: {rendered}", op.widget_props.label)
        }
        Widget::TimeInput { op, value } => {
            let rendered = value.map(|time| time.format(TIME_FORMAT).to_string()).unwrap_or_default();
            format!("{}: {rendered}", op.widget_props.label)
        }
        Widget::NumberInput { op, value } => {
            let rendered = value.map(|number| number.to_string()).unwrap_or_default();
            format!("{}: {rendered}", op.widget_props.label)
        }
        Widget::TextInput { op, value } => format!("{}: \"{value}\"", op.widget_props.label),
        Widget::PageLink { op, target } => match target {
            PageTarget::Url(url) => format!("-> {} ({url})", op.widget_props.label),
            PageTarget::Page(binding) => format!("-> {} (page {})", op.widget_props.label, binding.page()),
        },
    }
}

fn choice(label: &str, options: &[String], index: Option<usize>) -> String {
    let rendered: Vec<String> = options
        .iter()
        .enumerate()
        .map(|(position, option)| {
            if Some(position) == index {
                format!("({option})")
            } else {
                option.clone()
            }
        })
        .collect();
    format!("{label}: {}", rendered.join(" | "))
}

/// Reads a typed value for a widget of `kind`. `None` when it does not fit.
pub fn parse_value(kind: WidgetKind, raw: &str) -> Option<WidgetValue> {
    let raw = raw.trim();
    match kind {
        WidgetKind::Button => None,
        WidgetKind::Checkbox | WidgetKind::Toggle => parse_bool(raw).map(WidgetValue::Bool),
        WidgetKind::Radio | WidgetKind::Selectbox => {
            Some(WidgetValue::Selected(Some(raw.to_string()).filter(|raw| !raw.is_empty())))
        }
        WidgetKind::Multiselect => Some(WidgetValue::SelectedMany(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        WidgetKind::SelectSlider => match raw.split_once(RANGE_SEPARATOR) {
            Some((lower, upper)) => Some(WidgetValue::SelectedRange(
                lower.trim().to_string(),
                Some(upper.trim().to_string()),
            )),
            None if !raw.is_empty() => Some(WidgetValue::SelectedRange(raw.to_string(), None)),
            None => None,
        },
        WidgetKind::Slider => {
            let value = match raw.split_once(RANGE_SEPARATOR) {
                Some((from, to)) => SliderValue::Range(parse_scalar(from.trim())?, parse_scalar(to.trim())?),
                None => SliderValue::Single(parse_scalar(raw)?),
            };
            Some(WidgetValue::Slider(value))
        }
        WidgetKind::DateInput => {
            let date = |raw: &str| NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok();
            let selection = match raw.split_once(RANGE_SEPARATOR) {
                _ if raw.is_empty() => DateSelection::default(),
                Some((from, to)) => DateSelection {
                    from: Some(date(from)?),
                    to: Some(date(to)?),
                },
                None => DateSelection {
                    from: Some(date(raw)?),
                    to: None,
                },
            };
            Some(WidgetValue::Dates(selection))
        }
        WidgetKind::TimeInput if raw.is_empty() => Some(WidgetValue::Time(None)),
        WidgetKind::TimeInput => NaiveTime::parse_from_str(raw, TIME_FORMAT)
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
            .ok()
            .map(|time| WidgetValue::Time(Some(time))),
        WidgetKind::NumberInput if raw.is_empty() => Some(WidgetValue::Number(None)),
        WidgetKind::NumberInput => parse_number(raw).map(|number| WidgetValue::Number(Some(number))),
        WidgetKind::TextInput => Some(WidgetValue::Text(raw.to_string())),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<Number> {
    raw.parse::<i64>()
        .map(Number::Int)
        .or_else(|_| raw.parse::<f64>().map(Number::Float))
        .ok()
}

fn parse_scalar(raw: &str) -> Option<SliderScalar> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(SliderScalar::Int(value));
    }
    if let Ok(value) = raw.parse::<f64>() {
        return Some(SliderScalar::Float(value));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(SliderScalar::Datetime)
}
