//! Scripted connector and recording host for unit tests.

use crate::action::WidgetCallback;
use crate::connection::{Channel, Connector};
use crate::error::{HostError, TransportError};
use crate::host::{Element, Host, PageTarget, Widget};
use crate::navigation::{NavLocation, NavigationMenu, NavigationRequest, NavigationResponse, OperationsRequest, PageBinding};
use crate::operation::{ColumnGap, VerticalAlignment};
use crate::protocol::{ClientEnvelope, ServerEnvelope};
use crate::state::MemorySessionState;
use crate::stream::ChunkStream;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub enum Step {
    /// The call fails on the transport.
    Fail,
    Pong,
    Reply(ServerEnvelope),
}

#[derive(Debug, Default)]
struct Script {
    connect_failures: u32,
    connect_attempts: u32,
    closed: u32,
    steps: VecDeque<Step>,
    requests: Vec<ClientEnvelope>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeConnector {
    script: Arc<Mutex<Script>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connects(&self, count: u32) {
        self.lock().connect_failures = count;
    }

    pub fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.lock().steps.extend(steps);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.lock().connect_attempts
    }

    pub fn closed_channels(&self) -> u32 {
        self.lock().closed
    }

    pub fn navigation_requests(&self) -> Vec<NavigationRequest> {
        self.lock()
            .requests
            .iter()
            .filter_map(|request| match request {
                ClientEnvelope::Navigation(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn operations_requests(&self) -> Vec<OperationsRequest> {
        self.lock()
            .requests
            .iter()
            .filter_map(|request| match request {
                ClientEnvelope::Operations(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("fake script lock")
    }
}

impl Connector for FakeConnector {
    type Channel = FakeChannel;

    fn connect(&self, _address: &str) -> Result<FakeChannel, TransportError> {
        let mut script = self.lock();
        script.connect_attempts += 1;
        if script.connect_failures > 0 {
            script.connect_failures -= 1;
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        Ok(FakeChannel {
            script: self.script.clone(),
        })
    }
}

pub struct FakeChannel {
    script: Arc<Mutex<Script>>,
}

impl Channel for FakeChannel {
    fn call(&mut self, request: &ClientEnvelope) -> Result<ServerEnvelope, TransportError> {
        let mut script = self.script.lock().expect("fake script lock");
        script.requests.push(request.clone());

        // Pings leave scripted replies for the call they guard.
        let guarded = matches!(request, ClientEnvelope::Ping) && matches!(script.steps.front(), Some(Step::Reply(_)));
        let step = if guarded { None } else { script.steps.pop_front() };

        match step {
            Some(Step::Fail) => Err(io::Error::from(io::ErrorKind::BrokenPipe).into()),
            Some(Step::Pong) => Ok(ServerEnvelope::Pong),
            Some(Step::Reply(envelope)) => Ok(envelope),
            None => Ok(match request {
                ClientEnvelope::Ping => ServerEnvelope::Pong,
                ClientEnvelope::Navigation(_) => ServerEnvelope::Navigation(NavigationResponse::default()),
                ClientEnvelope::Operations(_) => ServerEnvelope::Operations { operations: Vec::new() },
            }),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.script.lock().expect("fake script lock").closed += 1;
        Ok(())
    }
}

/// Host whose surfaces are path strings and whose output is an event log.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub events: Vec<String>,
    pub callbacks: Vec<WidgetCallback>,
    pub streams: Vec<ChunkStream>,
    pub state: MemorySessionState,
    pub menus: Vec<Vec<String>>,
    pub flat_menus: bool,
    pub switched: Vec<String>,
    pub errors: Vec<String>,
    pub reruns: u32,
    pub stops: u32,
    /// The next `element` call fails with this message.
    pub element_failure: Option<String>,
    next_surface: u32,
}

impl RecordingHost {
    pub fn callback(&self, key: &str) -> Option<&WidgetCallback> {
        self.callbacks.iter().rev().find(|callback| callback.key() == key)
    }

    fn child(&mut self, parent: &str) -> String {
        let child = format!("{parent}/{}", self.next_surface);
        self.next_surface += 1;
        child
    }
}

impl Host for RecordingHost {
    type Surface = String;
    type State = MemorySessionState;

    fn root(&mut self) -> String {
        "root".to_string()
    }

    fn sidebar(&mut self) -> String {
        "sidebar".to_string()
    }

    fn container(&mut self, parent: &String, _height: Option<u32>, _border: bool) -> Result<String, HostError> {
        let child = self.child(parent);
        self.events.push(format!("container@{parent} -> {child}"));
        Ok(child)
    }

    fn expander(
        &mut self,
        parent: &String,
        label: &str,
        _expanded: bool,
        _icon: Option<&str>,
    ) -> Result<String, HostError> {
        let child = self.child(parent);
        self.events.push(format!("expander@{parent} -> {child}: {label}"));
        Ok(child)
    }

    fn tabs(&mut self, parent: &String, labels: &[String]) -> Result<Vec<String>, HostError> {
        let children: Vec<String> = labels.iter().map(|_| self.child(parent)).collect();
        self.events.push(format!("tabs@{parent} -> {}", children.join(",")));
        Ok(children)
    }

    fn columns(
        &mut self,
        parent: &String,
        widths: &[f64],
        _gap: ColumnGap,
        _vertical_alignment: VerticalAlignment,
    ) -> Result<Vec<String>, HostError> {
        let children: Vec<String> = widths.iter().map(|_| self.child(parent)).collect();
        self.events.push(format!("columns@{parent} -> {}", children.join(",")));
        Ok(children)
    }

    fn placeholder(&mut self, parent: &String) -> Result<String, HostError> {
        let child = self.child(parent);
        self.events.push(format!("placeholder@{parent} -> {child}"));
        Ok(child)
    }

    fn clear(&mut self, surface: &String) -> Result<(), HostError> {
        self.events.push(format!("clear@{surface}"));
        Ok(())
    }

    fn element(&mut self, surface: &String, element: Element<'_>) -> Result<(), HostError> {
        if let Some(message) = self.element_failure.take() {
            return Err(HostError::new(message));
        }
        let event = match element {
            Element::Title(op) => format!("title@{surface}: {}", op.body),
            Element::Header(op) => format!("header@{surface}: {}", op.body),
            Element::Subheader(op) => format!("subheader@{surface}: {}", op.body),
            Element::Caption(op) => format!("caption@{surface}: {}", op.body),
            Element::Code(op) => format!("code@{surface}: {}", op.body),
            Element::Divider(_) => format!("divider@{surface}"),
            Element::Latex(op) => format!("latex@{surface}: {}", op.body),
            Element::Text(op) => format!("text@{surface}: {}", op.body),
            Element::Markdown(op) => format!("markdown@{surface}: {}", op.body),
            Element::Warning(message) => format!("warning@{surface}: {message}"),
        };
        self.events.push(event);
        Ok(())
    }

    fn write_stream(&mut self, _surface: &String, stream: ChunkStream) -> Result<(), HostError> {
        self.streams.push(stream);
        Ok(())
    }

    fn widget(
        &mut self,
        surface: &String,
        widget: Widget<'_>,
        callback: Option<WidgetCallback>,
    ) -> Result<(), HostError> {
        let key = callback.as_ref().map(|callback| callback.key().to_string()).unwrap_or_default();
        let event = match widget {
            Widget::LinkButton { url, .. } => format!("link@{surface}: {url}"),
            Widget::PageLink {
                target: PageTarget::Url(url),
                ..
            } => format!("link@{surface}: {url}"),
            Widget::PageLink {
                target: PageTarget::Page(binding),
                ..
            } => format!("link@{surface}: {}", binding.name()),
            Widget::Button(_) => format!("widget@{surface}: {key}=button"),
            Widget::Checkbox(op) | Widget::Toggle(op) => format!("widget@{surface}: {key}={}", op.value),
            Widget::Radio { index, .. } | Widget::Selectbox { index, .. } => {
                format!("widget@{surface}: {key}={index:?}")
            }
            Widget::Multiselect { selected, .. } => format!("widget@{surface}: {key}={selected:?}"),
            Widget::SelectSlider { lower, upper, .. } => format!("widget@{surface}: {key}={lower:?}..{upper:?}"),
            Widget::Slider { value, .. } => format!("widget@{surface}: {key}={value}"),
            Widget::DateInput { value, .. } => format!("widget@{surface}: {key}={value:?}"),
            Widget::TimeInput { value, .. } => format!("widget@{surface}: {key}={value:?}"),
            Widget::NumberInput { value, .. } => format!("widget@{surface}: {key}={value:?}"),
            Widget::TextInput { value, .. } => format!("widget@{surface}: {key}={value}"),
        };
        self.events.push(event);
        self.callbacks.extend(callback);
        Ok(())
    }

    fn navigation(
        &mut self,
        menu: &NavigationMenu,
        _location: NavLocation,
    ) -> Result<Option<Arc<PageBinding>>, HostError> {
        self.menus
            .push(menu.pages().map(|page| page.binding.page().to_string()).collect());
        self.flat_menus = matches!(menu, NavigationMenu::Flat(_));
        Ok(menu.default_page().map(|page| page.binding.clone()))
    }

    fn switch_page(&mut self, page: &Arc<PageBinding>) -> Result<(), HostError> {
        self.switched.push(page.name().to_string());
        Ok(())
    }

    fn rerun(&mut self) {
        self.reruns += 1;
    }

    fn stop(&mut self) {
        self.stops += 1;
    }

    fn show_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn session_state(&mut self) -> &mut MemorySessionState {
        &mut self.state
    }
}
