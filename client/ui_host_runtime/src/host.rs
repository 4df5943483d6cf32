use crate::action::WidgetCallback;
use crate::error::HostError;
use crate::navigation::{NavLocation, NavigationMenu, PageBinding};
use crate::operation::{
    ButtonOp, CaptionOp, CheckboxOp, CodeOp, ColumnGap, DateInputOp, DividerOp, HeaderOp, LatexOp,
    MarkdownOp, MultiselectOp, NumberInputOp, PageLinkOp, RadioOp, SelectSliderOp, SelectboxOp,
    SliderOp, TextInputOp, TextOp, TimeInputOp, TitleOp, VerticalAlignment,
};
use crate::state::SessionState;
use crate::stream::ChunkStream;
use crate::value::{DateSelection, Number, SliderValue};
use chrono::{NaiveDate, NaiveTime};
use std::fmt;
use std::sync::Arc;

/// Static content rendered onto a surface.
#[derive(Debug, Clone, Copy)]
pub enum Element<'a> {
    Title(&'a TitleOp),
    Header(&'a HeaderOp),
    Subheader(&'a HeaderOp),
    Caption(&'a CaptionOp),
    Code(&'a CodeOp),
    Divider(&'a DividerOp),
    Latex(&'a LatexOp),
    Text(&'a TextOp),
    Markdown(&'a MarkdownOp),
    Warning(&'a str),
}

#[derive(Debug, Clone)]
pub enum PageTarget<'a> {
    Url(&'a str),
    Page(Arc<PageBinding>),
}

/// An input widget with its resolved current value.
#[derive(Debug, Clone)]
pub enum Widget<'a> {
    Button(&'a ButtonOp),
    LinkButton {
        op: &'a ButtonOp,
        url: &'a str,
    },
    Checkbox(&'a CheckboxOp),
    Toggle(&'a CheckboxOp),
    Radio {
        op: &'a RadioOp,
        index: Option<usize>,
    },
    Selectbox {
        op: &'a SelectboxOp,
        index: Option<usize>,
    },
    Multiselect {
        op: &'a MultiselectOp,
        selected: Vec<usize>,
    },
    SelectSlider {
        op: &'a SelectSliderOp,
        lower: Option<usize>,
        upper: Option<usize>,
    },
    Slider {
        op: &'a SliderOp,
        value: SliderValue,
    },
    DateInput {
        op: &'a DateInputOp,
        value: DateSelection,
        min: Option<NaiveDate>,
        max: Option<NaiveDate>,
        format: String,
    },
    TimeInput {
        op: &'a TimeInputOp,
        value: Option<NaiveTime>,
    },
    NumberInput {
        op: &'a NumberInputOp,
        value: Option<Number>,
    },
    TextInput {
        op: &'a TextInputOp,
        value: String,
    },
    PageLink {
        op: &'a PageLinkOp,
        target: PageTarget<'a>,
    },
}

/// Rendering capabilities the interpreter drives. Surfaces are opaque
/// handles owned by the host.
pub trait Host {
    type Surface: Clone + fmt::Debug;
    type State: SessionState;

    fn root(&mut self) -> Self::Surface;

    fn sidebar(&mut self) -> Self::Surface;

    /// `height` of `None` lets the container size itself.
    fn container(
        &mut self,
        parent: &Self::Surface,
        height: Option<u32>,
        border: bool,
    ) -> Result<Self::Surface, HostError>;

    fn expander(
        &mut self,
        parent: &Self::Surface,
        label: &str,
        expanded: bool,
        icon: Option<&str>,
    ) -> Result<Self::Surface, HostError>;

    /// One surface per label, in order.
    fn tabs(&mut self, parent: &Self::Surface, labels: &[String]) -> Result<Vec<Self::Surface>, HostError>;

    /// One surface per width, in order.
    fn columns(
        &mut self,
        parent: &Self::Surface,
        widths: &[f64],
        gap: ColumnGap,
        vertical_alignment: VerticalAlignment,
    ) -> Result<Vec<Self::Surface>, HostError>;

    /// Single-element slot whose content can be replaced or cleared.
    fn placeholder(&mut self, parent: &Self::Surface) -> Result<Self::Surface, HostError>;

    fn clear(&mut self, surface: &Self::Surface) -> Result<(), HostError>;

    fn element(&mut self, surface: &Self::Surface, element: Element<'_>) -> Result<(), HostError>;

    /// Must drain `stream` on its own thread; returning only after the
    /// stream ends would block the producer.
    fn write_stream(&mut self, surface: &Self::Surface, stream: ChunkStream) -> Result<(), HostError>;

    fn widget(
        &mut self,
        surface: &Self::Surface,
        widget: Widget<'_>,
        callback: Option<WidgetCallback>,
    ) -> Result<(), HostError>;

    /// Shows the menu and returns the page to run, if any.
    fn navigation(
        &mut self,
        menu: &NavigationMenu,
        location: NavLocation,
    ) -> Result<Option<Arc<PageBinding>>, HostError>;

    fn switch_page(&mut self, page: &Arc<PageBinding>) -> Result<(), HostError>;

    fn rerun(&mut self);

    fn stop(&mut self);

    fn show_error(&mut self, message: &str);

    fn session_state(&mut self) -> &mut Self::State;
}
