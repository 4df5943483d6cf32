use crate::action::{ActionQueue, ActionTemplate, WidgetCallback};
use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, Connector, TcpConnector};
use crate::context::ContextTree;
use crate::error::{Result, RuntimeError};
use crate::host::Host;
use crate::navigation::{NavigationMenu, NavigationRequest, OperationsRequest, PageBinding, PageRegistry};
use crate::operation::Operation;
use crate::session::Session;
use crate::state::SessionState;
use crate::stream::StreamRelay;
use std::ops::ControlFlow;
use tracing::{debug, error, info, info_span};

mod handlers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Idle,
    NavigationRequested,
    MenuResolved,
    OperationsRequested,
    Replaying,
    RoundComplete,
    Terminated,
}

/// How a round's replay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Every operation was replayed.
    Completed,
    /// An `end` operation stopped replay.
    Ended,
    Stopped,
    Rerun,
    SwitchedPage,
    Terminated,
}

type Flow = ControlFlow<RoundOutcome>;

/// Drives rounds against a server: requests navigation and operations,
/// replays them onto a host, and carries user actions to the next round.
pub struct RemoteUiClient<C: Connector, H: Host> {
    session: Session,
    connection: ConnectionManager<C>,
    actions: ActionQueue,
    contexts: ContextTree<H::Surface>,
    streams: StreamRelay,
    pages: PageRegistry,
    state: RoundState,
}

impl<H: Host> RemoteUiClient<TcpConnector, H> {
    pub fn connect(config: &ClientConfig, host: &mut H) -> Result<Self> {
        Self::with_connector(config, TcpConnector::new(config.rpc_timeout()), host)
    }
}

impl<C: Connector, H: Host> RemoteUiClient<C, H> {
    /// Connects immediately; fails when the server cannot be reached within
    /// the retry policy.
    pub fn with_connector(config: &ClientConfig, connector: C, host: &mut H) -> Result<Self> {
        let session = Session::new(config.app.clone());
        let _span = info_span!("session", id = session.short_id()).entered();
        info!(address = %config.address(), "starting session");

        let connection = ConnectionManager::connect(config.address(), connector, config.retry_policy())?;

        Ok(Self {
            session,
            connection,
            actions: ActionQueue::new(),
            contexts: ContextTree::new(host.root(), host.sidebar()),
            streams: StreamRelay::new(config.stream_idle_timeout()),
            pages: PageRegistry::default(),
            state: RoundState::Idle,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == RoundState::Terminated
    }

    /// Actions captured since the last round.
    pub fn actions(&self) -> &ActionQueue {
        &self.actions
    }

    pub fn pages(&self) -> &PageRegistry {
        &self.pages
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    /// Runs one round. A failed round is abandoned: the context tree is
    /// reset and the queued actions stay for the next attempt.
    pub fn render(&mut self, host: &mut H) -> Result<RoundOutcome> {
        if self.is_terminated() {
            return Err(RuntimeError::SessionTerminated(self.session.id().to_string()));
        }

        let _span = info_span!("session", id = self.session.short_id()).entered();
        let result = self.navigate(host);

        if let Err(err) = &result {
            error!(seq = self.session.seq(), "round abandoned: {err}");
            if !self.is_terminated() {
                self.contexts.reset(host.root(), host.sidebar());
                self.state = RoundState::Idle;
            }
        }

        result
    }

    /// Requests and replays the operations of one page.
    pub fn run_page(&mut self, page: &PageBinding, host: &mut H) -> Result<RoundOutcome> {
        debug!(binding = page.name(), "running page");
        self.run_operations(Some(page.page()), host)
    }

    fn navigate(&mut self, host: &mut H) -> Result<RoundOutcome> {
        let seq = self.session.next_round();
        self.state = RoundState::NavigationRequested;

        let request = NavigationRequest {
            session_id: self.session.id().to_string(),
            seq,
            app: self.session.app().map(str::to_string),
            actions: self.actions.snapshot(),
        };
        debug!(seq, actions = request.actions.len(), "requesting navigation");
        let response = self.connection.get_navigation(&request)?;

        let menu = NavigationMenu::build(&response.items, &mut self.pages);
        self.state = RoundState::MenuResolved;

        let Some(menu) = menu else {
            self.actions.clear();
            return self.run_operations(None, host);
        };

        let selected = host.navigation(&menu, response.location.unwrap_or_default())?;
        self.actions.clear();

        match selected {
            Some(page) => self.run_page(&page, host),
            None => {
                debug!("host selected no page");
                self.finish_round(host);
                Ok(RoundOutcome::Completed)
            }
        }
    }

    fn run_operations(&mut self, page: Option<&str>, host: &mut H) -> Result<RoundOutcome> {
        self.state = RoundState::OperationsRequested;

        let request = OperationsRequest {
            session_id: self.session.id().to_string(),
            seq: self.session.seq(),
            app: self.session.app().map(str::to_string),
            page: page.map(str::to_string),
            actions: self.actions.snapshot(),
        };
        let operations = self.connection.get_operations(&request)?;

        self.state = RoundState::Replaying;
        debug!(page, count = operations.len(), "replaying operations");
        let outcome = self.replay(&operations, host)?;

        if outcome != RoundOutcome::Terminated {
            self.finish_round(host);
        }
        info!(seq = self.session.seq(), ?outcome, "round finished");
        Ok(outcome)
    }

    fn replay(&mut self, operations: &[Operation], host: &mut H) -> Result<RoundOutcome> {
        for operation in operations {
            debug!(op = operation.kind(), "applying operation");
            if let ControlFlow::Break(outcome) = self.apply(operation, host)? {
                return Ok(outcome);
            }
        }
        Ok(RoundOutcome::Completed)
    }

    fn finish_round(&mut self, host: &mut H) {
        self.actions.clear();
        self.contexts.reset(host.root(), host.sidebar());
        self.state = RoundState::RoundComplete;
    }

    /// Disconnects and wipes everything the session accumulated.
    fn terminate(&mut self, host: &mut H) {
        info!("terminating session");
        self.connection.disconnect();
        host.session_state().clear();
        self.streams.clear();
        self.actions.clear();
        self.contexts.reset(host.root(), host.sidebar());
        self.state = RoundState::Terminated;
    }

    fn callback(&self, template: ActionTemplate) -> WidgetCallback {
        WidgetCallback::new(template, self.actions.sink())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, WidgetValue};
    use crate::navigation::{MenuEntry, MenuItem, NavigationResponse};
    use crate::protocol::ServerEnvelope;
    use crate::render_round;
    use crate::testing::{FakeConnector, RecordingHost, Step};
    use serde_json::{Value, json};

    fn config() -> ClientConfig {
        let mut config = ClientConfig::default();
        config.retry.base_delay_secs = 0.0;
        config.retry.max_delay_secs = 0.0;
        config.retry.max_retries = 2;
        config.app = Some("demo".into());
        config
    }

    fn client(connector: &FakeConnector, host: &mut RecordingHost) -> RemoteUiClient<FakeConnector, RecordingHost> {
        RemoteUiClient::with_connector(&config(), connector.clone(), host).expect("client connects")
    }

    fn operations(ops: Value) -> Step {
        let operations: Vec<Operation> = serde_json::from_value(ops).expect("decode operations fixture");
        Step::Reply(ServerEnvelope::Operations { operations })
    }

    fn navigation(items: Vec<MenuItem>) -> Step {
        Step::Reply(ServerEnvelope::Navigation(NavigationResponse { items, location: None }))
    }

    fn no_menu() -> Step {
        navigation(Vec::new())
    }

    fn page(page: &str) -> MenuEntry {
        MenuEntry {
            title: page.to_uppercase(),
            page: page.to_string(),
            ..MenuEntry::default()
        }
    }

    #[test]
    fn without_menu_operations_run_for_no_page() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([no_menu(), operations(json!([{"op": "title", "body": "Hi"}]))]);
        let outcome = client.render(&mut host).expect("round succeeds");

        assert_eq!(outcome, RoundOutcome::Completed);
        assert_eq!(client.state(), RoundState::RoundComplete);
        let request = connector.operations_requests().pop().expect("operations requested");
        assert_eq!(request.page, None);
        assert_eq!(request.app.as_deref(), Some("demo"));
        assert_eq!(request.seq, 1);
        assert_eq!(host.events, vec!["title@root: Hi"]);
    }

    #[test]
    fn single_headerless_menu_is_flat_and_runs_the_selected_page() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            navigation(vec![MenuItem {
                header: None,
                entries: vec![page("home"), page("settings")],
            }]),
            operations(json!([])),
        ]);
        client.render(&mut host).expect("round succeeds");

        assert_eq!(host.menus, vec![vec!["home".to_string(), "settings".to_string()]]);
        assert!(host.flat_menus);
        let request = connector.operations_requests().pop().expect("operations requested");
        assert_eq!(request.page.as_deref(), Some("home"));
        assert_eq!(client.pages().len(), 2);
    }

    #[test]
    fn actions_reach_only_the_next_navigation_request() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([{
                "op": "button",
                "widget_props": {"key": "go", "label": "Go"}
            }])),
        ]);
        client.render(&mut host).expect("first round");
        assert!(client.actions().is_empty());

        host.callback("go").expect("button callback registered").fire(WidgetValue::Clicked);
        assert_eq!(client.actions().len(), 1);

        connector.script([no_menu(), operations(json!([]))]);
        client.render(&mut host).expect("second round");

        let navs = connector.navigation_requests();
        assert!(navs[0].actions.is_empty());
        assert_eq!(navs[1].actions, vec![Action::Button { key: "go".into() }]);
        assert_eq!(navs[1].seq, 2);
        let ops = connector.operations_requests();
        assert!(ops[1].actions.is_empty());
        assert!(client.actions().is_empty());
    }

    #[test]
    fn end_with_terminate_stops_replay_and_terminates() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);
        host.state.set("stale", json!(1));

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "end", "terminate_session": true},
                {"op": "text", "body": "never"}
            ])),
        ]);
        let outcome = client.render(&mut host).expect("round succeeds");

        assert_eq!(outcome, RoundOutcome::Terminated);
        assert!(client.is_terminated());
        assert!(host.events.is_empty());
        assert!(host.state.is_empty());
        assert_eq!(host.reruns, 1);
        assert!(!client.connection().is_connected());

        match client.render(&mut host) {
            Err(RuntimeError::SessionTerminated(id)) => assert_eq!(id, client.session().id()),
            other => panic!("expected terminated session, got {other:?}"),
        }
    }

    #[test]
    fn terminate_session_does_not_rerun() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([{"op": "terminate_session"}, {"op": "divider"}])),
        ]);
        let outcome = client.render(&mut host).expect("round succeeds");

        assert_eq!(outcome, RoundOutcome::Terminated);
        assert_eq!(host.reruns, 0);
        assert!(host.events.is_empty());
    }

    #[test]
    fn plain_end_stops_replay() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "caption", "body": "shown"},
                {"op": "end"},
                {"op": "caption", "body": "hidden"}
            ])),
        ]);

        assert_eq!(client.render(&mut host).expect("round"), RoundOutcome::Ended);
        assert_eq!(host.events, vec!["caption@root: shown"]);
        assert!(!client.is_terminated());
    }

    #[test]
    fn containers_are_addressable_within_the_round_only() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "inner_container", "parent": "sidebar", "key": "box", "border": true},
                {"op": "text", "container": "box", "body": "inside"},
                {"op": "balloons"},
                {"op": "column_containers", "parent": "box", "widths": [1.0, 2.0], "keys": ["left", "right"]},
                {"op": "markdown", "container": "right", "body": "**r**"}
            ])),
        ]);
        client.render(&mut host).expect("first round");

        assert_eq!(
            host.events,
            vec![
                "container@sidebar -> sidebar/0",
                "text@sidebar/0: inside",
                "columns@sidebar/0 -> sidebar/0/1,sidebar/0/2",
                "markdown@sidebar/0/2: **r**",
            ]
        );

        connector.script([no_menu(), operations(json!([{"op": "text", "container": "box", "body": "stale"}]))]);
        let err = client.render(&mut host).expect_err("box belonged to the previous round");
        assert!(err.is_lookup());
        assert_eq!(client.state(), RoundState::Idle);
    }

    #[test]
    fn mismatched_tab_keys_fail_before_inserting() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "tab_containers", "tabs": ["One", "Two"], "keys": ["one"]}
            ])),
        ]);

        let err = client.render(&mut host).expect_err("two tabs, one key");
        assert!(err.is_validation());
        assert!(host.events.is_empty());
    }

    #[test]
    fn failed_round_keeps_queued_actions() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);
        client.actions().sink().push(Action::Button { key: "go".into() });

        connector.script([Step::Reply(ServerEnvelope::Error {
            code: "boom".into(),
            message: "server exploded".into(),
        })]);

        assert!(render_round(&mut client, &mut host).is_none());
        assert_eq!(client.actions().len(), 1);
        assert_eq!(host.errors.len(), 1);
        assert!(host.errors[0].contains("server exploded"));
    }

    #[test]
    fn host_failure_shows_the_banner_and_abandons_the_round() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "inner_container", "key": "box"},
                {"op": "title", "container": "box", "body": "broken"},
                {"op": "text", "body": "never"}
            ])),
        ]);
        host.element_failure = Some("surface is gone".into());

        assert!(render_round(&mut client, &mut host).is_none());
        assert_eq!(client.state(), RoundState::Idle);
        assert_eq!(
            host.errors,
            vec!["Error rendering: host rendering failed: surface is gone. Please check the logs for more information.".to_string()]
        );
        assert_eq!(host.events, vec!["container@root -> root/0"]);

        connector.script([no_menu(), operations(json!([{"op": "text", "container": "box", "body": "stale"}]))]);
        let err = client.render(&mut host).expect_err("context tree was reset");
        assert!(err.is_lookup());
    }

    #[test]
    fn stream_chunks_reach_one_consumer_in_order() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "write_stream_chunk", "key": "answer", "body": "a"},
                {"op": "write_stream_chunk", "key": "answer", "body": "b"},
                {"op": "write_stream_chunk", "key": "answer", "body": "c", "is_last": true}
            ])),
        ]);
        client.render(&mut host).expect("round succeeds");

        assert_eq!(host.streams.len(), 1);
        let stream = host.streams.pop().expect("one stream");
        assert_eq!(stream.key(), "answer");
        assert_eq!(stream.collect::<Vec<_>>(), vec!["a", "b", "c"]);
    }

    #[test]
    fn option_widgets_seed_session_state_from_the_server() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "radio", "widget_props": {"key": "color"}, "options": ["red", "green"], "index": 1},
                {"op": "selectbox", "widget_props": {"key": "size"}, "options": ["s"], "index": 4},
                {"op": "multiselect", "widget_props": {"key": "tags"}, "options": ["a", "b"], "selected_indices": [1, 9]},
                {"op": "select_slider", "widget_props": {"key": "band"}, "options": ["lo", "hi"], "lower_index": 0, "upper_index": 1}
            ])),
        ]);
        client.render(&mut host).expect("round succeeds");

        assert_eq!(host.state.get("color"), Some(&json!("green")));
        assert_eq!(host.state.get("size"), Some(&json!("")));
        assert_eq!(host.state.get("tags"), Some(&json!(["b"])));
        assert_eq!(host.state.get("band"), Some(&json!(["lo", "hi"])));
        assert_eq!(host.events[0], "widget@root: color=Some(1)");
        assert_eq!(host.events[1], "widget@root: size=None");
    }

    #[test]
    fn value_widgets_seed_only_when_absent() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);
        host.state.set("name", json!("typed by user"));

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "text_input", "widget_props": {"key": "name"}, "value": "server"},
                {"op": "number_input", "widget_props": {"key": "qty"}, "value": {"i": 3}},
                {"op": "date_input", "widget_props": {"key": "when"}, "from_date": "2024-05-01", "to_date": "2024-05-03"},
                {"op": "time_input", "widget_props": {"key": "at"}, "value": "07:45:00"}
            ])),
        ]);
        client.render(&mut host).expect("round succeeds");

        assert_eq!(host.state.get("name"), Some(&json!("typed by user")));
        assert_eq!(host.state.get("qty"), Some(&json!({"i": 3})));
        assert_eq!(host.state.get("when"), Some(&json!(["2024-05-01", "2024-05-03"])));
        assert_eq!(host.state.get("at"), Some(&json!("07:45:00")));
        assert_eq!(host.events[0], "widget@root: name=typed by user");
    }

    #[test]
    fn invalid_dates_and_missing_keys_are_validation_errors() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([{"op": "date_input", "widget_props": {"key": "d"}, "min_date": "01/02/2024"}])),
        ]);
        match client.render(&mut host) {
            Err(RuntimeError::InvalidField { message, field, .. }) => {
                assert_eq!(message, "DateInputOp");
                assert_eq!(field, "min_date");
            }
            other => panic!("expected invalid field, got {other:?}"),
        }

        connector.script([no_menu(), operations(json!([{"op": "checkbox", "widget_props": {"label": "?"}}]))]);
        match client.render(&mut host) {
            Err(RuntimeError::MissingField { message, field }) => {
                assert_eq!(message, "CheckboxOp");
                assert_eq!(field, "key");
            }
            other => panic!("expected missing field, got {other:?}"),
        }
    }

    #[test]
    fn stop_warns_then_aborts_the_round() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "stop", "message": "halt"},
                {"op": "text", "body": "after"}
            ])),
        ]);

        assert_eq!(client.render(&mut host).expect("round"), RoundOutcome::Stopped);
        assert_eq!(host.events, vec!["warning@root: halt"]);
        assert_eq!(host.stops, 1);
    }

    #[test]
    fn switch_page_and_page_links_use_memoized_bindings() {
        let connector = FakeConnector::new();
        let mut host = RecordingHost::default();
        let mut client = client(&connector, &mut host);

        connector.script([
            no_menu(),
            operations(json!([
                {"op": "page_link", "page": "https://example.com", "widget_props": {"label": "Docs"}},
                {"op": "page_link", "page": "reports", "widget_props": {"label": "Reports"}},
                {"op": "switch_page", "page": "reports"}
            ])),
        ]);

        assert_eq!(client.render(&mut host).expect("round"), RoundOutcome::SwitchedPage);
        assert_eq!(host.switched, vec!["get_reports".to_string()]);
        assert_eq!(
            host.events,
            vec!["link@root: https://example.com", "link@root: get_reports"]
        );
        assert_eq!(client.pages().len(), 1);
    }
}
