pub mod action;
pub mod client;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod host;
pub mod navigation;
pub mod operation;
pub mod protocol;
pub mod session;
pub mod state;
pub mod stream;
pub mod value;

#[cfg(test)]
mod testing;

use tracing::error;

pub use crate::action::{Action, ActionQueue, ActionSink, WidgetCallback, WidgetKind, WidgetValue};
pub use crate::client::{RemoteUiClient, RoundOutcome, RoundState};
pub use crate::config::{ClientConfig, ConfigError, RetryConfig};
pub use crate::connection::{Channel, ConnectionManager, Connector, RetryPolicy, TcpChannel, TcpConnector};
pub use crate::error::{HostError, Result, RuntimeError, TransportError};
pub use crate::host::{Element, Host, PageTarget, Widget};
pub use crate::navigation::{NavLocation, NavigationMenu, PageBinding};
pub use crate::operation::Operation;
pub use crate::state::{MemorySessionState, SessionState};
pub use crate::stream::ChunkStream;
pub use serde_json;

/// Runs one round and reports any failure through the host's error banner
/// instead of propagating it.
pub fn render_round<C: Connector, H: Host>(client: &mut RemoteUiClient<C, H>, host: &mut H) -> Option<RoundOutcome> {
    match client.render(host) {
        Ok(outcome) => Some(outcome),
        Err(err) => {
            error!("error rendering: {err}");
            host.show_error(&format!("Error rendering: {err}. Please check the logs for more information."));
            None
        }
    }
}
