use std::future::Future;

use tracing::{debug, warn};

use rmcp::handler::client::ClientHandler;
use rmcp::model::*;
use rmcp::service::NotificationContext;
use rmcp::RoleClient;

/// Client handler for short-lived tool-server connections.
///
/// Identifies the client during initialization. Server log notifications
/// go to `tracing`: warnings and worse at `warn`, the rest at `debug`.
pub struct QueryGraphClientHandler {
    server_name: String,
}

impl QueryGraphClientHandler {
    pub fn new(server_name: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
        }
    }
}

#[allow(clippy::manual_async_fn)]
impl ClientHandler for QueryGraphClientHandler {
    fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _ctx: NotificationContext<RoleClient>,
    ) -> impl Future<Output = ()> + Send + '_ {
        async move {
            let severe = matches!(
                params.level,
                LoggingLevel::Warning
                    | LoggingLevel::Error
                    | LoggingLevel::Critical
                    | LoggingLevel::Alert
                    | LoggingLevel::Emergency
            );
            if severe {
                warn!(server = %self.server_name, level = ?params.level, data = %params.data, "Tool server log");
            } else {
                debug!(server = %self.server_name, level = ?params.level, data = %params.data, "Tool server log");
            }
        }
    }

    fn on_progress(
        &self,
        params: ProgressNotificationParam,
        _ctx: NotificationContext<RoleClient>,
    ) -> impl Future<Output = ()> + Send + '_ {
        async move {
            debug!(
                server = %self.server_name,
                progress = params.progress,
                total = ?params.total,
                "MCP progress"
            );
        }
    }

    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            meta: None,
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "querygraph".into(),
                title: None,
                version: env!("CARGO_PKG_VERSION").into(),
                description: None,
                icons: None,
                website_url: None,
            },
        }
    }
}
