use rmcp::model::{ClientInfo, LoggingLevel, LoggingMessageNotificationParam};
use rmcp::service::NotificationContext;
use rmcp::{ClientHandler, RoleClient};

/// Answers the server's side of the session.
///
/// Pings are answered by the default handler. Server log messages are
/// forwarded to `tracing`.
#[derive(Clone)]
pub(crate) struct Handler {
    info: ClientInfo,
}

impl Handler {
    pub fn new(info: ClientInfo) -> Self {
        Self { info }
    }
}

impl ClientHandler for Handler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    async fn on_logging_message(
        &self,
        params: LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) {
        let LoggingMessageNotificationParam {
            level,
            logger,
            data,
        } = params;
        let logger = logger.as_deref().unwrap_or("server");
        match level {
            LoggingLevel::Debug => debug!("[{logger}] {data}"),
            LoggingLevel::Info | LoggingLevel::Notice => {
                info!("[{logger}] {data}")
            }
            LoggingLevel::Warning => warn!("[{logger}] {data}"),
            _ => error!("[{logger}] {data}"),
        }
    }
}
