use std::future::ready;

use reqwest::{Client, header};
use rmcp::RoleClient;
use rmcp::service::{RxJsonRpcMessage, TxJsonRpcMessage};
use rmcp::transport::Transport;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use toolbridge_sse::{Chunks, Sse};
use tracing::Instrument;
use url::Url;

use super::{BodyKind, body_kind, check_status, content_type};
use crate::Error;

/// The legacy HTTP+SSE transport.
///
/// Server messages arrive on a long-lived event stream, which is read by a
/// background task. Client messages are posted to the endpoint the server
/// names on that stream.
pub(crate) struct SseTransport {
    client: Client,
    endpoint: Url,
    inbox: mpsc::UnboundedReceiver<RxJsonRpcMessage<RoleClient>>,
    reader: JoinHandle<()>,
}

impl SseTransport {
    pub async fn connect(client: Client, url: Url) -> Result<Self, Error> {
        let resp = client
            .get(url.clone())
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let resp = check_status(resp)?;
        let content_type = content_type(&resp);
        if body_kind(content_type) != Some(BodyKind::EventStream) {
            return Err(Error::ContentType(content_type.map(str::to_owned)));
        }

        let mut sse = Sse::new(Chunks::from_response(resp));
        let endpoint = wait_for_endpoint(&mut sse, &url).await?;
        debug!("posting messages to {endpoint}");

        let (tx, inbox) = mpsc::unbounded_channel();
        let reader = tokio::spawn(
            read_messages(sse, tx).instrument(debug_span!("mcp sse reader")),
        );
        Ok(Self {
            client,
            endpoint,
            inbox,
            reader,
        })
    }
}

impl Transport<RoleClient> for SseTransport {
    type Error = Error;

    fn send(
        &mut self,
        item: TxJsonRpcMessage<RoleClient>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let resp_fut = self
            .client
            .post(self.endpoint.clone())
            .json(&item)
            .send();
        async move {
            check_status(resp_fut.await?)?;
            Ok(())
        }
    }

    fn receive(
        &mut self,
    ) -> impl Future<Output = Option<RxJsonRpcMessage<RoleClient>>> + Send {
        self.inbox.recv()
    }

    fn close(
        &mut self,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.reader.abort();
        self.inbox.close();
        ready(Ok(()))
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reads events until the server names the endpoint for posting messages.
async fn wait_for_endpoint(sse: &mut Sse, base: &Url) -> Result<Url, Error> {
    while let Some(event) = sse.next_event().await? {
        if event.event_type() != "endpoint" {
            trace!("skipped `{}` event before the endpoint", event.event_type());
            continue;
        }
        let endpoint = base.join(event.data.trim())?;
        if endpoint.origin() != base.origin() {
            return Err(Error::ForeignEndpoint(endpoint));
        }
        return Ok(endpoint);
    }
    Err(Error::Closed)
}

/// Forwards server messages until the stream ends or nobody listens.
async fn read_messages(
    mut sse: Sse,
    tx: mpsc::UnboundedSender<RxJsonRpcMessage<RoleClient>>,
) {
    loop {
        let event = match sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("event stream ended");
                break;
            }
            Err(err) => {
                warn!("event stream broken: {err}");
                break;
            }
        };
        if event.event_type() != "message" {
            trace!("skipped `{}` event", event.event_type());
            continue;
        }
        let message = match serde_json::from_str(&event.data) {
            Ok(message) => message,
            Err(err) => {
                warn!("invalid message from the server: {err}");
                continue;
            }
        };
        if tx.send(message).is_err() {
            break;
        }
    }
}
