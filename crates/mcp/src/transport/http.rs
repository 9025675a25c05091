use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::{Client, StatusCode, header};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::common::http_header::{
    EVENT_STREAM_MIME_TYPE, HEADER_LAST_EVENT_ID, HEADER_SESSION_ID,
    JSON_MIME_TYPE,
};
use rmcp::transport::streamable_http_client::{
    SseError, StreamableHttpClient, StreamableHttpClientTransportConfig,
    StreamableHttpError, StreamableHttpPostResponse,
};
use sse_stream::{Sse, SseStream};
use url::Url;

use super::{BodyKind, body_kind, content_type};

/// Creates the Streamable HTTP transport for the server at `url`.
///
/// The handshake, session tracking and stream resumption are left to
/// `rmcp`; this side only performs the HTTP exchanges.
pub(crate) fn streamable_http(
    client: Client,
    url: &Url,
) -> StreamableHttpClientTransport<HttpClient> {
    StreamableHttpClientTransport::with_client(
        HttpClient { client },
        StreamableHttpClientTransportConfig::with_uri(url.to_string()),
    )
}

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Client,
}

impl StreamableHttpClient for HttpClient {
    type Error = reqwest::Error;

    async fn get_stream(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        last_event_id: Option<String>,
        auth_token: Option<String>,
    ) -> Result<
        BoxStream<'static, Result<Sse, SseError>>,
        StreamableHttpError<Self::Error>,
    > {
        let mut builder = self
            .client
            .get(uri.as_ref())
            .header(header::ACCEPT, EVENT_STREAM_MIME_TYPE)
            .header(HEADER_SESSION_ID, session_id.as_ref());
        if let Some(last_event_id) = last_event_id {
            builder = builder.header(HEADER_LAST_EVENT_ID, last_event_id);
        }
        if let Some(token) = auth_token {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await?;
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Err(StreamableHttpError::ServerDoesNotSupportSse);
        }
        let resp = resp.error_for_status()?;

        let content_type = content_type(&resp);
        if body_kind(content_type) != Some(BodyKind::EventStream) {
            return Err(StreamableHttpError::UnexpectedContentType(
                content_type.map(str::to_owned),
            ));
        }
        Ok(SseStream::from_byte_stream(resp.bytes_stream()).boxed())
    }

    async fn delete_session(
        &self,
        uri: Arc<str>,
        session_id: Arc<str>,
        auth_token: Option<String>,
    ) -> Result<(), StreamableHttpError<Self::Error>> {
        let mut builder = self
            .client
            .delete(uri.as_ref())
            .header(HEADER_SESSION_ID, session_id.as_ref());
        if let Some(token) = auth_token {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await?;
        // Servers may not let clients end sessions.
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED {
            return Ok(());
        }
        resp.error_for_status()?;
        Ok(())
    }

    async fn post_message(
        &self,
        uri: Arc<str>,
        message: ClientJsonRpcMessage,
        session_id: Option<Arc<str>>,
        auth_token: Option<String>,
    ) -> Result<StreamableHttpPostResponse, StreamableHttpError<Self::Error>>
    {
        let mut builder = self
            .client
            .post(uri.as_ref())
            .header(
                header::ACCEPT,
                [JSON_MIME_TYPE, EVENT_STREAM_MIME_TYPE].join(", "),
            )
            .json(&message);
        if let Some(session_id) = session_id {
            builder = builder.header(HEADER_SESSION_ID, session_id.as_ref());
        }
        if let Some(token) = auth_token {
            builder = builder.bearer_auth(token);
        }

        let resp = builder.send().await?.error_for_status()?;
        if matches!(resp.status(), StatusCode::ACCEPTED | StatusCode::NO_CONTENT)
        {
            return Ok(StreamableHttpPostResponse::Accepted);
        }

        let session_id = resp
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        if let Some(session_id) = &session_id {
            trace!("server assigned session {session_id}");
        }

        let content_type = content_type(&resp).map(str::to_owned);
        match body_kind(content_type.as_deref()) {
            Some(BodyKind::EventStream) => {
                let stream =
                    SseStream::from_byte_stream(resp.bytes_stream()).boxed();
                Ok(StreamableHttpPostResponse::Sse(stream, session_id))
            }
            Some(BodyKind::Json) => {
                let message: ServerJsonRpcMessage = resp.json().await?;
                Ok(StreamableHttpPostResponse::Json(message, session_id))
            }
            None => {
                // Some servers acknowledge notifications with an empty 200.
                let body = resp.bytes().await?;
                if body.iter().all(u8::is_ascii_whitespace) {
                    return Ok(StreamableHttpPostResponse::Accepted);
                }
                Err(StreamableHttpError::UnexpectedContentType(content_type))
            }
        }
    }
}
