mod http;
mod sse;

use mime::Mime;
use reqwest::{Response, header};

use crate::Error;

pub(crate) use http::streamable_http;
pub(crate) use sse::SseTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BodyKind {
    Json,
    EventStream,
}

fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if !status.is_success() {
        debug!("server responded with {status}");
        return Err(Error::Status(status));
    }
    Ok(resp)
}

fn content_type(resp: &Response) -> Option<&str> {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

fn body_kind(content_type: Option<&str>) -> Option<BodyKind> {
    let mime: Mime = content_type?.parse().ok()?;
    match mime.subtype().as_str() {
        "json" => Some(BodyKind::Json),
        "event-stream" => Some(BodyKind::EventStream),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_kind() {
        assert_eq!(body_kind(Some("application/json")), Some(BodyKind::Json));
        assert_eq!(
            body_kind(Some("text/event-stream; charset=utf-8")),
            Some(BodyKind::EventStream)
        );
        assert_eq!(body_kind(Some("text/html")), None);
        assert_eq!(body_kind(None), None);
    }
}
