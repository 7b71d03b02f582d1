//! Canonical representation of one captured HTTP interaction
//!
//! The JSON produced by [`HttpEvent::to_json`] is consumed by templates and by
//! downstream readers of the record stream, so key names and field order are
//! part of the external contract.

use hyper::http::{request, response};
use hyper::HeaderMap;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::{ReplayError, Result};

/// Single header occurrence; duplicates are legal and kept in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name as observed
    pub name: String,
    /// Header value; multi-valued headers are joined with a comma
    pub value: String,
}

impl Header {
    /// Create a header
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One captured request/response pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpEvent {
    /// Identifier assigned once at capture time
    #[serde(rename = "event_pair_id")]
    pub pair_id: String,
    /// Request method
    #[serde(rename = "http_method")]
    pub method: String,
    /// Request path
    pub endpoint: String,
    /// Request headers in observed order
    #[serde(rename = "req_headers", default, deserialize_with = "null_as_empty")]
    pub request_headers: Vec<Header>,
    /// Request body
    pub request_body: String,
    /// Response headers in observed order
    #[serde(rename = "resp_headers", default, deserialize_with = "null_as_empty")]
    pub response_headers: Vec<Header>,
    /// Response body
    pub response_body: String,
    /// Status code as a string
    #[serde(rename = "http_response_code")]
    pub response_code: String,
}

impl HttpEvent {
    /// Build an event from the request sent upstream and the response received
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Conversion`] if no pair identifier can be generated
    pub fn from_exchange(
        request: &request::Parts,
        response: &response::Parts,
        request_body: &[u8],
        response_body: &[u8],
    ) -> Result<Self> {
        let pair_id = random_uuid()
            .map_err(|e| ReplayError::Conversion(format!("pair id generation failed: {e}")))?;

        Ok(Self {
            pair_id: pair_id.to_string(),
            method: request.method.to_string(),
            endpoint: request.uri.path().to_string(),
            request_headers: collect_headers(&request.headers),
            request_body: String::from_utf8_lossy(request_body).into_owned(),
            response_headers: collect_headers(&response.headers),
            response_body: String::from_utf8_lossy(response_body).into_owned(),
            response_code: response.status.as_u16().to_string(),
        })
    }

    /// Serialize to the wire JSON form
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the wire JSON form
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::Parse`] on malformed input
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Generate a random v4 UUID, surfacing entropy failures instead of panicking
///
/// # Errors
///
/// Returns error if the OS random source is unavailable
pub fn random_uuid() -> std::result::Result<Uuid, rand::Error> {
    let mut bytes = [0u8; 16];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

/// One [`Header`] per distinct name, values of repeated names joined with `,`
fn collect_headers(headers: &HeaderMap) -> Vec<Header> {
    headers
        .keys()
        .map(|name| {
            let value = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            Header::new(name.as_str(), value)
        })
        .collect()
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Header>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Header>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::{Request, Response, StatusCode};

    const EXAMPLE_JSON: &str = r#"{"event_pair_id":"abc123","http_method":"GET","endpoint":"/path/to","req_headers":[{"name":"Authorization","value":"Bearer password"}],"request_body":"{}","resp_headers":[{"name":"Content-Type","value":"application/json"},{"name":"Cookie","value":"key:value"}],"response_body":"Success","http_response_code":"200"}"#;

    fn example_event() -> HttpEvent {
        HttpEvent {
            pair_id: "abc123".to_string(),
            method: "GET".to_string(),
            endpoint: "/path/to".to_string(),
            request_headers: vec![Header::new("Authorization", "Bearer password")],
            request_body: "{}".to_string(),
            response_headers: vec![
                Header::new("Content-Type", "application/json"),
                Header::new("Cookie", "key:value"),
            ],
            response_body: "Success".to_string(),
            response_code: "200".to_string(),
        }
    }

    #[test]
    fn test_to_json_matches_wire_format() {
        assert_eq!(example_event().to_json().unwrap(), EXAMPLE_JSON);
    }

    #[test]
    fn test_from_json() {
        let event = HttpEvent::from_json(EXAMPLE_JSON).unwrap();
        assert_eq!(event, example_event());
    }

    #[test]
    fn test_from_json_null_headers() {
        let raw = r#"{"event_pair_id":"x","http_method":"GET","endpoint":"/","req_headers":null,"request_body":"","resp_headers":null,"response_body":"","http_response_code":"204"}"#;
        let event = HttpEvent::from_json(raw).unwrap();
        assert!(event.request_headers.is_empty());
        assert!(event.response_headers.is_empty());
    }

    #[test]
    fn test_from_json_malformed() {
        let result = HttpEvent::from_json("{\"event_pair_id\":");
        assert!(matches!(result, Err(ReplayError::Parse(_))));
    }

    #[test]
    fn test_from_exchange() {
        let (request, ()) = Request::builder()
            .method("POST")
            .uri("http://localhost:8080/path/to?q=1")
            .header("Authorization", "Bearer password")
            .body(())
            .unwrap()
            .into_parts();
        let (response, ()) = Response::builder()
            .status(StatusCode::CREATED)
            .header("Content-Type", "application/json")
            .header("Set-Cookie", "a=1")
            .header("Set-Cookie", "b=2")
            .body(())
            .unwrap()
            .into_parts();

        let event = HttpEvent::from_exchange(&request, &response, b"{}", b"Success").unwrap();

        assert_eq!(event.method, "POST");
        assert_eq!(event.endpoint, "/path/to");
        assert_eq!(event.response_code, "201");
        assert_eq!(event.request_body, "{}");
        assert_eq!(event.response_body, "Success");
        assert_eq!(
            event.request_headers,
            vec![Header::new("authorization", "Bearer password")]
        );
        assert_eq!(
            event.response_headers,
            vec![
                Header::new("content-type", "application/json"),
                Header::new("set-cookie", "a=1,b=2"),
            ]
        );
        assert!(Uuid::parse_str(&event.pair_id).is_ok());
    }

    #[test]
    fn test_pair_ids_are_unique() {
        let (request, ()) = Request::new(()).into_parts();
        let (response, ()) = Response::new(()).into_parts();

        let first = HttpEvent::from_exchange(&request, &response, b"", b"").unwrap();
        let second = HttpEvent::from_exchange(&request, &response, b"", b"").unwrap();
        assert_ne!(first.pair_id, second.pair_id);
    }
}
