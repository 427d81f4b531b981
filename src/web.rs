use crate::agents::{DeleteSession, GetSession, SaveSession};
use crate::config::{ConfigRc, Template};
use crate::crypto;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::router::router;
use crate::utils::{http::ResponseExt, BoxError, BoxFuture};
use bytes::{Bytes, BytesMut};
use futures_util::stream::StreamExt;
use headers::{CacheControl, ContentType, Cookie, Header, HeaderMapExt, StrictTransportSecurity};
use http::{request::Parts, HeaderMap, Method, StatusCode, Uri};
use hyper::server::conn::AddrStream;
use hyper::service::Service as HyperService;
use hyper::Body;
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::{net::SocketAddr, sync::Arc, task::Poll, time::Duration};
use thiserror::Error;
use url::form_urlencoded;

/// Error type used to indicate a request body size limit was exceeded.
#[derive(Debug, Error)]
#[error("size limit exceeded")]
pub struct SizeLimitExceeded;

/// A session as stored in the session store.
///
/// The authenticated user lives in `user_id`. Everything else is kept in `values`, a map of
/// JSON values under string keys, so independent features can share one session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Session {
    /// Whether a user logged in with this session.
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Whether the session holds nothing worth storing.
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.values.is_empty()
    }

    /// Get a value, if present and of the expected type.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    /// Set a value, replacing any previous value.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> BridgeResult<()> {
        let value = serde_json::to_value(value).map_err(|e| {
            BridgeError::Internal(format!("could not serialize session value {}: {}", key, e))
        })?;
        self.values.insert(key.to_owned(), value);
        Ok(())
    }

    /// Remove a value, returning it if it was present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }
}

/// Context for a request
pub struct Context {
    /// The application configuration
    pub app: ConfigRc,
    /// Request method
    pub method: Method,
    /// Request URI
    pub uri: Uri,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Bytes,
    /// ID of the session, if the client has one.
    session_id: Option<String>,
    /// Session ID abandoned during this request, to be deleted from the store.
    stale_session_id: Option<String>,
    /// Session data (must be explicitly loaded)
    session: Session,
    /// Whether the session must be saved at the end of the request.
    session_modified: bool,
}

impl Context {
    /// Create a context from a request, reading the body if necessary.
    ///
    /// Returns a response instead if the request can't be handled at all.
    pub async fn from_request(req: Request, app: ConfigRc) -> Result<Context, Response> {
        // Handle only simple path requests.
        if req.uri().scheme_str().is_some() || req.uri().host().is_some() {
            return Err(empty_response(StatusCode::BAD_REQUEST));
        }

        // Read the request body.
        let (parts, body) = req.into_parts();
        let body = match parts.method {
            Method::POST => match read_body(body, app.max_body_size).await {
                Ok(body) => body,
                Err(err) if err.is::<SizeLimitExceeded>() => {
                    return Err(empty_response(StatusCode::PAYLOAD_TOO_LARGE));
                }
                Err(err) => {
                    log::debug!("could not read request body: {}", err);
                    return Err(empty_response(StatusCode::BAD_REQUEST));
                }
            },
            _ => Bytes::new(),
        };

        Ok(Self::new(app, parts, body))
    }

    fn new(app: ConfigRc, parts: Parts, body: Bytes) -> Context {
        let session_id = parts
            .headers
            .typed_get::<Cookie>()
            .and_then(|cookie| {
                cookie
                    .get(&app.session_cookie_name)
                    .filter(|value| crypto::is_session_id(value))
                    .map(ToOwned::to_owned)
            });
        Context {
            app,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            session_id,
            stale_session_id: None,
            session: Session::default(),
            session_modified: false,
        }
    }

    /// Parse the query string into a `HashMap`.
    pub fn query_params(&self) -> HashMap<String, String> {
        if let Some(query) = self.uri.query() {
            parse_form_encoded(query.as_bytes())
        } else {
            HashMap::new()
        }
    }

    /// Parse the form-encoded body into a map ordered by field name.
    ///
    /// When a field is repeated, the last value wins. Bodies that are not a form, such as JSON,
    /// have no fields. Multipart forms are rejected.
    pub fn form_params(&self) -> BridgeResult<BTreeMap<String, String>> {
        let essence = self
            .headers
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase());
        match essence.as_deref() {
            Some("application/x-www-form-urlencoded") => {
                Ok(form_urlencoded::parse(&self.body).into_owned().collect())
            }
            Some("multipart/form-data") => Err(BridgeError::Input(
                "Unsupported form encoding".to_owned(),
            )),
            _ => Ok(BTreeMap::new()),
        }
    }

    /// Load the session named by the session cookie.
    ///
    /// An unknown or expired session ID leaves an empty session, and is replaced with a fresh
    /// ID if the session is saved.
    pub async fn load_session(&mut self) -> BridgeResult<()> {
        let session_id = match self.session_id {
            Some(ref id) => id.clone(),
            None => return Ok(()),
        };
        let found = self
            .app
            .store
            .send(GetSession { session_id })
            .await
            .map_err(|e| BridgeError::Internal(format!("could not load a session: {}", e)))?;
        match found {
            Some(session) => self.session = session,
            None => self.session_id = None,
        }
        Ok(())
    }

    /// Read access to the session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Write access to the session. Marks the session modified.
    pub fn session_mut(&mut self) -> &mut Session {
        self.session_modified = true;
        &mut self.session
    }

    /// Move the session data to a new ID when it is next saved.
    ///
    /// Used on login, so an ID planted before authentication is worthless afterwards.
    pub fn cycle_session_id(&mut self) {
        if let Some(id) = self.session_id.take() {
            self.stale_session_id = Some(id);
        }
        self.session_modified = true;
    }

    /// Persist the session if it was modified, and set the session cookie on the response.
    async fn save_session(&mut self, res: &mut Response) -> BridgeResult<()> {
        if let Some(session_id) = self.stale_session_id.take() {
            self.app
                .store
                .send(DeleteSession { session_id })
                .await
                .map_err(|e| BridgeError::Internal(format!("could not delete a session: {}", e)))?;
        }

        if !self.session_modified {
            return Ok(());
        }
        self.session_modified = false;

        if self.session.is_empty() {
            if let Some(session_id) = self.session_id.take() {
                self.app
                    .store
                    .send(DeleteSession { session_id })
                    .await
                    .map_err(|e| {
                        BridgeError::Internal(format!("could not delete a session: {}", e))
                    })?;
                res.header(hyper::header::SET_COOKIE, self.session_cookie("", 0));
            }
            return Ok(());
        }

        let session_id = match self.session_id {
            Some(ref id) => id.clone(),
            None => {
                let id = crypto::session_id(&self.app.rng).await;
                self.session_id = Some(id.clone());
                id
            }
        };
        self.app
            .store
            .send(SaveSession {
                session_id: session_id.clone(),
                data: self.session.clone(),
            })
            .await
            .map_err(|e| BridgeError::Internal(format!("could not save a session: {}", e)))?;
        let max_age = self.app.session_ttl.as_secs();
        res.header(
            hyper::header::SET_COOKIE,
            self.session_cookie(&session_id, max_age),
        );
        Ok(())
    }

    /// Format a `Set-Cookie` value for the session cookie.
    fn session_cookie(&self, value: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.app.session_cookie_name, value, max_age
        );
        if self.app.session_cookie_secure {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Turn the handler result into the final response, saving the session on success.
    pub async fn finish(&mut self, result: HandlerResult) -> Response {
        let mut response = match result {
            Ok(mut res) => match self.save_session(&mut res).await {
                Ok(()) => res,
                Err(err) => handle_error(self, err).await,
            },
            Err(err) => handle_error(self, err).await,
        };
        set_headers(&mut response);
        response
    }
}

/// Standard request type.
pub type Request = hyper::Request<Body>;
/// Standard response type.
pub type Response = hyper::Response<Body>;
/// Result type of handlers
pub type HandlerResult = Result<Response, BridgeError>;

// HTTP service
pub struct Service {
    /// The application configuration
    app: ConfigRc,
    /// The client address
    remote_addr: SocketAddr,
}

impl Service {
    pub fn new(app: ConfigRc, stream: &AddrStream) -> Self {
        Self {
            app,
            remote_addr: stream.remote_addr(),
        }
    }

    async fn serve(req: Request, app: ConfigRc) -> Result<Response, BoxError> {
        metrics::HTTP_REQUESTS.inc();

        let mut ctx = match Context::from_request(req, app).await {
            Ok(ctx) => ctx,
            Err(mut res) => {
                set_headers(&mut res);
                metrics::observe_status(res.status());
                return Ok(res);
            }
        };

        // Call the route handler.
        let result = match ctx.load_session().await {
            Ok(()) => router(&mut ctx).await,
            Err(err) => Err(err),
        };
        let response = ctx.finish(result).await;

        metrics::observe_status(response.status());
        Ok(response)
    }
}

impl HyperService<Request> for Service {
    type Response = Response;
    type Error = BoxError;
    type Future = BoxFuture<Result<Response, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        info!("{} - {} {}", self.remote_addr, req.method(), req.uri());

        // Grab what we need from `self` before creating a future.
        let app = Arc::clone(&self.app);
        Box::pin(Self::serve(req, app))
    }
}

/// Handle a `BridgeError` and create a response.
///
/// Input errors are shown to the user as-is. Internal errors are logged with a reference
/// number, and only the reference is shown to the user.
async fn handle_error(ctx: &Context, err: BridgeError) -> Response {
    let reference = err.log(Some(&ctx.app.rng)).await;
    let body = match reference {
        Some(reference) => format!(
            "Something went wrong, and we cannot complete your request at this time. (reference: {})",
            reference
        ),
        None => err.to_string(),
    };
    let mut res = text_response(body);
    *res.status_mut() = err.http_status_code();
    res
}

/// Mutate a response to set common headers.
fn set_headers<B>(res: &mut hyper::Response<B>) {
    // Handlers that render scripts set their own policy.
    if !res.has_content_security_policy() {
        res.content_security_policy(&["default-src 'none'", "form-action *"]);
    }

    res.typed_header(StrictTransportSecurity::excluding_subdomains(
        Duration::from_secs(31_536_000u64),
    ));
    res.header(hyper::header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_owned());
    res.header(hyper::header::X_FRAME_OPTIONS, "DENY".to_owned());

    // Default to disable caching completely.
    if !res.headers().contains_key(CacheControl::name()) {
        res.typed_header(CacheControl::new().with_no_cache().with_no_store());
    }
}

/// Parse a form-encoded string into a `HashMap`.
pub fn parse_form_encoded(input: &[u8]) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (key, value) in form_urlencoded::parse(input) {
        map.insert(key.into_owned(), value.into_owned());
    }
    map
}

/// Read the request body up to `limit` bytes.
pub async fn read_body(mut body: Body, limit: usize) -> Result<Bytes, BoxError> {
    let mut acc = BytesMut::new();
    while let Some(result) = body.next().await {
        let chunk = result.map_err(Box::new)?;
        if acc.len() + chunk.len() > limit {
            return Err(Box::new(SizeLimitExceeded));
        }
        acc.extend(chunk);
    }
    Ok(acc.freeze())
}

/// Render a page that immediately POSTs `params` to `action`.
///
/// All values pass through the template's HTML escaping, so attacker-controlled field names,
/// values and targets cannot break out of their attributes. `nonce` must match the
/// `script-src` of the content security policy sent along with the page.
pub fn render_autopost(
    template: &Template,
    action: &str,
    params: &BTreeMap<String, String>,
    nonce: &str,
) -> String {
    let data = mustache::MapBuilder::new()
        .insert_str("action", action)
        .insert_str("nonce", nonce)
        .insert_vec("params", |mut builder| {
            for (name, value) in params {
                builder = builder
                    .push_map(|builder| builder.insert_str("name", name).insert_str("value", value));
            }
            builder
        })
        .build();
    template.render_data(&data)
}

/// Create a response with a page that immediately POSTs `params` to `action`.
pub async fn autopost_response(
    ctx: &Context,
    action: &str,
    params: &BTreeMap<String, String>,
) -> Response {
    let nonce = crypto::csp_nonce(&ctx.app.rng).await;
    let script_src = format!("script-src 'nonce-{}'", nonce);
    let mut res = html_response(render_autopost(
        &ctx.app.templates.autopost,
        action,
        params,
        &nonce,
    ));
    res.content_security_policy(&["default-src 'none'", script_src.as_str(), "form-action *"]);
    res
}

/// Create a `302 Found` redirect response.
pub fn redirect_response(location: &str) -> Response {
    let mut res = empty_response(StatusCode::FOUND);
    res.header(hyper::header::LOCATION, location);
    res
}

/// Create a response with an HTML body.
pub fn html_response(html: String) -> Response {
    let mut res = Response::new(Body::from(html));
    res.header(hyper::header::CONTENT_TYPE, "text/html; charset=utf-8");
    res
}

/// Create a response with a plain text body.
pub fn text_response(text: String) -> Response {
    let mut res = Response::new(Body::from(text));
    res.typed_header(ContentType::text_utf8());
    res
}

/// Create a response with an empty body and a specific status code.
pub fn empty_response(status: StatusCode) -> Response {
    let mut res = Response::new(Body::empty());
    *res.status_mut() = status;
    res
}


#[cfg(test)]
mod tests {
    use super::testing::TestClient;
    use super::*;
    use crate::config::{ConfigBuilder, Templates};

    fn templates() -> Templates {
        Templates::new(env!("CARGO_MANIFEST_DIR")).expect("could not load templates")
    }

    #[test]
    fn sets_expected_headers() {
        let mut res = hyper::Response::new(());
        set_headers(&mut res);

        let headers = res.headers();
        assert!(headers.contains_key("Strict-Transport-Security"));
        assert!(headers.contains_key("Content-Security-Policy"));
        assert!(headers.contains_key("X-Content-Security-Policy"));
        assert!(headers.contains_key("X-Content-Type-Options"));
        assert!(headers.contains_key("X-Frame-Options"));
        assert!(headers.contains_key("Cache-Control"));
    }

    #[test]
    fn renders_autopost_form() {
        let mut params = BTreeMap::new();
        params.insert("a".to_owned(), "1".to_owned());
        params.insert("user_id".to_owned(), "42".to_owned());
        let html = render_autopost(&templates().autopost, "/lti_provider/x", &params, "n0nce");

        assert!(html.starts_with("<!doctype html>"));
        assert!(html.contains(r#"<form id="f" method="post" action="/lti_provider/x">"#));
        assert!(html.contains(r#"<input type="hidden" name="a" value="1"/>"#));
        assert!(html.contains(r#"<input type="hidden" name="user_id" value="42"/>"#));
        assert!(html.contains(r#"<script nonce="n0nce">document.getElementById("f").submit();</script>"#));
    }

    #[test]
    fn escapes_autopost_values() {
        let mut params = BTreeMap::new();
        params.insert(
            "\"><b>".to_owned(),
            "\"><script>alert(1)</script>".to_owned(),
        );
        let html = render_autopost(
            &templates().autopost,
            "/lti_provider/x?a=1&b=\"><script>",
            &params,
            "n0nce",
        );

        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(!html.contains("<b>"));
        assert!(!html.contains("\"><script>"));
        assert!(html.contains("&quot;&gt;&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("action=\"/lti_provider/x?a=1&amp;b=&quot;&gt;&lt;script&gt;\""));
        // Only the page's own script tag remains.
        assert_eq!(html.matches("<script").count(), 1);
    }

    #[test]
    fn manages_session_values() {
        let mut session = Session::default();
        assert!(session.is_empty());
        assert!(!session.is_authenticated());

        session.insert("target", &"/lti_provider/x").expect("insert failed");
        assert!(!session.is_empty());
        assert_eq!(session.get::<String>("target").as_deref(), Some("/lti_provider/x"));
        // A value of the wrong type reads as absent.
        assert_eq!(session.get::<BTreeMap<String, String>>("target"), None);

        assert!(session.remove("target").is_some());
        assert!(session.remove("target").is_none());
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn parses_form_params_last_value_wins() {
        let client = TestClient::new().await;
        let parts = hyper::Request::post("/")
            .header(
                hyper::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded; charset=utf-8",
            )
            .body(())
            .expect("invalid request")
            .into_parts()
            .0;
        let ctx = Context::new(
            client.app.clone(),
            parts,
            Bytes::from_static(b"b=2&a=1&a=3&c=%3Cx%3E"),
        );

        let params = ctx.form_params().expect("form rejected");
        assert_eq!(params.get("a").map(String::as_str), Some("3"));
        assert_eq!(params.get("c").map(String::as_str), Some("<x>"));
        assert_eq!(
            params.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );
    }

    fn context_with_body(client: &TestClient, content_type: &str, body: &'static [u8]) -> Context {
        let parts = hyper::Request::post("/")
            .header(hyper::header::CONTENT_TYPE, content_type)
            .body(())
            .expect("invalid request")
            .into_parts()
            .0;
        Context::new(client.app.clone(), parts, Bytes::from_static(body))
    }

    #[tokio::test]
    async fn only_decodes_form_bodies() {
        let client = TestClient::new().await;

        let ctx = context_with_body(&client, "application/json", br#"{"a":"1"}"#);
        assert!(ctx.form_params().expect("json rejected").is_empty());

        let ctx = context_with_body(&client, "text/plain", b"a=1");
        assert!(ctx.form_params().expect("text rejected").is_empty());

        let parts = hyper::Request::post("/").body(()).expect("invalid request").into_parts().0;
        let ctx = Context::new(client.app.clone(), parts, Bytes::from_static(b"a=1"));
        assert!(ctx.form_params().expect("body rejected").is_empty());

        let ctx = context_with_body(
            &client,
            "multipart/form-data; boundary=XX",
            b"--XX\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--XX--\r\n",
        );
        let err = ctx.form_params().expect_err("multipart accepted");
        assert_eq!(err.http_status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn html_responses_declare_utf8() {
        let res = html_response("<p>ok</p>".to_owned());
        assert_eq!(
            res.headers()[hyper::header::CONTENT_TYPE],
            "text/html; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn rejects_oversized_bodies() {
        let mut builder = ConfigBuilder::for_tests();
        builder.max_body_size = 16;
        let mut client = TestClient::with_builder(builder).await;
        let res = client
            .request(
                Method::POST,
                "/lti/bridge/launch?target=/lti_provider/x",
                &[("payload", "far more than sixteen bytes")],
            )
            .await;
        assert_eq!(res.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(client.session_id.is_none());
    }

    #[tokio::test]
    async fn ignores_unknown_session_cookies() {
        let mut client = TestClient::new().await;
        client.session_id = Some("A".repeat(crypto::SESSION_ID_LEN));
        let res = client.request(Method::GET, "/lti/bridge/continue", &[]).await;
        assert_eq!(res.status, StatusCode::FOUND);
        assert!(client.stored_session().await.is_none());
    }

    #[tokio::test]
    async fn clears_emptied_sessions() {
        let mut client = TestClient::new().await;
        client
            .request(
                Method::POST,
                "/lti/bridge/launch?target=/lti_provider/x",
                &[("a", "1")],
            )
            .await;
        assert!(client.session_id.is_some());

        // Empty the session through a context, as a handler would.
        let session_id = client.session_id.clone().expect("no session");
        let req = hyper::Request::builder()
            .uri("/")
            .header(
                hyper::header::COOKIE,
                format!("sessionid={}", session_id),
            )
            .body(Body::empty())
            .expect("invalid request");
        let mut ctx = match Context::from_request(req, client.app.clone()).await {
            Ok(ctx) => ctx,
            Err(res) => panic!("request rejected: {}", res.status()),
        };
        ctx.load_session().await.expect("load failed");
        ctx.session_mut().values.clear();
        let res = ctx.finish(Ok(empty_response(StatusCode::OK))).await;
        let cookie = res.headers()[hyper::header::SET_COOKIE]
            .to_str()
            .expect("invalid cookie");
        assert!(cookie.starts_with("sessionid=;"));
        assert!(cookie.contains("Max-Age=0"));
        assert!(client.stored_session().await.is_none());
    }
}
