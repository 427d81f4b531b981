use http::StatusCode;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};

lazy_static::lazy_static! {
    pub static ref HTTP_CONNECTIONS: IntCounter = register_int_counter!(
        "lti_bridge_http_connections",
        "Number of HTTP connections accepted"
    ).unwrap();

    pub static ref HTTP_REQUESTS: IntCounter = register_int_counter!(
        "lti_bridge_http_requests",
        "Number of HTTP requests processed"
    ).unwrap();

    pub static ref HTTP_RESPONSE_STATUS: IntCounterVec = register_int_counter_vec!(
        "lti_bridge_http_response_status",
        "Number of HTTP responses by status category",
        &["code"]
    ).unwrap();
    pub static ref HTTP_RESPONSE_STATUS_1XX: IntCounter =
        HTTP_RESPONSE_STATUS.with_label_values(&["1xx"]);
    pub static ref HTTP_RESPONSE_STATUS_2XX: IntCounter =
        HTTP_RESPONSE_STATUS.with_label_values(&["2xx"]);
    pub static ref HTTP_RESPONSE_STATUS_3XX: IntCounter =
        HTTP_RESPONSE_STATUS.with_label_values(&["3xx"]);
    pub static ref HTTP_RESPONSE_STATUS_4XX: IntCounter =
        HTTP_RESPONSE_STATUS.with_label_values(&["4xx"]);
    pub static ref HTTP_RESPONSE_STATUS_5XX: IntCounter =
        HTTP_RESPONSE_STATUS.with_label_values(&["5xx"]);

    pub static ref BRIDGE_LAUNCHES: IntCounter = register_int_counter!(
        "lti_bridge_launches",
        "Number of LTI launches deferred through the login step"
    ).unwrap();

    pub static ref BRIDGE_LAUNCHES_REJECTED: IntCounter = register_int_counter!(
        "lti_bridge_launches_rejected",
        "Number of LTI launches rejected for a bad method or target"
    ).unwrap();

    pub static ref BRIDGE_CONTINUE_UNAUTHENTICATED: IntCounter = register_int_counter!(
        "lti_bridge_continue_unauthenticated",
        "Number of continuation requests sent to the host login page"
    ).unwrap();

    pub static ref BRIDGE_CONTINUE_MISSING: IntCounter = register_int_counter!(
        "lti_bridge_continue_missing",
        "Number of continuation requests without a usable pending launch"
    ).unwrap();

    pub static ref BRIDGE_CONTINUE_INVALID_TARGET: IntCounter = register_int_counter!(
        "lti_bridge_continue_invalid_target",
        "Number of continuation requests whose stored target was rejected"
    ).unwrap();

    pub static ref BRIDGE_REPLAYS: IntCounter = register_int_counter!(
        "lti_bridge_replays",
        "Number of LTI launches replayed to their target"
    ).unwrap();

    pub static ref LOGINS_COMPLETED: IntCounter = register_int_counter!(
        "lti_bridge_logins_completed",
        "Number of completed logins"
    ).unwrap();

    pub static ref PIPELINE_REDIRECTS: IntCounter = register_int_counter!(
        "lti_bridge_pipeline_redirects",
        "Number of logins redirected by a post-login step"
    ).unwrap();
}

/// Count a response by its status category.
pub fn observe_status(status: StatusCode) {
    match status.as_u16() {
        100..=199 => HTTP_RESPONSE_STATUS_1XX.inc(),
        200..=299 => HTTP_RESPONSE_STATUS_2XX.inc(),
        300..=399 => HTTP_RESPONSE_STATUS_3XX.inc(),
        400..=499 => HTTP_RESPONSE_STATUS_4XX.inc(),
        500..=599 => HTTP_RESPONSE_STATUS_5XX.inc(),
        _ => {}
    }
}
