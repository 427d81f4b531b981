use crate::error::BridgeError;
use crate::metrics;
use crate::pipeline::PostLoginStep;
use crate::validation::is_safe_target;
use crate::web::{autopost_response, redirect_response, Context, HandlerResult, Response};
use http::Method;
use log::info;
use std::collections::BTreeMap;

/// Session key of the path a deferred launch is replayed to.
pub const SESSION_TARGET_KEY: &str = "lti_bridge_target";
/// Session key of the form fields of a deferred launch.
pub const SESSION_PAYLOAD_KEY: &str = "lti_bridge_payload";

/// Path of the continuation endpoint.
pub const CONTINUE_PATH: &str = "/lti/bridge/continue";

/// Request handler that defers an LTI launch until after login.
///
/// The launch form fields are stashed in the session together with the `target` query
/// parameter, then relayed to the login endpoint.
pub async fn launch(ctx: &mut Context) -> HandlerResult {
    if ctx.method != Method::POST {
        metrics::BRIDGE_LAUNCHES_REJECTED.inc();
        return Err(BridgeError::Input("POST required".to_owned()));
    }

    let target = ctx.query_params().remove("target").unwrap_or_default();
    if !is_safe_target(&target, &ctx.app.allowed_target_root) {
        metrics::BRIDGE_LAUNCHES_REJECTED.inc();
        return Err(BridgeError::Input("Invalid target".to_owned()));
    }

    let payload = ctx.form_params()?;
    let session = ctx.session_mut();
    session.insert(SESSION_TARGET_KEY, &target)?;
    session.insert(SESSION_PAYLOAD_KEY, &payload)?;

    metrics::BRIDGE_LAUNCHES.inc();
    info!("deferred LTI launch for {} until login", target);

    let app = ctx.app.clone();
    Ok(autopost_response(ctx, &app.login_url, &payload).await)
}

/// Request handler that replays a deferred launch once the user is logged in.
pub async fn continue_launch(ctx: &mut Context) -> HandlerResult {
    if !ctx.session().is_authenticated() {
        metrics::BRIDGE_CONTINUE_UNAUTHENTICATED.inc();
        return Ok(redirect_response(&host_login_redirect(
            &ctx.app.host_login_url,
        )));
    }

    let target: Option<String> = ctx.session().get(SESSION_TARGET_KEY);
    let payload: Option<BTreeMap<String, String>> = ctx.session().get(SESSION_PAYLOAD_KEY);
    let (target, payload) = match (target, payload) {
        (Some(target), Some(payload)) if !target.is_empty() && !payload.is_empty() => {
            (target, payload)
        }
        _ => {
            metrics::BRIDGE_CONTINUE_MISSING.inc();
            return Err(BridgeError::Input("No pending LTI launch".to_owned()));
        }
    };

    // The session outlives configuration changes, so check again.
    if !is_safe_target(&target, &ctx.app.allowed_target_root) {
        metrics::BRIDGE_CONTINUE_INVALID_TARGET.inc();
        return Err(BridgeError::Input("Invalid target in session".to_owned()));
    }

    let session = ctx.session_mut();
    session.remove(SESSION_TARGET_KEY);
    session.remove(SESSION_PAYLOAD_KEY);

    metrics::BRIDGE_REPLAYS.inc();
    info!("replaying LTI launch to {}", target);

    Ok(autopost_response(ctx, &target, &payload).await)
}

/// Build the host login URL that returns to the continuation endpoint.
fn host_login_redirect(host_login_url: &str) -> String {
    let separator = if host_login_url.contains('?') { '&' } else { '?' };
    format!("{}{}next={}", host_login_url, separator, CONTINUE_PATH)
}

/// Post-login step that resumes a deferred launch.
pub struct ResumeBridge;

impl PostLoginStep for ResumeBridge {
    fn name(&self) -> &'static str {
        "resume_bridge"
    }

    fn run(&self, ctx: Option<&Context>) -> Option<Response> {
        let target: String = ctx?.session().get(SESSION_TARGET_KEY)?;
        if target.is_empty() {
            return None;
        }
        Some(redirect_response(CONTINUE_PATH))
    }
}
