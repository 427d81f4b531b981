use crate::handlers;
use crate::web::{empty_response, Context, HandlerResult};
use http::{Method, StatusCode};

/// Route the request, returning a handler
pub async fn router(ctx: &mut Context) -> HandlerResult {
    // Development login, at whatever path the launch is relayed to.
    #[cfg(feature = "insecure")]
    if ctx.method == Method::POST && ctx.uri.path() == path_of(&ctx.app.login_url) {
        return handlers::login::trusting_login(ctx).await;
    }

    match (&ctx.method, ctx.uri.path()) {
        // Bridge endpoints
        // Launch checks the method itself, so it can explain the rejection.
        (_, "/lti/bridge/launch") => handlers::bridge::launch(ctx).await,
        (_, handlers::bridge::CONTINUE_PATH) => handlers::bridge::continue_launch(ctx).await,

        // Misc endpoints
        (&Method::GET, "/ver.txt") => handlers::pages::version(ctx).await,
        (&Method::GET, "/metrics") => handlers::pages::metrics(ctx).await,

        _ => Ok(empty_response(StatusCode::NOT_FOUND)),
    }
}

/// The path component of a relative URL.
#[cfg(feature = "insecure")]
fn path_of(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}
