use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::web::{redirect_response, Context, HandlerResult, Response};
use log::info;

/// A step run after a user logs in.
///
/// Steps run in registration order. The first step that returns a response short-circuits the
/// pipeline, and its response is sent instead of the default post-login redirect.
pub trait PostLoginStep: Send + Sync {
    /// Short name used in logging.
    fn name(&self) -> &'static str;

    /// Inspect the request, optionally producing a response.
    ///
    /// Steps may be invoked without a request context, in which case they should do nothing.
    fn run(&self, ctx: Option<&Context>) -> Option<Response>;
}

/// Ordered list of post-login steps.
#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn PostLoginStep>>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline::default()
    }

    /// Append a step to the pipeline.
    pub fn register(&mut self, step: impl PostLoginStep + 'static) -> &mut Pipeline {
        self.steps.push(Box::new(step));
        self
    }

    /// Run steps in order, returning the first response produced.
    pub fn run(&self, ctx: Option<&Context>) -> Option<Response> {
        self.steps.iter().find_map(|step| {
            let res = step.run(ctx);
            if res.is_some() {
                info!("post-login step {} redirected the login", step.name());
            }
            res
        })
    }
}

/// Mark the session as logged in as `user_id`, then run the post-login pipeline.
///
/// The session moves to a new ID, keeping its data.
pub async fn complete_login(ctx: &mut Context, user_id: &str) -> HandlerResult {
    check_user_id(user_id)?;

    ctx.cycle_session_id();
    ctx.session_mut().user_id = Some(user_id.to_owned());
    metrics::LOGINS_COMPLETED.inc();

    let app = ctx.app.clone();
    if let Some(res) = app.pipeline.run(Some(&*ctx)) {
        metrics::PIPELINE_REDIRECTS.inc();
        return Ok(res);
    }
    Ok(redirect_response(&app.login_redirect_url))
}

fn check_user_id(user_id: &str) -> BridgeResult<()> {
    if user_id.is_empty() {
        return Err(BridgeError::Input("Missing user_id".to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::{empty_response, testing::TestClient};
    use http::{Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed(StatusCode);

    impl PostLoginStep for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn run(&self, _ctx: Option<&Context>) -> Option<Response> {
            Some(empty_response(self.0))
        }
    }

    struct Counting(Arc<AtomicUsize>);

    impl PostLoginStep for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run(&self, _ctx: Option<&Context>) -> Option<Response> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn first_response_wins() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut pipeline = Pipeline::new();
        pipeline
            .register(Counting(calls.clone()))
            .register(Fixed(StatusCode::ACCEPTED))
            .register(Fixed(StatusCode::CONFLICT))
            .register(Counting(calls.clone()));

        let res = pipeline.run(None).expect("no response");
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_pipeline_produces_nothing() {
        let pipeline = Pipeline::new();
        assert!(pipeline.run(None).is_none());
    }

    #[tokio::test]
    async fn login_without_launch_uses_default_redirect() {
        let mut client = TestClient::new().await;
        let res = client.login("alice").await;
        assert_eq!(res.status, StatusCode::FOUND);
        assert_eq!(res.location(), Some("/"));

        let session = client.stored_session().await.expect("no session stored");
        assert_eq!(session.user_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn login_issues_new_session_id() {
        let mut client = TestClient::new().await;
        client
            .request(
                Method::POST,
                "/lti/bridge/launch?target=/lti_provider/x",
                &[("a", "1")],
            )
            .await;
        let before = client.session_id.clone().expect("no session after launch");

        client.login("alice").await;
        let after = client.session_id.clone().expect("no session after login");
        assert_ne!(before, after);

        // The old ID no longer resolves.
        client.session_id = Some(before);
        assert!(client.stored_session().await.is_none());
        client.session_id = Some(after);
        assert!(client.stored_session().await.is_some());
    }

    #[tokio::test]
    async fn rejects_empty_user_id() {
        let mut client = TestClient::new().await;
        let res = client.login("").await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST);
        assert_eq!(res.body, "Missing user_id");
        assert!(client.session_id.is_none());
    }
}
