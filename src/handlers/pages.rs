use crate::error::BridgeError;
use crate::web::{text_response, Context, HandlerResult};
use prometheus::Encoder;

/// Version information for the bridge.
pub async fn version(_ctx: &mut Context) -> HandlerResult {
    Ok(text_response(format!(
        "LTI bridge {}\n",
        env!("CARGO_PKG_VERSION")
    )))
}

/// Metrics in the prometheus text exposition format.
pub async fn metrics(_ctx: &mut Context) -> HandlerResult {
    let mut buffer = vec![];
    let encoder = prometheus::TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| BridgeError::Internal(format!("could not encode metrics: {}", e)))?;
    let body = String::from_utf8(buffer)
        .map_err(|e| BridgeError::Internal(format!("metrics are not valid UTF-8: {}", e)))?;
    Ok(text_response(body))
}

#[cfg(test)]
mod tests {
    use crate::web::testing::TestClient;
    use http::{Method, StatusCode};

    #[tokio::test]
    async fn serves_version() {
        let mut client = TestClient::new().await;
        let res = client.request(Method::GET, "/ver.txt", &[]).await;
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn serves_metrics() {
        let mut client = TestClient::new().await;
        client.request(Method::GET, "/ver.txt", &[]).await;
        let res = client.request(Method::GET, "/metrics", &[]).await;
        assert_eq!(res.status, StatusCode::OK);
        assert!(res.body.contains("lti_bridge_http_requests"));
    }
}
