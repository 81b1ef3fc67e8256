use super::RelayState;
use crate::error::RelayError;
use crate::metrics;
use crate::types::{RawRelayRequest, RelayResult};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Bytes;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, AUTHORIZATION, CONTENT_TYPE,
};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type BoxBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// 请求体上限 1 MiB
const MAX_BODY_BYTES: usize = 1024 * 1024;

const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// 处理 HTTP 请求的主路由
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<RelayState>,
) -> Result<Response<BoxBody>, BoxError> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::OPTIONS, _) => preflight(),
        (&Method::GET, "/health") => health_check(),
        (&Method::GET, "/metrics") => metrics_endpoint(),
        (&Method::POST, "/chat") | (&Method::POST, "/functions/v1/chat") => {
            relay(req, state).await
        }
        _ => not_found(),
    };

    Ok(with_cors(response))
}

fn full(body: impl Into<Bytes>) -> BoxBody {
    Full::new(body.into())
        .map_err(|e| Box::new(e) as BoxError)
        .boxed()
}

fn response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<BoxBody> {
    let mut response = Response::new(full(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response(status: StatusCode, body: &Value) -> Response<BoxBody> {
    response(status, "application/json", body.to_string())
}

fn with_cors(mut response: Response<BoxBody>) -> Response<BoxBody> {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    response
}

/// CORS 预检
fn preflight() -> Response<BoxBody> {
    response(StatusCode::OK, "text/plain", "ok")
}

/// 健康检查端点
fn health_check() -> Response<BoxBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "service": "chatrelay"
        }),
    )
}

/// 指标端点
fn metrics_endpoint() -> Response<BoxBody> {
    let body = metrics::global_metrics().export_prometheus();
    response(StatusCode::OK, "text/plain", body)
}

/// 中继端点：成功 200 `{content}`，任何失败 400 `{error}`
async fn relay(req: Request<hyper::body::Incoming>, state: Arc<RelayState>) -> Response<BoxBody> {
    let request_id = Uuid::new_v4();
    let span = info_span!("relay", %request_id);

    let mut response = async move {
        if !authorized(req.headers(), state.auth_token.as_deref()) {
            warn!("拒绝未授权的请求");
            return json_response(StatusCode::UNAUTHORIZED, &json!({"error": "Unauthorized"}));
        }

        let result = match read_relay_request(req).await {
            Ok(raw) => state.dispatcher.dispatch(raw).await,
            Err(e) => {
                metrics::global_metrics().record_rejected();
                warn!(error = %e, "无法解析请求体");
                RelayResult::failure(e.to_string())
            }
        };

        relay_response(result)
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

/// 校验静态 Bearer 凭证，未配置凭证时放行
fn authorized(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

async fn read_relay_request(
    req: Request<hyper::body::Incoming>,
) -> Result<RawRelayRequest, RelayError> {
    let body = Limited::new(req.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| RelayError::InvalidBody(e.to_string()))?
        .to_bytes();

    serde_json::from_slice(&body).map_err(|e| RelayError::InvalidBody(e.to_string()))
}

fn relay_response(result: RelayResult) -> Response<BoxBody> {
    match result {
        RelayResult::Success { content } => {
            json_response(StatusCode::OK, &json!({ "content": content }))
        }
        RelayResult::Failure { error } => {
            json_response(StatusCode::BAD_REQUEST, &json!({ "error": error }))
        }
    }
}

/// 404 响应
fn not_found() -> Response<BoxBody> {
    response(StatusCode::NOT_FOUND, "text/plain", "Not Found")
}
