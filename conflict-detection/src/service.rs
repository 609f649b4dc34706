use crate::auth::{AuthDecision, AuthorizationGuard, BearerTokenGuard};
use crate::config::Config;
use crate::errors::ConflictDetectionError;
use crate::merger::{ConflictReportMerger, ReportOutcome};
use crate::metrics_defs::{
    REPORT_CLIENTS, REPORTS_RECEIVED, REQUEST_DURATION, UNREGISTERED_CLIENTS_TOTAL,
};
use crate::router::{Endpoint, RouteMatch, Router};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Incoming};
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderValue, WWW_AUTHENTICATE};
use hyper::service::Service;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use serde::Serialize;
use shared::http::{make_boxed_error_response, make_empty_response};
use shared::{counter, gauge, histogram};
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

pub type ResponseBody = BoxBody<Bytes, ConflictDetectionError>;

/// HTTP front of the conflict report merger.
#[derive(Clone)]
pub struct ConflictDetectionService {
    inner: Arc<Inner>,
}

struct Inner {
    router: Router,
    guard: Arc<dyn AuthorizationGuard>,
    merger: Arc<ConflictReportMerger>,
    max_body_bytes: usize,
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

impl ConflictDetectionService {
    pub fn new(
        router: Router,
        guard: Arc<dyn AuthorizationGuard>,
        merger: Arc<ConflictReportMerger>,
        max_body_bytes: usize,
    ) -> Self {
        ConflictDetectionService {
            inner: Arc::new(Inner {
                router,
                guard,
                merger,
                max_body_bytes,
            }),
        }
    }

    pub fn from_config(config: &Config, merger: Arc<ConflictReportMerger>) -> Self {
        let guard = BearerTokenGuard::new(config.auth.admin_tokens.iter().cloned());
        ConflictDetectionService::new(
            Router::with_default_routes(&config.namespace),
            Arc::new(guard),
            merger,
            config.max_body_bytes,
        )
    }

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    /// Dispatches a request to its endpoint. Every failure is turned into a
    /// response here, so this never errors.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let start = Instant::now();
        let route = self.inner.router.find(req.method(), req.uri().path());

        let response = match route {
            RouteMatch::Matched(Endpoint::ReportConflicts) => {
                match self.report_conflicts(req).await {
                    Ok(response) => response,
                    Err(err) => {
                        counter!(REPORTS_RECEIVED, "outcome" => "rejected").increment(1);
                        error_response(err)
                    }
                }
            }
            RouteMatch::MethodNotAllowed(allowed) => method_not_allowed(&allowed),
            RouteMatch::NotFound => {
                tracing::debug!(
                    method = %req.method(),
                    path = %req.uri().path(),
                    "No route matched"
                );
                make_boxed_error_response(StatusCode::NOT_FOUND)
            }
        };

        histogram!(REQUEST_DURATION, "status" => response.status().as_u16().to_string())
            .record(start.elapsed().as_secs_f64());
        response
    }

    async fn report_conflicts<B>(
        &self,
        req: Request<B>,
    ) -> Result<Response<ResponseBody>, ConflictDetectionError>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        match self.inner.guard.authorize(req.headers()) {
            AuthDecision::Granted => {}
            AuthDecision::MissingCredentials => return Err(ConflictDetectionError::Unauthorized),
            AuthDecision::Denied => return Err(ConflictDetectionError::Forbidden),
        }

        let merger = &self.inner.merger;

        // Skip reading the body at all while detection is off
        if !merger.is_detecting().await? {
            return Ok(window_closed_response());
        }

        if !is_json(req.headers()) {
            return Err(ConflictDetectionError::UnsupportedMediaType);
        }

        let body = read_body(req.into_body(), self.inner.max_body_bytes).await?;

        match merger.report_conflicts(&body).await? {
            ReportOutcome::WindowClosed => Ok(window_closed_response()),
            ReportOutcome::Merged { reported, total } => {
                counter!(REPORTS_RECEIVED, "outcome" => "accepted").increment(1);
                histogram!(REPORT_CLIENTS).record(reported as f64);
                gauge!(UNREGISTERED_CLIENTS_TOTAL).set(total as f64);
                tracing::info!(reported, total, "merged conflict report");

                Ok(make_empty_response(StatusCode::NO_CONTENT))
            }
        }
    }
}

impl Service<Request<Incoming>> for ConflictDetectionService {
    type Response = Response<ResponseBody>;
    type Error = ConflictDetectionError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, ConflictDetectionError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(ConflictDetectionError::BodyTooLarge(limit))
        }
        Err(err) => Err(ConflictDetectionError::RequestBodyError(err.to_string())),
    }
}

fn window_closed_response() -> Response<ResponseBody> {
    counter!(REPORTS_RECEIVED, "outcome" => "window_closed").increment(1);
    tracing::debug!("conflict report outside of the detection window");
    make_empty_response(StatusCode::NOT_FOUND)
}

fn method_not_allowed(allowed: &[Method]) -> Response<ResponseBody> {
    let mut response = make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

fn error_response(err: ConflictDetectionError) -> Response<ResponseBody> {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(error = %err, "failed to handle conflict report");
    } else {
        tracing::debug!(error = %err, %status, "rejected conflict report");
    }

    let body = serde_json::to_vec(&ApiErrorResponse {
        error_message: err.to_string(),
    })
    .unwrap_or_default();

    let mut response = Response::new(
        Full::new(Bytes::from(body))
            .map_err(|e| match e {})
            .boxed(),
    );
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if status == StatusCode::UNAUTHORIZED {
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{
        ResourceDescriptor, ResourceType, UNREGISTERED_CLIENTS_KEY, UnregisteredClients,
    };
    use crate::testutils::{
        FAKE_CSS, FAKE_JS, FAKE_JS_AND_CSS, FixedClock, FlakyStore, test_now,
    };
    use crate::window::{DETECT_CONFLICTS_UNTIL_KEY, DetectionWindow};
    use chrono::TimeDelta;
    use options_store::{InMemoryOptionsStore, OptionsStore};
    use serde_json::Value;

    const ROUTE: &str = "/font-awesome/v1/report-conflicts";
    const TOKEN: &str = "s3cret";

    struct TestSetup {
        service: ConflictDetectionService,
        merger: Arc<ConflictReportMerger>,
    }

    async fn setup_with_store(
        store: Arc<dyn OptionsStore>,
        window: DetectionWindow,
    ) -> TestSetup {
        window.save(store.as_ref()).await.unwrap();
        let merger = Arc::new(ConflictReportMerger::new(
            store,
            Arc::new(FixedClock::new(test_now())),
        ));
        let service = ConflictDetectionService::new(
            Router::with_default_routes("font-awesome/v1"),
            Arc::new(BearerTokenGuard::new([TOKEN])),
            merger.clone(),
            1024,
        );
        TestSetup { service, merger }
    }

    async fn setup(window: DetectionWindow) -> TestSetup {
        setup_with_store(Arc::new(InMemoryOptionsStore::new()), window).await
    }

    fn detecting() -> DetectionWindow {
        DetectionWindow::until(test_now() + TimeDelta::minutes(10))
    }

    fn report_request(body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(Method::POST)
            .uri(ROUTE)
            .header(CONTENT_TYPE, "application/json")
            .header("authorization", format!("Bearer {TOKEN}"))
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn body_bytes(response: Response<ResponseBody>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    fn clients(json: &str) -> UnregisteredClients {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn test_route_is_registered() {
        let test = setup(detecting()).await;
        assert!(test.service.router().has_route(ROUTE));
    }

    #[tokio::test]
    async fn test_when_detecting_conflicts() {
        let test = setup(detecting()).await;

        let response = test.service.handle(report_request(FAKE_JS_AND_CSS)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(body_bytes(response).await.is_empty());

        assert_eq!(
            test.merger.unregistered_clients().await.unwrap(),
            clients(FAKE_JS_AND_CSS)
        );
    }

    #[tokio::test]
    async fn test_when_not_detecting_conflicts() {
        let test = setup(DetectionWindow::closed()).await;

        let response = test.service.handle(report_request(FAKE_JS)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_bytes(response).await.is_empty());

        assert!(test.merger.unregistered_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_when_adding_additional_conflicts() {
        let test = setup(detecting()).await;
        test.merger
            .store()
            .set(UNREGISTERED_CLIENTS_KEY, serde_json::from_str(FAKE_JS).unwrap())
            .await
            .unwrap();

        let response = test.service.handle(report_request(FAKE_CSS)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        assert_eq!(
            test.merger.unregistered_clients().await.unwrap(),
            clients(FAKE_JS_AND_CSS)
        );
    }

    #[tokio::test]
    async fn test_change_detection() {
        let test = setup(detecting()).await;
        test.merger
            .store()
            .set(UNREGISTERED_CLIENTS_KEY, serde_json::from_str(FAKE_JS).unwrap())
            .await
            .unwrap();

        // No change
        let response = test.service.handle(report_request(FAKE_JS)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            test.merger.unregistered_clients().await.unwrap(),
            clients(FAKE_JS)
        );

        // Change only in the value of a descriptor field
        let response = test
            .service
            .handle(report_request(
                r#"{"abc123":{"type":"style","src":"http://example.com/fake.js"}}"#,
            ))
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            test.merger.unregistered_clients().await.unwrap(),
            UnregisteredClients::from([(
                "abc123".to_string(),
                ResourceDescriptor::new(ResourceType::Style, "http://example.com/fake.js"),
            )])
        );
    }

    #[tokio::test]
    async fn test_authorization() {
        let test = setup(detecting()).await;

        let mut request = report_request(FAKE_JS);
        request.headers_mut().remove("authorization");
        let response = test.service.handle(request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");

        let mut request = report_request(FAKE_JS);
        request.headers_mut().insert(
            "authorization",
            HeaderValue::from_static("Bearer not-the-token"),
        );
        let response = test.service.handle(request).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        assert_eq!(
            test.merger
                .store()
                .get(UNREGISTERED_CLIENTS_KEY)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let test = setup(detecting()).await;

        let response = test.service.handle(report_request("{\"abc123\":")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(
            body["error_message"]
                .as_str()
                .unwrap()
                .starts_with("invalid conflict report")
        );

        let response = test
            .service
            .handle(report_request(r#"{"abc123":{"type":"font","src":"a.woff"}}"#))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(test.merger.unregistered_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_content_type() {
        let test = setup(detecting()).await;

        let mut request = report_request(FAKE_JS);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        let response = test.service.handle(request).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let mut request = report_request(FAKE_JS);
        request.headers_mut().remove(CONTENT_TYPE);
        let response = test.service.handle(request).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(test.merger.unregistered_clients().await.unwrap().is_empty());

        let mut request = report_request(FAKE_JS);
        request.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Application/JSON; charset=utf-8"),
        );
        let response = test.service.handle(request).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let test = setup(detecting()).await;

        let src = "x".repeat(2048);
        let body = format!(r#"{{"abc123":{{"type":"script","src":"{src}"}}}}"#);
        let response = test.service.handle(report_request(&body)).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(test.merger.unregistered_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let test = setup(detecting()).await;

        let mut request = report_request(FAKE_JS);
        *request.method_mut() = Method::GET;
        let response = test.service.handle(request).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "POST");

        let mut request = report_request(FAKE_JS);
        *request.uri_mut() = "/font-awesome/v1/conflicts".parse().unwrap();
        let response = test.service.handle(request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        assert!(test.merger.unregistered_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure() {
        let store = Arc::new(FlakyStore::default());
        let test = setup_with_store(store.clone(), detecting()).await;
        store.fail_writes(true);

        let response = test.service.handle(report_request(FAKE_JS)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        store.fail_writes(false);
        assert!(test.merger.unregistered_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_window_read_failure() {
        let store = Arc::new(FlakyStore::default());
        let test = setup_with_store(store.clone(), detecting()).await;
        let writes = store.writes();
        store.fail_reads_of(DETECT_CONFLICTS_UNTIL_KEY);

        let response = test.service.handle(report_request(FAKE_JS)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(
            body["error_message"]
                .as_str()
                .unwrap()
                .starts_with("options store error")
        );
        assert_eq!(store.writes(), writes);
    }
}
