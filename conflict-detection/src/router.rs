use hyper::Method;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    ReportConflicts,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub endpoint: Endpoint,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RouteMatch {
    Matched(Endpoint),
    /// The path is registered, but not for this method.
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

/// Routes registered under a single namespace, e.g. `/font-awesome/v1/...`
#[derive(Clone, Debug)]
pub struct Router {
    namespace: String,
    routes: Vec<Route>,
}

impl Router {
    pub fn new(namespace: &str) -> Self {
        Router {
            namespace: namespace.trim_matches('/').to_string(),
            routes: Vec::new(),
        }
    }

    /// Router with every conflict detection route registered.
    pub fn with_default_routes(namespace: &str) -> Self {
        let mut router = Router::new(namespace);
        router.register(Method::POST, "report-conflicts", Endpoint::ReportConflicts);
        router
    }

    pub fn register(&mut self, method: Method, route: &str, endpoint: Endpoint) {
        let path = format!("/{}/{}", self.namespace, route.trim_start_matches('/'));
        tracing::debug!(%method, path = %path, "registered route");
        self.routes.push(Route {
            method,
            path,
            endpoint,
        });
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn has_route(&self, path: &str) -> bool {
        self.routes.iter().any(|route| route.path == path)
    }

    pub fn find(&self, method: &Method, path: &str) -> RouteMatch {
        let mut allowed = Vec::new();

        for route in self.routes.iter().filter(|route| route.path == path) {
            if route.method == *method {
                return RouteMatch::Matched(route.endpoint);
            }
            allowed.push(route.method.clone());
        }

        if allowed.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed(allowed)
        }
    }
}
