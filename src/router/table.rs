//! Route storage and resolution.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use super::pattern::Pattern;
use crate::context::Parameters;
use crate::http::Method;

/// Why a `(method, path)` pair did not resolve to a route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no route matches {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("{method} is not allowed for {path} (allowed: {})", .allowed.join(", "))]
    MethodNotAllowed {
        method: Method,
        path: String,
        /// Methods that do match `path`, sorted and de-duplicated.
        allowed: Vec<String>,
    },
}

/// A registered route: method, original template, compiled pattern and its target.
#[derive(Debug)]
pub struct Route<T> {
    method: Method,
    template: String,
    pattern: Pattern,
    target: T,
}

impl<T> Route<T> {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    fn map<U>(self, f: &mut impl FnMut(T) -> U) -> Route<U> {
        Route {
            method: self.method,
            template: self.template,
            pattern: self.pattern,
            target: f(self.target),
        }
    }
}

/// A successful resolution.
#[derive(Debug)]
pub struct Resolved<'a, T> {
    pub route: &'a Route<T>,
    pub params: Parameters,
}

/// Routes indexed per method, with static templates on an O(1) fast path.
///
/// Built during setup through `&mut` access and only read afterwards; the
/// [`Dispatcher`](super::Dispatcher) keeps it behind an `Arc` with no way back to
/// mutation.
///
/// Resolution order for `(method, path)`:
///
/// 1. a static route for exactly `(method, path)`;
/// 2. dynamic routes under `method`, in registration order, first match wins;
/// 3. otherwise [`ResolveError::MethodNotAllowed`] if any other method has a static or
///    dynamic route for `path`, else [`ResolveError::NotFound`].
///
/// Overlapping dynamic templates are not ranked by specificity: with `/users/:id`
/// registered before `/users/:name/x`, the earlier one wins wherever both match. A
/// static template always beats a dynamic one under the same method.
pub struct RouteTable<T> {
    static_routes: HashMap<Method, HashMap<String, Route<T>>>,
    dynamic_routes: HashMap<Method, Vec<Route<T>>>,
    // Reverse index for 405 detection on static paths.
    static_methods: HashMap<String, BTreeSet<String>>,
    known_paths: Vec<String>,
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RouteTable<T> {
    pub fn new() -> Self {
        Self {
            static_routes: HashMap::new(),
            dynamic_routes: HashMap::new(),
            static_methods: HashMap::new(),
            known_paths: Vec::new(),
        }
    }

    /// Registers `target` for `(method, template)`.
    ///
    /// Registering the same pair again replaces the previous target (a dynamic route
    /// keeps its original position) and returns it.
    pub fn insert(&mut self, method: Method, template: &str, target: T) -> Option<T> {
        if !self.known_paths.iter().any(|known| known == template) {
            self.known_paths.push(template.to_owned());
        }

        let route = Route {
            method: method.clone(),
            template: template.to_owned(),
            pattern: Pattern::compile(template),
            target,
        };

        if route.pattern.is_static() {
            self.static_methods
                .entry(template.to_owned())
                .or_default()
                .insert(method.as_str().to_owned());
            return self
                .static_routes
                .entry(method)
                .or_default()
                .insert(template.to_owned(), route)
                .map(|old| old.target);
        }

        let routes = self.dynamic_routes.entry(method).or_default();
        match routes.iter_mut().find(|r| r.template == template) {
            Some(existing) => Some(std::mem::replace(existing, route).target),
            None => {
                routes.push(route);
                None
            }
        }
    }

    /// Resolves `(method, path)` to a route and its extracted parameters.
    ///
    /// # Errors
    ///
    /// [`ResolveError::MethodNotAllowed`] when only other methods match `path`,
    /// [`ResolveError::NotFound`] when nothing does.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<Resolved<'_, T>, ResolveError> {
        if let Some(route) = self.static_routes.get(method).and_then(|r| r.get(path)) {
            return Ok(Resolved {
                route,
                params: Parameters::new(),
            });
        }

        if let Some(routes) = self.dynamic_routes.get(method) {
            for route in routes {
                if let Some(params) = route.pattern.matches(path) {
                    return Ok(Resolved { route, params });
                }
            }
        }

        let allowed = self.allowed_methods(path);
        if allowed.is_empty() {
            Err(ResolveError::NotFound {
                method: method.clone(),
                path: path.to_owned(),
            })
        } else {
            Err(ResolveError::MethodNotAllowed {
                method: method.clone(),
                path: path.to_owned(),
                allowed,
            })
        }
    }

    /// Every method with a route matching `path`, sorted.
    pub fn allowed_methods(&self, path: &str) -> Vec<String> {
        let mut allowed = self.static_methods.get(path).cloned().unwrap_or_default();
        for (method, routes) in &self.dynamic_routes {
            if routes.iter().any(|r| r.pattern.matches(path).is_some()) {
                allowed.insert(method.as_str().to_owned());
            }
        }
        allowed.into_iter().collect()
    }

    /// Every registered template, in first-registration order, without duplicates.
    pub fn known_paths(&self) -> &[String] {
        &self.known_paths
    }

    pub fn len(&self) -> usize {
        self.static_routes.values().map(HashMap::len).sum::<usize>()
            + self.dynamic_routes.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all routes in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Route<T>> {
        self.static_routes
            .values()
            .flat_map(HashMap::values)
            .chain(self.dynamic_routes.values().flatten())
    }

    /// Converts every target, keeping routes, order and indexes intact.
    pub fn map_targets<U>(self, mut f: impl FnMut(T) -> U) -> RouteTable<U> {
        let static_routes: HashMap<Method, HashMap<String, Route<U>>> = self
            .static_routes
            .into_iter()
            .map(|(method, routes)| {
                let routes: HashMap<String, Route<U>> = routes
                    .into_iter()
                    .map(|(path, route)| (path, route.map(&mut f)))
                    .collect();
                (method, routes)
            })
            .collect();

        let dynamic_routes: HashMap<Method, Vec<Route<U>>> = self
            .dynamic_routes
            .into_iter()
            .map(|(method, routes)| {
                let routes: Vec<Route<U>> = routes.into_iter().map(|route| route.map(&mut f)).collect();
                (method, routes)
            })
            .collect();

        RouteTable {
            static_routes,
            dynamic_routes,
            static_methods: self.static_methods,
            known_paths: self.known_paths,
        }
    }
}
