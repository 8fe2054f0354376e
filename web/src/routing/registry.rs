//! Route collection and discovery.
//!
//! Routes are registered directly, through a factory function, or by
//! walking a [`RouteNamespace`]: a tree of named groups, each holding route
//! factories. Applications mirror their module layout in the tree (one
//! namespace per module, one factory per route function) and register the
//! root once.
//!
//! Discovery skips:
//!
//! - namespaces whose name starts with `.` or `_`, or is in the ignore list
//! - factories whose name starts with `_`
//!
//! A factory failing during discovery is logged and skipped; the walk goes
//! on.

use super::Route;
use std::fmt;

/// Namespace names never walked by default.
pub const DEFAULT_IGNORE_LIST: &[&str] = &["__pycache__", ".pytest_cache", ".git", "target", "venv", "env"];

/// Function building one route.
pub type RouteFactoryFn = fn() -> anyhow::Result<Route>;

/// A named route-producing function.
#[derive(Clone, Copy)]
pub struct RouteFactory {
    name: &'static str,
    build: RouteFactoryFn,
}

impl RouteFactory {
    /// Factory `name` calling `build`.
    #[must_use]
    pub const fn new(name: &'static str, build: RouteFactoryFn) -> Self {
        Self { name, build }
    }

    /// Name, used for discovery filtering and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Build the route.
    ///
    /// # Errors
    ///
    /// Whatever the factory function returns.
    pub fn build(&self) -> anyhow::Result<Route> {
        (self.build)()
    }
}

impl fmt::Debug for RouteFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RouteFactory").field(&self.name).finish()
    }
}

/// A named group of route factories and child groups.
///
/// # Example
///
/// ```
/// use cqea_web::routing::{RouteNamespace, RoutesRegistry};
/// # use cqea_web::routing::Route;
/// # fn list_users() -> anyhow::Result<Route> { anyhow::bail!("not needed") }
///
/// let api = RouteNamespace::new("api")
///     .child(RouteNamespace::new("users").factory("list_users", list_users))
///     .child(RouteNamespace::new("__pycache__"));
///
/// let mut registry = RoutesRegistry::new();
/// assert_eq!(registry.register_namespace(&api), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteNamespace {
    name: String,
    factories: Vec<RouteFactory>,
    children: Vec<RouteNamespace>,
}

impl RouteNamespace {
    /// Empty namespace `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a route factory.
    #[must_use]
    pub fn factory(mut self, name: &'static str, build: RouteFactoryFn) -> Self {
        self.factories.push(RouteFactory::new(name, build));
        self
    }

    /// Add a child namespace.
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Route factories, in declaration order.
    #[must_use]
    pub fn factories(&self) -> &[RouteFactory] {
        &self.factories
    }

    /// Child namespaces, in declaration order.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }
}

/// Ordered collection of routes.
#[derive(Debug, Clone)]
pub struct RoutesRegistry {
    routes: Vec<Route>,
    ignore_list: Vec<String>,
}

impl Default for RoutesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutesRegistry {
    /// Empty registry using [`DEFAULT_IGNORE_LIST`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            ignore_list: DEFAULT_IGNORE_LIST.iter().map(|name| (*name).to_string()).collect(),
        }
    }

    /// Replace the ignore list.
    #[must_use]
    pub fn with_ignore_list<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_list = names.into_iter().map(Into::into).collect();
        self
    }

    /// Append `route`.
    pub fn register_route(&mut self, route: Route) {
        tracing::debug!(path = route.path(), methods = ?route.methods(), "Registered route");
        self.routes.push(route);
    }

    /// Build a route with `factory` and append it.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error; nothing is registered then.
    pub fn register_route_function<F>(&mut self, factory: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> anyhow::Result<Route>,
    {
        self.register_route(factory()?);
        Ok(())
    }

    /// Walk `namespace` and register every route its factories build.
    ///
    /// The root itself is always walked. Returns the number of routes
    /// registered.
    pub fn register_namespace(&mut self, namespace: &RouteNamespace) -> usize {
        self.walk(namespace, namespace.name())
    }

    fn walk(&mut self, namespace: &RouteNamespace, qualified: &str) -> usize {
        let mut registered = 0;

        for factory in namespace.factories() {
            if factory.name().starts_with('_') {
                continue;
            }
            match factory.build() {
                Ok(route) => {
                    self.register_route(route);
                    registered += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        factory = %format!("{qualified}.{}", factory.name()),
                        error = %e,
                        "Could not build route"
                    );
                }
            }
        }

        for child in namespace.children() {
            if self.is_skipped(child.name()) {
                tracing::trace!(namespace = child.name(), "Skipping namespace");
                continue;
            }
            registered += self.walk(child, &format!("{qualified}.{}", child.name()));
        }

        registered
    }

    fn is_skipped(&self, name: &str) -> bool {
        name.starts_with('.') || name.starts_with('_') || self.ignore_list.iter().any(|ignored| ignored == name)
    }

    /// Registered routes, in registration order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Iterate over registered routes.
    pub fn iter(&self) -> std::slice::Iter<'_, Route> {
        self.routes.iter()
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<'a> IntoIterator for &'a RoutesRegistry {
    type Item = &'a Route;
    type IntoIter = std::slice::Iter<'a, Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.iter()
    }
}

impl IntoIterator for RoutesRegistry {
    type Item = Route;
    type IntoIter = std::vec::IntoIter<Route>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.into_iter()
    }
}
