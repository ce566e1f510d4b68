//! Route lookup shared by routing and controller modules.
//!
//! # Responsibilities
//! - Store (verb, matcher, handler) entries
//! - Reject duplicate routes at registration time
//! - Look up the handlers for a request, or report an explicit miss
//!
//! # Design Decisions
//! - Sealed before the server starts; read-only afterwards
//! - Entries are ordered by pattern specificity, then registration order
//! - A path that matches under another verb is `MethodNotAllowed`, not `NotFound`

use std::collections::HashSet;
use std::sync::Arc;

use axum::http::Method;

use crate::error::ConfigurationError;
use crate::routing::{HttpVerb, RouteMatch, RouteMatcher};

/// One registered route.
#[derive(Debug)]
pub struct RouteEntry<H> {
    pub verb: HttpVerb,
    pub matcher: Arc<RouteMatcher>,
    pub handler: H,
}

/// Outcome of looking up a request.
#[derive(Debug)]
pub enum Resolution<'a, H> {
    /// Candidates accepting the request, most specific first.
    Matched(Vec<(&'a RouteEntry<H>, RouteMatch)>),
    /// The path matched, but only under these verbs.
    MethodNotAllowed(Vec<HttpVerb>),
    NotFound,
}

/// Ordered route table.
#[derive(Debug)]
pub struct RouteResolver<H> {
    entries: Vec<RouteEntry<H>>,
    keys: HashSet<(HttpVerb, String)>,
    sealed: bool,
}

impl<H> RouteResolver<H> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            keys: HashSet::new(),
            sealed: false,
        }
    }

    /// Register a route. Fails on duplicates or after [`seal`](Self::seal).
    pub fn add(
        &mut self,
        verb: HttpVerb,
        matcher: Arc<RouteMatcher>,
        handler: H,
    ) -> Result<(), ConfigurationError> {
        if self.sealed {
            return Err(ConfigurationError::Locked);
        }
        if !self.keys.insert((verb, matcher.canonical())) {
            return Err(ConfigurationError::DuplicateRoute {
                verb: verb.to_string(),
                pattern: matcher.pattern().to_string(),
            });
        }
        self.entries.push(RouteEntry {
            verb,
            matcher,
            handler,
        });
        Ok(())
    }

    /// Sort entries by specificity and refuse further registrations.
    pub fn seal(&mut self) {
        if self.sealed {
            return;
        }
        // Stable sort keeps registration order among equally specific routes.
        self.entries.sort_by(|a, b| {
            a.matcher
                .cmp_specificity(&b.matcher)
                .then_with(|| (a.verb == HttpVerb::Any).cmp(&(b.verb == HttpVerb::Any)))
        });
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn entries(&self) -> &[RouteEntry<H>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the handlers for `method` and `path`.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_, H> {
        let mut matched = Vec::new();
        let mut allowed = Vec::new();

        for entry in &self.entries {
            let Some(route) = entry.matcher.try_match(path) else {
                continue;
            };
            if entry.verb.accepts(method) {
                matched.push((entry, route));
            } else if !allowed.contains(&entry.verb) {
                allowed.push(entry.verb);
            }
        }

        if !matched.is_empty() {
            Resolution::Matched(matched)
        } else if !allowed.is_empty() {
            Resolution::MethodNotAllowed(allowed)
        } else {
            Resolution::NotFound
        }
    }
}

impl<H> Default for RouteResolver<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(resolver: &mut RouteResolver<&'static str>, verb: HttpVerb, pattern: &str, name: &'static str) {
        let matcher = Arc::new(RouteMatcher::parse(pattern).unwrap());
        resolver.add(verb, matcher, name).unwrap();
    }

    fn first(resolution: Resolution<'_, &'static str>) -> Option<&'static str> {
        match resolution {
            Resolution::Matched(candidates) => candidates.first().map(|(e, _)| e.handler),
            _ => None,
        }
    }

    #[test]
    fn duplicate_routes_are_rejected() {
        let mut resolver = RouteResolver::new();
        add(&mut resolver, HttpVerb::Get, "/a/{x}", "one");
        let err = resolver
            .add(HttpVerb::Get, Arc::new(RouteMatcher::parse("/a/{y}").unwrap()), "two")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateRoute { .. }));

        // Same pattern under another verb is fine.
        add(&mut resolver, HttpVerb::Post, "/a/{x}", "three");
    }

    #[test]
    fn specific_routes_win_after_seal() {
        let mut resolver = RouteResolver::new();
        add(&mut resolver, HttpVerb::Get, "/users/{id}", "by-id");
        add(&mut resolver, HttpVerb::Get, "/users/me", "me");
        resolver.seal();

        assert_eq!(first(resolver.resolve(&Method::GET, "/users/me")), Some("me"));
        assert_eq!(first(resolver.resolve(&Method::GET, "/users/7")), Some("by-id"));
    }

    #[test]
    fn wrong_verb_is_method_not_allowed() {
        let mut resolver = RouteResolver::new();
        add(&mut resolver, HttpVerb::Post, "/items", "create");
        add(&mut resolver, HttpVerb::Delete, "/items", "clear");
        resolver.seal();

        match resolver.resolve(&Method::GET, "/items") {
            Resolution::MethodNotAllowed(verbs) => {
                assert_eq!(verbs, vec![HttpVerb::Post, HttpVerb::Delete]);
            }
            other => panic!("unexpected resolution: {other:?}"),
        }
        assert!(matches!(resolver.resolve(&Method::GET, "/nothing"), Resolution::NotFound));
    }

    #[test]
    fn sealed_resolver_refuses_routes() {
        let mut resolver: RouteResolver<&'static str> = RouteResolver::new();
        resolver.seal();
        let err = resolver
            .add(HttpVerb::Get, Arc::new(RouteMatcher::parse("/x").unwrap()), "x")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Locked));
    }
}
