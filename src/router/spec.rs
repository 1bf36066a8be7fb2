//! Endpoint descriptions shared by server registration and clients.

use std::fmt;
use std::marker::PhantomData;

use axum::http::Method;

use crate::route::{Route, RouteShape};

/// What a registered endpoint answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Json,
    Html,
    EventStream,
    None,
}

/// Free-form grouping for schema tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub comment: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: comment.into(),
        }
    }
}

/// Everything the router keeps about a registered endpoint, minus the closures.
#[derive(Debug, Clone)]
pub struct SpecInfo {
    pub method: Method,
    pub template: String,
    pub shape: RouteShape,
    pub reads_body: bool,
    pub returns: Returns,
    pub tags: Vec<Tag>,
}

/// A route/method pair that some router is expected to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declared {
    pub method: Method,
    pub template: String,
}

impl<P> From<&Route<P>> for Declared {
    /// Bare routes are pages, served on GET.
    fn from(route: &Route<P>) -> Self {
        Self {
            method: Method::GET,
            template: route.template().to_string(),
        }
    }
}

/// Result of a page handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    /// Markup placed inside `<html>`.
    Html(String),
    Redirect(String),
}

/// JSON API endpoint: params `P`, body codec `B`, response codec `R`.
pub struct ApiSpec<P, B, R> {
    pub method: Method,
    pub route: Route<P>,
    pub tags: Vec<Tag>,
    _codecs: PhantomData<fn() -> (B, R)>,
}

impl<P, B, R> ApiSpec<P, B, R> {
    pub fn new(method: Method, route: Route<P>) -> Self {
        Self {
            method,
            route,
            tags: Vec::new(),
            _codecs: PhantomData,
        }
    }

    pub fn tagged(mut self, name: impl Into<String>, comment: impl Into<String>) -> Self {
        self.tags.push(Tag::new(name, comment));
        self
    }

    pub fn declared(&self) -> Declared {
        Declared {
            method: self.method.clone(),
            template: self.route.template().to_string(),
        }
    }
}

impl<P, B, R> Clone for ApiSpec<P, B, R> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            route: self.route.clone(),
            tags: self.tags.clone(),
            _codecs: PhantomData,
        }
    }
}

impl<P, B, R> fmt::Debug for ApiSpec<P, B, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSpec")
            .field("method", &self.method)
            .field("route", &self.route.template())
            .finish_non_exhaustive()
    }
}

/// Server-sent event endpoint streaming batches of `I`.
pub struct SseSpec<P, I> {
    pub route: Route<P>,
    _items: PhantomData<fn() -> I>,
}

impl<P, I> SseSpec<P, I> {
    pub fn new(route: Route<P>) -> Self {
        Self {
            route,
            _items: PhantomData,
        }
    }

    pub fn declared(&self) -> Declared {
        Declared {
            method: Method::GET,
            template: self.route.template().to_string(),
        }
    }
}

impl<P, I> Clone for SseSpec<P, I> {
    fn clone(&self) -> Self {
        Self::new(self.route.clone())
    }
}

impl<P, I> fmt::Debug for SseSpec<P, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseSpec")
            .field("route", &self.route.template())
            .finish()
    }
}
