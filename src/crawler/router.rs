//! Label-based dispatch of fetched pages to site handlers
//!
//! A site declares the subset of [`Label`]s it uses and registers exactly one
//! handler per declared label. The table is checked when it is built, so a
//! missing or stray handler is a configuration error before any fetch happens.

use crate::crawler::extract::{BodyFormat, Document, ExtractError, Extraction};
use crate::crawler::request::{Label, Request};
use crate::ConfigError;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// A site handler for one label
pub type Handler =
    Box<dyn Fn(&Document, &Request) -> Result<Extraction, ExtractError> + Send + Sync>;

struct Route {
    format: BodyFormat,
    handler: Handler,
}

/// Closed mapping from label to handler
pub struct Router {
    site: String,
    routes: HashMap<Label, Route>,
}

impl Router {
    /// Starts a routing table for `site` serving exactly `labels`
    pub fn builder(site: impl Into<String>, labels: &[Label]) -> RouterBuilder {
        RouterBuilder {
            site: site.into(),
            declared: labels.iter().copied().collect(),
            routes: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    /// Returns true if a handler exists for `label`
    pub fn handles(&self, label: Label) -> bool {
        self.routes.contains_key(&label)
    }

    /// Body format the handler for `label` reads
    pub fn format(&self, label: Label) -> Option<BodyFormat> {
        self.routes.get(&label).map(|route| route.format)
    }

    /// Labels this router serves, in declaration order
    pub fn labels(&self) -> Vec<Label> {
        Label::ALL
            .into_iter()
            .filter(|label| self.handles(*label))
            .collect()
    }

    /// Parses `body` and runs the handler for the request's label
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Extraction))` - The handler ran
    /// * `Ok(None)` - No handler for this label; callers treat this as fatal
    /// * `Err(ExtractError)` - Parsing or extraction failed for this page only
    pub fn dispatch(
        &self,
        body: &[u8],
        request: &Request,
    ) -> Result<Option<Extraction>, ExtractError> {
        let Some(route) = self.routes.get(&request.label()) else {
            return Ok(None);
        };

        let document = Document::parse(body, route.format)?;
        (route.handler)(&document, request).map(Some)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("site", &self.site)
            .field("labels", &self.labels())
            .finish()
    }
}

/// Collects routes and checks them against the declared label set
pub struct RouterBuilder {
    site: String,
    declared: BTreeSet<Label>,
    routes: HashMap<Label, Route>,
    duplicates: Vec<Label>,
}

impl RouterBuilder {
    /// Registers a handler reading HTML bodies
    pub fn html<F>(self, label: Label, handler: F) -> Self
    where
        F: Fn(&Document, &Request) -> Result<Extraction, ExtractError> + Send + Sync + 'static,
    {
        self.route(label, BodyFormat::Html, handler)
    }

    /// Registers a handler reading JSON bodies
    pub fn json<F>(self, label: Label, handler: F) -> Self
    where
        F: Fn(&Document, &Request) -> Result<Extraction, ExtractError> + Send + Sync + 'static,
    {
        self.route(label, BodyFormat::Json, handler)
    }

    pub fn route<F>(mut self, label: Label, format: BodyFormat, handler: F) -> Self
    where
        F: Fn(&Document, &Request) -> Result<Extraction, ExtractError> + Send + Sync + 'static,
    {
        let previous = self.routes.insert(
            label,
            Route {
                format,
                handler: Box::new(handler),
            },
        );
        if previous.is_some() {
            self.duplicates.push(label);
        }
        self
    }

    /// Finishes the table
    ///
    /// # Returns
    ///
    /// * `Ok(Router)` - Every declared label has exactly one handler
    /// * `Err(ConfigError::Routing)` - A label is unhandled, handled twice, or undeclared
    pub fn build(self) -> Result<Router, ConfigError> {
        if self.declared.is_empty() {
            return Err(ConfigError::Routing(format!(
                "site '{}' declares no labels",
                self.site
            )));
        }

        if let Some(label) = self.duplicates.first() {
            return Err(ConfigError::Routing(format!(
                "site '{}' registers label '{}' more than once",
                self.site, label
            )));
        }

        if let Some(label) = self.declared.iter().find(|l| !self.routes.contains_key(*l)) {
            return Err(ConfigError::Routing(format!(
                "site '{}' has no handler for label '{}'",
                self.site, label
            )));
        }

        if let Some(label) = self.routes.keys().find(|l| !self.declared.contains(*l)) {
            return Err(ConfigError::Routing(format!(
                "site '{}' registers a handler for undeclared label '{}'",
                self.site, label
            )));
        }

        Ok(Router {
            site: self.site,
            routes: self.routes,
        })
    }
}
