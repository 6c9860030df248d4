//! External profile enrichment.
//!
//! When a turn's input looks like an entity reference (a person's name),
//! the plan engine queries a profile-lookup capability for several
//! independent data views and folds whichever ones come back into the
//! session's known context. Partial availability is the expected shape
//! of this data source: an absent view is a normal outcome, recorded as
//! simply missing, and a transport failure on one view is treated the
//! same way so the dialogue proceeds on whatever is already known.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::providers::{check_http_response, ProviderError};
use crate::types::BoundedPlanState;

/// The independently queryable profile views.
pub const PROFILE_VIEWS: &[&str] = &["emr", "system", "health_plan"];

/// Profile-lookup capability.
///
/// `Ok(None)` is the 404-equivalent: the view does not exist for this
/// entity. Callers must treat it identically to a transport failure —
/// the view is absent either way.
#[async_trait]
pub trait ProfileClient: Send + Sync {
    /// Fetch one data view for an entity reference.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport failure; absence of the
    /// view is `Ok(None)`, not an error.
    async fn fetch_view(
        &self,
        entity_ref: &str,
        view: &str,
    ) -> Result<Option<serde_json::Value>, ProviderError>;
}

/// Map-backed profile client for tests and fixtures.
#[derive(Debug, Default)]
pub struct StaticProfileClient {
    views: HashMap<(String, String), serde_json::Value>,
}

impl StaticProfileClient {
    /// An empty client where every view is absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view for an entity reference.
    #[must_use]
    pub fn with_view(
        mut self,
        entity_ref: impl Into<String>,
        view: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        self.views.insert((entity_ref.into(), view.into()), data);
        self
    }
}

#[async_trait]
impl ProfileClient for StaticProfileClient {
    async fn fetch_view(
        &self,
        entity_ref: &str,
        view: &str,
    ) -> Result<Option<serde_json::Value>, ProviderError> {
        Ok(self
            .views
            .get(&(entity_ref.to_owned(), view.to_owned()))
            .cloned())
    }
}

/// Profile client over an HTTP lookup service.
///
/// `GET {base_url}/profile/view?entity=<ref>&view=<name>`, JSON body on
/// success. A 404 is the view-absent outcome, not an error.
#[derive(Debug, Clone)]
pub struct HttpProfileClient {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpProfileClient {
    /// Create a client for `base_url` with a bounded per-view timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

fn decode_view_body(body: &str) -> Result<serde_json::Value, ProviderError> {
    serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))
}

#[async_trait]
impl ProfileClient for HttpProfileClient {
    async fn fetch_view(
        &self,
        entity_ref: &str,
        view: &str,
    ) -> Result<Option<serde_json::Value>, ProviderError> {
        let request = self
            .client
            .get(format!("{}/profile/view", self.base_url))
            .query(&[("entity", entity_ref), ("view", view)]);

        let deadline = self.timeout;
        let exchange = async {
            let response = request.send().await?;
            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let body = check_http_response(response).await?;
            decode_view_body(&body).map(Some)
        };
        tokio::time::timeout(deadline, exchange)
            .await
            .map_err(|_| ProviderError::Timeout {
                seconds: deadline.as_secs(),
            })?
    }
}

/// Fetch every view for an entity, keeping only the ones that resolve.
///
/// Absent views and per-view transport failures both simply leave the
/// view out of the result.
pub async fn gather_views(
    client: &dyn ProfileClient,
    entity_ref: &str,
    views: &[&str],
) -> BTreeMap<String, serde_json::Value> {
    let mut gathered = BTreeMap::new();
    for view in views {
        match client.fetch_view(entity_ref, view).await {
            Ok(Some(data)) => {
                gathered.insert((*view).to_owned(), data);
            }
            Ok(None) => {
                debug!(view, "profile view absent");
            }
            Err(error) => {
                warn!(view, %error, "profile view fetch failed; continuing without it");
            }
        }
    }
    gathered
}

/// Fold gathered views into the plan state's known context.
///
/// Each view's top-level object keys become resolved fields. Fields the
/// session already knows are kept; enrichment never overwrites an
/// explicit answer.
pub fn merge_views(state: &mut BoundedPlanState, views: &BTreeMap<String, serde_json::Value>) {
    for data in views.values() {
        let Some(object) = data.as_object() else {
            continue;
        };
        for (field, value) in object {
            if !state.known_context.contains_key(field) {
                state.record_field(field, value.clone());
            }
        }
    }
}

/// Whether raw input plausibly names an entity (a person's name).
///
/// Short sequence of capitalized alphabetic words, nothing else.
pub fn looks_like_entity_reference(text: &str) -> bool {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || words.len() > 4 {
        return false;
    }
    words.iter().all(|word| {
        let mut chars = word.chars();
        chars.next().is_some_and(|c| c.is_uppercase())
            && chars.all(|c| c.is_alphabetic() || c == '\'' || c == '-')
    })
}
