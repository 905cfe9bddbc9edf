//! Shared fixtures: an in-memory federation served through
//! [`StatementFetcher`]

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use federation_client::{ClientError, Result, StatementFetcher};
use federation_core::subordinate_statement_url;
use federation_core::testing::{TestEntity, EXPIRES_AT, ISSUED_AT};

pub const RP_ID: &str = "https://spid.wbss.it/Spid/oidc/rp/ipasv_lt";
pub const SA_ID: &str = "https://spid.wbss.it/Spid/oidc/sa";
pub const TA_ID: &str = "https://oidc.registry.servizicie.interno.gov.it";

pub const INSIDE_VALIDITY: i64 = 1_728_346_615;
pub const AFTER_EXPIRY: i64 = 1_928_346_615;

/// Serves published statements by URL and records every request
#[derive(Default)]
pub struct InMemoryFetcher {
    statements: Mutex<HashMap<String, String>>,
    unreachable: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl InMemoryFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, url: impl Into<String>, statement: impl Into<String>) {
        self.statements.lock().insert(url.into(), statement.into());
    }

    /// Make `url` fail at the transport level
    pub fn make_unreachable(&self, url: impl Into<String>) {
        self.unreachable.lock().insert(url.into());
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|u| *u == url).count()
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().len()
    }

    /// Publish `entity`'s configuration, listing `hints` as authorities
    ///
    /// Entities with `serves_fetch` advertise `{id}/fetch`.
    pub fn publish_configuration(&self, entity: &TestEntity, hints: &[&str], serves_fetch: bool) {
        let mut builder = entity.entity_configuration(ISSUED_AT, EXPIRES_AT);
        if !hints.is_empty() {
            builder = builder.authority_hints(hints);
        }
        if serves_fetch {
            builder = builder.fetch_endpoint(&fetch_endpoint(entity.entity_id()));
        }
        self.publish(entity.configuration_url(), builder.sign());
    }

    /// Publish the statement `authority` issues about `subject`
    pub fn publish_subordinate(&self, authority: &TestEntity, subject: &TestEntity) {
        self.publish_subordinate_raw(
            authority,
            subject.entity_id(),
            authority
                .subordinate_statement(subject, ISSUED_AT, EXPIRES_AT)
                .sign(),
        );
    }

    /// Publish an arbitrary statement where `authority` serves `subject_id`
    pub fn publish_subordinate_raw(&self, authority: &TestEntity, subject_id: &str, jwt: String) {
        let url = subordinate_statement_url(&fetch_endpoint(authority.entity_id()), subject_id)
            .expect("valid fetch endpoint");
        self.publish(url, jwt);
    }
}

#[async_trait]
impl StatementFetcher for InMemoryFetcher {
    async fn fetch_statement(&self, url: &str) -> Result<String> {
        self.requests.lock().push(url.to_string());

        if self.unreachable.lock().contains(url) {
            return Err(ClientError::HttpError(format!("connection refused: {}", url)));
        }
        self.statements
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| ClientError::UnexpectedStatus {
                status: 404,
                url: url.to_string(),
            })
    }
}

pub fn fetch_endpoint(entity_id: &str) -> String {
    format!("{}/fetch", entity_id)
}

/// `rp -> sa -> ta`, all statements published
pub struct SpidFederation {
    pub fetcher: Arc<InMemoryFetcher>,
    pub rp: TestEntity,
    pub sa: TestEntity,
    pub ta: TestEntity,
}

impl SpidFederation {
    pub fn new() -> Self {
        let fetcher = InMemoryFetcher::new();
        let rp = TestEntity::new(RP_ID);
        let sa = TestEntity::new(SA_ID);
        let ta = TestEntity::new(TA_ID);

        fetcher.publish_configuration(&rp, &[SA_ID], false);
        fetcher.publish_configuration(&sa, &[TA_ID], true);
        fetcher.publish_configuration(&ta, &[], true);
        fetcher.publish_subordinate(&sa, &rp);
        fetcher.publish_subordinate(&ta, &sa);

        Self {
            fetcher,
            rp,
            sa,
            ta,
        }
    }

    pub fn anchors() -> Vec<String> {
        vec![TA_ID.to_string()]
    }
}
