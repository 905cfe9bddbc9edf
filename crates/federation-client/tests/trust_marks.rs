//! Trust mark validation against anchor policy

mod common;

use serde_json::json;

use common::*;
use federation_client::{TrustMarkValidationResult, TrustMarkValidator};
use federation_core::testing::{TestEntity, EXPIRES_AT, ISSUED_AT};
use federation_core::EntityConfiguration;

const MARK_ID: &str = "https://registry.example/certified";
const LEAF_ID: &str = "https://leaf.example";
const ISSUER_ID: &str = "https://issuer.example";
const OWNER_ID: &str = "https://owner.example";

// =============================================================================
// Helpers
// =============================================================================

struct Setup {
    fetcher: std::sync::Arc<InMemoryFetcher>,
    issuer: TestEntity,
    owner: TestEntity,
    ta: TestEntity,
}

impl Setup {
    fn new() -> Self {
        let fetcher = InMemoryFetcher::new();
        let issuer = TestEntity::new(ISSUER_ID);
        let owner = TestEntity::new(OWNER_ID);
        let ta = TestEntity::new("https://ta.example");
        fetcher.publish_configuration(&issuer, &["https://ta.example"], false);

        Self {
            fetcher,
            issuer,
            owner,
            ta,
        }
    }

    fn validator(&self) -> TrustMarkValidator {
        TrustMarkValidator::new(self.fetcher.clone())
    }

    /// Anchor listing `issuers` for the mark
    fn anchor_with_issuers(&self, issuers: &[&str]) -> EntityConfiguration {
        serde_json::from_value(
            self.ta
                .entity_configuration(ISSUED_AT, EXPIRES_AT)
                .claim("trust_mark_issuers", json!({ MARK_ID: issuers }))
                .build(),
        )
        .unwrap()
    }

    /// Anchor delegating the mark to `owner`
    fn anchor_with_owner(&self) -> EntityConfiguration {
        serde_json::from_value(
            self.ta
                .entity_configuration(ISSUED_AT, EXPIRES_AT)
                .claim(
                    "trust_mark_owners",
                    json!({ MARK_ID: { "sub": OWNER_ID, "jwks": self.owner.jwks() } }),
                )
                .claim("trust_mark_issuers", json!({ MARK_ID: [ISSUER_ID] }))
                .build(),
        )
        .unwrap()
    }

    fn mark(&self) -> String {
        self.issuer.trust_mark(MARK_ID, LEAF_ID, EXPIRES_AT).sign()
    }

    fn delegation(&self, iss: &str) -> String {
        self.owner.sign(&json!({
            "iss": iss,
            "sub": ISSUER_ID,
            "id": MARK_ID,
            "iat": ISSUED_AT,
        }))
    }
}

// =============================================================================
// Issuer policy
// =============================================================================

#[tokio::test]
async fn test_listed_issuer_accepted() {
    let setup = Setup::new();
    let result = setup
        .validator()
        .validate_trust_mark(&setup.mark(), &setup.anchor_with_issuers(&[ISSUER_ID]), Some(INSIDE_VALIDITY))
        .await;

    assert_eq!(result, TrustMarkValidationResult::valid());
}

#[tokio::test]
async fn test_unlisted_issuer_rejected() {
    let setup = Setup::new();
    let result = setup
        .validator()
        .validate_trust_mark(
            &setup.mark(),
            &setup.anchor_with_issuers(&["https://someone-else.example"]),
            Some(INSIDE_VALIDITY),
        )
        .await;

    assert!(!result.is_valid);
    assert!(result.error.unwrap().contains("not authorized"));
}

#[tokio::test]
async fn test_unknown_mark_rejected() {
    let setup = Setup::new();
    let anchor: EntityConfiguration = serde_json::from_value(
        setup
            .ta
            .entity_configuration(ISSUED_AT, EXPIRES_AT)
            .build(),
    )
    .unwrap();

    let result = setup
        .validator()
        .validate_trust_mark(&setup.mark(), &anchor, Some(INSIDE_VALIDITY))
        .await;

    assert!(result.error.unwrap().contains("not recognized"));
}

// =============================================================================
// Token checks
// =============================================================================

#[tokio::test]
async fn test_expired_mark_rejected() {
    let setup = Setup::new();
    let result = setup
        .validator()
        .validate_trust_mark(&setup.mark(), &setup.anchor_with_issuers(&[ISSUER_ID]), Some(EXPIRES_AT))
        .await;

    assert_eq!(result, TrustMarkValidationResult::invalid("Trust mark has expired"));
}

#[tokio::test]
async fn test_mark_without_exp_does_not_expire() {
    let setup = Setup::new();
    let mark = setup
        .issuer
        .trust_mark(MARK_ID, LEAF_ID, EXPIRES_AT)
        .without("exp")
        .sign();

    let result = setup
        .validator()
        .validate_trust_mark(&mark, &setup.anchor_with_issuers(&[ISSUER_ID]), Some(AFTER_EXPIRY))
        .await;

    assert!(result.is_valid);
}

#[tokio::test]
async fn test_missing_id_rejected() {
    let setup = Setup::new();
    let mark = setup
        .issuer
        .trust_mark(MARK_ID, LEAF_ID, EXPIRES_AT)
        .without("id")
        .sign();

    let result = setup
        .validator()
        .validate_trust_mark(&mark, &setup.anchor_with_issuers(&[ISSUER_ID]), Some(INSIDE_VALIDITY))
        .await;

    assert_eq!(
        result.error.as_deref(),
        Some("Trust mark is missing required claims: id")
    );
}

#[tokio::test]
async fn test_forged_signature_rejected() {
    let setup = Setup::new();
    let forger = TestEntity::new(ISSUER_ID);
    let mark = setup
        .issuer
        .trust_mark(MARK_ID, LEAF_ID, EXPIRES_AT)
        .sign_with(&forger);

    let result = setup
        .validator()
        .validate_trust_mark(&mark, &setup.anchor_with_issuers(&[ISSUER_ID]), Some(INSIDE_VALIDITY))
        .await;

    assert_eq!(
        result.error.as_deref(),
        Some("Trust mark signature is invalid")
    );
}

#[tokio::test]
async fn test_unreachable_issuer_rejected() {
    let setup = Setup::new();
    setup.fetcher.make_unreachable(setup.issuer.configuration_url());

    let result = setup
        .validator()
        .validate_trust_mark(&setup.mark(), &setup.anchor_with_issuers(&[ISSUER_ID]), Some(INSIDE_VALIDITY))
        .await;

    assert!(result
        .error
        .unwrap()
        .starts_with("Failed to fetch trust mark issuer configuration"));
}

#[tokio::test]
async fn test_garbage_rejected() {
    let setup = Setup::new();
    let result = setup
        .validator()
        .validate_trust_mark("garbage", &setup.anchor_with_issuers(&[ISSUER_ID]), None)
        .await;

    assert!(!result.is_valid);
}

// =============================================================================
// Owner delegation
// =============================================================================

#[tokio::test]
async fn test_owner_delegation_accepted() {
    let setup = Setup::new();
    let mark = setup
        .issuer
        .trust_mark(MARK_ID, LEAF_ID, EXPIRES_AT)
        .claim("delegation", json!(setup.delegation(OWNER_ID)))
        .sign();

    let result = setup
        .validator()
        .validate_trust_mark(&mark, &setup.anchor_with_owner(), Some(INSIDE_VALIDITY))
        .await;

    assert_eq!(result, TrustMarkValidationResult::valid());
}

#[tokio::test]
async fn test_owned_mark_requires_delegation() {
    let setup = Setup::new();

    // Listed as an issuer too, but the owner path takes precedence
    let result = setup
        .validator()
        .validate_trust_mark(&setup.mark(), &setup.anchor_with_owner(), Some(INSIDE_VALIDITY))
        .await;

    assert!(result.error.unwrap().contains("requires a delegation"));
}

#[tokio::test]
async fn test_delegation_from_wrong_issuer_rejected() {
    let setup = Setup::new();
    let mark = setup
        .issuer
        .trust_mark(MARK_ID, LEAF_ID, EXPIRES_AT)
        .claim("delegation", json!(setup.delegation("https://not-the-owner.example")))
        .sign();

    let result = setup
        .validator()
        .validate_trust_mark(&mark, &setup.anchor_with_owner(), Some(INSIDE_VALIDITY))
        .await;

    assert_eq!(
        result.error.as_deref(),
        Some("Trust mark delegation was not issued by the owner")
    );
}

#[tokio::test]
async fn test_delegation_signed_by_stranger_rejected() {
    let setup = Setup::new();
    let stranger = TestEntity::new(OWNER_ID);
    let delegation = stranger.sign(&json!({"iss": OWNER_ID, "sub": ISSUER_ID, "id": MARK_ID}));
    let mark = setup
        .issuer
        .trust_mark(MARK_ID, LEAF_ID, EXPIRES_AT)
        .claim("delegation", json!(delegation))
        .sign();

    let result = setup
        .validator()
        .validate_trust_mark(&mark, &setup.anchor_with_owner(), Some(INSIDE_VALIDITY))
        .await;

    assert_eq!(
        result.error.as_deref(),
        Some("Trust mark delegation signature is invalid")
    );
}

// =============================================================================
// Attached marks
// =============================================================================

#[tokio::test]
async fn test_validate_attached_trust_marks() {
    let setup = Setup::new();
    let leaf = TestEntity::new(LEAF_ID);
    let other_id = "https://registry.example/other";

    let leaf_configuration: EntityConfiguration = serde_json::from_value(
        leaf.entity_configuration(ISSUED_AT, EXPIRES_AT)
            .claim(
                "trust_marks",
                json!([
                    {"id": MARK_ID, "trust_mark": setup.mark()},
                    // Listed under a different id than the mark carries
                    {"id": other_id, "trust_mark": setup.mark()},
                ]),
            )
            .build(),
    )
    .unwrap();

    let results = setup
        .validator()
        .validate_trust_marks(
            &leaf_configuration,
            &setup.anchor_with_issuers(&[ISSUER_ID]),
            Some(INSIDE_VALIDITY),
        )
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0], (MARK_ID.to_string(), TrustMarkValidationResult::valid()));
    assert_eq!(results[1].0, other_id);
    assert!(!results[1].1.is_valid);
}

#[tokio::test]
async fn test_attached_mark_issued_to_another_entity_rejected() {
    let setup = Setup::new();
    let thief = TestEntity::new("https://thief.example");
    let stolen = setup
        .issuer
        .trust_mark(MARK_ID, "https://victim.example", EXPIRES_AT)
        .sign();

    let thief_configuration: EntityConfiguration = serde_json::from_value(
        thief
            .entity_configuration(ISSUED_AT, EXPIRES_AT)
            .claim("trust_marks", json!([{"id": MARK_ID, "trust_mark": stolen}]))
            .build(),
    )
    .unwrap();

    let results = setup
        .validator()
        .validate_trust_marks(
            &thief_configuration,
            &setup.anchor_with_issuers(&[ISSUER_ID]),
            Some(INSIDE_VALIDITY),
        )
        .await;

    assert_eq!(
        results,
        vec![(
            MARK_ID.to_string(),
            TrustMarkValidationResult::invalid("Trust mark was not issued to 'https://thief.example'")
        )]
    );
}
