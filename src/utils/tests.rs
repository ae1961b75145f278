use super::error::{BrokerError, PubSubError, ResourceKind, TeardownFailure};
use super::logging;
use std::time::Duration;

#[test]
fn logging_init_accepts_levels() {
    // Should not panic
    logging::init("info");
    logging::init("debug");
    logging::init("warning");
    logging::init("nonsense");
}

#[test]
fn already_exists_is_recognised() {
    let err = BrokerError::AlreadyExists {
        kind: ResourceKind::Topic,
        name: "orders".to_string(),
    };
    assert!(err.is_already_exists());
    assert_eq!(err.to_string(), "topic already exists: orders");

    let err = BrokerError::Unavailable("down".to_string());
    assert!(!err.is_already_exists());
}

#[test]
fn resolution_error_names_the_resource() {
    let err = PubSubError::TopicResolution {
        topic: "orders".to_string(),
        source: BrokerError::DeadlineExceeded(Duration::from_secs(3)),
    };
    assert_eq!(
        err.to_string(),
        "failed to resolve topic orders: deadline exceeded after 3s"
    );
}

#[test]
fn teardown_error_counts_failures() {
    let err = PubSubError::Teardown {
        failures: vec![
            TeardownFailure::DeleteSubscription {
                subscription: "orders.a".to_string(),
                source: BrokerError::Closed,
            },
            TeardownFailure::CloseSession(BrokerError::Closed),
        ],
    };
    assert_eq!(err.to_string(), "teardown finished with 2 failure(s)");
}
