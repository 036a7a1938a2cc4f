use std::time::Duration;

use heimdall::{HeimdallError, Result, RetryConfig};

#[test]
fn test_error_display() {
    let err = HeimdallError::Api {
        status: 503,
        message: "overloaded".to_string(),
    };
    assert_eq!(err.to_string(), "API error (503): overloaded");
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(HeimdallError::EmptyResponse)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Codes
// ============================================================================

#[test]
fn codes() {
    assert_eq!(HeimdallError::Http("reset".into()).code(), "connection");
    assert_eq!(HeimdallError::Timeout.code(), "timeout");
    assert_eq!(
        HeimdallError::RateLimited {
            retry_after: None,
            message: String::new()
        }
        .code(),
        "rate_limit"
    );
    assert_eq!(
        HeimdallError::Api {
            status: 500,
            message: String::new()
        }
        .code(),
        "500"
    );
    assert_eq!(
        HeimdallError::CircuitOpen {
            retry_in: Duration::from_secs(1)
        }
        .code(),
        "circuit_open"
    );
}

// ============================================================================
// Pattern matching
// ============================================================================

#[test]
fn matches_by_code() {
    let err = HeimdallError::Api {
        status: 503,
        message: "unavailable".into(),
    };
    assert!(err.matches_any(&["503"]));
    assert!(!err.matches_any(&["500"]));
}

#[test]
fn matches_by_message_substring() {
    let err = HeimdallError::Api {
        status: 400,
        message: "upstream connection refused".into(),
    };
    assert!(err.matches_any(&["connection"]));
}

#[test]
fn empty_pattern_matches_nothing() {
    let err = HeimdallError::Http("boom".into());
    assert!(!err.matches_any(&[""]));
}

#[test]
fn breaker_and_deadline_never_match() {
    let open = HeimdallError::CircuitOpen {
        retry_in: Duration::from_secs(3),
    };
    assert!(!open.matches_any(&["circuit_open", "circuit", "open"]));

    let deadline = HeimdallError::DeadlineExceeded("waiting");
    assert!(!deadline.matches_any(&["deadline_exceeded", "waiting"]));
}

// ============================================================================
// Transient error classification
// ============================================================================

#[test]
fn transient_errors() {
    assert!(
        HeimdallError::RateLimited {
            retry_after: None,
            message: String::new()
        }
        .is_transient()
    );
    assert!(HeimdallError::Http("connection reset".into()).is_transient());
    assert!(HeimdallError::Timeout.is_transient());
    for status in [429, 500, 503] {
        assert!(
            HeimdallError::Api {
                status,
                message: String::new()
            }
            .is_transient(),
            "{status} should be transient"
        );
    }
}

#[test]
fn gateway_statuses_outside_default_patterns_are_permanent() {
    for status in [502, 504] {
        assert!(
            !HeimdallError::Api {
                status,
                message: String::new()
            }
            .is_transient(),
            "{status} is not in the default retry patterns"
        );
    }
}

#[test]
fn transient_agrees_with_default_retry_policy() {
    let policy = RetryConfig::default();
    let samples = [
        HeimdallError::Http("reset".into()),
        HeimdallError::Timeout,
        HeimdallError::RateLimited {
            retry_after: Some(Duration::from_secs(1)),
            message: "slow down".into(),
        },
        HeimdallError::CircuitOpen {
            retry_in: Duration::from_secs(1),
        },
        HeimdallError::DeadlineExceeded("retry"),
        HeimdallError::Json("eof".into()),
        HeimdallError::EmptyResponse,
        HeimdallError::Configuration("bad".into()),
    ];
    let statuses = [400, 401, 404, 429, 500, 502, 503, 504];
    let api = statuses.iter().map(|&status| HeimdallError::Api {
        status,
        message: String::new(),
    });

    for err in samples.into_iter().chain(api) {
        assert_eq!(
            err.is_transient(),
            policy.is_retryable(&err),
            "classification differs for {err:?}"
        );
    }
}

#[test]
fn permanent_errors() {
    assert!(
        !HeimdallError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient()
    );
    assert!(!HeimdallError::EmptyResponse.is_transient());
    assert!(!HeimdallError::Json("eof".into()).is_transient());
    assert!(
        !HeimdallError::CircuitOpen {
            retry_in: Duration::ZERO
        }
        .is_transient()
    );
}

#[test]
fn retry_after_hint() {
    let err = HeimdallError::RateLimited {
        retry_after: Some(Duration::from_secs(7)),
        message: String::new(),
    };
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
    assert_eq!(HeimdallError::Timeout.retry_after(), None);
}

#[test]
fn json_errors_convert() {
    let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
    let err: HeimdallError = parse.unwrap_err().into();
    assert!(matches!(err, HeimdallError::Json(_)));
}
