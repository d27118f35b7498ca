use std::sync::Arc;
use std::time::Duration;

use domain_pricing::{
    BillingModel, CircuitBreakerConfig, CircuitState, InMemoryCatalog, OperatingSystem,
    PricingConfig, PricingError, PricingService, RetryPolicy,
};

const CATALOG: &str = include_str!("fixtures/catalog.json");

fn service(catalog: Arc<InMemoryCatalog>) -> PricingService {
    let config = PricingConfig::default()
        .with_retry(RetryPolicy::new().with_max_attempts(1))
        .with_breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(5)
                .with_recovery_timeout(Duration::from_secs(60)),
        );
    PricingService::build(&config, "fixture", catalog, None)
}

async fn resolve(service: &PricingService) -> Result<f64, PricingError> {
    service
        .resolve_instance_price("m5.large", "us-east-1", OperatingSystem::Linux, BillingModel::OnDemand)
        .await
        .map(|quote| quote.hourly_rate())
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_then_recovers_through_half_open() {
    let catalog = Arc::new(InMemoryCatalog::from_json(CATALOG).unwrap());
    let service = service(catalog.clone());
    catalog.set_outage(true);

    for _ in 0..5 {
        assert!(matches!(
            resolve(&service).await,
            Err(PricingError::TransientUpstream(_))
        ));
    }
    assert_eq!(service.circuit_state(), CircuitState::Open);
    assert_eq!(catalog.calls(), 5);

    // t=30s: rejected without an upstream call
    tokio::time::advance(Duration::from_secs(30)).await;
    match resolve(&service).await {
        Err(PricingError::CircuitOpen { retry_in, .. }) => {
            assert_eq!(retry_in, Duration::from_secs(30));
        }
        other => panic!("expected open circuit, got {other:?}"),
    }
    assert_eq!(catalog.calls(), 5);

    // t=61s: the trial call goes through and closes the breaker
    catalog.set_outage(false);
    tokio::time::advance(Duration::from_secs(31)).await;
    assert!((resolve(&service).await.unwrap() - 0.096).abs() < 1e-12);
    assert_eq!(service.circuit_state(), CircuitState::Closed);
    assert_eq!(catalog.calls(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_failed_trial_reopens() {
    let catalog = Arc::new(InMemoryCatalog::from_json(CATALOG).unwrap());
    let service = service(catalog.clone());
    catalog.set_outage(true);

    for _ in 0..5 {
        let _ = resolve(&service).await;
    }
    tokio::time::advance(Duration::from_secs(61)).await;

    assert!(matches!(
        resolve(&service).await,
        Err(PricingError::TransientUpstream(_))
    ));
    assert_eq!(service.circuit_state(), CircuitState::Open);

    // The recovery timer restarted at the failed trial
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(matches!(
        resolve(&service).await,
        Err(PricingError::CircuitOpen { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_operator_reset_closes_breaker() {
    let catalog = Arc::new(InMemoryCatalog::from_json(CATALOG).unwrap());
    let service = service(catalog.clone());
    catalog.set_outage(true);
    for _ in 0..5 {
        let _ = resolve(&service).await;
    }
    assert_eq!(service.circuit_state(), CircuitState::Open);

    catalog.set_outage(false);
    service.reset_circuit_breaker();
    assert_eq!(service.circuit_state(), CircuitState::Closed);
    assert!(resolve(&service).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_not_found_does_not_trip_breaker() {
    let catalog = Arc::new(InMemoryCatalog::from_json(CATALOG).unwrap());
    let service = service(catalog);

    for _ in 0..10 {
        let err = service
            .resolve_instance_price("z9.huge", "us-east-1", OperatingSystem::Linux, BillingModel::OnDemand)
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::NotFound(_)));
    }
    assert_eq!(service.circuit_state(), CircuitState::Closed);
}
