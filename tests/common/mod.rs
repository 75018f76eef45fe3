//! Common test utilities shared across integration tests.

use harbormaster::ResourceType;
use harbormaster::testing::{FakeResource, FakeResourceProvider};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Poll `condition` every 10ms until it holds.
///
/// This is more reliable than fixed sleeps since execution time can vary.
///
/// # Panics
///
/// Panics if the timeout is reached before the condition holds.
pub async fn wait_until<F, Fut>(timeout: Duration, what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    loop {
        if condition().await {
            return;
        }
        if start.elapsed() > timeout {
            panic!("Timeout after {:?} waiting for {}", timeout, what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Build a provider of `resource_type` holding the given resources.
pub fn provider(
    resource_type: ResourceType,
    resources: &[(&str, FakeResource)],
) -> Arc<FakeResourceProvider> {
    let provider = FakeResourceProvider::new(resource_type);
    for (id, fake) in resources {
        provider.add(id, fake.clone());
    }
    Arc::new(provider)
}

/// Like [`provider`], with every update check taking `delay`.
pub fn slow_provider(
    resource_type: ResourceType,
    delay: Duration,
    resources: &[(&str, FakeResource)],
) -> Arc<FakeResourceProvider> {
    let provider = FakeResourceProvider::new(resource_type).with_delay(delay);
    for (id, fake) in resources {
        provider.add(id, fake.clone());
    }
    Arc::new(provider)
}
