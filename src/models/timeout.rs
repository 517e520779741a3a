use async_trait::async_trait;
use std::time::Duration;

use crate::cache::{GenerationError, Generator};

/// Bounds how long a generator may run before it counts as failed
pub struct TimeoutGenerator<G> {
    inner: G,
    timeout: Duration,
}

impl<G> TimeoutGenerator<G> {
    pub fn new(inner: G, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl<I, V, G> Generator<I, V> for TimeoutGenerator<G>
where
    I: Send + Sync,
    V: Send,
    G: Generator<I, V>,
{
    async fn generate(&self, items: &[I]) -> anyhow::Result<V> {
        match tokio::time::timeout(self.timeout, self.inner.generate(items)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::TimedOut(self.timeout).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Sleepy(Duration);

    #[async_trait]
    impl Generator<u32, String> for Sleepy {
        async fn generate(&self, items: &[u32]) -> anyhow::Result<String> {
            tokio::time::sleep(self.0).await;
            Ok(format!("{} items", items.len()))
        }
    }

    #[tokio::test]
    async fn test_fast_generator_passes_through() {
        let generator = TimeoutGenerator::new(Sleepy(Duration::ZERO), Duration::from_secs(5));
        let items = [1u32, 2];
        let value = Generator::<u32, String>::generate(&generator, &items[..])
            .await
            .unwrap();
        assert_eq!(value, "2 items");
    }

    #[tokio::test]
    async fn test_slow_generator_times_out() {
        let generator =
            TimeoutGenerator::new(Sleepy(Duration::from_secs(30)), Duration::from_millis(20));
        let items = [1u32];
        let err = Generator::<u32, String>::generate(&generator, &items[..])
            .await
            .unwrap_err();
        assert_eq!(
            GenerationError::from(err),
            GenerationError::TimedOut(Duration::from_millis(20))
        );
    }
}
