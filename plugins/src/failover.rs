//! Remote-primary, local-fallback classification. The first remote error
//! demotes the pair to fallback-only for the rest of the session; a
//! background probe keeps trying the primary and promotes back once it
//! answers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use stagehand_core::api::{ClassifyBackend, ClassifyRequest, ClassifyResponse};
use stagehand_core::error::BackendError;

use async_trait::async_trait;

const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

pub struct FailoverClassifier {
    primary: Arc<dyn ClassifyBackend>,
    fallback: Arc<dyn ClassifyBackend>,
    fallback_mode: Arc<AtomicBool>,
    probing: Arc<AtomicBool>,
    reconnect_interval: Duration,
}

impl FailoverClassifier {
    pub fn new(primary: Arc<dyn ClassifyBackend>, fallback: Arc<dyn ClassifyBackend>) -> Self {
        Self {
            primary,
            fallback,
            fallback_mode: Arc::new(AtomicBool::new(false)),
            probing: Arc::new(AtomicBool::new(false)),
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    pub fn in_fallback_mode(&self) -> bool {
        self.fallback_mode.load(Ordering::SeqCst)
    }

    fn demote(&self) {
        if self.fallback_mode.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!("primary classifier failed; demoting to fallback for this session");
        self.spawn_probe();
    }

    /// At most one probe loop at a time; it exits on promotion.
    fn spawn_probe(&self) {
        if self.probing.swap(true, Ordering::SeqCst) {
            return;
        }
        let primary = self.primary.clone();
        let fallback_mode = self.fallback_mode.clone();
        let probing = self.probing.clone();
        let interval = self.reconnect_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match primary.reconnect().await {
                    Ok(()) => {
                        info!("primary classifier reachable again; promoting");
                        fallback_mode.store(false, Ordering::SeqCst);
                        probing.store(false, Ordering::SeqCst);
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "primary classifier still unreachable");
                    }
                }
            }
        });
    }
}

#[async_trait]
impl ClassifyBackend for FailoverClassifier {
    async fn classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse, BackendError> {
        if !self.in_fallback_mode() {
            match self.primary.classify(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(error = %e, "primary classification failed");
                    self.demote();
                }
            }
        }
        self.fallback.classify(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use pretty_assertions::assert_eq;

    use super::*;

    struct Primary {
        up: AtomicBool,
        classify_calls: AtomicUsize,
        reconnect_calls: AtomicUsize,
    }

    impl Primary {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(Self {
                up: AtomicBool::new(up),
                classify_calls: AtomicUsize::new(0),
                reconnect_calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ClassifyBackend for Primary {
        async fn classify(
            &self,
            _request: ClassifyRequest,
        ) -> Result<ClassifyResponse, BackendError> {
            self.classify_calls.fetch_add(1, Ordering::SeqCst);
            if self.up.load(Ordering::SeqCst) {
                Ok(ClassifyResponse {
                    labels: vec!["remote".into()],
                    scores: vec![1.0],
                })
            } else {
                Err(BackendError::Unavailable("down".into()))
            }
        }

        async fn reconnect(&self) -> Result<(), BackendError> {
            self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
            if self.up.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(BackendError::Unavailable("down".into()))
            }
        }
    }

    struct Fallback {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClassifyBackend for Fallback {
        async fn classify(
            &self,
            _request: ClassifyRequest,
        ) -> Result<ClassifyResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ClassifyResponse {
                labels: vec!["local".into()],
                scores: vec![0.5],
            })
        }
    }

    fn request() -> ClassifyRequest {
        ClassifyRequest {
            sequence: "text".into(),
            candidate_labels: vec!["a".into()],
            hypothesis_template: "{}".into(),
            multi_label: true,
        }
    }

    #[tokio::test]
    async fn healthy_primary_is_used() {
        let primary = Primary::new(true);
        let fallback = Arc::new(Fallback {
            calls: AtomicUsize::new(0),
        });
        let failover = FailoverClassifier::new(primary.clone(), fallback.clone());

        let response = failover.classify(request()).await.unwrap();
        assert_eq!(response.labels, vec!["remote"]);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_demotes_for_subsequent_calls() {
        let primary = Primary::new(false);
        let fallback = Arc::new(Fallback {
            calls: AtomicUsize::new(0),
        });
        let failover = FailoverClassifier::new(primary.clone(), fallback.clone())
            .with_reconnect_interval(Duration::from_secs(3600));

        let first = failover.classify(request()).await.unwrap();
        assert_eq!(first.labels, vec!["local"]);
        assert!(failover.in_fallback_mode());

        let second = failover.classify(request()).await.unwrap();
        assert_eq!(second.labels, vec!["local"]);
        // The primary saw only the first call; the demotion is sticky.
        assert_eq!(primary.classify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn successful_probe_promotes_back() {
        let primary = Primary::new(false);
        let fallback = Arc::new(Fallback {
            calls: AtomicUsize::new(0),
        });
        let failover = FailoverClassifier::new(primary.clone(), fallback.clone())
            .with_reconnect_interval(Duration::from_millis(5));

        failover.classify(request()).await.unwrap();
        assert!(failover.in_fallback_mode());

        primary.up.store(true, Ordering::SeqCst);
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if !failover.in_fallback_mode() {
                break;
            }
        }
        assert!(!failover.in_fallback_mode());

        let response = failover.classify(request()).await.unwrap();
        assert_eq!(response.labels, vec!["remote"]);
    }
}
