// file: src/relay.rs

use std::future::Future;
use std::time::Duration;

use compass_client::{IndexClient, ParserClient};
use serde_json::Value;

use crate::error::RelayError;
use crate::registry::{self, BackendRole, Call};

/// Fixed-delay retry: `max_retries + 1` attempts in total, same delay every
/// time, every error treated alike.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Delay given in (possibly fractional) seconds; negative or NaN → no wait.
    /// A delay too large for `Duration` is rejected.
    pub fn from_seconds(max_retries: u32, sleep_seconds: f64) -> Result<Self, RelayError> {
        let delay = if sleep_seconds.is_nan() || sleep_seconds <= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(sleep_seconds)
                .map_err(|_| RelayError::InvalidRetryDelay(sleep_seconds))?
        };
        Ok(Self { max_retries, delay })
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

pub async fn retry_with<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RelayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.attempts();
    let mut last_error = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(v) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}/{}", label, attempt, attempts);
                }
                return Ok(v);
            }
            Err(e) => {
                tracing::warn!("{} attempt {}/{} failed: {:#}", label, attempt, attempts, e);
                last_error = Some(e);
                if attempt < attempts && !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(RelayError::Exhausted {
        attempts,
        message: last_error.map(|e| format!("{e:#}")).unwrap_or_default(),
    })
}

/// The client a call is executed against.
#[derive(Clone, Copy)]
pub enum Target<'a> {
    Compass(&'a dyn IndexClient),
    Parser(&'a dyn ParserClient),
}

impl Target<'_> {
    pub fn role(&self) -> BackendRole {
        match self {
            Target::Compass(_) => BackendRole::Compass,
            Target::Parser(_) => BackendRole::Parser,
        }
    }
}

/// Run an already resolved call with retries.
pub async fn run(
    call: &Call,
    target: Target<'_>,
    policy: &RetryPolicy,
) -> Result<Value, RelayError> {
    if call.role() != target.role() {
        return Err(RelayError::WrongBackend {
            operation: call.operation().to_string(),
            expected: call.role(),
        });
    }
    let label = format!("{}.{}", target.role(), call.operation());
    retry_with(policy, &label, move || async move {
        match target {
            Target::Compass(c) => call.execute_index(c).await,
            Target::Parser(p) => call.execute_parser(p).await,
        }
    })
    .await
}

/// Resolve `operation` against the target's registry entries and run it.
/// Unknown names and bad arguments are rejected before any call is made.
pub async fn invoke(
    target: Target<'_>,
    operation: &str,
    args: Value,
    policy: &RetryPolicy,
) -> Result<Value, RelayError> {
    let call = registry::resolve(target.role(), operation, args)?;
    run(&call, target, policy).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use compass_client::{
        DocumentUpload, IndexConfig, ParseOutcome, ParsedDocument, ResponsePayload,
    };
    use serde_json::json;

    /// Fails the first `fail_first` calls (all calls when `None`).
    struct FlakyIndex {
        calls: AtomicU32,
        fail_first: Option<u32>,
        seen: Mutex<Vec<String>>,
    }

    impl FlakyIndex {
        fn new(fail_first: Option<u32>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn tick(&self, what: &str) -> anyhow::Result<ResponsePayload> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().unwrap().push(what.to_string());
            match self.fail_first {
                Some(k) if n > k => Ok(ResponsePayload::from_body(json!({ "indexes": [{ "name": "idx1" }] }))),
                _ => anyhow::bail!("failure #{n}"),
            }
        }
    }

    #[async_trait]
    impl IndexClient for FlakyIndex {
        async fn list_indexes(&self) -> anyhow::Result<ResponsePayload> {
            self.tick("list_indexes")
        }
        async fn create_index(
            &self,
            name: &str,
            _: &IndexConfig,
        ) -> anyhow::Result<ResponsePayload> {
            self.tick(&format!("create_index:{name}"))
        }
        async fn search_documents(
            &self,
            name: &str,
            q: &str,
            k: usize,
        ) -> anyhow::Result<ResponsePayload> {
            self.tick(&format!("search:{name}:{q}:{k}"))
        }
        async fn upload_document(&self, u: DocumentUpload) -> anyhow::Result<ResponsePayload> {
            self.tick(&format!("upload:{}", u.filename))
        }
        async fn insert_docs(
            &self,
            name: &str,
            _: Vec<ParsedDocument>,
        ) -> anyhow::Result<ResponsePayload> {
            self.tick(&format!("insert:{name}"))
        }
    }

    struct EchoParser;

    #[async_trait]
    impl ParserClient for EchoParser {
        async fn process_folder(&self, folder: &Path) -> anyhow::Result<Vec<ParseOutcome>> {
            Ok(vec![ParseOutcome::Failed {
                filename: folder.display().to_string(),
                error: "empty".into(),
            }])
        }
    }

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::ZERO)
    }

    #[tokio::test]
    async fn unknown_operation_makes_no_calls() {
        let index = FlakyIndex::new(Some(0));
        let err = invoke(Target::Compass(&index), "drop_everything", json!({}), &fast(3))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UnknownOperation { .. }));
        assert_eq!(index.calls(), 0);
    }

    #[tokio::test]
    async fn permanent_failure_uses_every_attempt() {
        let index = FlakyIndex::new(None);
        let err = invoke(Target::Compass(&index), "list_indexes", json!({}), &fast(3))
            .await
            .unwrap_err();
        assert_eq!(index.calls(), 4);
        match err {
            RelayError::Exhausted { attempts, message } => {
                assert_eq!(attempts, 4);
                assert_eq!(message, "failure #4");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn fail_twice_then_succeed() {
        let index = FlakyIndex::new(Some(2));
        let v = invoke(Target::Compass(&index), "list_indexes", json!({}), &fast(3))
            .await
            .unwrap();
        assert_eq!(index.calls(), 3);
        assert_eq!(v["result"]["indexes"][0]["name"], "idx1");
    }

    #[tokio::test]
    async fn zero_retries_means_one_attempt() {
        let index = FlakyIndex::new(None);
        assert!(invoke(Target::Compass(&index), "list_indexes", json!({}), &fast(0))
            .await
            .is_err());
        assert_eq!(index.calls(), 1);
    }

    #[tokio::test]
    async fn arguments_reach_the_client() {
        let index = FlakyIndex::new(Some(0));
        invoke(
            Target::Compass(&index),
            "search_documents",
            json!({ "index_name": "idx1", "query": "what is X", "top_k": 3 }),
            &fast(0),
        )
        .await
        .unwrap();
        assert_eq!(*index.seen.lock().unwrap(), vec!["search:idx1:what is X:3"]);
    }

    #[tokio::test]
    async fn payload_errors_are_retried() {
        struct Refusing(AtomicU32);
        #[async_trait]
        impl IndexClient for Refusing {
            async fn list_indexes(&self) -> anyhow::Result<ResponsePayload> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(ResponsePayload::failed("503 Service Unavailable: busy"))
            }
            async fn create_index(
                &self,
                _: &str,
                _: &IndexConfig,
            ) -> anyhow::Result<ResponsePayload> {
                unreachable!()
            }
            async fn search_documents(
                &self,
                _: &str,
                _: &str,
                _: usize,
            ) -> anyhow::Result<ResponsePayload> {
                unreachable!()
            }
            async fn upload_document(&self, _: DocumentUpload) -> anyhow::Result<ResponsePayload> {
                unreachable!()
            }
            async fn insert_docs(
                &self,
                _: &str,
                _: Vec<ParsedDocument>,
            ) -> anyhow::Result<ResponsePayload> {
                unreachable!()
            }
        }

        let index = Refusing(AtomicU32::new(0));
        let err = invoke(Target::Compass(&index), "list_indexes", Value::Null, &fast(1))
            .await
            .unwrap_err();
        assert_eq!(index.0.load(Ordering::SeqCst), 2);
        assert_eq!(err.to_string(), "503 Service Unavailable: busy");
    }

    #[tokio::test]
    async fn parser_operations_run_on_the_parser() {
        let v = invoke(
            Target::Parser(&EchoParser),
            "process_folder",
            json!({ "folder_path": "/tmp/in" }),
            &fast(0),
        )
        .await
        .unwrap();
        assert_eq!(v[0]["status"], "failed");
        assert_eq!(v[0]["filename"], "/tmp/in");
    }

    #[tokio::test]
    async fn mismatched_target_is_rejected() {
        let index = FlakyIndex::new(Some(0));
        let call = registry::resolve(
            BackendRole::Parser,
            "process_folder",
            json!({ "folder_path": "/x" }),
        )
        .unwrap();
        let err = run(&call, Target::Compass(&index), &fast(3)).await.unwrap_err();
        assert!(matches!(err, RelayError::WrongBackend { expected: BackendRole::Parser, .. }));
        assert_eq!(index.calls(), 0);
    }

    #[tokio::test]
    async fn retry_with_waits_between_attempts_only() {
        let policy = RetryPolicy::new(2, Duration::from_millis(20));
        let started = std::time::Instant::now();
        let mut n = 0;
        let r: Result<(), _> = retry_with(&policy, "t", || {
            n += 1;
            async { anyhow::bail!("no") }
        })
        .await;
        assert!(r.is_err());
        assert_eq!(n, 3);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn policy_from_seconds() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::new(3, Duration::from_secs(1)));
        let delay = |secs: f64| RetryPolicy::from_seconds(2, secs).unwrap().delay;
        assert_eq!(delay(0.5), Duration::from_millis(500));
        assert_eq!(delay(-1.0), Duration::ZERO);
        assert_eq!(delay(f64::NAN), Duration::ZERO);
        let max = RetryPolicy::from_seconds(u32::MAX, 0.0).unwrap();
        assert_eq!(max.attempts(), u32::MAX);
    }

    #[test]
    fn oversized_delay_is_rejected() {
        for secs in [1e20, f64::INFINITY] {
            let err = RetryPolicy::from_seconds(3, secs).unwrap_err();
            assert!(matches!(err, RelayError::InvalidRetryDelay(_)));
            assert!(err.is_rejection());
        }
    }
}
