use crate::core::{ConfigError, PolicyProvider, PolicySnapshot, PolicyUnavailable};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::{path::PathBuf, sync::Arc};
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::watch,
    time::{self, Duration},
};
use tracing::{debug, info, warn};

/// The most recently loaded policy.
#[derive(Clone, Debug)]
pub enum PolicyState {
    Ready(Arc<PolicySnapshot>),

    /// The last reload failed. Requests are denied until a reload succeeds.
    Failed(String),
}

/// Serves the current policy snapshot to request handlers.
#[derive(Clone, Debug)]
pub struct PolicyWatch(watch::Receiver<PolicyState>);

/// Re-reads the policy document and publishes each result.
#[derive(Debug)]
pub struct PolicyReloader {
    path: PathBuf,
    tx: watch::Sender<PolicyState>,
    metrics: PolicyMetrics,
}

#[derive(Clone, Debug)]
pub struct PolicyMetrics {
    reloads: Family<ReloadLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ReloadLabels {
    result: &'static str,
}

/// Loads the policy at `path`. Failing to load at startup is fatal, so no
/// watch is returned without a usable snapshot.
pub fn init(
    path: PathBuf,
    metrics: PolicyMetrics,
) -> Result<(PolicyWatch, PolicyReloader), ConfigError> {
    let policy = PolicySnapshot::load(path.clone())?;
    info!(path = %path.display(), "Loaded security policy");
    let (tx, rx) = watch::channel(PolicyState::Ready(Arc::new(policy)));
    let reloader = PolicyReloader { path, tx, metrics };
    Ok((PolicyWatch(rx), reloader))
}

// === impl PolicyWatch ===

impl PolicyProvider for PolicyWatch {
    fn current(&self) -> Result<Arc<PolicySnapshot>, PolicyUnavailable> {
        match &*self.0.borrow() {
            PolicyState::Ready(policy) => Ok(policy.clone()),
            PolicyState::Failed(error) => Err(PolicyUnavailable(error.clone())),
        }
    }
}

// === impl PolicyReloader ===

impl PolicyReloader {
    /// Reloads on every `interval` tick and on SIGHUP until shutdown.
    pub async fn run(self, interval: Duration, drain: drain::Watch) -> anyhow::Result<()> {
        let mut hangups = signal(SignalKind::hangup())?;
        let mut ticks = time::interval_at(time::Instant::now() + interval, interval);
        ticks.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        tokio::pin! {
            let shutdown = drain.signaled();
        }
        loop {
            tokio::select! {
                _ = ticks.tick() => self.reload().await,
                _ = hangups.recv() => {
                    info!("Received SIGHUP; reloading policy");
                    self.reload().await;
                }
                _ = &mut shutdown => {
                    debug!("Policy reloader shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Replaces the published policy with a fresh load of the document. A
    /// failed load replaces it with a failure so that requests deny rather
    /// than evaluate against a stale policy.
    ///
    /// The document is read on the blocking pool.
    pub async fn reload(&self) {
        let path = self.path.clone();
        let loaded = tokio::task::spawn_blocking(move || PolicySnapshot::load(path))
            .await
            .map_err(|error| error.to_string())
            .and_then(|res| res.map_err(|error| error.to_string()));
        let state = match loaded {
            Ok(policy) => {
                debug!(path = %self.path.display(), "Reloaded security policy");
                self.metrics.reloaded("ok");
                PolicyState::Ready(Arc::new(policy))
            }
            Err(error) => {
                warn!(%error, "Failed to reload security policy");
                self.metrics.reloaded("error");
                PolicyState::Failed(error)
            }
        };
        self.tx.send_replace(state);
    }
}

// === impl PolicyMetrics ===

impl PolicyMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reloads = Family::<ReloadLabels, Counter>::default();
        reg.register(
            "reloads",
            "Total number of policy reloads by result",
            reloads.clone(),
        );
        Self { reloads }
    }

    fn reloaded(&self, result: &'static str) {
        self.reloads.get_or_create(&ReloadLabels { result }).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PolicyFile(PathBuf);

    impl PolicyFile {
        fn new(name: &str, contents: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "kube-police-{}-{name}.yaml",
                std::process::id()
            ));
            std::fs::write(&path, contents).expect("policy file must be written");
            Self(path)
        }

        fn write(&self, contents: &str) {
            std::fs::write(&self.0, contents).expect("policy file must be written");
        }
    }

    impl Drop for PolicyFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    fn metrics() -> (Registry, PolicyMetrics) {
        let mut reg = Registry::default();
        let metrics = PolicyMetrics::register(&mut reg);
        (reg, metrics)
    }

    #[test]
    fn startup_requires_a_policy() {
        let (_, metrics) = metrics();
        let missing = std::env::temp_dir().join("kube-police-does-not-exist.yaml");
        assert!(matches!(
            init(missing, metrics),
            Err(ConfigError::Read { .. })
        ));
    }

    #[tokio::test]
    async fn reload_replaces_snapshot() {
        let file = PolicyFile::new("replace", "image: { disallowedTags: [latest] }\n");
        let (reg, metrics) = metrics();
        let (watch, reloader) = init(file.0.clone(), metrics).expect("policy must load");

        let before = watch.current().expect("policy must be ready");
        assert_eq!(before.image.disallowed_tags, vec!["latest"]);

        file.write("image: { disallowedTags: [latest, dev] }\n");
        reloader.reload().await;
        let after = watch.current().expect("policy must be ready");
        assert_eq!(after.image.disallowed_tags, vec!["latest", "dev"]);

        // Earlier snapshots are never modified.
        assert_eq!(before.image.disallowed_tags, vec!["latest"]);

        let mut text = String::new();
        prometheus_client::encoding::text::encode(&mut text, &reg).expect("metrics must encode");
        assert!(text.contains(r#"reloads_total{result="ok"} 1"#), "{text}");
    }

    #[tokio::test]
    async fn failed_reload_denies_until_fixed() {
        let file = PolicyFile::new("failed", "image: { disallowedTags: [latest] }\n");
        let (_, metrics) = metrics();
        let (watch, reloader) = init(file.0.clone(), metrics).expect("policy must load");

        file.write("image: { disalowedTags: [latest] }\n");
        reloader.reload().await;
        let error = watch.current().expect_err("policy must be unavailable");
        assert!(error.to_string().contains("failed to parse policy"), "{error}");

        file.write("image: { disallowedTags: [dev] }\n");
        reloader.reload().await;
        assert_eq!(
            watch.current().expect("policy must be ready").image.disallowed_tags,
            vec!["dev"]
        );
    }

    #[tokio::test]
    async fn run_reloads_until_shutdown() {
        let file = PolicyFile::new("run", "image: { disallowedTags: [latest] }\n");
        let (_, metrics) = metrics();
        let (watch, reloader) = init(file.0.clone(), metrics).expect("policy must load");
        let mut updates = watch.0.clone();
        let (signal, drain) = drain::channel();
        let task = tokio::spawn(reloader.run(Duration::from_millis(10), drain));

        file.write("image: { disallowedTags: [dev] }\n");
        let reloaded = time::timeout(Duration::from_secs(5), async {
            loop {
                updates.changed().await.expect("reloader must publish");
                if let PolicyState::Ready(policy) = &*updates.borrow_and_update() {
                    if policy.image.disallowed_tags == ["dev"] {
                        return;
                    }
                }
            }
        })
        .await;
        assert!(reloaded.is_ok(), "policy must be reloaded on the interval");

        signal.drain().await;
        task.await
            .expect("reloader must not panic")
            .expect("reloader must exit cleanly");
    }
}
