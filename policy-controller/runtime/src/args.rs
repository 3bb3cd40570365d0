use crate::{
    admission::Admission,
    checks::{CosignVerifier, Evaluator},
    policy::{self, PolicyMetrics},
    AdmissionMetrics,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{path::PathBuf, sync::Arc};
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "kube-police", about = "A Kubernetes admission policy controller")]
pub struct Args {
    #[clap(long, default_value = "kube_police=info,warn", env = "KUBE_POLICE_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Path to the security policy document.
    #[clap(
        long,
        default_value = "configs/security-policies.yaml",
        env = "SECURITY_POLICIES_PATH"
    )]
    policy_path: PathBuf,

    /// How often the policy document is re-read. SIGHUP also triggers a reload.
    #[clap(long, default_value = "30")]
    policy_reload_interval_secs: u64,

    /// Upper bound on a single admission evaluation. Slower evaluations deny.
    #[clap(long, default_value = "9000")]
    evaluation_timeout_ms: u64,

    #[clap(long, default_value = "cosign")]
    cosign_path: PathBuf,

    #[clap(long, env = "COSIGN_PUBLIC_KEY_PATH")]
    cosign_public_key: Option<PathBuf>,

    #[clap(long, default_value = "5000")]
    signature_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            policy_path,
            policy_reload_interval_secs,
            evaluation_timeout_ms,
            cosign_path,
            cosign_public_key,
            signature_timeout_ms,
        } = self;

        let mut prom = <Registry>::default();
        let admission_metrics =
            AdmissionMetrics::register(prom.sub_registry_with_prefix("admission"));
        let policy_metrics = PolicyMetrics::register(prom.sub_registry_with_prefix("policy"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        // Serving without a usable policy would deny everything, so a bad
        // document at startup is fatal.
        let (policy, reloader) = policy::init(policy_path.clone(), policy_metrics)
            .with_context(|| format!("failed to load policy from {}", policy_path.display()))?;

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_server(server)
            .build()
            .await?;

        tokio::spawn(
            reloader
                .run(
                    Duration::from_secs(policy_reload_interval_secs),
                    runtime.shutdown_handle(),
                )
                .instrument(info_span!("policy_reload")),
        );

        if cosign_public_key.is_none() {
            info!("No cosign public key configured; signed images cannot be verified");
        }
        let verifier = CosignVerifier::new(
            cosign_path,
            cosign_public_key,
            Duration::from_millis(signature_timeout_ms),
        );
        let admission = Admission::new(
            Evaluator::new(Arc::new(verifier)),
            Arc::new(policy),
            admission_metrics,
            Duration::from_millis(evaluation_timeout_ms),
        );
        let runtime = runtime.spawn_server(admission);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
