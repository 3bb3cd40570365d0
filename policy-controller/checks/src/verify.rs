use std::{path::PathBuf, process::Stdio, time::Duration};

/// Verifies container image signatures.
#[async_trait::async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, image: &str) -> Result<(), VerifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no signature verification key is configured")]
    MissingKey,

    #[error("verification timed out after {0:?}")]
    Timeout(Duration),

    #[error("signature rejected: {0}")]
    Rejected(String),

    #[error("failed to run verifier: {0}")]
    Io(#[from] std::io::Error),
}

/// Verifies signatures by running `cosign verify --key <key> <image>`.
#[derive(Clone, Debug)]
pub struct CosignVerifier {
    program: PathBuf,
    key: Option<PathBuf>,
    timeout: Duration,
}

// === impl CosignVerifier ===

impl CosignVerifier {
    pub fn new(program: impl Into<PathBuf>, key: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            key,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl Verifier for CosignVerifier {
    async fn verify(&self, image: &str) -> Result<(), VerifyError> {
        let key = self.key.as_ref().ok_or(VerifyError::MissingKey)?;

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.arg("verify")
            .arg("--key")
            .arg(key)
            .arg(image)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            // The child must not outlive a timed-out or cancelled request.
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| VerifyError::Timeout(self.timeout))??;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let reason = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .map(|l| l.trim().to_string())
            .unwrap_or_else(|| output.status.to_string());
        Err(VerifyError::Rejected(reason))
    }
}
