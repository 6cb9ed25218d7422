//! Opens the upstream Kubernetes `pods/exec` channel, tries shell candidates
//! in order, and wires the attached process's stdin/stdout/resize/status
//! into plain channels the WebSocket gateway can drive.
//!
//! Built on `kube`'s `Api<Pod>::exec`/`AttachedProcess`:
//! `AttachParams::interactive_tty()`, `Api::exec`, `attached.terminal_size()`
//! for resize propagation.

use futures::{SinkExt, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, AttachedProcess, TerminalSize as KubeTerminalSize};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::error::GatewayError;
use crate::model::{ExecTarget, TerminalSize};

/// Shell candidates tried in order when `target.command` is absent.
const SHELL_CANDIDATES: &[&[&str]] = &[
    &["/bin/bash", "-il"],
    &["/usr/bin/bash", "-il"],
    &["bash", "-il"],
    &["/bin/sh", "-i"],
    &["/usr/bin/sh", "-i"],
    &["sh", "-i"],
    &["/bin/ash", "-i"],
    &["/usr/bin/ash", "-i"],
    &["ash", "-i"],
];

/// Substrings that classify an exec failure as "command not found", which
/// permits falling through to the next shell candidate.
const SHELL_FALLBACK_MARKERS: &[&str] = &[
    "executable file not found",
    "no such file or directory",
    "not found",
    "stat /",
];

/// Build a `kube::Client` from a raw kubeconfig blob, inlining any
/// file-referenced TLS material first: when `certificate-authority`/
/// `client-certificate`/`client-key` paths are
/// present without their `-data` counterparts, the referenced files are
/// read and base64-inlined so the config is portable across containers
/// where the original paths don't exist.
pub async fn client_from_kubeconfig(kubeconfig: &str) -> Result<kube::Client, GatewayError> {
    let parsed = Kubeconfig::from_yaml(kubeconfig)
        .map_err(|e| GatewayError::InvalidInput(format!("invalid kubeconfig: {e}")))?;
    let normalized = inline_file_credentials(parsed)?;
    let config = kube::Config::from_custom_kubeconfig(normalized, &KubeConfigOptions::default())
        .await
        .map_err(|e| GatewayError::Internal(format!("failed to build kube client config: {e}")))?;
    kube::Client::try_from(config).map_err(GatewayError::Kube)
}

fn inline_file_credentials(mut config: Kubeconfig) -> Result<Kubeconfig, GatewayError> {
    for named_cluster in &mut config.clusters {
        if let Some(cluster) = named_cluster.cluster.as_mut() {
            if cluster.certificate_authority_data.is_none() {
                if let Some(path) = cluster.certificate_authority.take() {
                    cluster.certificate_authority_data = Some(read_and_encode(&path)?);
                }
            }
        }
    }

    for named_auth_info in &mut config.auth_infos {
        if let Some(auth_info) = named_auth_info.auth_info.as_mut() {
            if auth_info.client_certificate_data.is_none() {
                if let Some(path) = auth_info.client_certificate.take() {
                    auth_info.client_certificate_data = Some(read_and_encode(&path)?);
                }
            }
            if auth_info.client_key_data.is_none() {
                if let Some(path) = auth_info.client_key.take() {
                    auth_info.client_key_data = Some(read_and_encode(&path)?);
                }
            }
        }
    }

    Ok(config)
}

fn read_and_encode(path: &str) -> Result<String, GatewayError> {
    use base64::Engine;
    let bytes = std::fs::read(path)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

struct AttachOutcome {
    process: AttachedProcess,
    tried: Vec<String>,
}

async fn attach_with_fallback(
    client: &kube::Client,
    target: &ExecTarget,
) -> Result<AttachOutcome, GatewayError> {
    let api: Api<Pod> = Api::namespaced(client.clone(), &target.namespace);

    // `.stderr(false)`: with `interactive_tty()` the kubelet runs the process
    // behind a pty, which has no separate stderr fd to attach to — stderr is
    // already merged into the stdout stream by the runtime. Requesting a
    // stderr stream alongside tty:true is rejected by the attach API, so
    // disabling it here is what actually produces a single merged
    // stdout/stderr sink, not an omission of stderr.
    let mut params = AttachParams::interactive_tty().stderr(false);
    if let Some(container) = &target.container {
        params = params.container(container.clone());
    }

    if let Some(command) = &target.command {
        let process = api
            .exec(&target.pod, command.clone(), &params)
            .await
            .map_err(|e| GatewayError::ExecFailed(e.to_string()))?;
        return Ok(AttachOutcome {
            process,
            tried: vec![command.join(" ")],
        });
    }

    let mut tried = Vec::new();
    for candidate in SHELL_CANDIDATES {
        let argv: Vec<String> = candidate.iter().map(|s| s.to_string()).collect();
        let label = argv.join(" ");
        match api.exec(&target.pod, argv.clone(), &params).await {
            Ok(process) => return Ok(AttachOutcome { process, tried }),
            Err(e) => {
                let message = e.to_string();
                tried.push(label.clone());
                if is_shell_fallback_error(&message) {
                    warn!(candidate = %label, error = %message, "shell candidate unavailable, trying next");
                    continue;
                }
                return Err(GatewayError::ExecFailed(message));
            }
        }
    }

    Err(GatewayError::NoShellFound(tried.join(", ")))
}

fn is_shell_fallback_error(message: &str) -> bool {
    let lowered = message.to_lowercase();
    SHELL_FALLBACK_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Terminal outcome of an exec session, classified from the upstream status
/// callback.
#[derive(Debug, Clone)]
pub enum ExecOutcome {
    /// Upstream status `"Success"`: normal completion, close 1000.
    Success,
    /// Upstream status `"Failure"`: close 1011 with this message.
    Failure { message: String },
    /// The status channel closed without a terminal status (e.g. the
    /// connection dropped); treated the same as a transport-level error.
    Unknown,
}

/// A running exec attach, wired to plain channels so the WebSocket gateway
/// never has to touch `kube` types directly.
pub struct ExecSession {
    pub stdin_tx: mpsc::Sender<Vec<u8>>,
    pub output_rx: mpsc::Receiver<Vec<u8>>,
    pub resize_tx: watch::Sender<TerminalSize>,
    pub status_rx: oneshot::Receiver<ExecOutcome>,
    pub tried_candidates: Vec<String>,
    process: AttachedProcess,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

/// Stdin/resize half of a split [`ExecSession`]: handed to whichever task
/// forwards client input, independent of the output side.
pub struct ExecInput {
    pub stdin_tx: mpsc::Sender<Vec<u8>>,
    pub resize_tx: watch::Sender<TerminalSize>,
}

/// Stdout/status half of a split [`ExecSession`]: handed to whichever task
/// forwards upstream output, independent of the input side.
pub struct ExecOutput {
    pub output_rx: mpsc::Receiver<Vec<u8>>,
    pub status_rx: oneshot::Receiver<ExecOutcome>,
}

/// The abort-only remainder of a split [`ExecSession`]. Kept by whichever
/// task performs final cleanup once both the input and output sides have
/// stopped.
pub struct ExecCleanup {
    process: AttachedProcess,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ExecSession {
    /// Split into independent input/output handles plus a cleanup handle, so
    /// the stdin forwarder and the stdout/heartbeat pumps can run as
    /// separate tasks — a blocked stdin write can then never stall output
    /// delivery or liveness checks.
    pub fn split(self) -> (ExecInput, ExecOutput, ExecCleanup) {
        (
            ExecInput {
                stdin_tx: self.stdin_tx,
                resize_tx: self.resize_tx,
            },
            ExecOutput {
                output_rx: self.output_rx,
                status_rx: self.status_rx,
            },
            ExecCleanup {
                process: self.process,
                tasks: self.tasks,
            },
        )
    }
}

impl ExecCleanup {
    /// Abort the stdin/stdout/resize pump tasks and the underlying attach.
    pub fn close(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.process.abort();
    }
}

/// Attach to the target container (with shell fallback) and start the
/// stdin/stdout/resize/status pumps. `initial_size` becomes the TTY's
/// starting window (the dimensions carried by the first `resize` frame).
pub async fn start(
    client: &kube::Client,
    target: &ExecTarget,
    initial_size: TerminalSize,
) -> Result<ExecSession, GatewayError> {
    let AttachOutcome { mut process, tried } = attach_with_fallback(client, target).await?;

    let mut stdin_writer = process
        .stdin()
        .ok_or_else(|| GatewayError::Internal("exec attach missing stdin".into()))?;
    let stdout_reader = process
        .stdout()
        .ok_or_else(|| GatewayError::Internal("exec attach missing stdout".into()))?;
    let resize_sender = process.terminal_size();
    let status_future = process.take_status();

    let (stdin_tx, mut stdin_rx) = mpsc::channel::<Vec<u8>>(32);
    let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(32);
    let (resize_tx, mut resize_rx) = watch::channel(initial_size);
    let (status_tx, status_rx) = oneshot::channel();

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(async move {
        while let Some(chunk) = stdin_rx.recv().await {
            if stdin_writer.write_all(&chunk).await.is_err() {
                break;
            }
        }
    }));

    tasks.push(tokio::spawn(async move {
        let mut stream = ReaderStream::new(stdout_reader);
        while let Some(Ok(bytes)) = stream.next().await {
            if output_tx.send(bytes.to_vec()).await.is_err() {
                break;
            }
        }
    }));

    if let Some(mut sender) = resize_sender {
        let initial = KubeTerminalSize {
            height: initial_size.rows,
            width: initial_size.cols,
        };
        let _ = sender.send(initial).await;

        tasks.push(tokio::spawn(async move {
            while resize_rx.changed().await.is_ok() {
                let size = *resize_rx.borrow();
                let message = KubeTerminalSize {
                    height: size.rows,
                    width: size.cols,
                };
                if sender.send(message).await.is_err() {
                    break;
                }
            }
        }));
    }

    if let Some(status_future) = status_future {
        tasks.push(tokio::spawn(async move {
            let outcome = match status_future.await {
                Some(status) => classify_status(&status),
                None => ExecOutcome::Unknown,
            };
            let _ = status_tx.send(outcome);
        }));
    }

    Ok(ExecSession {
        stdin_tx,
        output_rx,
        resize_tx,
        status_rx,
        tried_candidates: tried,
        process,
        tasks,
    })
}

fn classify_status(status: &Status) -> ExecOutcome {
    match status.status.as_deref() {
        Some("Success") => ExecOutcome::Success,
        Some("Failure") => ExecOutcome::Failure {
            message: status
                .message
                .clone()
                .unwrap_or_else(|| "exec failed".to_string()),
        },
        _ => ExecOutcome::Unknown,
    }
}
