//! Core data types: `ExecTarget`, ticket records, terminal sizing.

use serde::{Deserialize, Serialize};

/// The `(namespace, pod, container?, command?)` tuple identifying which
/// container to `exec` into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
    /// When present, disables shell-candidate fallback.
    pub command: Option<Vec<String>>,
}

impl ExecTarget {
    /// Validate and normalize (trim) a freshly-parsed target:
    /// `namespace`/`pod` non-empty trimmed; `container` optional non-empty
    /// trimmed; `command` optional non-empty array of non-empty trimmed
    /// strings.
    pub fn normalize(
        namespace: String,
        pod: String,
        container: Option<String>,
        command: Option<Vec<String>>,
    ) -> crate::error::Result<Self> {
        let namespace = namespace.trim().to_string();
        let pod = pod.trim().to_string();
        if namespace.is_empty() {
            return Err(crate::error::GatewayError::InvalidInput(
                "namespace must not be empty".into(),
            ));
        }
        if pod.is_empty() {
            return Err(crate::error::GatewayError::InvalidInput(
                "pod must not be empty".into(),
            ));
        }

        let container = match container {
            Some(c) if !c.trim().is_empty() => Some(c.trim().to_string()),
            Some(_) => {
                return Err(crate::error::GatewayError::InvalidInput(
                    "container must not be empty when present".into(),
                ))
            }
            None => None,
        };

        let command = match command {
            Some(argv) if argv.is_empty() => {
                return Err(crate::error::GatewayError::InvalidInput(
                    "command must not be an empty array when present".into(),
                ))
            }
            Some(argv) => {
                let mut trimmed = Vec::with_capacity(argv.len());
                for arg in argv {
                    let arg = arg.trim().to_string();
                    if arg.is_empty() {
                        return Err(crate::error::GatewayError::InvalidInput(
                            "command arguments must not be empty".into(),
                        ));
                    }
                    trimmed.push(arg);
                }
                Some(trimmed)
            }
            None => None,
        };

        Ok(Self {
            namespace,
            pod,
            container,
            command,
        })
    }
}

/// Metadata about whoever issued or consumed a ticket, for audit logging only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerMeta {
    pub remote_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A record stored in the `TicketStore`. The `kubeconfig` text is never
/// echoed back to a client.
#[derive(Debug, Clone)]
pub struct TicketRecord {
    pub kubeconfig: String,
    pub target: ExecTarget,
    pub issuer: PeerMeta,
}

/// Terminal window dimensions, as carried by `resize` frames and the
/// upstream `kube` exec resize channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn validate(cols: i64, rows: i64) -> crate::error::Result<Self> {
        if cols < 1 || rows < 1 {
            return Err(crate::error::GatewayError::InvalidInput(
                "cols and rows must be >= 1".into(),
            ));
        }
        let cols = u16::try_from(cols)
            .map_err(|_| crate::error::GatewayError::InvalidInput("cols out of range".into()))?;
        let rows = u16::try_from(rows)
            .map_err(|_| crate::error::GatewayError::InvalidInput("rows out of range".into()))?;
        Ok(Self { cols, rows })
    }
}
