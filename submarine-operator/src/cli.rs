//! Command-line surface (§10 Configuration / CLI): one `clap` struct with
//! every flag mirrored onto an environment variable, so the same binary runs
//! unchanged from a shell or a container.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "submarine-operator", version, about = "Controller for the Submarine custom resource")]
pub struct Cli {
    /// Use the in-cluster service account instead of a kubeconfig.
    #[arg(long, env = "SUBMARINE_IN_CLUSTER")]
    pub in_cluster: bool,

    /// Number of concurrent reconcile workers.
    #[arg(long, env = "SUBMARINE_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Directory holding the bundled sub-release chart templates (traefik,
    /// notebook-controller, tfjob, pytorchjob).
    #[arg(long, env = "SUBMARINE_CHARTS_DIR", default_value = "charts")]
    pub charts_dir: PathBuf,

    /// Restrict watches to a single namespace; unset watches every namespace.
    #[arg(long, env = "SUBMARINE_NAMESPACE")]
    pub namespace: Option<String>,
}
