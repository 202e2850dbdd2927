use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Tensor backend requested on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// CPU backend.
    #[value(name = "ndarray")]
    NdArray,
    /// GPU backend (requires the `backend-wgpu` feature).
    Wgpu,
}

impl BackendKind {
    pub fn is_gpu(&self) -> bool {
        matches!(self, BackendKind::Wgpu)
    }
}

/// Runtime options shared by the train/eval binaries.
#[derive(Debug, Clone, Args, Serialize, Deserialize)]
pub struct RuntimeArgs {
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Worker threads for clip decoding (0 keeps the rayon default).
    #[arg(long, default_value_t = 4)]
    pub n_threads: usize,
}

impl Default for RuntimeArgs {
    fn default() -> Self {
        Self {
            backend: BackendKind::NdArray,
            n_threads: 4,
        }
    }
}

impl RuntimeArgs {
    /// Size the clip decoding pool.
    pub fn apply(&self) {
        configure_threads(self.n_threads);
    }
}

/// Install a fmt subscriber filtered by `RUST_LOG`, falling back to `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // A subscriber may already be installed (tests, embedding); keep the existing one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Size rayon's global pool used for parallel clip decoding. `0` keeps rayon's default.
pub fn configure_threads(n_threads: usize) {
    if n_threads == 0 {
        return;
    }
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(n_threads)
        .build_global()
    {
        tracing::warn!("could not size clip loader pool to {n_threads} threads: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        runtime: RuntimeArgs,
    }

    #[test]
    fn runtime_args_defaults_and_backend_names() {
        let cli = Cli::parse_from(["bin"]);
        assert_eq!(cli.runtime.backend, BackendKind::NdArray);
        assert_eq!(cli.runtime.n_threads, 4);
        let cli = Cli::parse_from(["bin", "--backend", "ndarray"]);
        assert!(!cli.runtime.backend.is_gpu());
        let cli = Cli::parse_from(["bin", "--backend", "wgpu", "--n-threads", "0"]);
        assert!(cli.runtime.backend.is_gpu());
        assert_eq!(cli.runtime.n_threads, 0);
    }
}
