use crate::peer::types::Candidate;
use tracing::debug;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Логирование с временными метками
///
/// Installs the global subscriber once; later calls are no-ops. `RUST_LOG`
/// overrides the default `info` filter.
pub fn init() {
    if !crate::config::LOGGING_ENABLED || !crate::config::dev::ENABLE_LOGGING {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_target(false)
        .try_init();
}

/// Печать ICE-candidate при появлении (Trickle-ICE)
pub fn dump_candidate(label: &str, cand: &Candidate) {
    debug!(
        "Trickle {label}: candidate={} sdp_mid={:?} sdp_mline_index={:?} username_fragment={:?}",
        cand.candidate, cand.sdp_mid, cand.sdp_mline_index, cand.username_fragment
    );
}
