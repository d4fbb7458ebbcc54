// src/main.rs
//
// Devnet demo that wires up the neuron library:
//
// - configuration from NEURON_CONFIG / NEURON_METRICS_ADDR
// - tracing subscriber driven by RUST_LOG
// - Prometheus metrics exporter on /metrics
// - an in-memory devnet ledger behind the call-recording decorator
// - one proof-of-work registration followed by one commit-reveal cycle

use std::sync::Arc;

use tracing::info;

use neuron::{
    AccountId, CommitRevealScheduler, InMemoryLedger, MetricsRegistry, NeuronConfig,
    RegistrationOrchestrator, TracedLedger, TracedOrchestrator, TracedScheduler, Wallet,
    run_prometheus_http_server,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "neuron=info".to_string()))
        .init();

    if let Err(err) = run().await {
        eprintln!("fatal error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let cfg = NeuronConfig::from_env().map_err(|e| format!("failed to load config: {e}"))?;

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                eprintln!("metrics HTTP server error: {e}");
            }
        });
        info!(%addr, "metrics exporter listening on /metrics");
    }

    // ---------------------------
    // Devnet ledger
    // ---------------------------

    let mut devnet = cfg.devnet.clone();
    // A frozen clock would never open the reveal window.
    if devnet.blocks_per_query == 0 {
        devnet.blocks_per_query = 1;
    }
    let netuid = devnet
        .subnets
        .first()
        .map(|s| s.netuid)
        .ok_or_else(|| "devnet config has no subnets".to_string())?;
    let ledger = Arc::new(TracedLedger::new(InMemoryLedger::new(devnet)));

    // In a real client the keys come from the wallet store. For the demo we
    // derive deterministic accounts from fixed byte strings.
    let wallet = Wallet::new(
        "demo",
        AccountId::from_seed(b"demo-hotkey"),
        AccountId::from_seed(b"demo-coldkey"),
    );
    info!(wallet = %wallet.name, hotkey = %wallet.hotkey, netuid, "starting devnet demo");

    // ---------------------------
    // Proof-of-work registration
    // ---------------------------

    let orchestrator: TracedOrchestrator<InMemoryLedger> =
        RegistrationOrchestrator::new(ledger.clone(), cfg.registration.clone())
            .with_metrics(metrics.registration.clone());
    let reg_wallet = wallet.clone();
    let registration =
        tokio::task::spawn_blocking(move || orchestrator.register(&reg_wallet, netuid))
            .await
            .map_err(|e| format!("registration task failed: {e}"))?;

    if !registration.success {
        return Err(format!(
            "registration failed: {}",
            registration.error.unwrap_or_default()
        ));
    }
    info!(netuid, uid = ?registration.uid, "hotkey registered");

    // ---------------------------
    // Weight commit-reveal
    // ---------------------------

    let scheduler: TracedScheduler<InMemoryLedger> =
        CommitRevealScheduler::new(ledger.clone(), cfg.weights.clone())
            .with_metrics(metrics.weights.clone());
    let weights_wallet = wallet.clone();
    let uids: Vec<u64> = vec![0, 1, 2, 3];
    let weights: Vec<f32> = vec![0.1, 0.2, 0.3, 0.4];
    let reveal = tokio::task::spawn_blocking(move || {
        scheduler.commit_and_reveal(&weights_wallet, netuid, &uids, &weights, None)
    })
    .await
    .map_err(|e| format!("commit-reveal task failed: {e}"))?;

    if !reveal.success {
        return Err(format!("commit-reveal failed: {}", reveal.message));
    }
    info!(netuid, message = %reveal.message, "weights set");

    info!(
        ledger_calls = ledger.log().records().len(),
        submissions = ledger.log().count("submit_pow_register"),
        "devnet demo finished"
    );
    Ok(())
}
