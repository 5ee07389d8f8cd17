//! Process bootstrap: open the store, reconcile, discover, plan, and spawn
//! the four control loops plus (optionally) the control socket.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use fleet_daemon::{run_idle_watcher, run_pool_monitor, run_quota_monitor, Activator, DriverSet, RotationCtx};
use fleet_discovery::{EnvSecretSurface, MapSecretSurface, SecretSurface};
use fleet_drivers::{ColabDriver, EnvVault, FakeDriver, InMemoryVault, KaggleDriver};
use fleet_gateway::Gateway;
use fleet_store::Store;

use crate::cli::DaemonOpts;
use crate::config::FleetConfig;

/// Everything spawned needs to live somewhere even after `main` hands off
/// to `tokio::select!` on the shutdown signal.
pub struct Handles {
    pub ctx: RotationCtx,
    pub activator: Activator,
    pub cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Handles {
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

fn build_driver_set(fake: bool) -> DriverSet {
    if fake {
        DriverSet::new(
            Arc::new(FakeDriver::new(fleet_core::types::Provider::C)),
            Arc::new(FakeDriver::new(fleet_core::types::Provider::K)),
        )
    } else {
        DriverSet::new(Arc::new(ColabDriver::new()), Arc::new(KaggleDriver::new()))
    }
}

fn build_secret_surface(fake: bool) -> Box<dyn SecretSurface> {
    if fake {
        Box::new(MapSecretSurface::new())
    } else {
        Box::new(EnvSecretSurface)
    }
}

/// Boot sequence shared by every subcommand that touches the durable state:
/// open the database, reconcile crash-recovered rows, run one discovery
/// pass. Does not start any control loop.
pub async fn bootstrap_store(config: &FleetConfig, fake_drivers: bool, gateway: &Gateway) -> anyhow::Result<Arc<Store>> {
    let store = if fake_drivers {
        Arc::new(Store::open_in_memory()?)
    } else {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Arc::new(Store::open(&config.db_path)?)
    };

    let report = store.reconcile_on_boot()?;
    info!(
        timed_out_starting = report.timed_out_starting,
        expired_quota = report.expired_quota,
        adopted = report.adopted.len(),
        "boot reconciliation complete"
    );

    let secrets = build_secret_surface(fake_drivers);
    let discovery = fleet_discovery::run(&store, secrets.as_ref())?;
    info!(
        added = discovery.added.len(),
        removed = discovery.removed.len(),
        unchanged = discovery.unchanged,
        "auto-discovery complete"
    );
    fleet_discovery::publish_events(gateway, &discovery).await;

    Ok(store)
}

/// Start the daemon: boot the store, build the shared context, and spawn
/// the pool monitor (which itself owns the rotation executor lifecycle),
/// the quota monitor, and the idle watcher.
pub async fn start(config: &FleetConfig, opts: &DaemonOpts, fake_drivers: bool) -> anyhow::Result<Handles> {
    let gateway = Gateway::default();
    let store = bootstrap_store(config, fake_drivers, &gateway).await?;
    let drivers = Arc::new(build_driver_set(fake_drivers));
    let vault: Arc<dyn fleet_drivers::CredentialsVault> = if fake_drivers {
        Arc::new(InMemoryVault::new())
    } else {
        Arc::new(EnvVault)
    };

    let ctx = RotationCtx {
        store: store.clone(),
        gateway: gateway.clone(),
        drivers: drivers.clone(),
        vault: vault.clone(),
    };

    let cancel = CancellationToken::new();
    let activator = Activator::new(store, gateway, drivers, vault);

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(run_pool_monitor(
        ctx.clone(),
        std::time::Duration::from_secs(config.poll_interval_secs),
        cancel.child_token(),
    )));
    tasks.push(tokio::spawn(run_quota_monitor(
        ctx.clone(),
        std::time::Duration::from_secs(config.quota_monitor_interval_secs),
        cancel.child_token(),
    )));
    tasks.push(tokio::spawn(run_idle_watcher(
        ctx.clone(),
        std::time::Duration::from_secs(config.idle_watch_interval_secs),
        std::time::Duration::from_secs(config.idle_timeout_secs),
        cancel.child_token(),
    )));

    if opts.control_socket {
        let socket_path = config.socket_path.clone();
        let socket_ctx = ctx.clone();
        let socket_activator = activator.clone();
        let socket_cancel = cancel.child_token();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = crate::server::run_server(&socket_path, socket_ctx, socket_activator, socket_cancel).await {
                tracing::warn!(error = %e, "control socket exited");
            }
        }));
    }

    Ok(Handles {
        ctx,
        activator,
        cancel,
        tasks,
    })
}
