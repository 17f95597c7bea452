//! OverlayDaemon implementation.
//!
//! The OverlayDaemon owns the switch and the segment orchestrator.
//! It manages:
//! - Switch-wide attributes and VLAN bring-up
//! - Provisioning of configured segments, each bounded by a deadline
//! - Teardown on shutdown

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::config::{ConfigError, OverlaydConfig};
use crate::segment::{
    CancellationToken, SegmentDescriptor, SegmentError, SegmentHandle, SegmentOrch,
};
use log::{debug, error, info, warn};
use sonic_sai::api::{SwitchAttrApi, VlanApi};
use sonic_sai::{Inventory, SaiError, VirtualSwitch};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Switch bring-up failed: {0}")]
    BringUp(#[from] SaiError),
    #[error("Segment {name}: {source}")]
    Segment {
        name: String,
        #[source]
        source: SegmentError,
    },
    #[error("Segment {name} cancelled after {after:?}{}", cause(.source))]
    Timeout {
        name: String,
        after: Duration,
        /// Why the cancelled attempt failed, or why removing an attempt
        /// that finished late failed
        #[source]
        source: Option<SegmentError>,
    },
    #[error("Segment {name}: worker task failed: {message}")]
    Task { name: String, message: String },
}

fn cause(source: &Option<SegmentError>) -> String {
    source
        .as_ref()
        .map(|e| format!(": {}", e))
        .unwrap_or_default()
}

/// Outcome of provisioning every configured segment.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub provisioned: usize,
    pub failures: Vec<DaemonError>,
    /// Switch state once all attempts finished
    pub inventory: Inventory,
}

impl ProvisionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Requests shutdown of a running daemon from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        info!("Stopping OverlayDaemon");

        let record = AuditRecord::new(AuditCategory::AdminAction, "OverlayDaemon", "stop_requested")
            .with_outcome(AuditOutcome::Success);
        audit_log!(record);

        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }
}

/// The overlay segment daemon.
pub struct OverlayDaemon {
    config: OverlaydConfig,
    switch: Arc<VirtualSwitch>,
    orch: Arc<SegmentOrch>,
    /// Segments provisioned by this daemon, oldest first
    handles: Vec<SegmentHandle>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl OverlayDaemon {
    /// Validates the configuration and builds a switch sized from it.
    pub fn new(config: OverlaydConfig) -> Result<Self, DaemonError> {
        config.validate()?;
        let switch = Arc::new(VirtualSwitch::with_capacities(&config.capacities()));
        Ok(Self::with_switch(config, switch))
    }

    pub fn with_switch(config: OverlaydConfig, switch: Arc<VirtualSwitch>) -> Self {
        let orch = Arc::new(SegmentOrch::new(config.orch_config(), switch.clone()));
        Self {
            config,
            switch,
            orch,
            handles: Vec::new(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn switch(&self) -> &Arc<VirtualSwitch> {
        &self.switch
    }

    pub fn orch(&self) -> &Arc<SegmentOrch> {
        &self.orch
    }

    pub fn handles(&self) -> &[SegmentHandle] {
        &self.handles
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    pub fn inventory(&self) -> Inventory {
        self.switch.inventory()
    }

    /// Programs switch-wide state. Called once before provisioning.
    pub fn init(&self) -> Result<(), DaemonError> {
        info!(
            "Initializing OverlayDaemon with {} configured segments",
            self.config.segments.len()
        );

        let record = AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "OverlayDaemon",
            "daemon_initialization_start",
        )
        .with_outcome(AuditOutcome::InProgress)
        .with_details(serde_json::json!({
            "segments": self.config.segments.len(),
            "vxlan_udp_port": self.config.switch.vxlan_udp_port,
            "bring_up": self.config.daemon.bring_up,
        }));
        audit_log!(record);

        let result = self.program_switch();

        let mut record = AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "OverlayDaemon",
            "daemon_initialization_end",
        );
        record = match &result {
            Ok(()) => record.with_outcome(AuditOutcome::Success),
            Err(e) => record.with_error(e.to_string()),
        };
        audit_log!(record);

        result.map_err(DaemonError::from)
    }

    fn program_switch(&self) -> Result<(), SaiError> {
        self.switch
            .set_vxlan_udp_port(self.config.switch.vxlan_udp_port)?;

        if !self.config.daemon.bring_up {
            return Ok(());
        }

        let mut memberships = BTreeSet::new();
        for desc in &self.config.segments {
            memberships.insert((desc.access_vlan, desc.access_port));
            memberships.insert((desc.transport_vlan, desc.network_port));
            if desc.termination.enabled {
                memberships.insert((desc.termination.provider_vlan, desc.network_port));
            }
        }

        for (vlan, port) in memberships {
            if self.switch.ensure_vlan(vlan)? {
                debug!("Created VLAN {}", vlan);
            }
            self.switch.add_port_to_vlan(vlan, port, true)?;
            debug!("Added {} to VLAN {} tagged", port, vlan);
        }
        Ok(())
    }

    /// Provisions every configured segment in order. A failed segment is
    /// reported and the rest are still attempted.
    pub async fn provision_all(&mut self) -> ProvisionReport {
        let mut report = ProvisionReport::default();

        for desc in self.config.segments.clone() {
            match self.provision_segment(desc).await {
                Ok(handle) => {
                    info!("Provisioned segment {} ({})", handle.key, handle.id);
                    report.provisioned += 1;
                    self.handles.push(handle);
                }
                Err(e) => {
                    error!("{}", e);
                    report.failures.push(e);
                }
            }
        }

        report.inventory = self.inventory();

        let outcome = if report.is_clean() {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        let record = AuditRecord::new(
            AuditCategory::ConfigurationChange,
            "OverlayDaemon",
            "provision_all",
        )
        .with_outcome(outcome)
        .with_details(serde_json::json!({
            "provisioned": report.provisioned,
            "failed": report.failures.len(),
            "inventory_entries": report.inventory.len(),
        }));
        audit_log!(record);

        report
    }

    /// Runs one provisioning attempt on the blocking pool. Once the
    /// deadline passes the attempt is cancelled and awaited, so whatever it
    /// created has been unwound when this returns. An attempt that passed
    /// its last cancellation check before the deadline fired still counts
    /// as timed out and its segment is deprovisioned.
    pub async fn provision_segment(
        &self,
        desc: SegmentDescriptor,
    ) -> Result<SegmentHandle, DaemonError> {
        let name = desc.label();
        let after = self.config.provision_timeout();
        let cancel = CancellationToken::new();

        let orch = Arc::clone(&self.orch);
        let token = cancel.clone();
        let mut task = tokio::task::spawn_blocking(move || orch.provision_with(&desc, &token));

        let joined = match tokio::time::timeout(after, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!("Provisioning {} exceeded {:?}, cancelling", name, after);
                cancel.cancel();
                let joined = task.await;
                return Err(self.settle_timed_out(name, after, joined).await);
            }
        };

        match joined {
            Ok(Ok(handle)) => Ok(handle),
            Ok(Err(source)) => Err(DaemonError::Segment { name, source }),
            Err(e) => Err(DaemonError::Task {
                name,
                message: e.to_string(),
            }),
        }
    }

    async fn settle_timed_out(
        &self,
        name: String,
        after: Duration,
        joined: Result<Result<SegmentHandle, SegmentError>, tokio::task::JoinError>,
    ) -> DaemonError {
        match joined {
            Ok(Err(source)) => DaemonError::Timeout {
                name,
                after,
                source: Some(source),
            },
            Ok(Ok(handle)) => {
                warn!("Segment {} finished after its deadline, deprovisioning it", name);
                let orch = Arc::clone(&self.orch);
                match tokio::task::spawn_blocking(move || orch.deprovision(&handle)).await {
                    Ok(removed) => DaemonError::Timeout {
                        name,
                        after,
                        source: removed.err(),
                    },
                    Err(e) => DaemonError::Task {
                        name,
                        message: e.to_string(),
                    },
                }
            }
            Err(e) => DaemonError::Task {
                name,
                message: e.to_string(),
            },
        }
    }

    /// Tears down provisioned segments, newest first.
    pub async fn deprovision_all(&mut self) -> Vec<DaemonError> {
        let mut failures = Vec::new();

        while let Some(handle) = self.handles.pop() {
            let name = handle.key.to_string();
            let orch = Arc::clone(&self.orch);
            let joined = tokio::task::spawn_blocking(move || orch.deprovision(&handle)).await;
            match joined {
                Ok(Ok(())) => debug!("Deprovisioned segment {}", name),
                Ok(Err(source)) => failures.push(DaemonError::Segment { name, source }),
                Err(e) => failures.push(DaemonError::Task {
                    name,
                    message: e.to_string(),
                }),
            }
        }

        failures
    }

    /// Initializes the switch, provisions all segments and, unless `once`
    /// is set, waits for [`StopHandle::stop`]. Segments are torn down on
    /// the way out when configured to.
    pub async fn run(&mut self, once: bool) -> Result<ProvisionReport, DaemonError> {
        self.running.store(true, Ordering::SeqCst);
        if let Err(e) = self.init() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let report = self.provision_all().await;
        info!(
            "Provisioned {} of {} segments",
            report.provisioned,
            self.config.segments.len()
        );
        debug!("Switch inventory:\n{}", report.inventory);

        if !once {
            let record =
                AuditRecord::new(AuditCategory::AdminAction, "OverlayDaemon", "daemon_started")
                    .with_outcome(AuditOutcome::Success)
                    .with_details(serde_json::json!({
                        "segments": self.handles.len(),
                    }));
            audit_log!(record);

            self.shutdown.notified().await;
        }

        if self.config.daemon.deprovision_on_exit {
            for e in self.deprovision_all().await {
                error!("Teardown failed: {}", e);
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("OverlayDaemon stopped");

        let record = AuditRecord::new(AuditCategory::AdminAction, "OverlayDaemon", "daemon_stopped")
            .with_outcome(AuditOutcome::Success);
        audit_log!(record);

        Ok(report)
    }
}
