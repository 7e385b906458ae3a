// ABOUTME: Orchestrates save and load: collects state over the bus, commits it atomically, restores it.
// ABOUTME: At most one save or load runs at a time; each is retried under a per-attempt deadline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use savekeep_core::{
    BusEvent, CollectedState, Completion, EventBus, Obfuscator, OperationKind, SavePackage, SlotId,
    decode, encode,
};
use savekeep_store::{AtomicFileStore, DirectoryError, RepairReport, SaveDirectory, SlotRegistry};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::Instant;
use ulid::Ulid;

use crate::config::SavekeepConfig;
use crate::result::{OperationError, OperationResult};
use crate::scene::{SceneController, transition_needed};
use crate::shutdown::ShutdownSignal;
use crate::supervisor::{self, RetryPolicy};

/// What one successful attempt produced.
struct Outcome {
    file_path: PathBuf,
    systems: usize,
    save_time: String,
}

/// Releases the single-flight flag when dropped.
struct FlightGuard<'a>(&'a AtomicBool);

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SaveCoordinator {
    config: SavekeepConfig,
    store: AtomicFileStore,
    registry: SlotRegistry,
    bus: Arc<dyn EventBus>,
    scenes: Arc<dyn SceneController>,
    obfuscator: Arc<dyn Obfuscator>,
    shutdown: ShutdownSignal,
    in_flight: AtomicBool,
}

impl SaveCoordinator {
    /// Build a coordinator that keeps its slots in `save_dir`.
    pub fn new(
        config: SavekeepConfig,
        save_dir: impl Into<PathBuf>,
        bus: Arc<dyn EventBus>,
        scenes: Arc<dyn SceneController>,
    ) -> Self {
        let store = AtomicFileStore::new(save_dir);
        let obfuscator = config.obfuscator();
        let registry = SlotRegistry::new(store.clone(), obfuscator.clone(), config.max_slots);
        Self {
            config,
            store,
            registry,
            bus,
            scenes,
            obfuscator,
            shutdown: ShutdownSignal::new(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Resolve the save directory from the configuration, then clean up any
    /// write that was interrupted by a previous crash.
    pub fn open(
        config: SavekeepConfig,
        bus: Arc<dyn EventBus>,
        scenes: Arc<dyn SceneController>,
    ) -> Result<Self, DirectoryError> {
        let dir = SaveDirectory::resolve(&config.home, &config.fallback_home)?;
        let coordinator = Self::new(config, dir.path, bus, scenes);
        coordinator.repair_all();
        Ok(coordinator)
    }

    /// Share an existing shutdown signal instead of the coordinator's own.
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn config(&self) -> &SavekeepConfig {
        &self.config
    }

    pub fn save_dir(&self) -> &Path {
        self.store.dir()
    }

    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// True while a save or load is running.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Ask any running operation to stop at its next wait and refuse new ones.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub async fn quick_save(&self) -> OperationResult {
        self.save(self.config.quick_slot.get()).await
    }

    pub async fn quick_load(&self) -> OperationResult {
        self.load(self.config.quick_slot.get()).await
    }

    /// Repair leftovers of interrupted writes in every configured slot.
    pub fn repair_all(&self) -> Vec<(SlotId, RepairReport)> {
        let mut repaired = Vec::new();
        for n in 1..=self.config.max_slots {
            let Ok(slot) = SlotId::new(n) else { continue };
            match self.store.repair(slot) {
                Ok(report) if !report.is_clean() => repaired.push((slot, report)),
                Ok(_) => {}
                Err(e) => tracing::error!(slot = %slot, error = %e, "could not repair slot"),
            }
        }
        repaired
    }

    /// Collect state from every responding system and commit it to `slot_number`.
    pub async fn save(&self, slot_number: u32) -> OperationResult {
        let Some(_guard) = self.begin() else {
            tracing::warn!(slot = slot_number, "save rejected, operation already in progress");
            return OperationResult::failed(slot_number, &OperationError::Busy, 0);
        };

        let slot = match SlotId::new(slot_number) {
            Ok(slot) => slot,
            Err(e) => return OperationResult::failed(slot_number, &OperationError::from(e), 0),
        };

        tracing::info!(slot = %slot, "save started");

        let mut operation_id = Ulid::new();
        let outcome = supervisor::retry(&self.retry_policy(), &self.shutdown, "save", |_| {
            operation_id = Ulid::new();
            self.save_attempt(slot, operation_id)
        })
        .await;

        match outcome {
            Ok(done) => {
                let Outcome {
                    file_path,
                    systems,
                    save_time,
                } = done.value;
                tracing::info!(slot = %slot, systems, attempts = done.attempts, path = %file_path.display(), "save complete");
                OperationResult::succeeded(
                    slot,
                    format!("Saved {} systems at {}", systems, save_time),
                    file_path,
                    systems,
                    done.attempts,
                )
            }
            Err(failure) => {
                let error = OperationError::from(failure.error);
                if !matches!(error, OperationError::ShuttingDown) {
                    self.restore_last_good(slot);
                }
                self.publish_failure(OperationKind::Save, slot, operation_id, &error);
                OperationResult::failed(slot_number, &error, failure.attempts)
            }
        }
    }

    /// Read `slot_number`, switch scenes if needed, and hand the state to every subsystem.
    pub async fn load(&self, slot_number: u32) -> OperationResult {
        let Some(_guard) = self.begin() else {
            tracing::warn!(slot = slot_number, "load rejected, operation already in progress");
            return OperationResult::failed(slot_number, &OperationError::Busy, 0);
        };

        let slot = match SlotId::new(slot_number) {
            Ok(slot) => slot,
            Err(e) => return OperationResult::failed(slot_number, &OperationError::from(e), 0),
        };

        tracing::info!(slot = %slot, "load started");

        let outcome = supervisor::retry(&self.retry_policy(), &self.shutdown, "load", |_| {
            self.load_attempt(slot)
        })
        .await;

        match outcome {
            Ok(done) => {
                let Outcome {
                    file_path,
                    systems,
                    save_time,
                } = done.value;
                tracing::info!(slot = %slot, systems, attempts = done.attempts, "load complete");
                OperationResult::succeeded(
                    slot,
                    format!("Loaded {} systems from {}", systems, save_time),
                    file_path,
                    systems,
                    done.attempts,
                )
            }
            Err(failure) => {
                let error = OperationError::from(failure.error);
                self.publish_failure(OperationKind::Load, slot, Ulid::new(), &error);
                OperationResult::failed(slot_number, &error, failure.attempts)
            }
        }
    }

    async fn save_attempt(&self, slot: SlotId, operation_id: Ulid) -> Result<Outcome, OperationError> {
        // Subscribe before publishing so no response can slip past.
        let mut responses = self.bus.subscribe();
        let mut state = CollectedState::new();

        self.bus.publish(BusEvent::SaveRequested {
            slot,
            operation_id,
            request_time: Utc::now(),
        });

        self.collect(&mut responses, &mut state).await?;
        drop(responses);

        if state.ensure_not_empty() {
            tracing::warn!(slot = %slot, "no systems responded, saving placeholder entry");
        }

        let package = SavePackage::build(slot, self.scenes.active_scene(), operation_id, &state);
        let encoded = encode(&package, self.obfuscator.as_ref()).map_err(OperationError::Serialize)?;
        if encoded.plain_len as u64 > self.config.max_save_bytes {
            tracing::warn!(
                slot = %slot,
                bytes = encoded.plain_len,
                limit = self.config.max_save_bytes,
                "save is larger than the configured limit"
            );
        }

        let file_path = self
            .store
            .write(slot, &encoded.text)
            .map_err(OperationError::Write)?;

        self.bus.publish(BusEvent::completed(
            OperationKind::Save,
            Completion {
                slot,
                success: true,
                count: state.len(),
                save_time: package.save_time.clone(),
                operation_id,
                message: String::new(),
            },
        ));

        Ok(Outcome {
            file_path,
            systems: state.len(),
            save_time: package.save_time,
        })
    }

    /// Fold responses into `state` until the save window closes. The window
    /// always runs its full length; answers arriving after it are not saved.
    async fn collect(
        &self,
        responses: &mut broadcast::Receiver<BusEvent>,
        state: &mut CollectedState,
    ) -> Result<(), OperationError> {
        let deadline = Instant::now() + self.config.save_timeout;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Ok(()),
                _ = self.shutdown.triggered() => return Err(OperationError::ShuttingDown),
                received = responses.recv() => match received {
                    Ok(BusEvent::SaveDataResponse { system_name, payload }) => {
                        if state.insert_first(system_name.as_str(), payload) {
                            tracing::debug!(system = %system_name, "collected system state");
                        } else {
                            tracing::debug!(system = %system_name, "duplicate response ignored");
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "response collection fell behind the bus");
                    }
                    Err(RecvError::Closed) => {
                        self.shutdown.sleep_until(deadline).await?;
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn load_attempt(&self, slot: SlotId) -> Result<Outcome, OperationError> {
        let file_path = self.store.paths(slot).file;

        let text = self.store.read(slot).map_err(OperationError::from_read)?;
        let package = decode(&text, self.obfuscator.as_ref()).map_err(OperationError::Decode)?;
        let state = package.collected_state();
        let operation_id = package.operation_id.parse::<Ulid>().unwrap_or_else(|_| Ulid::new());

        let current = self.scenes.active_scene();
        if transition_needed(&current, &package.scene_name) {
            self.transition_to(&package.scene_name).await?;
        }

        if !state.is_empty() {
            self.bus.publish(BusEvent::LoadData {
                slot,
                state: state.clone(),
                save_time: package.save_time.clone(),
                operation_id,
            });
            self.shutdown.sleep(self.config.load_settle_delay).await?;
        }

        self.bus.publish(BusEvent::completed(
            OperationKind::Load,
            Completion {
                slot,
                success: true,
                count: state.len(),
                save_time: package.save_time.clone(),
                operation_id,
                message: String::new(),
            },
        ));

        Ok(Outcome {
            file_path,
            systems: state.len(),
            save_time: package.save_time,
        })
    }

    async fn transition_to(&self, scene: &str) -> Result<(), OperationError> {
        tracing::info!(scene, "loading saved scene");
        self.scenes.begin_transition(scene)?;

        let deadline = Instant::now() + self.config.scene_load_timeout;
        while !self.scenes.transition_complete() {
            if Instant::now() >= deadline {
                return Err(OperationError::SceneLoadTimeout {
                    scene: scene.to_string(),
                    timeout: self.config.scene_load_timeout,
                });
            }
            self.shutdown.sleep(self.config.tick).await?;
        }

        self.shutdown.sleep(self.config.scene_settle_delay).await?;
        Ok(())
    }

    /// After a save has given up, put the last committed file back if a backup
    /// survived and the primary is missing or empty.
    fn restore_last_good(&self, slot: SlotId) {
        if self.store.has_primary(slot) {
            return;
        }
        match self.store.restore_backup(slot) {
            Ok(true) => tracing::warn!(slot = %slot, "save failed, previous save restored from backup"),
            Ok(false) => {}
            Err(e) => tracing::error!(slot = %slot, error = %e, "save failed and backup could not be restored"),
        }
    }

    fn publish_failure(&self, kind: OperationKind, slot: SlotId, operation_id: Ulid, error: &OperationError) {
        tracing::error!(slot = %slot, operation = ?kind, failure = ?error.kind(), error = %error, "operation failed");
        self.bus.publish(BusEvent::completed(
            kind,
            Completion {
                slot,
                success: false,
                count: 0,
                save_time: String::new(),
                operation_id,
                message: error.to_string(),
            },
        ));
    }

    fn begin(&self) -> Option<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlightGuard(&self.in_flight))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.config.max_retry_attempts,
            delay: self.config.retry_delay,
            attempt_timeout: self.config.operation_timeout,
        }
    }
}
