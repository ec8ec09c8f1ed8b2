//! Doctor-side view of one patient, and the revocation poller that keeps it honest.
//!
//! Revocation is detected by polling: there is no push channel from the patient to the doctor.
//! Once a [`DoctorView`] has loaded, a [`RevocationPoller`] re-reads the grant state every poll
//! interval and clears the view's data as soon as the grant is no longer active. Staleness is
//! therefore bounded by one interval.
//!
//! A view is bound to one (identity, role, patient, scope). Switching patient or dropping the
//! view cancels any in-flight load and stops the poller.

use crate::error::GateResult;
use crate::gate::{AckOutcome, DoctorGate};
use crate::grants::{GrantService, GrantState};
use crate::records::{FileEntry, HealthRecord, PatientPod, RecordStore};
use crate::session::SessionContext;
use crate::{CoreConfig, PodError};
use pod_types::{Role, WebId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Shared cancellation signal, checked after every await of a long-running sequence.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a doctor sees once the gate has passed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientData {
    pub grant: GrantState,
    pub record: Option<HealthRecord>,
    /// Only files shared with doctors.
    pub files: Vec<FileEntry>,
}

type SharedData = Arc<RwLock<Option<PatientData>>>;

/// Periodic grant re-check bound to one loaded view.
///
/// Stops by itself after clearing the data. Dropping it cancels and aborts the task.
#[derive(Debug)]
pub struct RevocationPoller {
    cancel: CancelFlag,
    handle: JoinHandle<()>,
}

impl RevocationPoller {
    fn start(
        cfg: Arc<CoreConfig>,
        session: SessionContext,
        patient: WebId,
        scope: String,
        data: SharedData,
    ) -> Self {
        let cancel = CancelFlag::new();
        let task_cancel = cancel.clone();
        let interval = cfg.poll_interval();
        let doctor = session.web_id().clone();
        let grants = GrantService::new(cfg, session);

        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if task_cancel.is_cancelled() {
                    break;
                }

                let result = grants
                    .get_active_grant_state(&patient, &doctor, &scope)
                    .await;
                if task_cancel.is_cancelled() {
                    break;
                }

                match result {
                    Ok(Some(state)) if state.is_active() => {
                        tracing::trace!(patient = %patient, scope = %scope, "grant still active");
                    }
                    Ok(_) => {
                        tracing::info!(patient = %patient, doctor = %doctor, scope = %scope, "grant no longer active, clearing view");
                        *data.write().await = None;
                        break;
                    }
                    Err(PodError::Forbidden { url }) => {
                        tracing::info!(patient = %patient, url = %url, "grant state forbidden, clearing view");
                        *data.write().await = None;
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(patient = %patient, scope = %scope, error = %e, "revocation check failed");
                    }
                }
            }
        });

        Self { cancel, handle }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RevocationPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A doctor's view of one patient's record.
pub struct DoctorView {
    cfg: Arc<CoreConfig>,
    session: SessionContext,
    patient: PatientPod,
    scope: String,
    data: SharedData,
    cancel: CancelFlag,
    poller: Option<RevocationPoller>,
}

impl DoctorView {
    pub fn new(
        cfg: Arc<CoreConfig>,
        session: SessionContext,
        patient: PatientPod,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            cfg,
            session,
            patient,
            scope: scope.into(),
            data: Arc::new(RwLock::new(None)),
            cancel: CancelFlag::new(),
            poller: None,
        }
    }

    pub fn patient(&self) -> &PatientPod {
        &self.patient
    }

    /// Cancels the load in progress, or the next one if none is running.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Run the gate, then fetch the record and the files shared with doctors.
    ///
    /// Returns `Ok(None)` when the load was cancelled. Any error resets the view to empty. On
    /// success a revocation poller is started.
    pub async fn load(&mut self) -> GateResult<Option<PatientData>> {
        self.stop_poller();
        *self.data.write().await = None;

        let result = self.fetch().await;
        self.cancel = CancelFlag::new();
        match result {
            Ok(Some(data)) => {
                *self.data.write().await = Some(data.clone());
                self.poller = Some(RevocationPoller::start(
                    self.cfg.clone(),
                    self.session.clone(),
                    self.patient.owner().clone(),
                    self.scope.clone(),
                    self.data.clone(),
                ));
                tracing::info!(patient = %self.patient.owner(), scope = %self.scope, "patient record loaded");
                Ok(Some(data))
            }
            Ok(None) => {
                tracing::debug!(patient = %self.patient.owner(), "load cancelled");
                Ok(None)
            }
            Err(e) => {
                *self.data.write().await = None;
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> GateResult<Option<PatientData>> {
        self.session.require_role(Role::Doctor, "view patient records")?;
        let cancel = self.cancel.clone();

        let gate = DoctorGate::new(self.cfg.clone(), self.session.clone());
        let grant = gate.gate_or_throw(self.patient.owner(), &self.scope).await?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let records = RecordStore::new(self.cfg.clone(), self.session.clone());
        let record = records.load_record(&self.patient).await?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let files = records
            .list_visible_files(&self.patient, Role::Doctor)
            .await?;
        if cancel.is_cancelled() {
            return Ok(None);
        }

        Ok(Some(PatientData {
            grant,
            record,
            files,
        }))
    }

    /// Acknowledge the legal notice for the current grant. Call [`DoctorView::load`] afterwards.
    pub async fn acknowledge(&self) -> GateResult<AckOutcome> {
        DoctorGate::new(self.cfg.clone(), self.session.clone())
            .acknowledge_grant(self.patient.owner(), &self.scope)
            .await
    }

    /// Currently loaded data, if any.
    pub async fn data(&self) -> Option<PatientData> {
        self.data.read().await.clone()
    }

    /// Back to the "nothing loaded" baseline.
    pub async fn clear(&mut self) {
        self.cancel.cancel();
        self.cancel = CancelFlag::new();
        self.stop_poller();
        *self.data.write().await = None;
    }

    /// Bind the view to another patient (or scope), dropping everything loaded so far.
    pub async fn switch_patient(&mut self, patient: PatientPod, scope: impl Into<String>) {
        self.clear().await;
        self.patient = patient;
        self.scope = scope.into();
    }

    fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
    }
}

impl Drop for DoctorView {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.stop_poller();
    }
}
