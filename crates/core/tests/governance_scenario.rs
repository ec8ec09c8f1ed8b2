//! End-to-end governance scenario over an in-memory pod.
//!
//! Governance bootstraps, the patient shares with the doctor, the doctor acknowledges the legal
//! notice and reads, the patient revokes, and the doctor's view is cleared within one poll
//! interval. Every step is checked against the audit log at the end.

use acp::MatcherMode;
use pod_core::{
    AccessControlService, AccessToggles, AckOutcome, AuditEventType, AuditLog, CoreConfig,
    DoctorView, FileDraft, FileKind, GateError, GovernanceStore, GrantService, GrantStatus,
    HealthRecord, MemoryPod, PatientPod, RecordStore, SessionContext, SharingFlags,
};
use pod_types::{Role, RoleTable, WebId};
use std::sync::Arc;
use std::time::Duration;

const SCOPE: &str = "record";

struct World {
    pod: MemoryPod,
    cfg: Arc<CoreConfig>,
    patient: WebId,
    doctor: WebId,
    governance: WebId,
}

impl World {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let governance = WebId::parse("https://gov.example/profile/card#me").unwrap();
        let patient = WebId::parse("https://alice.example/profile/card#me").unwrap();
        let doctor = WebId::parse("https://drbob.example/profile/card#me").unwrap();
        let roles = RoleTable::new()
            .with(patient.clone(), Role::Patient)
            .with(doctor.clone(), Role::Doctor);

        let cfg = CoreConfig::new(
            "https://gov.example/",
            governance.clone(),
            roles,
            MatcherMode::restricted("https://app.example/clientid.jsonld", "https://idp.example")
                .unwrap(),
        )
        .unwrap()
        .with_poll_interval(Duration::from_secs(5))
        .unwrap();

        Self {
            pod: MemoryPod::new(),
            cfg: Arc::new(cfg),
            patient,
            doctor,
            governance,
        }
    }

    fn session(&self, web_id: &WebId) -> SessionContext {
        SessionContext::new(Arc::new(self.pod.session(web_id.clone())), self.cfg.roles()).unwrap()
    }

    fn patient_pod(&self) -> PatientPod {
        PatientPod::new(self.patient.clone(), "https://alice.example/").unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_share_read_revoke_clear() {
    let world = World::new();
    let patient = world.session(&world.patient);
    let doctor = world.session(&world.doctor);
    let governance = world.session(&world.governance);
    let pod = world.patient_pod();

    // Governance bootstrap, twice.
    let store = GovernanceStore::new(world.cfg.clone());
    let first = store.bootstrap(&governance).await.unwrap();
    let second = store.bootstrap(&governance).await.unwrap();
    assert_eq!(first.created.len(), 6);
    assert!(second.created.is_empty());
    assert!(!second.terms_written);

    // The patient fills in the record and adds a shared file.
    let records = RecordStore::new(world.cfg.clone(), patient.clone());
    let mut record = records.load_record(&pod).await.unwrap().unwrap();
    record.patient_name = "Alice Example".into();
    record.allergies = "penicillin".into();
    records.save_record(&pod, &record).await.unwrap();
    records
        .add_file(
            &pod,
            FileDraft {
                title: "Blood panel".into(),
                description: "annual".into(),
                content: "Hb 13.5".into(),
                kind: FileKind::Lab,
                shared_with: SharingFlags {
                    doctor: true,
                    ..SharingFlags::default()
                },
            },
        )
        .await
        .unwrap();

    // The patient shares with the doctor only.
    let access = AccessControlService::new(world.cfg.clone(), patient.clone());
    let applied = access
        .apply_access_control(
            &pod,
            AccessToggles {
                doctor: true,
                ..AccessToggles::default()
            },
            SCOPE,
        )
        .await
        .unwrap();
    assert_eq!(applied.granted.len(), 1);
    let read_back = access.read_access_grants(&pod).await;
    assert!(read_back.doctor_granted);
    assert!(!read_back.emergency_granted);

    // First doctor read is blocked on the legal notice.
    let mut view = DoctorView::new(world.cfg.clone(), doctor.clone(), pod.clone(), SCOPE);
    match view.load().await {
        Err(GateError::LegalNoticeRequired(notice)) => {
            assert_eq!(notice.grant_id, applied.granted[0].grant_id);
            assert_eq!(notice.text, world.cfg.terms().text());
        }
        other => panic!("expected legal notice, got {other:?}"),
    }

    assert!(matches!(view.acknowledge().await.unwrap(), AckOutcome::Recorded(_)));
    let data = view.load().await.unwrap().unwrap();
    assert_eq!(
        data.record,
        Some(HealthRecord {
            patient_name: "Alice Example".into(),
            allergies: "penicillin".into(),
            ..HealthRecord::default()
        })
    );
    assert_eq!(data.files.len(), 1);

    // Revocation is noticed within one poll interval.
    let revoked = GrantService::new(world.cfg.clone(), patient.clone())
        .revoke_active_grant(&world.patient, &world.doctor, SCOPE)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(revoked.status, GrantStatus::Revoked);
    assert!(view.data().await.is_some());

    tokio::time::sleep(world.cfg.poll_interval() + Duration::from_millis(1)).await;
    assert!(view.data().await.is_none());
    assert!(!view.is_polling());
    assert!(matches!(view.load().await, Err(GateError::NoActiveGrant)));

    // The audit trail, newest first, all hashes intact.
    let events = AuditLog::new(world.cfg.clone(), governance.clone())
        .list(100)
        .await
        .unwrap();
    assert!(events.iter().all(|e| e.verify_hash()));
    let types: Vec<AuditEventType> = events.iter().rev().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            AuditEventType::Bootstrap,
            AuditEventType::Bootstrap,
            AuditEventType::Grant,
            AuditEventType::ReadBlocked,
            AuditEventType::NoticeAck,
            AuditEventType::Revoke,
            AuditEventType::ReadBlocked,
        ]
    );

    let limited = AuditLog::new(world.cfg.clone(), governance)
        .list(events.len() - 1)
        .await
        .unwrap();
    assert_eq!(limited.len(), events.len() - 1);
    assert_eq!(limited[0].id, events[0].id);
}

#[tokio::test]
async fn test_regrant_needs_fresh_acknowledgement() {
    let world = World::new();
    let patient = world.session(&world.patient);
    let doctor = world.session(&world.doctor);
    GovernanceStore::new(world.cfg.clone())
        .bootstrap(&world.session(&world.governance))
        .await
        .unwrap();

    let grants = GrantService::new(world.cfg.clone(), patient);
    let g1 = grants
        .create_grant_and_activate(&world.patient, &world.doctor, SCOPE)
        .await
        .unwrap();

    let mut view = DoctorView::new(world.cfg.clone(), doctor, world.patient_pod(), SCOPE);
    view.acknowledge().await.unwrap();
    assert!(view.load().await.unwrap().is_some());

    grants
        .revoke_active_grant(&world.patient, &world.doctor, SCOPE)
        .await
        .unwrap();
    let g2 = grants
        .create_grant_and_activate(&world.patient, &world.doctor, SCOPE)
        .await
        .unwrap();
    assert_ne!(g1.grant_id, g2.grant_id);

    match view.load().await {
        Err(GateError::LegalNoticeRequired(notice)) => assert_eq!(notice.grant_id, g2.grant_id),
        other => panic!("expected legal notice, got {other:?}"),
    }
}
