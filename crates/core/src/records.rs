//! Health record and files resources in a patient's pod.
//!
//! Both live in the health container by convention:
//!
//! - `<pod root><health path>record.json`: the full record document
//! - `<pod root><health path>files.json`: a JSON array of [`FileEntry`]
//!
//! Every mutation reads the whole document, changes it in memory and PUTs it back. Concurrent
//! editors therefore race and the last writer wins.

use crate::client::ResourceClient;
use crate::config::parse_container_url;
use crate::session::SessionContext;
use crate::{CoreConfig, PodError, PodResult};
use pod_types::{Role, WebId};
use pod_uuid::{Timestamp, TimestampGenerator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// A patient's pod: its owner and root container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientPod {
    owner: WebId,
    root: Url,
}

impl PatientPod {
    pub fn new(owner: WebId, root: &str) -> PodResult<Self> {
        Ok(Self {
            owner,
            root: parse_container_url(root)?,
        })
    }

    pub fn owner(&self) -> &WebId {
        &self.owner
    }

    pub fn root(&self) -> &Url {
        &self.root
    }
}

/// Resolved health resource locations for one pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthPaths {
    pub container: Url,
    pub record: Url,
    pub files: Url,
}

impl HealthPaths {
    pub fn resolve(cfg: &CoreConfig, pod: &PatientPod) -> PodResult<Self> {
        let join = |base: &Url, relative: &str| {
            base.join(relative).map_err(|e| PodError::InvalidUrl {
                url: format!("{base}{relative}"),
                reason: e.to_string(),
            })
        };
        let container = join(pod.root(), cfg.health_path())?;
        Ok(Self {
            record: join(&container, cfg.record_filename())?,
            files: join(&container, cfg.files_filename())?,
            container,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthRecord {
    pub patient_name: String,
    pub date_of_birth: String,
    pub blood_type: String,
    pub address: String,
    pub allergies: String,
    pub diagnoses: String,
    pub medications: String,
    pub notes: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Lab,
    Prescription,
    Imaging,
    Report,
    Note,
}

/// Which shared roles may see a file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SharingFlags {
    pub doctor: bool,
    pub emergency: bool,
    pub nurse: bool,
    pub pharmacy: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub created_by: WebId,
    #[serde(default)]
    pub shared_with: SharingFlags,
}

impl FileEntry {
    /// Whether `role` may see this file. Patients and governance always can.
    pub fn visible_to(&self, role: Role) -> bool {
        match role {
            Role::Patient | Role::Governance => true,
            Role::Doctor => self.shared_with.doctor,
            Role::EmergencyContact => self.shared_with.emergency,
            Role::Nurse => self.shared_with.nurse,
            Role::Pharmacy => self.shared_with.pharmacy,
        }
    }
}

/// Caller-supplied fields of a new or updated file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDraft {
    pub title: String,
    pub description: String,
    pub content: String,
    pub kind: FileKind,
    pub shared_with: SharingFlags,
}

impl FileDraft {
    fn validate(&self) -> PodResult<()> {
        if self.title.trim().is_empty() {
            return Err(PodError::InvalidInput("file title cannot be empty".into()));
        }
        Ok(())
    }
}

/// Record and files operations for one session.
#[derive(Clone, Debug)]
pub struct RecordStore {
    cfg: Arc<CoreConfig>,
    session: SessionContext,
}

impl RecordStore {
    pub fn new(cfg: Arc<CoreConfig>, session: SessionContext) -> Self {
        Self { cfg, session }
    }

    fn client(&self) -> ResourceClient {
        self.session.client()
    }

    pub fn paths(&self, pod: &PatientPod) -> PodResult<HealthPaths> {
        HealthPaths::resolve(&self.cfg, pod)
    }

    fn owns(&self, pod: &PatientPod) -> bool {
        self.session.role() == Role::Patient && self.session.web_id() == pod.owner()
    }

    /// Load the health record.
    ///
    /// When the record is absent and the session is the owning patient, a default empty
    /// record is written and returned. Anyone else gets `None`.
    pub async fn load_record(&self, pod: &PatientPod) -> PodResult<Option<HealthRecord>> {
        let paths = self.paths(pod)?;
        if let Some(record) = self.client().get_json(&paths.record).await? {
            return Ok(Some(record));
        }
        if !self.owns(pod) {
            return Ok(None);
        }

        let record = HealthRecord::default();
        self.client().put_json(&paths.record, &record).await?;
        tracing::info!(url = %paths.record, "created empty health record");
        Ok(Some(record))
    }

    /// Replace the whole record.
    pub async fn save_record(&self, pod: &PatientPod, record: &HealthRecord) -> PodResult<()> {
        let paths = self.paths(pod)?;
        self.client().put_json(&paths.record, record).await?;
        tracing::info!(url = %paths.record, "health record saved");
        Ok(())
    }

    /// All files in stored order. An absent listing is empty.
    pub async fn list_files(&self, pod: &PatientPod) -> PodResult<Vec<FileEntry>> {
        let paths = self.paths(pod)?;
        Ok(self.client().get_json(&paths.files).await?.unwrap_or_default())
    }

    /// Files `role` may see, in stored order.
    pub async fn list_visible_files(&self, pod: &PatientPod, role: Role) -> PodResult<Vec<FileEntry>> {
        let mut files = self.list_files(pod).await?;
        files.retain(|f| f.visible_to(role));
        Ok(files)
    }

    async fn write_files(&self, pod: &PatientPod, files: &[FileEntry]) -> PodResult<()> {
        let paths = self.paths(pod)?;
        self.client().put_json(&paths.files, &files).await
    }

    /// Append a file to the end of the listing.
    pub async fn add_file(&self, pod: &PatientPod, draft: FileDraft) -> PodResult<FileEntry> {
        draft.validate()?;
        let mut files = self.list_files(pod).await?;
        let now = TimestampGenerator::now();
        let entry = FileEntry {
            id: Uuid::new_v4(),
            title: draft.title,
            description: draft.description,
            content: draft.content,
            kind: draft.kind,
            created_at: now,
            updated_at: now,
            created_by: self.session.web_id().clone(),
            shared_with: draft.shared_with,
        };
        files.push(entry.clone());
        self.write_files(pod, &files).await?;
        tracing::info!(file_id = %entry.id, kind = ?entry.kind, "file added");
        Ok(entry)
    }

    /// Replace the editable fields of file `id`, keeping its position.
    pub async fn update_file(&self, pod: &PatientPod, id: Uuid, draft: FileDraft) -> PodResult<FileEntry> {
        draft.validate()?;
        let mut files = self.list_files(pod).await?;
        let entry = files
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or(PodError::FileNotFound(id))?;

        entry.title = draft.title;
        entry.description = draft.description;
        entry.content = draft.content;
        entry.kind = draft.kind;
        entry.shared_with = draft.shared_with;
        entry.updated_at = TimestampGenerator::now();
        let updated = entry.clone();

        self.write_files(pod, &files).await?;
        tracing::info!(file_id = %id, "file updated");
        Ok(updated)
    }

    /// Remove file `id`; the remaining files keep their order.
    pub async fn delete_file(&self, pod: &PatientPod, id: Uuid) -> PodResult<()> {
        let mut files = self.list_files(pod).await?;
        let before = files.len();
        files.retain(|f| f.id != id);
        if files.len() == before {
            return Err(PodError::FileNotFound(id));
        }
        self.write_files(pod, &files).await?;
        tracing::info!(file_id = %id, "file deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Fixture;

    fn draft(title: &str) -> FileDraft {
        FileDraft {
            title: title.into(),
            description: String::new(),
            content: format!("{title} content"),
            kind: FileKind::Lab,
            shared_with: SharingFlags {
                doctor: true,
                ..SharingFlags::default()
            },
        }
    }

    #[test]
    fn test_paths() {
        let fx = Fixture::new();
        let paths = HealthPaths::resolve(&fx.cfg, &fx.patient_pod()).unwrap();
        assert_eq!(paths.container.as_str(), "https://alice.example/health/");
        assert_eq!(paths.record.as_str(), "https://alice.example/health/record.json");
        assert_eq!(paths.files.as_str(), "https://alice.example/health/files.json");
    }

    #[tokio::test]
    async fn test_owner_gets_default_record() {
        let fx = Fixture::new();
        let store = RecordStore::new(fx.cfg.clone(), fx.patient_session());
        let record = store.load_record(&fx.patient_pod()).await.unwrap();
        assert_eq!(record, Some(HealthRecord::default()));
        assert!(fx.pod.contains("https://alice.example/health/record.json"));
    }

    #[tokio::test]
    async fn test_others_get_none_for_absent_record() {
        let fx = Fixture::new();
        let store = RecordStore::new(fx.cfg.clone(), fx.doctor_session());
        let record = store.load_record(&fx.patient_pod()).await.unwrap();
        assert!(record.is_none());
        assert!(!fx.pod.contains("https://alice.example/health/record.json"));
    }

    #[tokio::test]
    async fn test_save_replaces_record() {
        let fx = Fixture::new();
        let store = RecordStore::new(fx.cfg.clone(), fx.patient_session());
        let pod = fx.patient_pod();
        let record = HealthRecord {
            patient_name: "Alice Example".into(),
            blood_type: "AB-".into(),
            ..HealthRecord::default()
        };
        store.save_record(&pod, &record).await.unwrap();
        assert_eq!(store.load_record(&pod).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_record_tolerates_missing_fields() {
        let fx = Fixture::new();
        fx.pod.insert(
            "https://alice.example/health/record.json",
            "application/json",
            r#"{"patientName": "Alice"}"#,
        );
        let store = RecordStore::new(fx.cfg.clone(), fx.doctor_session());
        let record = store.load_record(&fx.patient_pod()).await.unwrap().unwrap();
        assert_eq!(record.patient_name, "Alice");
        assert!(record.allergies.is_empty());
    }

    #[tokio::test]
    async fn test_delete_preserves_order() {
        let fx = Fixture::new();
        let store = RecordStore::new(fx.cfg.clone(), fx.patient_session());
        let pod = fx.patient_pod();

        let a = store.add_file(&pod, draft("a")).await.unwrap();
        let b = store.add_file(&pod, draft("b")).await.unwrap();
        let c = store.add_file(&pod, draft("c")).await.unwrap();

        store.delete_file(&pod, b.id).await.unwrap();
        let ids: Vec<Uuid> = store
            .list_files(&pod)
            .await
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![a.id, c.id]);

        let missing = store.delete_file(&pod, b.id).await;
        assert!(matches!(missing, Err(PodError::FileNotFound(id)) if id == b.id));
    }

    #[tokio::test]
    async fn test_update_keeps_position() {
        let fx = Fixture::new();
        let store = RecordStore::new(fx.cfg.clone(), fx.patient_session());
        let pod = fx.patient_pod();

        let a = store.add_file(&pod, draft("a")).await.unwrap();
        let b = store.add_file(&pod, draft("b")).await.unwrap();

        let mut changed = draft("a2");
        changed.kind = FileKind::Imaging;
        let updated = store.update_file(&pod, a.id, changed).await.unwrap();
        assert_eq!(updated.created_at, a.created_at);
        assert!(updated.updated_at > a.updated_at);

        let files = store.list_files(&pod).await.unwrap();
        assert_eq!(files[0].title, "a2");
        assert_eq!(files[0].kind, FileKind::Imaging);
        assert_eq!(files[1].id, b.id);
    }

    #[tokio::test]
    async fn test_visibility_by_role() {
        let fx = Fixture::new();
        let store = RecordStore::new(fx.cfg.clone(), fx.patient_session());
        let pod = fx.patient_pod();

        store.add_file(&pod, draft("shared")).await.unwrap();
        let mut private = draft("private");
        private.shared_with = SharingFlags::default();
        store.add_file(&pod, private).await.unwrap();

        let doctor_view = store.list_visible_files(&pod, Role::Doctor).await.unwrap();
        assert_eq!(doctor_view.len(), 1);
        assert_eq!(doctor_view[0].title, "shared");
        assert!(store
            .list_visible_files(&pod, Role::Pharmacy)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.list_visible_files(&pod, Role::Patient).await.unwrap().len(), 2);
    }

    #[test]
    fn test_file_wire_format() {
        let json = serde_json::json!({
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "title": "Blood panel",
            "description": "",
            "content": "Hb 13.5",
            "type": "lab",
            "createdAt": "2026-10-18T09:15:02.123Z",
            "updatedAt": "2026-10-18T09:15:02.123Z",
            "createdBy": "https://alice.example/#me",
            "sharedWith": {"doctor": true, "emergency": false, "nurse": false, "pharmacy": false},
        });
        let entry: FileEntry = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(entry.kind, FileKind::Lab);
        assert!(entry.visible_to(Role::Doctor));
        assert_eq!(serde_json::to_value(&entry).unwrap(), json);
    }

    #[tokio::test]
    async fn test_empty_title_rejected() {
        let fx = Fixture::new();
        let store = RecordStore::new(fx.cfg.clone(), fx.patient_session());
        let result = store.add_file(&fx.patient_pod(), draft(" ")).await;
        assert!(matches!(result, Err(PodError::InvalidInput(_))));
    }
}
