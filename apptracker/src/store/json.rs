//! Document backend: the whole store is one JSON file.
//!
//! Every mutation rewrites the document through a temp-file rename, so a
//! crash mid-write leaves the previous document intact. Referential checks
//! and cascades that SQLite enforces declaratively are done here with linear
//! scans; at desktop-tracker scale that is never the bottleneck.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::models::{
    Activity, ActivityPatch, ActivityRow, Application, ApplicationFull, ApplicationPatch, Contact,
    ContactPatch, ContactRow, NewActivity, NewApplication, NewContact, Stats, Tag,
};
use crate::schema::StatusVocabulary;
use crate::store::{self, PatchSet, Store};
use crate::validation;

/// Per-entity id counters. Persisted for readability of the document, but
/// authoritative state is recomputed from the arrays on load.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Counters {
    applications: i64,
    contacts: i64,
    activities: i64,
    tags: i64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Document {
    meta: Counters,
    applications: Vec<Application>,
    contacts: Vec<Contact>,
    activities: Vec<Activity>,
    tags: Vec<Tag>,
    application_tags: Vec<crate::models::ApplicationTag>,
}

impl Document {
    /// Counters are max(existing id) + 1 regardless of what the file says;
    /// a stale or absent `meta` block can never cause id reuse.
    fn recompute_counters(&mut self) {
        fn next(ids: impl Iterator<Item = i64>) -> i64 {
            ids.max().unwrap_or(0) + 1
        }
        self.meta = Counters {
            applications: next(self.applications.iter().map(|a| a.id)),
            contacts: next(self.contacts.iter().map(|c| c.id)),
            activities: next(self.activities.iter().map(|a| a.id)),
            tags: next(self.tags.iter().map(|t| t.id)),
        };
    }
}

pub struct JsonStore {
    path: Option<PathBuf>,
    data: Document,
    vocab: StatusVocabulary,
}

impl JsonStore {
    /// `None` keeps everything in memory; useful for tests and previews.
    pub fn open(path: Option<PathBuf>, vocab: StatusVocabulary) -> Result<Self> {
        if let Some(path) = &path {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
        }
        let data = match &path {
            Some(path) if path.exists() => Self::load(path),
            _ => Document::default(),
        };
        Ok(Self { path, data, vocab })
    }

    /// A document that cannot be read or parsed degrades to an empty store
    /// rather than refusing to open.
    fn load(path: &Path) -> Document {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("cannot read {}: {err}; starting empty", path.display());
                return Document::default();
            }
        };
        let mut doc = match serde_json::from_str::<Document>(&text) {
            Ok(doc) => doc,
            Err(err) => {
                log::warn!("corrupt document {}: {err}; starting empty", path.display());
                Document::default()
            }
        };
        doc.recompute_counters();
        doc
    }

    /// Write-through: serialize to a sibling temp file, then rename over the
    /// target. No-op in memory mode.
    fn persist(&self) -> Result<()> {
        let path = match &self.path {
            Some(path) => path,
            None => return Ok(()),
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(&self.data)?.as_bytes())?;
        tmp.persist(path).map_err(|err| TrackerError::Io(err.error))?;
        Ok(())
    }

    fn take_id(counter: &mut i64) -> i64 {
        if *counter < 1 {
            *counter = 1;
        }
        let id = *counter;
        *counter += 1;
        id
    }

    fn application_exists(&self, id: i64) -> bool {
        self.data.applications.iter().any(|a| a.id == id)
    }

    fn require_application(&self, id: i64) -> Result<()> {
        if self.application_exists(id) {
            Ok(())
        } else {
            Err(TrackerError::NotFound("Application not found".to_string()))
        }
    }

    fn owner(&self, application_id: i64) -> (Option<String>, Option<String>) {
        match self.data.applications.iter().find(|a| a.id == application_id) {
            Some(app) => (Some(app.company.clone()), app.role.clone()),
            None => (None, None),
        }
    }
}

fn apply_application_patch(app: &mut Application, set: &PatchSet) {
    for (column, value) in &set.text {
        match *column {
            "company" => {
                if let Some(value) = value {
                    app.company = value.clone();
                }
            }
            "role" => app.role = value.clone(),
            "status" => {
                if let Some(value) = value {
                    app.status = value.clone();
                }
            }
            "url" => app.url = value.clone(),
            "notes" => app.notes = value.clone(),
            _ => {}
        }
    }
}

fn apply_contact_patch(contact: &mut Contact, set: &PatchSet) {
    for (column, value) in &set.text {
        match *column {
            "name" => {
                if let Some(value) = value {
                    contact.name = value.clone();
                }
            }
            "email" => contact.email = value.clone(),
            "phone" => contact.phone = value.clone(),
            "title" => contact.title = value.clone(),
            "linkedin" => contact.linkedin = value.clone(),
            _ => {}
        }
    }
    if let Some(app_id) = set.application_id {
        contact.application_id = app_id;
    }
}

fn apply_activity_patch(activity: &mut Activity, set: &PatchSet) {
    for (column, value) in &set.text {
        match *column {
            "type" => {
                if let Some(value) = value {
                    activity.kind = value.clone();
                }
            }
            "date" => activity.date = value.clone(),
            "notes" => activity.notes = value.clone(),
            _ => {}
        }
    }
    if let Some(app_id) = set.application_id {
        activity.application_id = app_id;
    }
}

impl Store for JsonStore {
    fn allowed_statuses(&self) -> Vec<String> {
        self.vocab.labels().to_vec()
    }

    fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            applications: self.data.applications.len() as i64,
            contacts: self.data.contacts.len() as i64,
            activities: self.data.activities.len() as i64,
        })
    }

    fn create_application(&mut self, input: &NewApplication) -> Result<i64> {
        let valid = store::validate_new_application(input, &self.vocab)?;
        let id = Self::take_id(&mut self.data.meta.applications);
        self.data.applications.push(Application {
            id,
            company: valid.company,
            role: valid.role,
            status: valid.status,
            url: valid.url,
            notes: valid.notes,
            created_at: store::now_timestamp(),
        });
        self.persist()?;
        Ok(id)
    }

    fn list_applications(&self) -> Result<Vec<Application>> {
        let mut apps = self.data.applications.clone();
        apps.sort_by(|a, b| store::newest_first(&a.created_at, a.id, &b.created_at, b.id));
        Ok(apps)
    }

    fn update_application(&mut self, id: i64, patch: &ApplicationPatch) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let set = store::validate_application_patch(patch, &self.vocab)?;
        if set.is_empty() {
            return Ok(0);
        }
        let Some(app) = self.data.applications.iter_mut().find(|a| a.id == id) else {
            return Ok(0);
        };
        apply_application_patch(app, &set);
        self.persist()?;
        Ok(1)
    }

    fn delete_application(&mut self, id: i64) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let before = self.data.applications.len();
        self.data.applications.retain(|a| a.id != id);
        if self.data.applications.len() == before {
            return Ok(0);
        }
        // Cascade, same shape as ON DELETE CASCADE
        self.data.contacts.retain(|c| c.application_id != id);
        self.data.activities.retain(|a| a.application_id != id);
        self.data
            .application_tags
            .retain(|link| link.application_id != id);
        self.persist()?;
        Ok(1)
    }

    fn get_application_full(&self, id: i64) -> Result<Option<ApplicationFull>> {
        let id = validation::positive_id(id, "id")?;
        let Some(application) = self.data.applications.iter().find(|a| a.id == id).cloned()
        else {
            return Ok(None);
        };

        let mut contacts: Vec<Contact> = self
            .data
            .contacts
            .iter()
            .filter(|c| c.application_id == id)
            .cloned()
            .collect();
        contacts.sort_by_key(|c| c.id);

        let mut activities: Vec<Activity> = self
            .data
            .activities
            .iter()
            .filter(|a| a.application_id == id)
            .cloned()
            .collect();
        activities.sort_by(|a, b| store::activity_date_order(a, b));

        let mut tags: Vec<Tag> = self
            .data
            .application_tags
            .iter()
            .filter(|link| link.application_id == id)
            .filter_map(|link| self.data.tags.iter().find(|t| t.id == link.tag_id))
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Some(ApplicationFull {
            application,
            contacts,
            activities,
            tags,
        }))
    }

    fn create_contact(&mut self, input: &NewContact) -> Result<i64> {
        let valid = store::validate_new_contact(input)?;
        self.require_application(valid.application_id)?;
        let id = Self::take_id(&mut self.data.meta.contacts);
        self.data.contacts.push(Contact {
            id,
            application_id: valid.application_id,
            name: valid.name,
            email: valid.email,
            phone: valid.phone,
            title: valid.title,
            linkedin: valid.linkedin,
            created_at: store::now_timestamp(),
        });
        self.persist()?;
        Ok(id)
    }

    fn list_contacts(&self) -> Result<Vec<ContactRow>> {
        let mut contacts = self.data.contacts.clone();
        contacts.sort_by(|a, b| store::newest_first(&a.created_at, a.id, &b.created_at, b.id));
        Ok(contacts
            .into_iter()
            .map(|contact| {
                let (application_company, application_role) = self.owner(contact.application_id);
                ContactRow {
                    contact,
                    application_company,
                    application_role,
                }
            })
            .collect())
    }

    fn update_contact(&mut self, id: i64, patch: &ContactPatch) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let set = store::validate_contact_patch(patch)?;
        if set.is_empty() {
            return Ok(0);
        }
        // Unknown id is 0 changes, before the reassignment target is checked
        if !self.data.contacts.iter().any(|c| c.id == id) {
            return Ok(0);
        }
        if let Some(app_id) = set.application_id {
            self.require_application(app_id)?;
        }
        if let Some(contact) = self.data.contacts.iter_mut().find(|c| c.id == id) {
            apply_contact_patch(contact, &set);
        }
        self.persist()?;
        Ok(1)
    }

    fn delete_contact(&mut self, id: i64) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let before = self.data.contacts.len();
        self.data.contacts.retain(|c| c.id != id);
        if self.data.contacts.len() == before {
            return Ok(0);
        }
        self.persist()?;
        Ok(1)
    }

    fn create_activity(&mut self, input: &NewActivity) -> Result<i64> {
        let valid = store::validate_new_activity(input)?;
        self.require_application(valid.application_id)?;
        let id = Self::take_id(&mut self.data.meta.activities);
        self.data.activities.push(Activity {
            id,
            application_id: valid.application_id,
            kind: valid.kind,
            date: valid.date,
            notes: valid.notes,
            created_at: store::now_timestamp(),
        });
        self.persist()?;
        Ok(id)
    }

    fn list_activities(&self) -> Result<Vec<ActivityRow>> {
        let mut activities = self.data.activities.clone();
        activities.sort_by(|a, b| store::newest_first(&a.created_at, a.id, &b.created_at, b.id));
        Ok(activities
            .into_iter()
            .map(|activity| {
                let (application_company, application_role) = self.owner(activity.application_id);
                ActivityRow {
                    activity,
                    application_company,
                    application_role,
                }
            })
            .collect())
    }

    fn update_activity(&mut self, id: i64, patch: &ActivityPatch) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let set = store::validate_activity_patch(patch)?;
        if set.is_empty() {
            return Ok(0);
        }
        if !self.data.activities.iter().any(|a| a.id == id) {
            return Ok(0);
        }
        if let Some(app_id) = set.application_id {
            self.require_application(app_id)?;
        }
        if let Some(activity) = self.data.activities.iter_mut().find(|a| a.id == id) {
            apply_activity_patch(activity, &set);
        }
        self.persist()?;
        Ok(1)
    }

    fn delete_activity(&mut self, id: i64) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let before = self.data.activities.len();
        self.data.activities.retain(|a| a.id != id);
        if self.data.activities.len() == before {
            return Ok(0);
        }
        self.persist()?;
        Ok(1)
    }
}
