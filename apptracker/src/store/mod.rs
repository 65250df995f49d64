//! The store contract and backend selection.
//!
//! One `Store` trait, two implementations. Callers pick a backend in
//! `OpenOptions` and never branch on it again; both adapters expose identical
//! observable behavior, down to error payloads and list orderings.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};

use crate::error::Result;
use crate::models::{
    Activity, ActivityPatch, ActivityRow, Application, ApplicationFull, ApplicationPatch,
    ContactPatch, ContactRow, NewActivity, NewApplication, NewContact, Stats,
};
use crate::schema::StatusVocabulary;
use crate::validation;

pub mod json;
pub mod sqlite;

pub use json::JsonStore;
pub use sqlite::SqliteStore;

/// Where the persisted state lives.
#[derive(Debug, Clone)]
pub enum Backend {
    /// SQLite file; parent directories are created as needed.
    Sqlite { path: PathBuf },
    /// SQLite without a file, for tests and scratch sessions.
    SqliteInMemory,
    /// Single JSON document; `None` runs pure in-memory.
    Json { path: Option<PathBuf> },
}

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub backend: Backend,
    pub vocabulary: StatusVocabulary,
}

impl OpenOptions {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            vocabulary: StatusVocabulary::default(),
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: StatusVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }
}

/// Open a store, running migrations (relational) or document normalization
/// (JSON) before any operation is accepted.
pub fn open_store(options: OpenOptions) -> Result<Box<dyn Store>> {
    let OpenOptions {
        backend,
        vocabulary,
    } = options;
    Ok(match backend {
        Backend::Sqlite { path } => Box::new(SqliteStore::open(&path, vocabulary)?),
        Backend::SqliteInMemory => Box::new(SqliteStore::open_in_memory(vocabulary)?),
        Backend::Json { path } => Box::new(JsonStore::open(path, vocabulary)?),
    })
}

/// The operation surface exposed to the GUI layer. Both backends implement
/// this contract with identical semantics; mutations return the number of
/// affected rows, and an unknown id is `0` changes rather than an error.
pub trait Store {
    /// The active vocabulary, in pipeline order.
    fn allowed_statuses(&self) -> Vec<String>;

    /// Live row counts. Never cached.
    fn stats(&self) -> Result<Stats>;

    fn create_application(&mut self, input: &NewApplication) -> Result<i64>;
    fn list_applications(&self) -> Result<Vec<Application>>;
    fn update_application(&mut self, id: i64, patch: &ApplicationPatch) -> Result<u64>;
    /// Deleting an application cascades to its contacts, activities, and tag
    /// associations.
    fn delete_application(&mut self, id: i64) -> Result<u64>;
    fn get_application_full(&self, id: i64) -> Result<Option<ApplicationFull>>;

    fn create_contact(&mut self, input: &NewContact) -> Result<i64>;
    fn list_contacts(&self) -> Result<Vec<ContactRow>>;
    fn update_contact(&mut self, id: i64, patch: &ContactPatch) -> Result<u64>;
    fn delete_contact(&mut self, id: i64) -> Result<u64>;

    fn create_activity(&mut self, input: &NewActivity) -> Result<i64>;
    fn list_activities(&self) -> Result<Vec<ActivityRow>>;
    fn update_activity(&mut self, id: i64, patch: &ActivityPatch) -> Result<u64>;
    fn delete_activity(&mut self, id: i64) -> Result<u64>;

    /// Insert one sample application with a contact and an activity, only if
    /// the store is empty. Safe to call repeatedly.
    fn seed_sample_data(&mut self) -> Result<()> {
        if self.stats()?.applications > 0 {
            return Ok(());
        }
        let status = self.allowed_statuses().into_iter().nth(1);
        let app_id = self.create_application(&NewApplication {
            company: "OpenAI".to_string(),
            role: Some("Software Engineer".to_string()),
            status,
            url: Some("https://openai.com/careers".to_string()),
            notes: Some("Exciting opportunity".to_string()),
        })?;
        self.create_contact(&NewContact {
            application_id: app_id,
            name: "Alex Doe".to_string(),
            email: Some("alex@example.com".to_string()),
            title: Some("Recruiter".to_string()),
            ..Default::default()
        })?;
        self.create_activity(&NewActivity {
            application_id: app_id,
            kind: "Phone Screen".to_string(),
            date: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            notes: Some("Intro call".to_string()),
        })?;
        Ok(())
    }
}

// ── Shared write-path plumbing ──────────────────────────────────
//
// Both adapters funnel writes through these validators so the two backends
// cannot drift apart on normalization or error payloads. A `PatchSet` is the
// validated form of a partial update: column assignments plus an optional
// foreign-key reassignment that still needs an existence check.

/// Timestamps match SQLite's `CURRENT_TIMESTAMP` shape so list orderings
/// agree across backends.
pub(crate) fn now_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(crate) struct ValidApplication {
    pub company: String,
    pub role: Option<String>,
    pub status: String,
    pub url: Option<String>,
    pub notes: Option<String>,
}

pub(crate) struct ValidContact {
    pub application_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub linkedin: Option<String>,
}

pub(crate) struct ValidActivity {
    pub application_id: i64,
    pub kind: String,
    pub date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Default)]
pub(crate) struct PatchSet {
    /// Column assignments; `None` clears the column to NULL.
    pub text: Vec<(&'static str, Option<String>)>,
    /// Reassignment target, validated for existence by the adapter.
    pub application_id: Option<i64>,
}

impl PatchSet {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.application_id.is_none()
    }
}

pub(crate) fn validate_new_application(
    input: &NewApplication,
    vocab: &StatusVocabulary,
) -> Result<ValidApplication> {
    let company = validation::required_string(Some(input.company.as_str()), "company")?;
    let status = match input.status.as_deref() {
        Some(s) if !s.trim().is_empty() => validation::validate_status(s, vocab)?,
        _ => vocab.default_status().to_string(),
    };
    Ok(ValidApplication {
        company,
        role: validation::optional_string(input.role.as_deref()),
        status,
        url: validation::validate_application_url(input.url.as_deref())?,
        notes: validation::optional_string(input.notes.as_deref()),
    })
}

pub(crate) fn validate_application_patch(
    patch: &ApplicationPatch,
    vocab: &StatusVocabulary,
) -> Result<PatchSet> {
    let mut set = PatchSet::default();
    if let Some(company) = &patch.company {
        set.text
            .push(("company", Some(validation::non_empty_string(company, "company")?)));
    }
    if let Some(role) = &patch.role {
        set.text.push(("role", validation::optional_string(Some(role))));
    }
    if let Some(status) = &patch.status {
        set.text
            .push(("status", Some(validation::validate_status(status, vocab)?)));
    }
    if let Some(url) = &patch.url {
        set.text
            .push(("url", validation::validate_application_url(Some(url))?));
    }
    if let Some(notes) = &patch.notes {
        set.text.push(("notes", validation::optional_string(Some(notes))));
    }
    Ok(set)
}

pub(crate) fn validate_new_contact(input: &NewContact) -> Result<ValidContact> {
    if input.application_id <= 0 {
        return Err(crate::TrackerError::Validation(
            "'applicationId' is required".to_string(),
        ));
    }
    Ok(ValidContact {
        application_id: input.application_id,
        name: validation::required_string(Some(input.name.as_str()), "name")?,
        email: validation::optional_string(input.email.as_deref()),
        phone: validation::optional_string(input.phone.as_deref()),
        title: validation::optional_string(input.title.as_deref()),
        linkedin: validation::validate_linkedin_url(input.linkedin.as_deref())?,
    })
}

pub(crate) fn validate_contact_patch(patch: &ContactPatch) -> Result<PatchSet> {
    let mut set = PatchSet::default();
    if let Some(name) = &patch.name {
        set.text
            .push(("name", Some(validation::non_empty_string(name, "name")?)));
    }
    if let Some(email) = &patch.email {
        set.text.push(("email", validation::optional_string(Some(email))));
    }
    if let Some(phone) = &patch.phone {
        set.text.push(("phone", validation::optional_string(Some(phone))));
    }
    if let Some(title) = &patch.title {
        set.text.push(("title", validation::optional_string(Some(title))));
    }
    if let Some(linkedin) = &patch.linkedin {
        set.text
            .push(("linkedin", validation::validate_linkedin_url(Some(linkedin))?));
    }
    if let Some(app_id) = patch.application_id {
        set.application_id = Some(validation::positive_id(app_id, "applicationId")?);
    }
    Ok(set)
}

pub(crate) fn validate_new_activity(input: &NewActivity) -> Result<ValidActivity> {
    if input.application_id <= 0 {
        return Err(crate::TrackerError::Validation(
            "'applicationId' is required".to_string(),
        ));
    }
    Ok(ValidActivity {
        application_id: input.application_id,
        kind: validation::required_string(Some(input.kind.as_str()), "type")?,
        date: validation::normalize_date(input.date.as_deref())?,
        notes: validation::optional_string(input.notes.as_deref()),
    })
}

pub(crate) fn validate_activity_patch(patch: &ActivityPatch) -> Result<PatchSet> {
    let mut set = PatchSet::default();
    if let Some(kind) = &patch.kind {
        set.text
            .push(("type", Some(validation::non_empty_string(kind, "type")?)));
    }
    if let Some(date) = &patch.date {
        set.text.push(("date", validation::normalize_date(Some(date))?));
    }
    if let Some(notes) = &patch.notes {
        set.text.push(("notes", validation::optional_string(Some(notes))));
    }
    if let Some(app_id) = patch.application_id {
        set.application_id = Some(validation::positive_id(app_id, "applicationId")?);
    }
    Ok(set)
}

/// Newest first: `created_at` descending, ties broken by id descending.
pub(crate) fn newest_first(
    a_created: &str,
    a_id: i64,
    b_created: &str,
    b_id: i64,
) -> std::cmp::Ordering {
    b_created.cmp(a_created).then(b_id.cmp(&a_id))
}

/// Activity order inside the full-application read: dated entries newest
/// first, undated entries last, ties broken by id descending. Matches
/// SQLite's `ORDER BY date DESC, id DESC` (NULL sorts last under DESC).
pub(crate) fn activity_date_order(a: &Activity, b: &Activity) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let by_date = match (&a.date, &b.date) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_date.then(b.id.cmp(&a.id))
}
