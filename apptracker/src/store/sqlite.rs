//! Relational backend on rusqlite.
//!
//! Opens run the full migration pipeline before any operation is accepted,
//! so a store handle always sits on a current-vocabulary schema. Referential
//! integrity is enforced by SQLite itself (`PRAGMA foreign_keys = ON`), and
//! cascade deletes ride on `ON DELETE CASCADE`.

use std::fs;
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::{Result, TrackerError};
use crate::migration;
use crate::models::{
    Activity, ActivityPatch, ActivityRow, Application, ApplicationFull, ApplicationPatch, Contact,
    ContactPatch, ContactRow, NewActivity, NewApplication, NewContact, Stats, Tag,
};
use crate::schema::StatusVocabulary;
use crate::store::{self, PatchSet, Store};
use crate::validation;

pub struct SqliteStore {
    conn: Connection,
    vocab: StatusVocabulary,
}

impl SqliteStore {
    pub fn open(path: &Path, vocab: StatusVocabulary) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Self::boot(Connection::open(path)?, vocab)
    }

    pub fn open_in_memory(vocab: StatusVocabulary) -> Result<Self> {
        Self::boot(Connection::open_in_memory()?, vocab)
    }

    fn boot(conn: Connection, vocab: StatusVocabulary) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&conn, &vocab)?;
        Ok(Self { conn, vocab })
    }

    /// Direct access for maintenance tooling and tests.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Runs a validated patch as a dynamic `UPDATE ... SET`. Returns affected
    /// rows; an unknown id simply matches nothing.
    fn apply_patch(&self, table: &str, id: i64, set: &PatchSet) -> Result<u64> {
        let mut assignments: Vec<String> = set
            .text
            .iter()
            .map(|(column, _)| format!("{column} = ?"))
            .collect();
        let mut values: Vec<Value> = set
            .text
            .iter()
            .map(|(_, value)| match value {
                Some(text) => Value::Text(text.clone()),
                None => Value::Null,
            })
            .collect();
        if let Some(app_id) = set.application_id {
            assignments.push("application_id = ?".to_string());
            values.push(Value::Integer(app_id));
        }
        values.push(Value::Integer(id));
        let sql = format!(
            "UPDATE {table} SET {} WHERE id = ?",
            assignments.join(", ")
        );
        let changes = self
            .conn
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(map_fk_violation)?;
        Ok(changes as u64)
    }
}

/// A violated application reference surfaces as the same "not found" payload
/// the document backend produces from its existence scan.
fn map_fk_violation(err: rusqlite::Error) -> TrackerError {
    if let rusqlite::Error::SqliteFailure(_, Some(message)) = &err {
        if message.contains("FOREIGN KEY constraint failed") {
            return TrackerError::NotFound("Application not found".to_string());
        }
    }
    err.into()
}

fn application_from_row(row: &Row<'_>) -> rusqlite::Result<Application> {
    Ok(Application {
        id: row.get("id")?,
        company: row.get("company")?,
        role: row.get("role")?,
        status: row.get("status")?,
        url: row.get("url")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
    })
}

fn contact_from_row(row: &Row<'_>) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get("id")?,
        application_id: row.get("application_id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        phone: row.get("phone")?,
        title: row.get("title")?,
        linkedin: row.get("linkedin")?,
        created_at: row.get("created_at")?,
    })
}

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get("id")?,
        application_id: row.get("application_id")?,
        kind: row.get("type")?,
        date: row.get("date")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
    })
}

impl Store for SqliteStore {
    fn allowed_statuses(&self) -> Vec<String> {
        self.vocab.labels().to_vec()
    }

    fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            applications: self.count("applications")?,
            contacts: self.count("contacts")?,
            activities: self.count("activities")?,
        })
    }

    fn create_application(&mut self, input: &NewApplication) -> Result<i64> {
        let valid = store::validate_new_application(input, &self.vocab)?;
        self.conn.execute(
            "INSERT INTO applications (company, role, status, url, notes) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![valid.company, valid.role, valid.status, valid.url, valid.notes],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_applications(&self) -> Result<Vec<Application>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, company, role, status, url, notes, created_at \
             FROM applications ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map([], application_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn update_application(&mut self, id: i64, patch: &ApplicationPatch) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let set = store::validate_application_patch(patch, &self.vocab)?;
        if set.is_empty() {
            return Ok(0);
        }
        self.apply_patch("applications", id, &set)
    }

    fn delete_application(&mut self, id: i64) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let changes = self
            .conn
            .execute("DELETE FROM applications WHERE id = ?1", params![id])?;
        Ok(changes as u64)
    }

    fn get_application_full(&self, id: i64) -> Result<Option<ApplicationFull>> {
        let id = validation::positive_id(id, "id")?;
        let application = self
            .conn
            .query_row(
                "SELECT id, company, role, status, url, notes, created_at \
                 FROM applications WHERE id = ?1",
                params![id],
                application_from_row,
            )
            .optional()?;
        let Some(application) = application else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, name, email, phone, title, linkedin, created_at \
             FROM contacts WHERE application_id = ?1 ORDER BY id ASC",
        )?;
        let contacts = stmt
            .query_map(params![id], contact_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT id, application_id, type, date, notes, created_at \
             FROM activities WHERE application_id = ?1 ORDER BY date DESC, id DESC",
        )?;
        let activities = stmt
            .query_map(params![id], activity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name FROM tags t \
             JOIN application_tags at ON at.tag_id = t.id \
             WHERE at.application_id = ?1 ORDER BY t.name ASC",
        )?;
        let tags = stmt
            .query_map(params![id], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(ApplicationFull {
            application,
            contacts,
            activities,
            tags,
        }))
    }

    fn create_contact(&mut self, input: &NewContact) -> Result<i64> {
        let valid = store::validate_new_contact(input)?;
        self.conn
            .execute(
                "INSERT INTO contacts (application_id, name, email, phone, title, linkedin) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    valid.application_id,
                    valid.name,
                    valid.email,
                    valid.phone,
                    valid.title,
                    valid.linkedin
                ],
            )
            .map_err(map_fk_violation)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_contacts(&self) -> Result<Vec<ContactRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.application_id, c.name, c.email, c.phone, c.title, c.linkedin, \
                    c.created_at, a.company AS application_company, a.role AS application_role \
             FROM contacts c \
             LEFT JOIN applications a ON a.id = c.application_id \
             ORDER BY c.created_at DESC, c.id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ContactRow {
                contact: contact_from_row(row)?,
                application_company: row.get("application_company")?,
                application_role: row.get("application_role")?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn update_contact(&mut self, id: i64, patch: &ContactPatch) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let set = store::validate_contact_patch(patch)?;
        if set.is_empty() {
            return Ok(0);
        }
        self.apply_patch("contacts", id, &set)
    }

    fn delete_contact(&mut self, id: i64) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let changes = self
            .conn
            .execute("DELETE FROM contacts WHERE id = ?1", params![id])?;
        Ok(changes as u64)
    }

    fn create_activity(&mut self, input: &NewActivity) -> Result<i64> {
        let valid = store::validate_new_activity(input)?;
        self.conn
            .execute(
                "INSERT INTO activities (application_id, type, date, notes) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![valid.application_id, valid.kind, valid.date, valid.notes],
            )
            .map_err(map_fk_violation)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_activities(&self) -> Result<Vec<ActivityRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT ac.id, ac.application_id, ac.type, ac.date, ac.notes, ac.created_at, \
                    a.company AS application_company, a.role AS application_role \
             FROM activities ac \
             LEFT JOIN applications a ON a.id = ac.application_id \
             ORDER BY ac.created_at DESC, ac.id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(ActivityRow {
                activity: activity_from_row(row)?,
                application_company: row.get("application_company")?,
                application_role: row.get("application_role")?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn update_activity(&mut self, id: i64, patch: &ActivityPatch) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let set = store::validate_activity_patch(patch)?;
        if set.is_empty() {
            return Ok(0);
        }
        self.apply_patch("activities", id, &set)
    }

    fn delete_activity(&mut self, id: i64) -> Result<u64> {
        let id = validation::positive_id(id, "id")?;
        let changes = self
            .conn
            .execute("DELETE FROM activities WHERE id = ?1", params![id])?;
        Ok(changes as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn memory_store() -> SqliteStore {
        SqliteStore::open_in_memory(StatusVocabulary::english()).unwrap()
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deep/tracker.db");
        let mut store = SqliteStore::open(&path, StatusVocabulary::english()).unwrap();
        store
            .create_application(&NewApplication {
                company: "Acme".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracker.db");
        {
            let mut store = SqliteStore::open(&path, StatusVocabulary::english()).unwrap();
            store
                .create_application(&NewApplication {
                    company: "Acme".to_string(),
                    status: Some("Applied".to_string()),
                    ..Default::default()
                })
                .unwrap();
        }
        let store = SqliteStore::open(&path, StatusVocabulary::english()).unwrap();
        let apps = store.list_applications().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].company, "Acme");
        assert_eq!(apps[0].status, "Applied");
    }

    #[test]
    fn test_open_migrates_legacy_vocabulary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracker.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE applications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    company TEXT NOT NULL,
                    role TEXT,
                    status TEXT NOT NULL DEFAULT 'Planned'
                        CHECK(status IN ('Planned','Applied','Interviewing','Offer','Hired','Rejected','On Hold')),
                    url TEXT,
                    notes TEXT,
                    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                );
                INSERT INTO applications (company, status) VALUES ('Acme', 'Interviewing');",
            )
            .unwrap();
        }
        let store = SqliteStore::open(&path, StatusVocabulary::german()).unwrap();
        let apps = store.list_applications().unwrap();
        assert_eq!(apps[0].status, "Vorstellungsgespräch");
    }

    #[test]
    fn test_contact_insert_maps_fk_failure() {
        let mut store = memory_store();
        let err = store
            .create_contact(&NewContact {
                application_id: 7,
                name: "Max".to_string(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(ref m) if m == "Application not found"));
    }

    #[test]
    fn test_get_full_tags_ordered_by_name() {
        let mut store = memory_store();
        let id = store
            .create_application(&NewApplication {
                company: "Acme".to_string(),
                ..Default::default()
            })
            .unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO tags (name) VALUES ('remote'), ('backend'), ('equity');
                 INSERT INTO application_tags (application_id, tag_id) VALUES (1, 1), (1, 2), (1, 3);",
            )
            .unwrap();
        let full = store.get_application_full(id).unwrap().unwrap();
        let names: Vec<&str> = full.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["backend", "equity", "remote"]);
    }

    #[test]
    fn test_tag_links_cascade_with_application() {
        let mut store = memory_store();
        let id = store
            .create_application(&NewApplication {
                company: "Acme".to_string(),
                ..Default::default()
            })
            .unwrap();
        store
            .connection()
            .execute_batch(
                "INSERT INTO tags (name) VALUES ('remote');
                 INSERT INTO application_tags (application_id, tag_id) VALUES (1, 1);",
            )
            .unwrap();
        store.delete_application(id).unwrap();
        let links: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM application_tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(links, 0);
        // Tags themselves survive; only the association rows cascade.
        let tags: i64 = store
            .connection()
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tags, 1);
    }

    #[test]
    fn test_check_constraint_backs_validation() {
        let store = memory_store();
        // The schema itself rejects out-of-vocabulary statuses even if a
        // writer bypasses the validation layer.
        let err = store
            .connection()
            .execute(
                "INSERT INTO applications (company, status) VALUES ('X', 'Bogus')",
                [],
            )
            .unwrap_err();
        assert!(err.to_string().contains("CHECK constraint failed"));
    }
}
