//! Entity records and the input/patch shapes the store operations take.
//! Callers always receive owned copies; nothing hands out references into
//! store state.

use serde::{Deserialize, Serialize};

/// The aggregate root. `created_at` is set by the store and immutable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Application {
    pub id: i64,
    pub company: String,
    pub role: Option<String>,
    pub status: String,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

/// A person tied to exactly one application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Contact {
    pub id: i64,
    pub application_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub linkedin: Option<String>,
    pub created_at: String,
}

/// A dated event tied to exactly one application. The wire field is `type`;
/// `kind` avoids the keyword in Rust.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    pub id: i64,
    pub application_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Many-to-many association row between applications and tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationTag {
    pub application_id: i64,
    pub tag_id: i64,
}

/// A contact list row enriched with its owning application's company and
/// role. The joined fields are null if the owner is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactRow {
    #[serde(flatten)]
    pub contact: Contact,
    pub application_company: Option<String>,
    pub application_role: Option<String>,
}

/// An activity list row with the same owner enrichment as `ContactRow`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRow {
    #[serde(flatten)]
    pub activity: Activity,
    pub application_company: Option<String>,
    pub application_role: Option<String>,
}

/// The single aggregate read: one application plus everything owned by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationFull {
    pub application: Application,
    pub contacts: Vec<Contact>,
    pub activities: Vec<Activity>,
    pub tags: Vec<Tag>,
}

/// Live row counts per entity. Never cached; always reflects current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub applications: i64,
    pub contacts: i64,
    pub activities: i64,
}

// ── Inputs ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewApplication {
    pub company: String,
    pub role: Option<String>,
    /// Defaults to the vocabulary's first label when absent.
    pub status: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
}

/// Partial update. `None` means "leave unchanged"; a present-but-empty string
/// clears an optional column to NULL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationPatch {
    pub company: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContact {
    pub application_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub linkedin: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub title: Option<String>,
    pub linkedin: Option<String>,
    /// Reassign to a different application; the new target is re-validated.
    pub application_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewActivity {
    pub application_id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityPatch {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub date: Option<String>,
    pub notes: Option<String>,
    pub application_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_serializes_kind_as_type() {
        let activity = Activity {
            id: 1,
            application_id: 2,
            kind: "Phone Screen".to_string(),
            date: None,
            notes: None,
            created_at: "2026-01-01 00:00:00".to_string(),
        };
        let json = serde_json::to_value(&activity).unwrap();
        assert_eq!(json["type"], "Phone Screen");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_contact_row_flattens() {
        let row = ContactRow {
            contact: Contact {
                id: 1,
                application_id: 1,
                name: "Max".to_string(),
                email: None,
                phone: None,
                title: None,
                linkedin: None,
                created_at: "2026-01-01 00:00:00".to_string(),
            },
            application_company: Some("Acme".to_string()),
            application_role: None,
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["name"], "Max");
        assert_eq!(json["application_company"], "Acme");
    }
}
