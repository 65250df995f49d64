//! Table definitions and the status vocabulary the schema is rendered from.

/// The ordered set of pipeline-stage labels an application's `status` may
/// take, plus a legacy remap table consulted only during migration.
///
/// The vocabulary is an explicit parameter of `open_store`; the store never
/// reads a global. The first label doubles as the create-time default.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusVocabulary {
    labels: Vec<String>,
    legacy: Vec<(String, String)>,
}

impl StatusVocabulary {
    /// The German vocabulary the tracker shipped with.
    ///
    /// The legacy table carries the pre-localization English labels and the
    /// mis-encoded variants of the accented labels found in databases written
    /// before the UTF-8 fix. They are historical data remapped once by the
    /// status migration, not part of the live vocabulary.
    pub fn german() -> Self {
        let labels = [
            "Geplant",
            "Beworben",
            "Vorstellungsgespräch",
            "Angebot",
            "Eingestellt",
            "Abgelehnt",
            "Zurückgestellt",
        ];
        let legacy = [
            ("Planned", "Geplant"),
            ("Applied", "Beworben"),
            ("Interviewing", "Vorstellungsgespräch"),
            ("VorstellungsgesprÃ¤ch", "Vorstellungsgespräch"),
            ("Vorstellungsgespr\u{c3}\u{fffd}ch", "Vorstellungsgespräch"),
            ("VorstellungsgesprÃch", "Vorstellungsgespräch"),
            ("Offer", "Angebot"),
            ("Hired", "Eingestellt"),
            ("Rejected", "Abgelehnt"),
            ("On Hold", "Zurückgestellt"),
            ("ZurÃ¼ckgestellt", "Zurückgestellt"),
            ("ZurÃckgestellt", "Zurückgestellt"),
        ];
        Self {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            legacy: legacy
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
        }
    }

    /// The untranslated English vocabulary. No legacy spellings to repair.
    pub fn english() -> Self {
        let labels = [
            "Planned",
            "Applied",
            "Interviewing",
            "Offer",
            "Hired",
            "Rejected",
            "On Hold",
        ];
        Self {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            legacy: Vec::new(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Status assigned when a create omits one.
    pub fn default_status(&self) -> &str {
        &self.labels[0]
    }

    pub fn contains(&self, status: &str) -> bool {
        self.labels.iter().any(|l| l == status)
    }

    /// Legacy remap entries, oldest spelling first.
    pub fn legacy(&self) -> &[(String, String)] {
        &self.legacy
    }

    /// Map a persisted status through the legacy table; values with no entry
    /// pass through unchanged.
    pub fn remap<'a>(&'a self, status: &'a str) -> &'a str {
        self.legacy
            .iter()
            .find(|(old, _)| old == status)
            .map(|(_, new)| new.as_str())
            .unwrap_or(status)
    }

    /// Comma-joined label list for validation error messages.
    pub fn allowed_list(&self) -> String {
        self.labels.join(", ")
    }
}

impl Default for StatusVocabulary {
    fn default() -> Self {
        Self::german()
    }
}

/// A dependent table's shape, shared by DDL generation and the rebuild
/// engine in `migration`.
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    create_body: &'static str,
}

impl TableDef {
    pub fn create_sql(&self, if_not_exists: bool) -> String {
        let clause = if if_not_exists { "IF NOT EXISTS " } else { "" };
        format!("CREATE TABLE {}{} {}", clause, self.name, self.create_body)
    }
}

pub const CONTACTS: TableDef = TableDef {
    name: "contacts",
    columns: &[
        "id",
        "application_id",
        "name",
        "email",
        "phone",
        "title",
        "linkedin",
        "created_at",
    ],
    create_body: "(
  id INTEGER PRIMARY KEY,
  application_id INTEGER NOT NULL,
  name TEXT,
  email TEXT,
  phone TEXT,
  title TEXT,
  linkedin TEXT,
  created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
  FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE CASCADE
)",
};

pub const ACTIVITIES: TableDef = TableDef {
    name: "activities",
    columns: &["id", "application_id", "type", "date", "notes", "created_at"],
    create_body: "(
  id INTEGER PRIMARY KEY,
  application_id INTEGER NOT NULL,
  type TEXT,
  date DATETIME,
  notes TEXT,
  created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
  FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE CASCADE
)",
};

pub const APPLICATION_TAGS: TableDef = TableDef {
    name: "application_tags",
    columns: &["application_id", "tag_id"],
    create_body: "(
  application_id INTEGER NOT NULL,
  tag_id INTEGER NOT NULL,
  PRIMARY KEY (application_id, tag_id),
  FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE CASCADE,
  FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
)",
};

/// Tables whose foreign keys point at `applications` and therefore need the
/// stale-reference repair after a schema rewrite.
pub const DEPENDENT_TABLES: &[&TableDef] = &[&CONTACTS, &ACTIVITIES, &APPLICATION_TAGS];

pub const APPLICATION_COLUMNS: &[&str] = &[
    "id",
    "company",
    "role",
    "status",
    "url",
    "notes",
    "created_at",
];

/// DDL for the applications table. The CHECK constraint and default status
/// are rendered from the active vocabulary, so the stored schema text tells
/// the migration engine which vocabulary a database was written with.
pub fn applications_table_sql(vocab: &StatusVocabulary, if_not_exists: bool) -> String {
    let clause = if if_not_exists { "IF NOT EXISTS " } else { "" };
    let checks = vocab
        .labels()
        .iter()
        .map(|l| format!("'{l}'"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE {clause}applications (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  company TEXT NOT NULL,
  role TEXT,
  status TEXT NOT NULL DEFAULT '{default}' CHECK (status IN ({checks})),
  url TEXT,
  notes TEXT,
  created_at DATETIME DEFAULT CURRENT_TIMESTAMP
)",
        default = vocab.default_status(),
    )
}

/// Full idempotent schema: five tables plus lookup indexes.
pub fn schema_sql(vocab: &StatusVocabulary) -> String {
    let mut sql = String::new();
    sql.push_str(&applications_table_sql(vocab, true));
    sql.push_str(";\n\n");
    sql.push_str(&CONTACTS.create_sql(true));
    sql.push_str(";\n\n");
    sql.push_str(&ACTIVITIES.create_sql(true));
    sql.push_str(";\n\n");
    sql.push_str(
        "CREATE TABLE IF NOT EXISTS tags (
  id INTEGER PRIMARY KEY,
  name TEXT NOT NULL UNIQUE
);\n\n",
    );
    sql.push_str(&APPLICATION_TAGS.create_sql(true));
    sql.push_str(";\n\n");
    sql.push_str(
        "CREATE INDEX IF NOT EXISTS idx_contacts_application ON contacts(application_id);
CREATE INDEX IF NOT EXISTS idx_activities_application ON activities(application_id);\n",
    );
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_vocabulary_is_german() {
        let vocab = StatusVocabulary::default();
        assert_eq!(vocab.labels().len(), 7);
        assert_eq!(vocab.default_status(), "Geplant");
        assert!(vocab.contains("Vorstellungsgespräch"));
        assert!(!vocab.contains("Planned"));
    }

    #[test]
    fn test_english_vocabulary_has_no_legacy_entries() {
        let vocab = StatusVocabulary::english();
        assert_eq!(vocab.labels().len(), 7);
        assert_eq!(vocab.default_status(), "Planned");
        assert!(vocab.legacy().is_empty());
    }

    #[test]
    fn test_remap_legacy_and_passthrough() {
        let vocab = StatusVocabulary::german();
        assert_eq!(vocab.remap("Applied"), "Beworben");
        assert_eq!(vocab.remap("On Hold"), "Zurückgestellt");
        assert_eq!(vocab.remap("ZurÃ¼ckgestellt"), "Zurückgestellt");
        // Unknown values pass through unchanged
        assert_eq!(vocab.remap("Beworben"), "Beworben");
        assert_eq!(vocab.remap("Mystery"), "Mystery");
    }

    #[test]
    fn test_applications_ddl_renders_vocabulary() {
        let sql = applications_table_sql(&StatusVocabulary::german(), false);
        assert!(sql.starts_with("CREATE TABLE applications"));
        assert!(sql.contains("DEFAULT 'Geplant'"));
        assert!(sql.contains("'Zurückgestellt'"));
        assert!(!sql.contains("IF NOT EXISTS"));

        let sql = applications_table_sql(&StatusVocabulary::english(), true);
        assert!(sql.contains("IF NOT EXISTS"));
        assert!(sql.contains("'On Hold'"));
    }

    #[test]
    fn test_schema_sql_declares_all_tables() {
        let sql = schema_sql(&StatusVocabulary::german());
        for table in [
            "applications",
            "contacts",
            "activities",
            "tags",
            "application_tags",
        ] {
            assert!(
                sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
        assert!(sql.contains("ON DELETE CASCADE"));
    }

    #[test]
    fn test_schema_sql_is_idempotent_against_sqlite() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let sql = schema_sql(&StatusVocabulary::german());
        conn.execute_batch(&sql).unwrap();
        conn.execute_batch(&sql).unwrap();
    }
}
