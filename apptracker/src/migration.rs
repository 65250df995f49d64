//! Open-time schema repairs for the relational backend.
//!
//! Two repairs exist, both built on one reusable rename-create-copy-drop
//! procedure: the status-vocabulary rewrite (legacy or mis-encoded labels in
//! the applications CHECK constraint) and the foreign-key-target repair for
//! dependent tables left pointing at a renamed intermediate table. Running
//! either repair twice is a no-op.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::error::{Result, TrackerError};
use crate::schema::{self, StatusVocabulary};

/// Bring a database to the current schema and vocabulary. The status
/// migration is fatal on failure; the foreign-key repair only warns, since
/// the primary schema is already consistent at that point.
pub fn migrate(conn: &Connection, vocab: &StatusVocabulary) -> Result<()> {
    migrate_status_vocabulary(conn, vocab)
        .map_err(|e| TrackerError::Migration(format!("status vocabulary migration failed: {e}")))?;
    conn.execute_batch(&schema::schema_sql(vocab))?;
    match repair_foreign_keys(conn) {
        Ok(true) => conn.execute_batch(&schema::schema_sql(vocab))?,
        Ok(false) => {}
        Err(err) => log::warn!("Foreign key repair failed: {err}"),
    }
    Ok(())
}

/// Everything `rebuild_table` needs to recreate one table under a new
/// definition while preserving its rows.
struct RebuildPlan<'a> {
    table: &'a str,
    columns: &'a [&'a str],
    create_sql: &'a str,
    /// Optionally rewrite one named column's text value on every copied row.
    remap: Option<(&'a str, &'a dyn Fn(&str) -> String)>,
}

/// If the stored applications DDL still quotes any legacy status spelling,
/// rewrite the table under the current constraint and remap every row's
/// status through the vocabulary's legacy table.
fn migrate_status_vocabulary(conn: &Connection, vocab: &StatusVocabulary) -> Result<()> {
    let table_sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'applications'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let table_sql = match table_sql {
        Some(sql) => sql,
        // Fresh install, nothing to migrate
        None => return Ok(()),
    };

    let stale = vocab
        .legacy()
        .iter()
        .any(|(old, _)| table_sql.contains(&format!("'{old}'")));
    if !stale {
        return Ok(());
    }

    let create_sql = schema::applications_table_sql(vocab, false);
    let remap = |status: &str| vocab.remap(status).to_string();
    rebuild_table(
        conn,
        &RebuildPlan {
            table: "applications",
            columns: schema::APPLICATION_COLUMNS,
            create_sql: &create_sql,
            remap: Some(("status", &remap)),
        },
    )
}

/// After a schema rewrite, dependent tables may declare foreign keys against
/// the renamed `applications_old` instead of the live table. Rebuild each
/// affected table so its foreign key points at `applications` again.
/// Returns whether any table was rebuilt.
pub fn repair_foreign_keys(conn: &Connection) -> Result<bool> {
    let mut changed = false;
    for def in schema::DEPENDENT_TABLES {
        let targets = foreign_key_targets(conn, def.name)?;
        if !targets.iter().any(|t| t == "applications_old") {
            continue;
        }
        changed = true;
        let create_sql = def.create_sql(false);
        rebuild_table(
            conn,
            &RebuildPlan {
                table: def.name,
                columns: def.columns,
                create_sql: &create_sql,
                remap: None,
            },
        )?;
    }
    Ok(changed)
}

fn foreign_key_targets(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(2))?;
    let mut targets = Vec::new();
    for row in rows {
        targets.push(row?);
    }
    Ok(targets)
}

/// Recreate a table under a new definition: disable foreign-key enforcement,
/// rename the live table aside, create it fresh, copy rows across, drop the
/// old copy, all inside one transaction. On failure the transaction rolls
/// back and the original table is restored under its original name; the
/// prior foreign-key state is restored either way.
fn rebuild_table(conn: &Connection, plan: &RebuildPlan) -> Result<()> {
    let fk_was_on: bool = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
    conn.pragma_update(None, "foreign_keys", false)?;
    let result = rebuild_in_transaction(conn, plan);
    conn.pragma_update(None, "foreign_keys", fk_was_on)?;
    result
}

fn rebuild_in_transaction(conn: &Connection, plan: &RebuildPlan) -> Result<()> {
    let old = format!("{}_old", plan.table);
    conn.execute_batch("BEGIN IMMEDIATE")?;
    let result = (|| -> Result<()> {
        conn.execute_batch(&format!("ALTER TABLE {} RENAME TO {old}", plan.table))?;
        conn.execute_batch(plan.create_sql)?;
        copy_rows(conn, plan, &old)?;
        conn.execute_batch(&format!("DROP TABLE {old}"))?;
        Ok(())
    })();
    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            // The rollback already undoes the rename; the explicit restore
            // covers drivers that auto-committed the ALTER.
            let _ = conn.execute_batch(&format!("ALTER TABLE {old} RENAME TO {}", plan.table));
            Err(err)
        }
    }
}

fn copy_rows(conn: &Connection, plan: &RebuildPlan, old: &str) -> Result<()> {
    let cols = plan.columns.join(", ");
    let (remap_idx, remap_fn) = match plan.remap {
        Some((column, f)) => {
            let idx = plan
                .columns
                .iter()
                .position(|c| *c == column)
                .ok_or_else(|| {
                    TrackerError::Migration(format!("unknown remap column '{column}'"))
                })?;
            (idx, f)
        }
        None => {
            conn.execute_batch(&format!(
                "INSERT INTO {table}({cols}) SELECT {cols} FROM {old}",
                table = plan.table
            ))?;
            return Ok(());
        }
    };

    let placeholders = vec!["?"; plan.columns.len()].join(", ");
    let mut select = conn.prepare(&format!(
        "SELECT {cols} FROM {old} ORDER BY {first}",
        first = plan.columns[0]
    ))?;
    let mut insert = conn.prepare(&format!(
        "INSERT INTO {table}({cols}) VALUES ({placeholders})",
        table = plan.table
    ))?;

    let mut rows = select.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(plan.columns.len());
        for i in 0..plan.columns.len() {
            values.push(row.get::<_, Value>(i)?);
        }
        if let Value::Text(text) = &values[remap_idx] {
            values[remap_idx] = Value::Text(remap_fn(text));
        }
        insert.execute(params_from_iter(values.iter()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn legacy_english_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", true).unwrap();
        conn.execute_batch(&schema::schema_sql(&StatusVocabulary::english()))
            .unwrap();
        conn.execute(
            "INSERT INTO applications(company, role, status) VALUES (?1, ?2, ?3)",
            ("Acme", "Engineer", "Applied"),
        )
        .unwrap();
        conn.execute(
            "INSERT INTO applications(company, status) VALUES (?1, ?2)",
            ("Globex", "On Hold"),
        )
        .unwrap();
        conn
    }

    fn statuses(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT status FROM applications ORDER BY id")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }

    fn applications_ddl(conn: &Connection) -> String {
        conn.query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'applications'",
            [],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_status_migration_rewrites_vocabulary() {
        let conn = legacy_english_db();
        let vocab = StatusVocabulary::german();

        migrate(&conn, &vocab).unwrap();

        assert_eq!(statuses(&conn), vec!["Beworben", "Zurückgestellt"]);
        let ddl = applications_ddl(&conn);
        assert!(ddl.contains("'Geplant'"));
        assert!(!ddl.contains("'Planned'"));

        // Ids survive the rebuild
        let companies: Vec<(i64, String)> = conn
            .prepare("SELECT id, company FROM applications ORDER BY id")
            .unwrap()
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(
            companies,
            vec![(1, "Acme".to_string()), (2, "Globex".to_string())]
        );
    }

    #[test]
    fn test_status_migration_is_idempotent() {
        let conn = legacy_english_db();
        let vocab = StatusVocabulary::german();

        migrate(&conn, &vocab).unwrap();
        let ddl_once = applications_ddl(&conn);
        let rows_once = statuses(&conn);

        migrate(&conn, &vocab).unwrap();
        assert_eq!(applications_ddl(&conn), ddl_once);
        assert_eq!(statuses(&conn), rows_once);
    }

    #[test]
    fn test_fresh_install_needs_no_migration() {
        let conn = Connection::open_in_memory().unwrap();
        let vocab = StatusVocabulary::german();
        migrate(&conn, &vocab).unwrap();
        assert!(applications_ddl(&conn).contains("'Geplant'"));
        assert_eq!(statuses(&conn).len(), 0);
    }

    #[test]
    fn test_mojibake_statuses_are_repaired() {
        let conn = Connection::open_in_memory().unwrap();
        // A database written after a mojibake incident: garbled literals in
        // both the constraint and the data.
        conn.execute_batch(
            "CREATE TABLE applications (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  company TEXT NOT NULL,
  role TEXT,
  status TEXT NOT NULL DEFAULT 'Geplant' CHECK (status IN ('Geplant', 'Beworben', 'VorstellungsgesprÃ¤ch', 'Angebot', 'Eingestellt', 'Abgelehnt', 'ZurÃ¼ckgestellt')),
  url TEXT,
  notes TEXT,
  created_at DATETIME DEFAULT CURRENT_TIMESTAMP
)",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO applications(company, status) VALUES (?1, ?2)",
            ("Acme", "VorstellungsgesprÃ¤ch"),
        )
        .unwrap();

        migrate(&conn, &StatusVocabulary::german()).unwrap();

        assert_eq!(statuses(&conn), vec!["Vorstellungsgespräch"]);
        let ddl = applications_ddl(&conn);
        assert!(ddl.contains("'Vorstellungsgespräch'"));
        assert!(!ddl.contains("Ã"));
    }

    #[test]
    fn test_unmapped_statuses_pass_through() {
        let conn = Connection::open_in_memory().unwrap();
        // English constraint but a free-form status value with no map entry.
        conn.execute_batch(
            "CREATE TABLE applications (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  company TEXT NOT NULL,
  role TEXT,
  status TEXT NOT NULL DEFAULT 'Planned',
  url TEXT,
  notes TEXT,
  created_at DATETIME DEFAULT CURRENT_TIMESTAMP
)",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO applications(company, status) VALUES (?1, ?2)",
            ("Acme", "Planned"),
        )
        .unwrap();
        conn.execute(
            "INSERT INTO applications(company, status) VALUES (?1, ?2)",
            ("Globex", "Angebot"),
        )
        .unwrap();

        // 'Planned' appears in the DDL as a default, so migration triggers.
        // 'Angebot' has no legacy entry and survives unchanged.
        migrate(&conn, &StatusVocabulary::german()).unwrap();
        assert_eq!(statuses(&conn), vec!["Geplant", "Angebot"]);
    }

    #[test]
    fn test_fk_repair_rebuilds_stale_references() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", false).unwrap();
        conn.execute_batch(&schema::applications_table_sql(
            &StatusVocabulary::german(),
            false,
        ))
        .unwrap();
        // A contacts table left pointing at the renamed intermediate
        conn.execute_batch(
            "CREATE TABLE contacts (
  id INTEGER PRIMARY KEY,
  application_id INTEGER NOT NULL,
  name TEXT,
  email TEXT,
  phone TEXT,
  title TEXT,
  linkedin TEXT,
  created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
  FOREIGN KEY (application_id) REFERENCES applications_old(id) ON DELETE CASCADE
)",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO applications(company, status) VALUES ('Acme', 'Geplant')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO contacts(application_id, name) VALUES (1, 'Max')",
            [],
        )
        .unwrap();

        let changed = repair_foreign_keys(&conn).unwrap();
        assert!(changed);

        let targets = foreign_key_targets(&conn, "contacts").unwrap();
        assert_eq!(targets, vec!["applications"]);
        let names: Vec<String> = conn
            .prepare("SELECT name FROM contacts ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(names, vec!["Max"]);

        // Second pass finds nothing to repair
        assert!(!repair_foreign_keys(&conn).unwrap());
    }

    #[test]
    fn test_rebuild_rolls_back_on_copy_failure() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE applications (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  company TEXT,
  role TEXT,
  status TEXT,
  url TEXT,
  notes TEXT,
  created_at DATETIME DEFAULT CURRENT_TIMESTAMP
)",
        )
        .unwrap();
        // NULL company cannot be copied into the NOT NULL target schema
        conn.execute(
            "INSERT INTO applications(company, status) VALUES (NULL, 'Applied')",
            [],
        )
        .unwrap();

        let create_sql = schema::applications_table_sql(&StatusVocabulary::german(), false);
        let remap = |s: &str| s.to_string();
        let err = rebuild_table(
            &conn,
            &RebuildPlan {
                table: "applications",
                columns: schema::APPLICATION_COLUMNS,
                create_sql: &create_sql,
                remap: Some(("status", &remap)),
            },
        );
        assert!(err.is_err());

        // Original table restored under its original name, row intact
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        let status: String = conn
            .query_row("SELECT status FROM applications", [], |row| row.get(0))
            .unwrap();
        assert_eq!(status, "Applied");
    }
}
