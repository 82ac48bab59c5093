use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use log::{error, info};
use rusqlite::{params, Connection};
use tokio::sync::oneshot;

mod migrations;

use crate::error::{Error, Result};
use crate::models::{Record, RecordContent, SourceType};
use crate::settings::Settings;
use migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::Storage(format!("value {value} is negative")))
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| Error::Storage(format!("invalid datetime '{value}': {err}")))
}

fn source_from_str(value: &str) -> Result<SourceType> {
    match value {
        "auto" => Ok(SourceType::Auto),
        "manual" => Ok(SourceType::Manual),
        _ => Err(Error::Storage(format!("unknown source type '{value}'"))),
    }
}

/// Async facade over a dedicated SQLite worker thread. One connection per
/// process; every operation is a closure shipped over a channel, so the
/// store has exactly one exclusive access path.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                Error::Storage(format!(
                    "failed to create database directory {}: {err}",
                    parent.display()
                ))
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("daylog-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx
                            .send(Err(Error::Storage(format!("failed to open SQLite database: {err}"))));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result = run_migrations(&mut conn);
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .map_err(|err| Error::Storage(format!("failed to spawn database worker thread: {err}")))?;

        ready_rx
            .recv()
            .map_err(|_| Error::Storage("database worker exited before signaling readiness".into()))??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            let result = task(conn);
            if reply_tx.send(result).is_err() {
                error!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| Error::Storage(format!("failed to send command to DB thread: {err}")))?;

        reply_rx
            .await
            .map_err(|_| Error::Storage("database thread terminated unexpectedly".into()))?
    }

    /// Inserts one record and returns it with its assigned id. Records are
    /// append-only; there is no update path.
    pub async fn insert_record(
        &self,
        timestamp: DateTime<Utc>,
        content: &RecordContent,
        screenshot_path: Option<String>,
    ) -> Result<Record> {
        let stored = content.to_storage_text()?;
        let source = content.source_type();
        let content = content.clone();

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO records (timestamp, source_type, content, screenshot_path)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    timestamp.to_rfc3339(),
                    source.as_str(),
                    stored,
                    screenshot_path,
                ],
            )?;
            Ok(Record {
                id: conn.last_insert_rowid(),
                timestamp,
                content,
                screenshot_path,
            })
        })
        .await
    }

    /// All records whose timestamp falls inside the given UTC calendar day,
    /// ascending.
    pub async fn records_for_utc_day(&self, day: NaiveDate) -> Result<Vec<Record>> {
        let start = day.and_time(NaiveTime::MIN).and_utc();
        let end = start + TimeDelta::days(1);

        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, source_type, content, screenshot_path
                 FROM records
                 WHERE timestamp >= ?1 AND timestamp < ?2
                 ORDER BY timestamp ASC",
            )?;

            let mut rows = stmt.query(params![start.to_rfc3339(), end.to_rfc3339()])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let source = source_from_str(&row.get::<_, String>(2)?)?;
                records.push(Record {
                    id: row.get(0)?,
                    timestamp: parse_datetime(&row.get::<_, String>(1)?)?,
                    content: RecordContent::from_storage(source, &row.get::<_, String>(3)?),
                    screenshot_path: row.get(4)?,
                });
            }

            Ok(records)
        })
        .await
    }

    /// Reads the single settings row; defaults when none has been saved yet.
    pub async fn get_settings(&self) -> Result<Settings> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT api_base_url, api_key, vision_model, summary_model,
                        screenshot_interval, change_threshold, max_silent_minutes,
                        summary_time, analysis_prompt, summary_prompt, vault_path
                 FROM settings WHERE id = 1",
            )?;

            let mut rows = stmt.query([])?;
            if let Some(row) = rows.next()? {
                Ok(Settings {
                    api_base_url: row.get(0)?,
                    api_key: row.get(1)?,
                    vision_model: row.get(2)?,
                    summary_model: row.get(3)?,
                    screenshot_interval: to_u64(row.get::<_, i64>(4)?)?,
                    change_threshold: row.get(5)?,
                    max_silent_minutes: to_u64(row.get::<_, i64>(6)?)?,
                    summary_time: row.get(7)?,
                    analysis_prompt: row.get(8)?,
                    summary_prompt: row.get(9)?,
                    vault_path: row.get(10)?,
                })
            } else {
                Ok(Settings::default())
            }
        })
        .await
    }

    /// Replaces the single settings row atomically.
    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        let s = settings.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings
                 (id, api_base_url, api_key, vision_model, summary_model,
                  screenshot_interval, change_threshold, max_silent_minutes,
                  summary_time, analysis_prompt, summary_prompt, vault_path)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    s.api_base_url,
                    s.api_key,
                    s.vision_model,
                    s.summary_model,
                    i64::try_from(s.screenshot_interval)
                        .map_err(|_| Error::Storage("screenshot_interval out of range".into()))?,
                    s.change_threshold,
                    i64::try_from(s.max_silent_minutes)
                        .map_err(|_| Error::Storage("max_silent_minutes out of range".into()))?,
                    s.summary_time,
                    s.analysis_prompt,
                    s.summary_prompt,
                    s.vault_path,
                ],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScreenAnalysis, ScreenContext};
    use chrono::TimeZone;

    fn open_test_db(dir: &tempfile::TempDir) -> Database {
        crate::test_support::init_test_logging();
        Database::new(dir.path().join("daylog.sqlite3")).unwrap()
    }

    #[tokio::test]
    async fn database_path_points_at_the_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);
        assert_eq!(db.path(), dir.path().join("daylog.sqlite3"));
        assert!(db.path().exists());
    }

    #[tokio::test]
    async fn settings_default_until_first_save() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        assert_eq!(db.get_settings().await.unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.api_key = "sk-test".to_string();
        settings.screenshot_interval = 10;
        settings.vault_path = Some("/tmp/vault".to_string());
        db.save_settings(&settings).await.unwrap();

        assert_eq!(db.get_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn save_settings_replaces_the_single_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        let mut first = Settings::default();
        first.api_key = "sk-one".to_string();
        db.save_settings(&first).await.unwrap();

        let mut second = Settings::default();
        second.api_key = "sk-two".to_string();
        second.max_silent_minutes = 60;
        db.save_settings(&second).await.unwrap();

        let loaded = db.get_settings().await.unwrap();
        assert_eq!(loaded.api_key, "sk-two");
        assert_eq!(loaded.max_silent_minutes, 60);
    }

    #[tokio::test]
    async fn records_round_trip_and_sort_ascending() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        let today = Utc::now().date_naive();
        let morning = today.and_hms_opt(9, 0, 0).unwrap().and_utc();
        let noon = today.and_hms_opt(12, 0, 0).unwrap().and_utc();

        let auto = RecordContent::Auto(ScreenContext::Structured(ScreenAnalysis {
            current_focus: "reviewing a pull request".to_string(),
            active_software: "Firefox".to_string(),
            context_keywords: vec!["code review".to_string()],
        }));
        let note = RecordContent::Manual("lunch with the infra team".to_string());

        // Inserted out of order on purpose.
        db.insert_record(noon, &note, None).await.unwrap();
        let first = db
            .insert_record(morning, &auto, Some("/tmp/shot.png".to_string()))
            .await
            .unwrap();
        assert!(first.id > 0);

        let records = db.records_for_utc_day(today).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, morning);
        assert_eq!(records[0].content, auto);
        assert_eq!(records[0].screenshot_path.as_deref(), Some("/tmp/shot.png"));
        assert_eq!(records[1].content, note);
    }

    #[tokio::test]
    async fn day_query_excludes_other_days() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        let day = chrono::NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let inside = day.and_hms_opt(23, 59, 59).unwrap().and_utc();
        let before = Utc.with_ymd_and_hms(2026, 3, 13, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();

        for ts in [inside, before, after] {
            db.insert_record(ts, &RecordContent::Manual("x".to_string()), None)
                .await
                .unwrap();
        }

        let records = db.records_for_utc_day(day).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, inside);
    }

    #[tokio::test]
    async fn unparseable_auto_content_reads_back_as_raw() {
        let dir = tempfile::tempdir().unwrap();
        let db = open_test_db(&dir);

        let raw = RecordContent::Auto(ScreenContext::Raw("the model rambled".to_string()));
        db.insert_record(Utc::now(), &raw, None).await.unwrap();

        let records = db.records_for_utc_day(Utc::now().date_naive()).await.unwrap();
        assert_eq!(records[0].content, raw);
    }
}
