//! Append-only durability log of stored items.
//!
//! Every successful write appends one JSON object per alias, one object per
//! line (`{"<alias>": <item>}`), so each record can be parsed on its own and
//! a torn final write only loses that line. On startup the log is replayed,
//! in order, into the primary backend. A file holding a single consolidated
//! line with every alias is read the same way.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tinylink_core::{Item, ItemBatch, LinkStore, Result, StorageError};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, SeekFrom};
use tokio::sync::Mutex;
use tracing::{info, trace, warn};

/// Outcome of replaying a snapshot file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Aliases written into the primary backend.
    pub restored: usize,
    /// Aliases rejected by the primary backend because of a conflict.
    pub skipped: usize,
}

#[derive(Debug)]
pub struct FileSnapshot {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSnapshot {
    /// Opens (or creates) the snapshot file for appending. Existing records are kept.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await?;
        terminate_torn_tail(&mut file, &path).await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record per item of the batch.
    pub async fn save(&self, items: &ItemBatch) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        for (alias, item) in items {
            let record: HashMap<&str, &Item> = HashMap::from([(alias.as_str(), item)]);
            serde_json::to_writer(&mut buf, &record)?;
            buf.push(b'\n');
        }

        let mut file = self.file.lock().await;
        file.write_all(&buf).await?;
        file.flush().await?;

        trace!(count = items.len(), path = %self.path.display(), "appended snapshot records");
        Ok(())
    }
}

/// Ends a partially written last line so the next record starts on a line of its own.
async fn terminate_torn_tail(file: &mut File, path: &Path) -> Result<()> {
    if file.metadata().await?.len() == 0 {
        return Ok(());
    }

    file.seek(SeekFrom::End(-1)).await?;
    if file.read_u8().await? != b'\n' {
        warn!(path = %path.display(), "snapshot ends with a torn record, starting a new line");
        // Append mode writes at the end regardless of the cursor.
        file.write_all(b"\n").await?;
        file.flush().await?;
    }

    Ok(())
}

/// Reads every record of the snapshot file, in file order.
///
/// A missing file reads as empty. Lines that fail to parse are logged and skipped.
pub async fn read_records(path: &Path) -> Result<Vec<ItemBatch>> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut records = Vec::new();
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut number = 0usize;

    // Lines are read as bytes: a torn write may end in the middle of a UTF-8 sequence.
    while reader.read_until(b'\n', &mut line).await? > 0 {
        number += 1;

        if !line.trim_ascii().is_empty() {
            match serde_json::from_slice::<ItemBatch>(&line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(path = %path.display(), line = number, error = %err, "skipping corrupt snapshot record");
                }
            }
        }

        line.clear();
    }

    Ok(records)
}

/// Replays the snapshot file into `store`, one record at a time.
///
/// Records the store rejects as conflicting are skipped; any other failure aborts.
pub async fn restore(path: &Path, store: &dyn LinkStore) -> Result<RestoreSummary> {
    let mut summary = RestoreSummary::default();

    for record in read_records(path).await? {
        match store.set(&record).await {
            Ok(()) => summary.restored += record.len(),
            Err(err @ (StorageError::AlreadyExists(_) | StorageError::AliasTaken(_))) => {
                warn!(error = %err, "skipping conflicting snapshot record");
                summary.skipped += record.len();
            }
            Err(err) => return Err(err),
        }
    }

    info!(
        path = %path.display(),
        restored = summary.restored,
        skipped = summary.skipped,
        "restored snapshot"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStorage;
    use tempfile::TempDir;

    fn batch(entries: &[(&str, &str, &str)]) -> ItemBatch {
        entries
            .iter()
            .map(|(alias, url, owner)| (alias.to_string(), Item::new(*url, *owner)))
            .collect()
    }

    #[tokio::test]
    async fn save_writes_one_line_per_alias() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        let snapshot = FileSnapshot::open(&path).await.unwrap();

        snapshot
            .save(&batch(&[
                ("abc123", "https://a.example", "u1"),
                ("def456", "https://b.example", "u1"),
            ]))
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);

        let records = read_records(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|record| record.len() == 1));
    }

    #[tokio::test]
    async fn reopening_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");

        FileSnapshot::open(&path)
            .await
            .unwrap()
            .save(&batch(&[("abc123", "https://a.example", "u1")]))
            .await
            .unwrap();
        FileSnapshot::open(&path)
            .await
            .unwrap()
            .save(&batch(&[("def456", "https://b.example", "u1")]))
            .await
            .unwrap();

        assert_eq!(read_records(&path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn open_creates_missing_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("links.json");

        let snapshot = FileSnapshot::open(&path).await.unwrap();

        assert_eq!(snapshot.path(), path.as_path());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();

        let records = read_records(&dir.path().join("absent.json")).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn consolidated_first_line_is_restored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        tokio::fs::write(
            &path,
            concat!(
                r#"{"abc123":{"original_url":"https://a.example","owner_id":"u1"},"#,
                r#""def456":{"original_url":"https://b.example","owner_id":"u2","is_deleted":true}}"#,
                "\n"
            ),
        )
        .await
        .unwrap();

        let store = InMemoryStorage::new();
        let summary = restore(&path, &store).await.unwrap();

        assert_eq!(summary, RestoreSummary { restored: 2, skipped: 0 });
        assert_eq!(store.get("abc123").await.unwrap(), "https://a.example");
        assert!(matches!(
            store.get("def456").await.unwrap_err(),
            StorageError::Gone(_)
        ));
    }

    #[tokio::test]
    async fn older_record_layout_is_restored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        tokio::fs::write(
            &path,
            concat!(
                r#"{"abc123":{"Object":"https://a.example","UserID":"u1","IsDeleted":false,"Expiration":0},"#,
                r#""def456":{"Object":"https://b.example","UserID":"u2","IsDeleted":true,"Expiration":0}}"#,
                "\n"
            ),
        )
        .await
        .unwrap();

        let store = InMemoryStorage::new();
        let summary = restore(&path, &store).await.unwrap();

        assert_eq!(summary, RestoreSummary { restored: 2, skipped: 0 });
        assert_eq!(store.get("abc123").await.unwrap(), "https://a.example");
        assert!(matches!(
            store.get("def456").await.unwrap_err(),
            StorageError::Gone(_)
        ));
    }

    #[tokio::test]
    async fn corrupt_and_torn_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        tokio::fs::write(
            &path,
            concat!(
                r#"{"abc123":{"original_url":"https://a.example","owner_id":"u1"}}"#,
                "\n",
                "not json\n",
                r#"{"def456":{"original_url":"https://b.exa"#,
            ),
        )
        .await
        .unwrap();

        let store = InMemoryStorage::new();
        let summary = restore(&path, &store).await.unwrap();

        assert_eq!(summary.restored, 1);
        assert_eq!(store.get("abc123").await.unwrap(), "https://a.example");
    }

    #[tokio::test]
    async fn torn_multibyte_tail_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        let mut content =
            br#"{"abc123":{"original_url":"https://a.example","owner_id":"u1"}}"#.to_vec();
        content.push(b'\n');
        // Cut in the middle of a two-byte UTF-8 sequence.
        content.extend_from_slice(br#"{"def456":{"original_url":"https://b.example/"#);
        content.push(0xc3);
        tokio::fs::write(&path, &content).await.unwrap();

        let store = InMemoryStorage::new();
        let summary = restore(&path, &store).await.unwrap();

        assert_eq!(summary.restored, 1);
        assert_eq!(store.get("abc123").await.unwrap(), "https://a.example");
        assert!(matches!(
            store.get("def456").await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn invalid_utf8_in_the_middle_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        let mut content = vec![0xff, 0xfe, b'\n'];
        content.extend_from_slice(
            br#"{"abc123":{"original_url":"https://a.example","owner_id":"u1"}}"#,
        );
        content.push(b'\n');
        tokio::fs::write(&path, &content).await.unwrap();

        let records = read_records(&path).await.unwrap();

        assert_eq!(records.len(), 1);
        assert!(records[0].contains_key("abc123"));
    }

    #[tokio::test]
    async fn append_after_torn_tail_starts_a_new_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        tokio::fs::write(
            &path,
            concat!(
                r#"{"abc123":{"original_url":"https://a.example","owner_id":"u1"}}"#,
                "\n",
                r#"{"def456":{"original_url":"https://b.exa"#,
            ),
        )
        .await
        .unwrap();

        let snapshot = FileSnapshot::open(&path).await.unwrap();
        snapshot
            .save(&batch(&[("new111", "https://new.example", "u1")]))
            .await
            .unwrap();
        drop(snapshot);

        let records = read_records(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains_key("abc123"));
        assert!(records[1].contains_key("new111"));

        // Reopening a well-terminated file adds nothing.
        let before = tokio::fs::read(&path).await.unwrap();
        FileSnapshot::open(&path).await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), before);
    }

    #[tokio::test]
    async fn conflicting_records_are_skipped_on_restore() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("links.json");
        let snapshot = FileSnapshot::open(&path).await.unwrap();
        snapshot
            .save(&batch(&[("abc123", "https://a.example", "u1")]))
            .await
            .unwrap();
        snapshot
            .save(&batch(&[("zz9999", "https://a.example", "u1")]))
            .await
            .unwrap();

        let store = InMemoryStorage::new();
        let summary = restore(&path, &store).await.unwrap();

        assert_eq!(summary, RestoreSummary { restored: 1, skipped: 1 });
        assert_eq!(store.alias_for("https://a.example").await.unwrap(), "abc123");
    }
}
