use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
    sync::Mutex,
};
use tracing::{debug, warn};

use super::entities::MeasurementEntity;

/// Interface for abstracting storage of measurements.
pub trait MeasurementStore {
    /// Initializes the backing store as an empty sequence if it is absent.
    /// Idempotent, never truncates an already populated store.
    fn ensure_exists(&self) -> impl Future<Output = Result<()>> + Send;

    /// Loads every stored measurement in insertion order.
    fn read_all(&self) -> impl Future<Output = Result<Vec<MeasurementEntity>>> + Send;

    /// Assigns the next id and persists a new measurement stamped with
    /// `created_at`. Returns the measurement as it was stored.
    fn append(
        &self,
        elapsed_ms: f64,
        created_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<MeasurementEntity>> + Send;
}

impl<T: Deref> MeasurementStore for T
where
    T::Target: MeasurementStore,
{
    fn ensure_exists(&self) -> impl Future<Output = Result<()>> + Send {
        self.deref().ensure_exists()
    }

    fn read_all(&self) -> impl Future<Output = Result<Vec<MeasurementEntity>>> + Send {
        self.deref().read_all()
    }

    fn append(
        &self,
        elapsed_ms: f64,
        created_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<MeasurementEntity>> + Send {
        self.deref().append(elapsed_ms, created_at)
    }
}

/// The main realization of [MeasurementStore]. Keeps the whole history as one
/// pretty-printed json array in `measurements.json`.
///
/// Appends are a read-modify-write over the entire array, serialized by an
/// in-process mutex and an exclusive advisory file lock, so concurrent
/// registrations can't assign colliding ids or overwrite each other.
pub struct JsonFileStore {
    store_path: PathBuf,
    write_lock: Mutex<()>,
}

pub const STORE_FILE_NAME: &str = "measurements.json";

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            store_path: dir.join(STORE_FILE_NAME),
            write_lock: Mutex::new(()),
        })
    }

    async fn read_all_inner(&self) -> Result<Vec<MeasurementEntity>> {
        async fn extract(path: &Path) -> std::result::Result<Vec<MeasurementEntity>, std::io::Error> {
            debug!("Extracting {path:?}");
            let mut file = File::open(path).await?;
            file.lock_shared()?;
            let mut raw = String::new();
            let read_result = file.read_to_string(&mut raw).await;
            file.unlock_async().await?;
            read_result?;

            Ok(match serde_json::from_str::<Vec<MeasurementEntity>>(&raw) {
                Ok(v) => v,
                Err(e) => {
                    // A corrupt store reads as empty. Might happen after shutdowns.
                    warn!("During parsing {path:?} found illegal content: {e}");
                    vec![]
                }
            })
        }

        match extract(&self.store_path).await {
            Ok(s) => Ok(s),
            Err(e) => {
                if e.kind() == ErrorKind::NotFound {
                    Ok(vec![])
                } else {
                    Err(e)?
                }
            }
        }
    }

    async fn rewrite(&self, measurements: &[MeasurementEntity]) -> Result<()> {
        let mut file = File::options()
            .write(true)
            .create(true)
            .read(true)
            .truncate(false)
            .open(&self.store_path)
            .await?;

        // Semi-safe acquire-release for the file
        file.lock_exclusive()?;
        let result = Self::rewrite_with_file(&mut file, measurements).await;
        file.unlock_async().await?;
        result
    }

    async fn rewrite_with_file(file: &mut File, measurements: &[MeasurementEntity]) -> Result<()> {
        let buffer = serde_json::to_vec_pretty(measurements)?;

        file.set_len(0).await?;
        file.rewind().await?;
        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

impl MeasurementStore for JsonFileStore {
    async fn ensure_exists(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match File::options()
            .write(true)
            .create_new(true)
            .open(&self.store_path)
            .await
        {
            Ok(mut file) => {
                file.write_all(b"[]").await?;
                file.flush().await?;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e)?,
        }
    }

    async fn read_all(&self) -> Result<Vec<MeasurementEntity>> {
        self.read_all_inner().await
    }

    async fn append(&self, elapsed_ms: f64, created_at: DateTime<Utc>) -> Result<MeasurementEntity> {
        let _guard = self.write_lock.lock().await;

        let mut measurements = self.read_all_inner().await?;
        let next_id = measurements.iter().map(|m| m.id).max().unwrap_or(0) + 1;
        let created = MeasurementEntity {
            id: next_id,
            elapsed_ms,
            created_at,
        };
        measurements.push(created.clone());
        self.rewrite(&measurements).await?;
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::storage::measurement_store::{JsonFileStore, MeasurementStore, STORE_FILE_NAME};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    #[tokio::test]
    async fn test_append_assigns_sequential_ids() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonFileStore::new(dir.path().to_owned())?;

        let created_at = Utc.from_utc_datetime(&TEST_START_DATE);
        let first = storage.append(50., created_at).await?;
        let second = storage.append(300., created_at).await?;
        let third = storage.append(120., created_at).await?;

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(third.id, 3);

        let stored = storage.read_all().await?;
        assert_eq!(stored, vec![first, second, third]);

        Ok(())
    }

    #[tokio::test]
    async fn test_append_returns_given_elapsed() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonFileStore::new(dir.path().to_owned())?;

        let created = storage
            .append(250., Utc.from_utc_datetime(&TEST_START_DATE))
            .await?;

        assert_eq!(created.elapsed_ms, 250.);
        assert_eq!(created.created_at, Utc.from_utc_datetime(&TEST_START_DATE));

        Ok(())
    }

    #[tokio::test]
    async fn test_store_survives_reopening() -> Result<()> {
        let dir = tempdir()?;

        let created = {
            let storage = JsonFileStore::new(dir.path().to_owned())?;
            storage
                .append(250., Utc.from_utc_datetime(&TEST_START_DATE))
                .await?
        };

        let reopened = JsonFileStore::new(dir.path().to_owned())?;
        assert_eq!(reopened.read_all().await?, vec![created]);

        Ok(())
    }

    #[tokio::test]
    async fn test_read_all_on_missing_file_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonFileStore::new(dir.path().to_owned())?;

        assert_eq!(storage.read_all().await?, vec![]);

        Ok(())
    }

    #[tokio::test]
    async fn test_read_all_on_corrupt_file_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonFileStore::new(dir.path().to_owned())?;

        std::fs::write(dir.path().join(STORE_FILE_NAME), "{ not an array")?;

        assert_eq!(storage.read_all().await?, vec![]);

        Ok(())
    }

    #[tokio::test]
    async fn test_append_over_corrupt_file_restarts_ids() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonFileStore::new(dir.path().to_owned())?;

        std::fs::write(dir.path().join(STORE_FILE_NAME), "garbage")?;

        let created = storage
            .append(75., Utc.from_utc_datetime(&TEST_START_DATE))
            .await?;

        assert_eq!(created.id, 1);
        assert_eq!(storage.read_all().await?, vec![created]);

        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_exists_creates_empty_sequence() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonFileStore::new(dir.path().to_owned())?;

        storage.ensure_exists().await?;

        assert_eq!(
            std::fs::read_to_string(dir.path().join(STORE_FILE_NAME))?,
            "[]"
        );
        assert_eq!(storage.read_all().await?, vec![]);

        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_exists_never_truncates() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonFileStore::new(dir.path().to_owned())?;

        let created = storage
            .append(250., Utc.from_utc_datetime(&TEST_START_DATE))
            .await?;

        storage.ensure_exists().await?;
        storage.ensure_exists().await?;

        assert_eq!(storage.read_all().await?, vec![created]);

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_every_measurement() -> Result<()> {
        let dir = tempdir()?;
        let storage = std::sync::Arc::new(JsonFileStore::new(dir.path().to_owned())?);

        let created_at = Utc.from_utc_datetime(&TEST_START_DATE);
        let handles = (0..10)
            .map(|i| {
                let storage = storage.clone();
                tokio::spawn(async move { storage.append(100. + i as f64, created_at).await })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            handle.await??;
        }

        let stored = storage.read_all().await?;
        assert_eq!(stored.len(), 10);
        let mut ids = stored.iter().map(|m| m.id).collect::<Vec<_>>();
        ids.sort_unstable();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());

        Ok(())
    }
}
