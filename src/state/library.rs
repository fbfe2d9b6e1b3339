use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::data::Tour;
use crate::error::{Result, TourError};

/// Key of the single list-valued record holding every saved tour
const TOURS_KEY: &str = "tours";

/// `image_blobs.position` of a tour's preview; captures use their index
const PREVIEW_POSITION: i64 = -1;

/// The TourStore keeps finished tours in an embedded SQLite database.
///
/// Tour metadata lives in a plain key-value table as one JSON list under
/// [`TOURS_KEY`], in the order the tours were saved. Encoded stills are kept
/// out of the JSON, one BLOB row per image in `image_blobs`. Writes run
/// inside an immediate transaction so two connections on the same file
/// cannot interleave a read-modify-write.
pub struct TourStore {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl TourStore {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        // Ensure the parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        info!("📁 Tour store opened at: {}", db_path.display());

        let store = TourStore {
            conn,
            db_path: Some(db_path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// A throwaway store that lives only as long as the value
    pub fn in_memory() -> Result<Self> {
        let store = TourStore {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS image_blobs (
                tour_id     INTEGER NOT NULL,
                position    INTEGER NOT NULL,
                bytes       BLOB NOT NULL,
                PRIMARY KEY (tour_id, position)
            );",
        )?;
        Ok(())
    }

    /// Location of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Append a tour. Existing entries are never overwritten: saving a tour
    /// whose id is already present is a storage failure.
    pub fn save(&mut self, tour: &Tour) -> Result<i64> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut tours = read_tours(&tx)?;
        if tours.iter().any(|existing| existing.id == tour.id) {
            return Err(TourError::StorageFailure(format!(
                "tour {} already exists",
                tour.id
            )));
        }

        let (metadata, blobs) = split_blobs(tour);
        tours.push(metadata);
        write_tours(&tx, &tours)?;
        for (position, bytes) in blobs {
            tx.execute(
                "INSERT INTO image_blobs (tour_id, position, bytes) VALUES (?1, ?2, ?3)",
                rusqlite::params![tour.id, position, bytes],
            )?;
        }
        tx.commit()?;

        info!(tour_id = tour.id, images = tour.images.len(), "tour saved");
        Ok(tour.id)
    }

    /// All tours in insertion order
    pub fn list(&self) -> Result<Vec<Tour>> {
        let mut tours = read_tours(&self.conn)?;
        for tour in &mut tours {
            attach_blobs(&self.conn, tour)?;
        }
        Ok(tours)
    }

    pub fn get(&self, tour_id: i64) -> Result<Option<Tour>> {
        let found = read_tours(&self.conn)?
            .into_iter()
            .find(|tour| tour.id == tour_id);
        match found {
            Some(mut tour) => {
                attach_blobs(&self.conn, &mut tour)?;
                Ok(Some(tour))
            }
            None => Ok(None),
        }
    }

    /// Remove a tour. Returns whether anything was removed; a missing id is
    /// not an error.
    pub fn delete(&mut self, tour_id: i64) -> Result<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut tours = read_tours(&tx)?;
        let before = tours.len();
        tours.retain(|tour| tour.id != tour_id);
        let removed = tours.len() != before;

        if removed {
            write_tours(&tx, &tours)?;
            tx.execute("DELETE FROM image_blobs WHERE tour_id = ?1", [tour_id])?;
            tx.commit()?;
            info!(tour_id, "tour deleted");
        } else {
            debug!(tour_id, "delete of unknown tour ignored");
        }

        Ok(removed)
    }

    pub fn tour_count(&self) -> Result<usize> {
        Ok(read_tours(&self.conn)?.len())
    }
}

fn read_tours(conn: &Connection) -> Result<Vec<Tour>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT value FROM kv WHERE key = ?1",
            [TOURS_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(Vec::new()),
    }
}

fn write_tours(conn: &Connection, tours: &[Tour]) -> Result<()> {
    let json = serde_json::to_string(tours)?;
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![TOURS_KEY, json],
    )?;
    Ok(())
}

/// Copy of `tour` without encoded stills, plus the stills keyed by position
fn split_blobs(tour: &Tour) -> (Tour, Vec<(i64, Vec<u8>)>) {
    let mut metadata = tour.clone();
    let mut blobs = Vec::with_capacity(metadata.images.len() + 1);

    blobs.push((PREVIEW_POSITION, std::mem::take(&mut metadata.preview_image)));
    for (position, image) in metadata.images.iter_mut().enumerate() {
        blobs.push((position as i64, image.take_image_bytes()));
    }
    (metadata, blobs)
}

fn attach_blobs(conn: &Connection, tour: &mut Tour) -> Result<()> {
    let mut stmt = conn.prepare("SELECT position, bytes FROM image_blobs WHERE tour_id = ?1")?;
    let rows = stmt.query_map([tour.id], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
    })?;

    for row in rows {
        let (position, bytes) = row?;
        if position == PREVIEW_POSITION {
            tour.preview_image = bytes;
        } else if let Some(image) = usize::try_from(position)
            .ok()
            .and_then(|index| tour.images.get_mut(index))
        {
            image.restore_image_bytes(bytes);
        }
    }
    Ok(())
}

impl std::fmt::Debug for TourStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TourStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}
