//! Persistence: per-domain best configurations and the append-only
//! generation telemetry log.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::schema::{BestConfigRecord, GenerationRecord};

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stores the best configuration discovered per domain, one JSON file per
/// domain. Writes go to a temp file first and land via atomic rename, so
/// concurrent runs of different domains and external readers never see a
/// torn record.
#[derive(Debug)]
pub struct BestConfigStore {
    dir: PathBuf,
}

impl BestConfigStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, domain: &str) -> PathBuf {
        self.dir.join(format!("{domain}.best.json"))
    }

    /// Persist a domain's best record, replacing any previous one.
    pub fn save(&self, record: &BestConfigRecord) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&record.domain);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!("saved best config for {} to {}", record.domain, path.display());
        Ok(path)
    }

    /// Load a domain's best record; `None` when nothing has been saved.
    pub fn load(&self, domain: &str) -> Result<Option<BestConfigRecord>, StoreError> {
        let path = self.path_for(domain);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}

/// Append-only, line-delimited JSON log of per-generation telemetry.
/// External reporting tools consume consecutive lines; the format never
/// rewrites past records.
pub struct TelemetryLog {
    writer: BufWriter<File>,
}

impl TelemetryLog {
    /// Open (or create) a telemetry log for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Append one generation record as a single JSON line.
    pub fn append(&mut self, record: &GenerationRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{unix_timestamp, Config};
    use std::io::BufRead;

    fn sample_record(domain: &str, fitness: f64) -> BestConfigRecord {
        let mut config = Config::new();
        config.insert("gain".into(), 6.5);
        BestConfigRecord {
            domain: domain.to_string(),
            fitness,
            config,
            timestamp: unix_timestamp(),
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BestConfigStore::new(dir.path()).unwrap();

        assert!(store.load("audio").unwrap().is_none());

        store.save(&sample_record("audio", 0.7)).unwrap();
        let loaded = store.load("audio").unwrap().unwrap();
        assert_eq!(loaded.domain, "audio");
        assert_eq!(loaded.fitness, 0.7);
        assert_eq!(loaded.config["gain"], 6.5);
    }

    #[test]
    fn test_save_replaces_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = BestConfigStore::new(dir.path()).unwrap();

        store.save(&sample_record("memory", 0.4)).unwrap();
        store.save(&sample_record("memory", 0.9)).unwrap();
        let loaded = store.load("memory").unwrap().unwrap();
        assert_eq!(loaded.fitness, 0.9);

        // No leftover temp file after the rename.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_domains_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = BestConfigStore::new(dir.path()).unwrap();
        store.save(&sample_record("audio", 0.6)).unwrap();
        store.save(&sample_record("memory", 0.3)).unwrap();
        assert_eq!(store.load("audio").unwrap().unwrap().fitness, 0.6);
        assert_eq!(store.load("memory").unwrap().unwrap().fitness, 0.3);
    }

    #[test]
    fn test_telemetry_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("generations.jsonl");

        {
            let mut log = TelemetryLog::open(&path).unwrap();
            for generation in 0..3 {
                log.append(&GenerationRecord {
                    generation,
                    timestamp: unix_timestamp(),
                    best_fitness: 0.1 * generation as f64,
                    avg_fitness: 0.05,
                    valid_individuals: 8,
                    population_size: 10,
                })
                .unwrap();
            }
        }
        // Reopening appends rather than truncating.
        {
            let mut log = TelemetryLog::open(&path).unwrap();
            log.append(&GenerationRecord {
                generation: 3,
                timestamp: unix_timestamp(),
                best_fitness: 0.4,
                avg_fitness: 0.2,
                valid_individuals: 9,
                population_size: 10,
            })
            .unwrap();
        }

        let file = File::open(&path).unwrap();
        let lines: Vec<GenerationRecord> = std::io::BufReader::new(file)
            .lines()
            .map(|l| serde_json::from_str(&l.unwrap()).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3].generation, 3);
    }
}
