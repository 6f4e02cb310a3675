//! Append-only experiment logs
//!
//! These files are the experiment record, separate from `tracing`
//! diagnostics. Layout under the log root:
//!
//! ```text
//! _HEAT_SIMPLE_THRESHOLD_LOGS/<subject>_<session>_<stamp>.txt
//! _HEAT_LOGS/<subject>_<session>_<stamp>/
//!     <subject>_<session>_<stamp>.txt                      marker CSV
//!     <subject>_<session>_<stamp>_temperatures_<target>/
//!         trial_001_<stamp>.csv                            samples
//! ```
//!
//! Every line is flushed as soon as it is written; nothing is rewritten.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use thermode_core::marker::Marker;
use thermode_core::types::{Response, ZoneVector};

use crate::error::LogError;

/// Folder holding threshold-search logs.
pub const THRESHOLD_DIR: &str = "_HEAT_SIMPLE_THRESHOLD_LOGS";

/// Folder holding cyclic session logs.
pub const CYCLIC_DIR: &str = "_HEAT_LOGS";

/// Stamp used in file names and CSV rows.
pub const FILE_STAMP_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Stamp used in the threshold log header.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker log header.
pub const MARKER_CSV_HEADER: &str = "ms,year_month_day_hour_min_sec,marker";

/// Temperature capture header.
pub const TEMPERATURE_CSV_HEADER: &str = "temp_1,temp_2,temp_3,temp_4,temp_5";

/// Wall-clock stamp in file-name format.
pub fn file_stamp(now: &DateTime<Local>) -> String {
    now.format(FILE_STAMP_FORMAT).to_string()
}

// ============================================================================
// Directories
// ============================================================================

/// Result of making sure a directory exists.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DirStatus {
    /// Directory was created
    Created,
    /// Directory already existed
    AlreadyPresent,
}

/// Create `path` (and missing parents) unless it already is a directory.
///
/// # Errors
///
/// Any failure other than "already exists as a directory".
pub fn ensure_dir(path: &Path) -> Result<DirStatus, LogError> {
    let created = match fs::create_dir(path) {
        Ok(()) => Ok(DirStatus::Created),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => {
            Ok(DirStatus::AlreadyPresent)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map(|()| DirStatus::Created)
        }
        Err(e) => Err(e),
    };

    created.map_err(|source| LogError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

/// Root folder of all experiment logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogLayout {
    root: PathBuf,
}

impl LogLayout {
    /// Use `root` as the log root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The log root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder for threshold-search logs.
    pub fn threshold_dir(&self) -> PathBuf {
        self.root.join(THRESHOLD_DIR)
    }

    /// Folder for cyclic session folders.
    pub fn cyclic_dir(&self) -> PathBuf {
        self.root.join(CYCLIC_DIR)
    }
}

// ============================================================================
// Append-only file
// ============================================================================

#[derive(Debug)]
struct AppendFile {
    path: PathBuf,
    file: File,
}

impl AppendFile {
    fn open(path: PathBuf) -> Result<Self, LogError> {
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Ok(Self { path, file }),
            Err(source) => Err(LogError::Write { path, source }),
        }
    }

    fn append(&mut self, text: &str) -> Result<(), LogError> {
        self.file
            .write_all(text.as_bytes())
            .and_then(|()| self.file.flush())
            .map_err(|source| LogError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

// ============================================================================
// Threshold Log
// ============================================================================

/// Plain-text record of one threshold search.
#[derive(Debug)]
pub struct ThresholdLog {
    file: AppendFile,
}

impl ThresholdLog {
    /// Create the log file and write the header block.
    ///
    /// # Errors
    ///
    /// Returns [`LogError`] if the folder or file cannot be created.
    pub fn create(
        layout: &LogLayout,
        subject_id: &str,
        session: &str,
        now: &DateTime<Local>,
    ) -> Result<Self, LogError> {
        let dir = layout.threshold_dir();
        ensure_dir(&dir)?;

        let name = format!("{subject_id}_{session}_{}.txt", file_stamp(now));
        let mut file = AppendFile::open(dir.join(name))?;
        file.append(&format!(
            "Subject ID: {subject_id}\nSession: {session}\nDate: {}\n\n",
            now.format(DATE_FORMAT)
        ))?;

        tracing::info!("Threshold log at {}", file.path.display());
        Ok(Self { file })
    }

    /// Path of the log file.
    pub fn path(&self) -> &Path {
        &self.file.path
    }

    /// Record one answered trial.
    pub fn trial(&mut self, temperature_c: u8, response: Response) -> Result<(), LogError> {
        self.file.append(&format!(
            "Temperature: {temperature_c}\nResponse: {}\n",
            response.code()
        ))
    }

    /// Record the confirmed threshold.
    pub fn threshold(&mut self, threshold_c: u8) -> Result<(), LogError> {
        self.file.append(&format!("\nThreshold: {threshold_c}\n"))
    }

    /// Record that the ceiling was passed without a painful answer.
    pub fn max_exceeded(&mut self, attempted_c: u8) -> Result<(), LogError> {
        self.file.append(&format!("\nMax temp exceeded: {attempted_c}\n"))
    }
}

// ============================================================================
// Cyclic Log
// ============================================================================

/// Marker CSV and per-trial temperature captures of one cyclic session.
#[derive(Debug)]
pub struct CyclicLog {
    session_dir: PathBuf,
    markers: AppendFile,
    captures: TemperatureCapture,
}

impl CyclicLog {
    /// Create the session folder, marker log and temperature folder.
    ///
    /// # Errors
    ///
    /// Returns [`LogError`] if any folder or file cannot be created.
    pub fn create(
        layout: &LogLayout,
        subject_id: &str,
        session: &str,
        target_c: u8,
        now: &DateTime<Local>,
    ) -> Result<Self, LogError> {
        let base = format!("{subject_id}_{session}_{}", file_stamp(now));

        let cyclic_dir = layout.cyclic_dir();
        ensure_dir(&cyclic_dir)?;
        let session_dir = cyclic_dir.join(&base);
        ensure_dir(&session_dir)?;

        let mut markers = AppendFile::open(session_dir.join(format!("{base}.txt")))?;
        markers.append(&format!("{MARKER_CSV_HEADER}\n"))?;

        let captures =
            TemperatureCapture::create(session_dir.join(format!("{base}_temperatures_{target_c}")))?;

        tracing::info!("Cyclic logs in {}", session_dir.display());
        Ok(Self {
            session_dir,
            markers,
            captures,
        })
    }

    /// Session folder.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Marker CSV path.
    pub fn marker_path(&self) -> &Path {
        &self.markers.path
    }

    /// Temperature capture folder.
    pub fn temperature_dir(&self) -> &Path {
        self.captures.dir()
    }

    /// Append one marker event row.
    pub fn event(&mut self, elapsed_ms: u64, wall_clock: &str, marker: Marker) -> Result<(), LogError> {
        self.markers.append(&format!("{elapsed_ms},{wall_clock},{marker}\n"))
    }

    /// Write the samples of one trial to their own CSV.
    pub fn capture(
        &mut self,
        trial: u32,
        now: &DateTime<Local>,
        samples: &[ZoneVector],
    ) -> Result<PathBuf, LogError> {
        self.captures.write_trial(trial, now, samples)
    }
}

/// Folder of per-trial temperature CSVs.
#[derive(Debug)]
pub struct TemperatureCapture {
    dir: PathBuf,
}

impl TemperatureCapture {
    /// Create the capture folder.
    ///
    /// # Errors
    ///
    /// Returns [`LogError`] if the folder cannot be created.
    pub fn create(dir: PathBuf) -> Result<Self, LogError> {
        ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    /// Capture folder.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `trial_<nnn>_<stamp>.csv` with a header and one row per sample.
    pub fn write_trial(
        &self,
        trial: u32,
        now: &DateTime<Local>,
        samples: &[ZoneVector],
    ) -> Result<PathBuf, LogError> {
        let path = self
            .dir
            .join(format!("trial_{trial:03}_{}.csv", file_stamp(now)));

        let mut body = String::with_capacity(TEMPERATURE_CSV_HEADER.len() + samples.len() * 26);
        body.push_str(TEMPERATURE_CSV_HEADER);
        body.push('\n');
        for sample in samples {
            let row: Vec<String> = sample.iter().map(|t| format!("{t:.1}")).collect();
            body.push_str(&row.join(","));
            body.push('\n');
        }

        let mut file = AppendFile::open(path.clone())?;
        file.append(&body)?;
        tracing::debug!("Trial {} temperatures: {} samples", trial, samples.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use thermode_core::types::Zone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap()
    }

    #[test]
    fn test_ensure_dir_reports_existing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("b");
        assert_eq!(ensure_dir(&dir).unwrap(), DirStatus::Created);
        assert_eq!(ensure_dir(&dir).unwrap(), DirStatus::AlreadyPresent);
    }

    #[test]
    fn test_ensure_dir_fails_on_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("taken");
        fs::write(&file, "x").unwrap();
        assert!(matches!(ensure_dir(&file), Err(LogError::CreateDir { .. })));
    }

    #[test]
    fn test_threshold_log_format() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(tmp.path());
        let mut log = ThresholdLog::create(&layout, "S01", "A", &fixed_now()).unwrap();
        log.trial(46, Response::NotPainful).unwrap();
        log.trial(47, Response::Painful).unwrap();
        log.threshold(47).unwrap();

        assert_eq!(
            log.path(),
            tmp.path().join(THRESHOLD_DIR).join("S01_A_2024_03_07_14_05_09.txt")
        );
        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            text,
            "Subject ID: S01\nSession: A\nDate: 2024-03-07 14:05:09\n\n\
             Temperature: 46\nResponse: N\n\
             Temperature: 47\nResponse: Y\n\
             \nThreshold: 47\n"
        );
    }

    #[test]
    fn test_cyclic_log_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(tmp.path());
        let now = fixed_now();
        let mut log = CyclicLog::create(&layout, "S01", "B", 51, &now).unwrap();

        let base = "S01_B_2024_03_07_14_05_09";
        assert_eq!(log.session_dir(), tmp.path().join(CYCLIC_DIR).join(base));
        assert_eq!(log.marker_path(), log.session_dir().join(format!("{base}.txt")));
        assert_eq!(
            log.temperature_dir(),
            log.session_dir().join(format!("{base}_temperatures_51"))
        );

        log.event(0, &file_stamp(&now), Marker::BEGIN).unwrap();
        log.event(1_000, &file_stamp(&now), Marker::for_zone(Zone::Z1)).unwrap();
        let text = fs::read_to_string(log.marker_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], MARKER_CSV_HEADER);
        assert_eq!(lines[1], "0,2024_03_07_14_05_09,11");
        assert_eq!(lines[2], "1000,2024_03_07_14_05_09,1");
    }

    #[test]
    fn test_capture_files_are_unique_per_trial() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = LogLayout::new(tmp.path());
        let now = fixed_now();
        let mut log = CyclicLog::create(&layout, "S01", "B", 51, &now).unwrap();

        let samples = [[32.0, 51.0, 32.0, 32.0, 32.0], [32.0, 50.96, 32.0, 32.0, 31.9]];
        let first = log.capture(1, &now, &samples).unwrap();
        let second = log.capture(2, &now, &samples[..1]).unwrap();
        assert_ne!(first, second);

        let text = fs::read_to_string(&first).unwrap();
        assert_eq!(
            text,
            "temp_1,temp_2,temp_3,temp_4,temp_5\n\
             32.0,51.0,32.0,32.0,32.0\n\
             32.0,51.0,32.0,32.0,31.9\n"
        );
        assert!(first.file_name().unwrap().to_string_lossy().starts_with("trial_001_"));
    }

    #[test]
    fn test_unwritable_root_is_log_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("root");
        fs::write(&blocker, "x").unwrap();
        let layout = LogLayout::new(&blocker);
        assert!(ThresholdLog::create(&layout, "S", "1", &fixed_now()).is_err());
    }
}
