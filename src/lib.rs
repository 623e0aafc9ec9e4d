//! # DayRoll
//!
//! DayRoll is a daily rotating file writer. It appends bytes to a single
//! "live" file and, once the calendar day has moved on (or the live file was
//! last modified on an earlier day), renames it to a dated archive named
//! `YYYY-MM-DD-<basename>` next to it, reopens a fresh live file and sweeps
//! archives that fell out of the retention window.
//!
//! Every write and every rotation is serialized by one lock per writer, so a
//! single [`RotatingWriter`] can be shared between threads behind an `Arc`.
//! The rotation check itself is lock-free.
//!
//! ## Example
//!
//! ```rust
//! use dayroll::{Retention, RotatingWriterBuilder, TimeZone};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dir = std::env::temp_dir().join("dayroll-doc");
//!     let writer = RotatingWriterBuilder::new(dir.join("app.log"))
//!         .retention(Retention::Days(3)) // Keep today's archives and the 3 days before
//!         .time_zone(TimeZone::UTC) // Decide calendar days in UTC
//!         .build()?;
//!
//!     writer.rotate_write(b"service started\n")?;
//!     writer.close()?;
//!     Ok(())
//! }
//! ```
use {
    chrono::{DateTime, Days, FixedOffset, Local, NaiveDate, Utc},
    regex::Regex,
    std::{
        collections::HashSet,
        ffi::{OsStr, OsString},
        fmt::{self, Debug},
        fs,
        io::{self, Write as _},
        path::{Component, Path, PathBuf},
        sync::{
            atomic::{AtomicI64, Ordering},
            Mutex, MutexGuard, PoisonError,
        },
    },
    tracing::{debug, info},
};

#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

/// Path used by [`RotatingWriter::with_defaults`].
pub const DEFAULT_FILE_PATH: &str = "/tmp/rotating.log";

/// Number of days kept by [`RotatingWriter::with_defaults`].
pub const DEFAULT_MAX_AGE: u32 = 7;

/// Largest accepted day count for [`Retention::Days`] (roughly a century).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Permissions given to a live file when it is created.
#[cfg_attr(not(unix), allow(dead_code))]
const DEFAULT_FILE_MODE: u32 = 0o644;

/// `strftime` pattern of the date prefix in archive file names.
const ARCHIVE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Specifies the time zone in which calendar days are decided.
///
/// This setting affects:
/// - When a new day starts, and so when rotation becomes due
/// - Which day a file's modification time falls on
/// - The date prefix of archive names and the retention window
///
/// # Examples
/// ```
/// use dayroll::TimeZone;
/// use chrono::FixedOffset;
///
/// // Use UTC time for global deployments
/// let utc = TimeZone::UTC;
///
/// // Follow the system time zone, including daylight saving changes
/// let local = TimeZone::Local;
///
/// // Use a fixed offset for a specific region (e.g., UTC+8)
/// let china = TimeZone::Fix(FixedOffset::east_opt(8 * 3600).unwrap());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeZone {
    /// Use UTC. Best when several hosts in different regions share logs.
    UTC,
    /// Use the system's local time zone, re-evaluated on every check so that
    /// daylight saving changes are followed.
    Local,
    /// Use a fixed offset regardless of where the application runs.
    Fix(FixedOffset),
}

impl TimeZone {
    /// Express an instant in this time zone.
    fn localize(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self {
            TimeZone::UTC => instant.fixed_offset(),
            TimeZone::Local => instant.with_timezone(&Local).fixed_offset(),
            TimeZone::Fix(offset) => instant.with_timezone(offset),
        }
    }

    /// The calendar date an instant falls on in this time zone.
    fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.localize(instant).date_naive()
    }
}

/// How long archived files survive the cleanup sweep.
///
/// Retention counts calendar days, not files: gaps in the archive history
/// (days on which nothing was rotated) never extend how long older archives
/// are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep every archive; the cleanup sweep never runs.
    Unlimited,
    /// Keep archives dated today and on the given number of preceding days.
    /// `Days(0)` keeps only archives dated today.
    Days(u32),
}

impl Default for Retention {
    fn default() -> Self {
        Retention::Days(DEFAULT_MAX_AGE)
    }
}

impl TryFrom<i64> for Retention {
    type Error = RotateError;

    /// Convert an integer day count, where `-1` means unlimited retention.
    fn try_from(days: i64) -> Result<Self, Self::Error> {
        match days {
            -1 => Ok(Retention::Unlimited),
            0.. => u32::try_from(days)
                .map(Retention::Days)
                .map_err(|_| RotateError::InvalidRetention(days)),
            _ => Err(RotateError::InvalidRetention(days)),
        }
    }
}

/// An archived file belonging to a [`RotatingWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    /// The date embedded in the archive name.
    pub date: NaiveDate,
    /// Full path of the archive.
    pub path: PathBuf,
}

/// Errors that can occur when using the rotating writer.
#[derive(Debug, thiserror::Error)]
pub enum RotateError {
    #[error("Path should be absolute and name a file ('{0}' given)")]
    InvalidPath(PathBuf),
    #[error("Retention should be -1 or between 0 and {max} days ({0} given)", max = MAX_RETENTION_DAYS)]
    InvalidRetention(i64),
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to open file '{path}': {source}")]
    OpenFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to close file '{path}': {source}")]
    CloseFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to rename file from '{from}' to '{to}': {source}")]
    RenameFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to set file permissions for '{path}': {source}")]
    SetPermissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("File IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Internal error: {0}")]
    InternalError(String),
}

#[allow(clippy::io_other_error)]
impl From<RotateError> for io::Error {
    fn from(err: RotateError) -> Self {
        let kind = match err {
            RotateError::Io(inner) => return inner,
            RotateError::CreateDirectory { ref source, .. }
            | RotateError::OpenFile { ref source, .. }
            | RotateError::CloseFile { ref source, .. }
            | RotateError::RenameFile { ref source, .. }
            | RotateError::RemoveFile { ref source, .. }
            | RotateError::SetPermissions { ref source, .. } => source.kind(),
            RotateError::InvalidPath(_) | RotateError::InvalidRetention(_) => io::ErrorKind::InvalidInput,
            RotateError::InternalError(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Lexically normalize a path: drop `.` segments, fold `..` into the
/// preceding segment and ignore repeated separators.
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                // `..` above the root stays at the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}

/// The archive file name for `date`: `YYYY-MM-DD-<basename>`.
fn archive_name(date: NaiveDate, basename: &OsStr) -> OsString {
    let mut name = OsString::from(format!("{}-", date.format(ARCHIVE_DATE_FORMAT)));
    name.push(basename);
    name
}

/// Archive names that survive a sweep: today and the `days` days before it.
fn protected_names(basename: &OsStr, today: NaiveDate, days: u32) -> HashSet<OsString> {
    (0..=u64::from(days))
        .filter_map(|offset| today.checked_sub_days(Days::new(offset)))
        .map(|date| archive_name(date, basename))
        .collect()
}

/// Whether a directory entry belongs to the archive family of `basename`.
/// Hidden files and the live file itself never do.
fn is_archive_candidate(name: &OsStr, basename: &OsStr) -> bool {
    let name = name.as_encoded_bytes();
    let basename = basename.as_encoded_bytes();
    !name.starts_with(b".") && name != basename && name.ends_with(basename)
}

/// Copy `reader` to the end of `archive`. On failure the archive is cut
/// back to the length it had before the copy.
fn append_or_restore<R: io::Read>(reader: &mut R, archive: &mut fs::File) -> io::Result<u64> {
    let original_len = archive.metadata()?.len();
    match io::copy(reader, archive).and_then(|copied| archive.flush().map(|()| copied)) {
        Ok(copied) => Ok(copied),
        Err(err) => {
            archive.set_len(original_len)?;
            Err(err)
        }
    }
}

/// Metadata for the rotating writer.
/// Everything here is fixed once the writer is built.
struct RotatingWriterMeta {
    /// The cleaned, absolute path of the live file.
    path: PathBuf,
    /// The directory holding the live file and its archives.
    directory: PathBuf,
    /// The final segment of `path`, shared by every archive name.
    basename: OsString,
    /// How long archives are kept.
    retention: Retention,
    /// The time zone calendar days are decided in.
    time_zone: TimeZone,
    /// Explicit permissions to enforce on the live file (Unix-like systems
    /// only). When unset, new files are created with mode 0o644 and the
    /// process umask applies.
    file_mode: Option<u32>,
    /// Whether the `io::Write` adapter rotates before each write.
    rotate_on_write: bool,
}

impl RotatingWriterMeta {
    /// Get the current time in the configured time zone.
    fn now(&self) -> DateTime<FixedOffset> {
        self.time_zone.localize(Utc::now())
    }

    /// Get today's date in the configured time zone.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Get the path an archive dated `date` is stored at.
    fn archive_path(&self, date: NaiveDate) -> PathBuf {
        self.directory.join(archive_name(date, &self.basename))
    }

    /// Open the live file.
    /// The file is opened in append mode and created if it doesn't exist. If
    /// the directory does not exist either, it is created first.
    /// # Returns
    /// The open live file.
    fn open_live_file(&self) -> Result<fs::File, RotateError> {
        let mut open_options = fs::OpenOptions::new();
        open_options.append(true).create(true);
        #[cfg(unix)]
        {
            open_options.mode(self.file_mode.unwrap_or(DEFAULT_FILE_MODE));
        }

        let mut open_res = open_options.open(&self.path);
        if matches!(&open_res, Err(err) if err.kind() == io::ErrorKind::NotFound) {
            fs::create_dir_all(&self.directory).map_err(|source| RotateError::CreateDirectory {
                path: self.directory.clone(),
                source,
            })?;
            open_res = open_options.open(&self.path);
        }

        let file = open_res.map_err(|source| RotateError::OpenFile {
            path: self.path.clone(),
            source,
        })?;

        self.set_permissions(&self.path)?;

        debug!(path = %self.path.display(), "opened live file");
        Ok(file)
    }

    /// Set the permissions for a file based on the configured file mode.
    ///
    /// This only has an effect when a file mode has been configured and the
    /// target is a Unix-like operating system. Elsewhere a warning is logged
    /// and nothing happens.
    fn set_permissions(&self, path: &Path) -> Result<(), RotateError> {
        if let Some(mode) = self.file_mode {
            #[cfg(unix)]
            {
                fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|source| {
                    RotateError::SetPermissions {
                        path: path.to_path_buf(),
                        source,
                    }
                })?;
            }
            #[cfg(not(unix))]
            {
                tracing::warn!(
                    path = %path.display(),
                    mode = format_args!("{mode:o}"),
                    "setting file permissions is not supported on non-Unix platforms"
                );
            }
        }
        Ok(())
    }

    /// Move the live file to its dated archive name.
    ///
    /// The date comes from the live file's own modification time, not from
    /// the current time. If the archive already exists (a second rotation on
    /// the same day), the live file is appended to it instead.
    /// # Returns
    /// The archive path, or `None` when there was no live file to archive.
    fn archive_live_file(&self) -> Result<Option<PathBuf>, RotateError> {
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no live file to archive");
                return Ok(None);
            }
            Err(err) => return Err(RotateError::Io(err)),
        };
        let modified = self.time_zone.date_of(metadata.modified()?.into());
        let archive_path = self.archive_path(modified);

        if archive_path.exists() {
            self.merge_into_archive(&archive_path)?;
        } else {
            fs::rename(&self.path, &archive_path).map_err(|source| RotateError::RenameFile {
                from: self.path.clone(),
                to: archive_path.clone(),
                source,
            })?;
        }

        info!(from = %self.path.display(), to = %archive_path.display(), "archived live file");
        Ok(Some(archive_path))
    }

    /// Append the live file to an existing archive and remove it.
    ///
    /// A failed copy truncates the archive back to its previous length and
    /// keeps the live file, so retrying the rotation does not duplicate data.
    fn merge_into_archive(&self, archive_path: &Path) -> Result<(), RotateError> {
        let mut live = fs::File::open(&self.path).map_err(|source| RotateError::OpenFile {
            path: self.path.clone(),
            source,
        })?;
        let mut archive = fs::OpenOptions::new()
            .append(true)
            .open(archive_path)
            .map_err(|source| RotateError::OpenFile {
                path: archive_path.to_path_buf(),
                source,
            })?;
        let merged = append_or_restore(&mut live, &mut archive)?;
        drop(live);

        fs::remove_file(&self.path).map_err(|source| RotateError::RemoveFile {
            path: self.path.clone(),
            source,
        })?;
        debug!(archive = %archive_path.display(), bytes = merged, "merged live file into existing archive");
        Ok(())
    }

    /// Remove archives whose date falls outside the retention window.
    ///
    /// Only called from [`RotatingWriter::rotate`] while the writer lock is
    /// held. The first failed removal stops the sweep; files removed before
    /// it stay removed.
    /// # Returns
    /// The number of removed archives.
    fn sweep(&self) -> Result<usize, RotateError> {
        let Retention::Days(days) = self.retention else {
            return Ok(0);
        };
        let protected = protected_names(&self.basename, self.today(), days);

        let mut removed = 0;
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let name = entry.file_name();
            if !is_archive_candidate(&name, &self.basename) || protected.contains(&name) {
                continue;
            }
            if entry.file_type()?.is_dir() {
                continue;
            }

            let path = entry.path();
            fs::remove_file(&path).map_err(|source| RotateError::RemoveFile {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), "removed expired archive");
            removed += 1;
        }
        Ok(removed)
    }
}

/// A file writer that rotates to a dated archive once per calendar day.
///
/// The writer owns its live file handle exclusively. Between closing the old
/// handle and opening the new one during a rotation there is no handle; if
/// the rotation fails in that gap, writes keep failing with an I/O error until
/// a later [`rotate`](RotatingWriter::rotate) succeeds.
pub struct RotatingWriter {
    meta: RotatingWriterMeta,
    /// Microseconds since the Unix epoch of construction or of the last
    /// successful rotation.
    last_rotation: AtomicI64,
    writer: Mutex<Option<fs::File>>,
}

impl RotatingWriter {
    /// Create a writer for `path` keeping `max_age` days of archives.
    ///
    /// `path` must be absolute. A `max_age` of `-1` keeps archives forever;
    /// anything lower is rejected.
    ///
    /// # Examples
    /// ```no_run
    /// use dayroll::RotatingWriter;
    ///
    /// let writer = RotatingWriter::new("/var/log/app/app.log", 3).unwrap();
    /// writer.rotate_write(b"hello\n").unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(path: P, max_age: i64) -> Result<Self, RotateError> {
        RotatingWriterBuilder::new(path)
            .retention(Retention::try_from(max_age)?)
            .build()
    }

    /// Create a writer for [`DEFAULT_FILE_PATH`] keeping
    /// [`DEFAULT_MAX_AGE`] days of archives.
    pub fn with_defaults() -> Result<Self, RotateError> {
        RotatingWriterBuilder::with_defaults().build()
    }

    /// The path of the live file.
    pub fn path(&self) -> &Path {
        &self.meta.path
    }

    /// The configured retention.
    pub fn retention(&self) -> Retention {
        self.meta.retention
    }

    /// When the writer was built or last rotated successfully.
    pub fn last_rotation(&self) -> DateTime<FixedOffset> {
        let micros = self.last_rotation.load(Ordering::Acquire);
        self.meta
            .time_zone
            .localize(DateTime::from_timestamp_micros(micros).unwrap_or_default())
    }

    /// Whether a live file handle is currently held.
    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// The path an archive dated `date` gets.
    pub fn archive_path(&self, date: NaiveDate) -> PathBuf {
        self.meta.archive_path(date)
    }

    fn lock(&self) -> MutexGuard<'_, Option<fs::File>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_rotated(&self) {
        self.last_rotation
            .store(Utc::now().timestamp_micros(), Ordering::Release);
    }

    /// Error reported when writing while no live file is open.
    fn not_open(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::NotConnected,
            format!("no open file for '{}', rotate to reopen it", self.meta.path.display()),
        )
    }

    /// Write `buf` to the live file with a single write call.
    ///
    /// No rotation check is done; see [`rotate_write`](Self::rotate_write).
    /// # Returns
    /// The number of bytes written, which may be less than `buf.len()`.
    pub fn write(&self, buf: &[u8]) -> Result<usize, RotateError> {
        let mut writer = self.lock();
        let file = writer.as_mut().ok_or_else(|| self.not_open())?;
        Ok(file.write(buf)?)
    }

    /// Write all of `buf` to the live file without letting other writes or a
    /// rotation in between.
    pub fn write_all(&self, buf: &[u8]) -> Result<(), RotateError> {
        let mut writer = self.lock();
        let file = writer.as_mut().ok_or_else(|| self.not_open())?;
        Ok(file.write_all(buf)?)
    }

    /// Flush the live file.
    pub fn flush(&self) -> Result<(), RotateError> {
        let mut writer = self.lock();
        let file = writer.as_mut().ok_or_else(|| self.not_open())?;
        Ok(file.flush()?)
    }

    /// Check if the live file should be rotated.
    ///
    /// Rotation is due when today differs from the day of the last rotation,
    /// or when the live file was last modified on a different day than the
    /// last rotation (a stale file handed over at start-up). The check takes
    /// no lock; two callers racing through it may rotate back to back.
    pub fn should_rotate(&self) -> bool {
        let last = self.last_rotation().date_naive();
        let today = self.meta.today();
        if today != last {
            debug!(%today, %last, "day changed since last rotation");
            return true;
        }

        if let Ok(modified) = fs::metadata(&self.meta.path).and_then(|metadata| metadata.modified()) {
            let modified = self.meta.time_zone.date_of(modified.into());
            if modified != last {
                debug!(%modified, %last, "live file modified on another day");
                return true;
            }
        }

        false
    }

    /// Rotate the live file unconditionally.
    ///
    /// Steps, each aborting the rotation on failure:
    /// 1. Close the current handle, leaving none.
    /// 2. Rename the live file to `YYYY-MM-DD-<basename>`, dated from its
    ///    modification time. Skipped when there is no live file.
    /// 3. Open a new live file.
    /// 4. Sweep expired archives unless retention is unlimited. A failed
    ///    sweep leaves the new file open.
    /// 5. Record the rotation time.
    pub fn rotate(&self) -> Result<(), RotateError> {
        let mut writer = self.lock();

        if let Some(file) = writer.take() {
            file.sync_all().map_err(|source| RotateError::CloseFile {
                path: self.meta.path.clone(),
                source,
            })?;
        }

        self.meta.archive_live_file()?;

        *writer = Some(self.meta.open_live_file()?);

        let removed = self.meta.sweep()?;
        if removed > 0 {
            debug!(removed, retention = ?self.meta.retention, "swept expired archives");
        }

        self.mark_rotated();
        Ok(())
    }

    /// Rotate only if [`should_rotate`](Self::should_rotate) says so.
    /// # Returns
    /// Whether a rotation happened.
    pub fn rotate_safe(&self) -> Result<bool, RotateError> {
        if !self.should_rotate() {
            return Ok(false);
        }
        self.rotate()?;
        Ok(true)
    }

    /// Rotate if due, then write `buf`. The write is skipped when the
    /// rotation fails.
    pub fn rotate_write(&self, buf: &[u8]) -> Result<usize, RotateError> {
        self.rotate_safe()?;
        self.write(buf)
    }

    /// List this writer's archives, oldest first.
    ///
    /// Only entries that are not directories and are named exactly `YYYY-MM-DD-<basename>` with a valid date are
    /// returned.
    pub fn archives(&self) -> Result<Vec<Archive>, RotateError> {
        let basename = self.meta.basename.to_string_lossy();
        let pattern = Regex::new(&format!(r"^(\d{{4}}-\d{{2}}-\d{{2}})-{}$", regex::escape(&basename)))
            .map_err(|err| RotateError::InternalError(err.to_string()))?;

        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.meta.directory)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Some(captures) = pattern.captures(&file_name) else {
                continue;
            };
            if let Ok(date) = NaiveDate::parse_from_str(&captures[1], ARCHIVE_DATE_FORMAT) {
                archives.push(Archive { date, path: entry.path() });
            }
        }

        archives.sort_by_key(|archive| archive.date);
        Ok(archives)
    }

    /// Flush and close the live file.
    ///
    /// Dropping the writer closes the file as well, but silently.
    pub fn close(self) -> Result<(), RotateError> {
        let file = self.writer.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = file {
            file.sync_all().map_err(|source| RotateError::CloseFile {
                path: self.meta.path.clone(),
                source,
            })?;
            debug!(path = %self.meta.path.display(), "closed live file");
        }
        Ok(())
    }
}

impl Debug for RotatingWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotatingWriter")
            .field("path", &self.meta.path)
            .field("retention", &self.meta.retention)
            .field("time_zone", &self.meta.time_zone)
            .field("last_rotation", &self.last_rotation())
            .field("open", &self.is_open())
            .finish()
    }
}

/// Provides a fluent interface for configuring RotatingWriter instances.
///
/// # Default Configuration
///
/// If not explicitly configured, a writer uses these defaults:
/// * Keep 7 days of archives
/// * Local system time zone
/// * New files created with mode 0o644
/// * The `io::Write` adapter does not rotate
///
/// # Examples
///
/// ```rust
/// use dayroll::{Retention, RotatingWriterBuilder, TimeZone};
///
/// let path = std::env::temp_dir().join("dayroll-builder").join("app.log");
/// let writer = RotatingWriterBuilder::new(path)
///     .retention(Retention::Unlimited) // Never sweep archives
///     .time_zone(TimeZone::UTC)
///     .rotate_on_write(true) // Rotate from the io::Write adapter
///     .build()
///     .unwrap();
/// ```
pub struct RotatingWriterBuilder {
    path: PathBuf,
    retention: Retention,
    time_zone: TimeZone,
    file_mode: Option<u32>,
    rotate_on_write: bool,
}

impl RotatingWriterBuilder {
    /// Create a new builder for the live file at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        RotatingWriterBuilder {
            path: path.as_ref().to_path_buf(),
            retention: Retention::default(),
            time_zone: TimeZone::Local,
            file_mode: None,
            rotate_on_write: false,
        }
    }

    /// Create a builder for [`DEFAULT_FILE_PATH`] keeping
    /// [`DEFAULT_MAX_AGE`] days of archives.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_FILE_PATH).retention(Retention::Days(DEFAULT_MAX_AGE))
    }

    /// Set how long archives are kept.
    pub fn retention(self, retention: Retention) -> Self {
        Self { retention, ..self }
    }

    /// Set the time zone calendar days are decided in.
    pub fn time_zone(self, time_zone: TimeZone) -> Self {
        Self { time_zone, ..self }
    }

    /// Set the file permissions for the live file (Unix-like systems only).
    /// This sets the file mode bits in octal notation like when using chmod.
    /// For example, 0o640 for rw-r----- permissions.
    pub fn file_mode(self, mode: u32) -> Self {
        Self {
            file_mode: Some(mode),
            ..self
        }
    }

    /// Make the `io::Write` adapter call
    /// [`rotate_write`](RotatingWriter::rotate_write) instead of a plain
    /// write, so that the writer rotates itself when used as a log appender.
    pub fn rotate_on_write(self, rotate_on_write: bool) -> Self {
        Self {
            rotate_on_write,
            ..self
        }
    }

    /// Build the rotating writer and open the live file.
    pub fn build(self) -> Result<RotatingWriter, RotateError> {
        let path = clean_path(&self.path);
        if !path.is_absolute() {
            return Err(RotateError::InvalidPath(self.path));
        }
        let (Some(directory), Some(basename)) = (path.parent(), path.file_name()) else {
            return Err(RotateError::InvalidPath(self.path));
        };
        if let Retention::Days(days) = self.retention {
            if days > MAX_RETENTION_DAYS {
                return Err(RotateError::InvalidRetention(i64::from(days)));
            }
        }

        let meta = RotatingWriterMeta {
            directory: directory.to_path_buf(),
            basename: basename.to_os_string(),
            path,
            retention: self.retention,
            time_zone: self.time_zone,
            file_mode: self.file_mode,
            rotate_on_write: self.rotate_on_write,
        };
        let file = meta.open_live_file()?;

        Ok(RotatingWriter {
            meta,
            last_rotation: AtomicI64::new(Utc::now().timestamp_micros()),
            writer: Mutex::new(Some(file)),
        })
    }
}

impl io::Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let writer: &RotatingWriter = *self;
        let written = if writer.meta.rotate_on_write {
            writer.rotate_write(buf)
        } else {
            RotatingWriter::write(writer, buf)
        };
        Ok(written?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(RotatingWriter::flush(self)?)
    }
}

impl io::Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut &*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn clean_path_folds_dots_and_separators() {
        assert_eq!(clean_path(Path::new("/var//log/./app.log")), PathBuf::from("/var/log/app.log"));
        assert_eq!(clean_path(Path::new("/var/tmp/../log/app.log")), PathBuf::from("/var/log/app.log"));
        assert_eq!(clean_path(Path::new("/../app.log")), PathBuf::from("/app.log"));
        assert_eq!(clean_path(Path::new("logs/../../app.log")), PathBuf::from("../app.log"));
    }

    #[test]
    fn retention_from_integer() {
        assert_eq!(Retention::try_from(-1).unwrap(), Retention::Unlimited);
        assert_eq!(Retention::try_from(0).unwrap(), Retention::Days(0));
        assert_eq!(Retention::try_from(7).unwrap(), Retention::Days(7));
        assert!(matches!(Retention::try_from(-2), Err(RotateError::InvalidRetention(-2))));
        assert!(matches!(
            Retention::try_from(i64::MAX),
            Err(RotateError::InvalidRetention(i64::MAX))
        ));
    }

    #[test]
    fn archive_name_prefixes_date() {
        assert_eq!(archive_name(date(2024, 3, 9), OsStr::new("app.log")), OsString::from("2024-03-09-app.log"));
    }

    #[test]
    fn protected_window_includes_today_and_n_previous_days() {
        let basename = OsStr::new("app.log");
        let protected = protected_names(basename, date(2024, 3, 2), 3);

        assert_eq!(protected.len(), 4);
        for name in ["2024-03-02-app.log", "2024-03-01-app.log", "2024-02-29-app.log", "2024-02-28-app.log"] {
            assert!(protected.contains(OsStr::new(name)), "{name} should be protected");
        }
        assert!(!protected.contains(OsStr::new("2024-02-27-app.log")));

        let today_only = protected_names(basename, date(2024, 3, 2), 0);
        assert_eq!(today_only.len(), 1);
        assert!(today_only.contains(OsStr::new("2024-03-02-app.log")));
    }

    #[test]
    fn archive_candidates() {
        let basename = OsStr::new("app.log");
        assert!(is_archive_candidate(OsStr::new("2024-03-02-app.log"), basename));
        assert!(is_archive_candidate(OsStr::new("old-app.log"), basename));
        assert!(!is_archive_candidate(OsStr::new("app.log"), basename));
        assert!(!is_archive_candidate(OsStr::new(".2024-03-02-app.log"), basename));
        assert!(!is_archive_candidate(OsStr::new("2024-03-02-app.log.gz"), basename));
        assert!(!is_archive_candidate(OsStr::new("other.txt"), basename));
    }

    #[test]
    fn fixed_time_zone_moves_the_date() {
        let instant = DateTime::parse_from_rfc3339("2024-03-01T22:30:00Z").unwrap().to_utc();
        let east = TimeZone::Fix(FixedOffset::east_opt(2 * 3600).unwrap());

        assert_eq!(TimeZone::UTC.date_of(instant), date(2024, 3, 1));
        assert_eq!(east.date_of(instant), date(2024, 3, 2));
    }

    #[test]
    fn build_rejects_invalid_configuration() {
        assert!(matches!(
            RotatingWriterBuilder::new("logs/app.log").build(),
            Err(RotateError::InvalidPath(_))
        ));
        assert!(matches!(RotatingWriterBuilder::new("/").build(), Err(RotateError::InvalidPath(_))));
        assert!(matches!(
            RotatingWriterBuilder::new("/tmp/app.log")
                .retention(Retention::Days(MAX_RETENTION_DAYS + 1))
                .build(),
            Err(RotateError::InvalidRetention(_))
        ));
    }

    #[test]
    fn defaults_builder_targets_default_path() {
        let builder = RotatingWriterBuilder::with_defaults();

        assert_eq!(DEFAULT_MAX_AGE, 7);
        assert_eq!(builder.path, PathBuf::from("/tmp/rotating.log"));
        assert_eq!(builder.retention, Retention::Days(7));
        assert_eq!(builder.time_zone, TimeZone::Local);
    }

    #[test]
    fn day_change_since_last_rotation_triggers_rotation() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = RotatingWriterBuilder::new(dir.path().join("app.log"))
            .retention(Retention::Unlimited)
            .time_zone(TimeZone::UTC)
            .build()
            .unwrap();
        assert!(!writer.should_rotate());

        let yesterday = Utc::now().timestamp_micros() - 24 * 60 * 60 * 1_000_000;
        writer.last_rotation.store(yesterday, Ordering::Release);

        assert!(writer.should_rotate());
        assert!(writer.rotate_safe().unwrap());
        assert!(!writer.rotate_safe().unwrap());
        assert_eq!(writer.last_rotation().date_naive(), Utc::now().date_naive());
    }

    /// Yields `good` once, then fails.
    struct FailingReader {
        good: Option<&'static [u8]>,
    }

    impl io::Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.good.take() {
                Some(bytes) => {
                    buf[..bytes.len()].copy_from_slice(bytes);
                    Ok(bytes.len())
                }
                None => Err(io::Error::new(io::ErrorKind::Other, "disk full")),
            }
        }
    }

    #[test]
    fn failed_append_restores_archive_length() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("2024-03-02-app.log");
        fs::write(&path, "kept\n").unwrap();
        let mut archive = fs::OpenOptions::new().append(true).open(&path).unwrap();

        let mut reader = FailingReader {
            good: Some(b"partial"),
        };
        let err = append_or_restore(&mut reader, &mut archive).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\n");

        let appended = append_or_restore(&mut &b"more\n"[..], &mut archive).unwrap();
        assert_eq!(appended, 5);
        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\nmore\n");
    }

    #[test]
    fn io_error_conversion_keeps_kind() {
        let err: io::Error = RotateError::RemoveFile {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        }
        .into();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        let err: io::Error = RotateError::InvalidRetention(-3).into();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
