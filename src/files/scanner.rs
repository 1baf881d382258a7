//! Directory watcher. Converts "file appears in the watch directory" into
//! "descriptor enqueued exactly once", classifying each file by size.

use std::{
    fs,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::{select, tick};
use log::{debug, error, info};

use crate::{
    config,
    files::{CSV_EXTENSION, FileCache, FileQueue, FileRef, StopToken},
};

pub struct Scanner {
    config:      Arc<config::FileProcessor>,
    files:       Arc<FileQueue>,
    split_files: Arc<FileQueue>,
    cache:       FileCache,
    stop:        StopToken,
}

impl Scanner {
    pub fn new(
        config: Arc<config::FileProcessor>,
        files: Arc<FileQueue>,
        split_files: Arc<FileQueue>,
        cache: FileCache,
        stop: StopToken,
    ) -> Scanner {
        Scanner {
            config,
            files,
            split_files,
            cache,
            stop,
        }
    }

    /// Scan immediately, then on every tick, until the stop token fires.
    pub fn run(mut self) {
        let dir = self.config.files_dir.clone();
        info!("start scanning files in directory={}", dir.display());
        if !dir.is_dir() {
            // not fatal: the directory may appear later, the ticker retries
            error!("can't open directory={}: not a directory", dir.display());
        }

        let ticker = tick(Duration::from_millis(self.config.file_scanner.check_every_ms));
        let stop = self.stop.receiver().clone();
        self.scan_dir();
        loop {
            select! {
                recv(ticker) -> _ => {
                    debug!("rescan directory={}", dir.display());
                    self.scan_dir();
                },
                recv(stop) -> _ => {
                    info!("stop scanning files in directory={}", dir.display());
                    return;
                },
            }
        }
    }

    fn scan_dir(&mut self) {
        let entries = match fs::read_dir(&self.config.files_dir) {
            Ok(entries) => entries,
            Err(err) => {
                error!(
                    "can't open directory={}: ({err})",
                    self.config.files_dir.display()
                );
                return;
            },
        };
        for entry in entries {
            match entry {
                Ok(entry) => {
                    if self.valid(&entry) {
                        self.add(&entry);
                    }
                },
                Err(err) => error!(
                    "can't read entry in directory={}: ({err})",
                    self.config.files_dir.display()
                ),
            }
        }
    }

    /// Regular `.csv` files only; directories and other extensions are
    /// left alone.
    fn valid(&self, entry: &fs::DirEntry) -> bool {
        let path = entry.path();
        path.is_file() && path.extension().is_some_and(|ext| ext == CSV_EXTENSION)
    }

    /// The atomic claim. Renaming under a nanosecond prefix is what makes
    /// the file ours: a later scan can only observe the new name, which is
    /// already in the cache. Classification stats the renamed file, so
    /// chunk files written by the splitter are measured at their real size.
    fn add(&mut self, entry: &fs::DirEntry) {
        let path = entry.path();
        if self.cache.get(&path).is_some() {
            return;
        }

        debug!("add entry={} to files queue", path.display());

        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let original_name = entry.file_name().to_string_lossy().into_owned();
        let new_file = FileRef::new(
            &self.config.files_dir,
            format!("{now_ns}_{original_name}"),
        );
        if let Err(err) = fs::rename(&path, &new_file.path) {
            error!(
                "can't rename entry={} to={new_file}: ({err})",
                path.display()
            );
            return;
        }

        // claimed: from here on the file must never be enqueued twice,
        // even if routing below fails
        self.cache.put(new_file.clone());

        let size = match fs::metadata(&new_file.path) {
            Ok(meta) => meta.len(),
            Err(err) => {
                error!("can't get file={new_file} info: ({err})");
                return;
            },
        };

        if size >= self.config.max_file_size_bytes {
            if let Err(err) = self.split_files.put(new_file) {
                error!("can't add file to split files queue: ({err})");
            }
            return;
        }
        if let Err(err) = self.files.put(new_file) {
            error!("can't add file to files queue: ({err})");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, path::Path, thread, time::Duration};

    use tempfile::TempDir;

    use super::*;
    use crate::files::stop_channel;

    fn test_config(dir: &Path, max_file_size_bytes: u64) -> Arc<config::FileProcessor> {
        Arc::new(config::FileProcessor {
            files_dir: dir.to_path_buf(),
            max_file_size_bytes,
            file_scanner: config::FileScanner { check_every_ms: 5 },
            ..config::FileProcessor::default()
        })
    }

    fn test_scanner(
        dir: &Path,
        max_file_size_bytes: u64,
    ) -> (Scanner, Arc<FileQueue>, Arc<FileQueue>, crate::files::StopHandle) {
        let files = Arc::new(FileQueue::new(16));
        let split_files = Arc::new(FileQueue::new(16));
        let (handle, stop) = stop_channel();
        let scanner = Scanner::new(
            test_config(dir, max_file_size_bytes),
            files.clone(),
            split_files.clone(),
            FileCache::new(),
            stop,
        );
        (scanner, files, split_files, handle)
    }

    fn drop_file(dir: &Path, name: &str, bytes: usize) {
        let mut f = fs::File::create(dir.join(name)).unwrap();
        f.write_all(&vec![b'x'; bytes]).unwrap();
    }

    fn entries(dir: &Path) -> Vec<fs::DirEntry> {
        fs::read_dir(dir).unwrap().map(|e| e.unwrap()).collect()
    }

    #[test]
    fn valid_accepts_only_csv_files() {
        let dir = TempDir::new().unwrap();
        drop_file(dir.path(), "a.csv", 10);
        drop_file(dir.path(), "b.txt", 10);
        fs::create_dir(dir.path().join("sub.csv")).unwrap();

        let (scanner, ..) = test_scanner(dir.path(), 1 << 20);
        let mut accepted: Vec<String> = entries(dir.path())
            .iter()
            .filter(|e| scanner.valid(e))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        accepted.sort();
        assert_eq!(accepted, ["a.csv"]);
    }

    #[test]
    fn add_claims_and_enqueues_once() {
        let dir = TempDir::new().unwrap();
        drop_file(dir.path(), "a.csv", 100);

        let (mut scanner, files, split_files, _handle) = test_scanner(dir.path(), 1 << 20);
        scanner.scan_dir();

        let claimed = files.get().unwrap();
        assert!(claimed.name.ends_with("_a.csv"));
        assert!(claimed.path.exists());
        assert!(!dir.path().join("a.csv").exists());
        assert!(split_files.is_empty());
        assert_eq!(scanner.cache.len(), 1);
        assert!(scanner.cache.get(&claimed.path).is_some());
    }

    #[test]
    fn rescan_of_unchanged_directory_enqueues_nothing() {
        let dir = TempDir::new().unwrap();
        drop_file(dir.path(), "a.csv", 100);

        let (mut scanner, files, _split_files, _handle) = test_scanner(dir.path(), 1 << 20);
        scanner.scan_dir();
        assert_eq!(files.data().try_iter().count(), 1);

        scanner.scan_dir();
        assert!(files.is_empty());
        assert_eq!(scanner.cache.len(), 1);
    }

    #[test]
    fn oversized_file_is_routed_to_split_queue() {
        let dir = TempDir::new().unwrap();
        drop_file(dir.path(), "big.csv", 500);

        let (mut scanner, files, split_files, _handle) = test_scanner(dir.path(), 100);
        scanner.scan_dir();

        assert!(files.is_empty());
        let claimed = split_files.get().unwrap();
        assert!(claimed.name.ends_with("_big.csv"));
        assert_eq!(scanner.cache.len(), 1);
    }

    #[test]
    fn size_boundary_is_inclusive() {
        let dir = TempDir::new().unwrap();
        drop_file(dir.path(), "edge.csv", 100);

        let (mut scanner, files, split_files, _handle) = test_scanner(dir.path(), 100);
        scanner.scan_dir();

        assert!(files.is_empty());
        assert!(split_files.get().is_ok());
    }

    #[test]
    fn file_already_in_cache_is_skipped() {
        let dir = TempDir::new().unwrap();
        drop_file(dir.path(), "a.csv", 100);

        let (mut scanner, files, split_files, _handle) = test_scanner(dir.path(), 1 << 20);
        let entry = entries(dir.path()).remove(0);
        scanner
            .cache
            .put(FileRef::new(dir.path(), "a.csv"));

        scanner.add(&entry);

        assert!(files.is_empty());
        assert!(split_files.is_empty());
        assert_eq!(scanner.cache.len(), 1);
        // never claimed, so never renamed
        assert!(dir.path().join("a.csv").exists());
    }

    #[test]
    fn run_picks_up_files_until_stopped() {
        let dir = TempDir::new().unwrap();
        let (scanner, files, _split_files, handle) = test_scanner(dir.path(), 1 << 20);
        let runner = thread::spawn(move || scanner.run());

        drop_file(dir.path(), "a.csv", 50);
        let data = files.data();
        let got = data.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(got.name.ends_with("_a.csv"));

        handle.stop();
        runner.join().unwrap();
    }
}
