//! Cuts oversized CSV files into fixed-row chunks written back into the
//! watch directory, where the scanner re-discovers them as regular files.

use std::{fs, sync::Arc, thread};

use crossbeam_channel::{Sender, bounded};
use log::{debug, error, info};
use threadpool::ThreadPool;

use crate::{
    CliResult, config,
    files::{FileQueue, FileRef, StopToken, move_file},
    util,
};

/// One chunk of a parent file, in row order, headed for `target`.
struct FileLines {
    target: FileRef,
    lines:  Vec<csv::ByteRecord>,
    parent: FileRef,
}

pub struct Splitter {
    config: Arc<config::FileProcessor>,
    files:  Arc<FileQueue>,
    stop:   StopToken,
}

impl Splitter {
    pub fn new(
        config: Arc<config::FileProcessor>,
        split_files: Arc<FileQueue>,
        stop: StopToken,
    ) -> Splitter {
        Splitter {
            config,
            files: split_files,
            stop,
        }
    }

    /// Reader side: one thread draining the oversized queue, one parse job
    /// per file on a pool. Writer side: a pool draining the internal chunk
    /// channel to disk. On stop, the read side is drained before the chunk
    /// channel is closed, so nothing ever sends on a closed channel.
    pub fn run(self) {
        info!("start file splitter");
        let workers = util::njobs(self.config.file_splitter.workers_count);
        let (lines_tx, lines_rx) =
            bounded::<FileLines>(self.config.file_splitter.lines_queue_size.max(1));

        let read_pool = ThreadPool::with_name("splitter-read".into(), workers);
        let reader = {
            let data = self.files.data();
            let pool = read_pool.clone();
            let config = self.config.clone();
            let lines_tx = lines_tx.clone();
            thread::spawn(move || {
                for file in data.iter() {
                    let config = config.clone();
                    let lines_tx = lines_tx.clone();
                    pool.execute(move || split_file(&config, &file, &lines_tx));
                }
            })
        };

        let mut writers = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx = lines_rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("splitter-write-{i}"))
                .spawn(move || {
                    info!("start file splitter worker");
                    for item in rx.iter() {
                        if let Err(err) = write_chunk(&item) {
                            error!(
                                "can't write file={} for parent={}: ({err})",
                                item.target, item.parent
                            );
                        }
                    }
                    info!("stop file splitter worker");
                });
            match spawned {
                Ok(handle) => writers.push(handle),
                Err(err) => error!("can't start file splitter worker: ({err})"),
            }
        }
        drop(lines_rx);

        self.stop.wait();
        info!("stopping file splitter");

        // read side quiesces once the oversized queue is closed upstream
        if reader.join().is_err() {
            error!("file splitter reader panicked");
        }
        read_pool.join();
        drop(lines_tx);
        for writer in writers {
            if writer.join().is_err() {
                error!("file splitter worker panicked");
            }
        }
        info!("stop file splitter");
    }
}

/// Walk one parent row by row, pushing a chunk every `split_by_lines` rows
/// and a trailing partial chunk at EOF. The parent leaves the watch
/// directory once its last chunk has been pushed.
fn split_file(config: &config::FileProcessor, file: &FileRef, lines_tx: &Sender<FileLines>) {
    info!("try to split file={file}");
    let handle = match fs::File::open(&file.path) {
        Ok(handle) => handle,
        Err(err) => {
            error!("can't open file={file}: ({err})");
            move_file(file, &config.files_errors_dir);
            return;
        },
    };

    let split_by = config.file_splitter.split_by_lines.max(1);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(handle);
    let mut record = csv::ByteRecord::new();
    let mut lines: Vec<csv::ByteRecord> = Vec::with_capacity(split_by);
    let mut counter = 0_usize;
    loop {
        match rdr.read_byte_record(&mut record) {
            Ok(true) => {
                counter += 1;
                lines.push(record.clone());
                if lines.len() == split_by {
                    push_chunk(config, file, std::mem::take(&mut lines), counter, lines_tx);
                }
            },
            Ok(false) => {
                if !lines.is_empty() {
                    push_chunk(config, file, std::mem::take(&mut lines), counter, lines_tx);
                }
                debug!("done reading file={file}");
                move_file(file, &config.files_processed_dir);
                break;
            },
            Err(err) => {
                error!("can't read file={file} data: ({err})");
                move_file(file, &config.files_errors_dir);
                return;
            },
        }
    }
    info!("done splitting file={file}");
}

fn push_chunk(
    config: &config::FileProcessor,
    parent: &FileRef,
    lines: Vec<csv::ByteRecord>,
    end: usize,
    lines_tx: &Sender<FileLines>,
) {
    let start = end - lines.len();
    let target = FileRef::new(
        &config.files_dir,
        format!("{start}_{end}_{}", parent.name),
    );
    let chunk = FileLines {
        target,
        lines,
        parent: parent.clone(),
    };
    if lines_tx.send(chunk).is_err() {
        error!("can't push chunk of file={parent}, chunk channel is closed");
    }
}

fn write_chunk(item: &FileLines) -> CliResult<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(&item.target.path)?;
    for record in &item.lines {
        wtr.write_byte_record(record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::files::stop_channel;

    fn test_config(watch: &Path, processed: &Path, errors: &Path, split_by: usize) -> Arc<config::FileProcessor> {
        Arc::new(config::FileProcessor {
            files_dir: watch.to_path_buf(),
            files_processed_dir: processed.to_path_buf(),
            files_errors_dir: errors.to_path_buf(),
            file_splitter: config::FileSplitter {
                workers_count:    2,
                lines_queue_size: 4,
                split_by_lines:   split_by,
            },
            ..config::FileProcessor::default()
        })
    }

    fn write_rows(dir: &Path, name: &str, rows: usize) -> FileRef {
        let file = FileRef::new(dir, name);
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&file.path)
            .unwrap();
        for i in 0..rows {
            wtr.write_record([
                format!("id-{i}"),
                String::from("19.99"),
                String::from("2024-05-01 10:30:00 +0000 UTC"),
            ])
            .unwrap();
        }
        wtr.flush().unwrap();
        file
    }

    fn read_rows(path: &Path) -> Vec<String> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        rdr.records()
            .map(|r| r.unwrap().get(0).unwrap().to_owned())
            .collect()
    }

    /// Chunk files of `parent`, sorted by their start row.
    fn chunks_of(dir: &Path, parent: &FileRef) -> Vec<(usize, usize, std::path::PathBuf)> {
        let mut found: Vec<(usize, usize, std::path::PathBuf)> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let rest = name.strip_suffix(&format!("_{}", parent.name))?;
                let (start, end) = rest.split_once('_')?;
                Some((start.parse().ok()?, end.parse().ok()?, e.path()))
            })
            .collect();
        found.sort();
        found
    }

    fn run_splitter(config: Arc<config::FileProcessor>, parents: Vec<FileRef>) {
        let queue = Arc::new(FileQueue::new(parents.len()));
        for parent in parents {
            queue.put(parent).unwrap();
        }
        let (handle, stop) = stop_channel();
        let splitter = Splitter::new(config, queue.clone(), stop);
        let runner = thread::spawn(move || splitter.run());
        // supervisor order: queue closes, then the stop token fires; the
        // splitter still drains every queued parent before exiting
        queue.close().unwrap();
        handle.stop();
        runner.join().unwrap();
    }

    #[test]
    fn chunks_tile_the_parent_in_row_order() {
        let watch = TempDir::new().unwrap();
        let processed = TempDir::new().unwrap();
        let errors = TempDir::new().unwrap();
        let parent = write_rows(watch.path(), "1700_prices.csv", 105);
        let original = read_rows(&parent.path);

        run_splitter(
            test_config(watch.path(), processed.path(), errors.path(), 50),
            vec![parent.clone()],
        );

        let chunks = chunks_of(watch.path(), &parent);
        assert_eq!(
            chunks.iter().map(|(s, e, _)| (*s, *e)).collect::<Vec<_>>(),
            [(0, 50), (50, 100), (100, 105)]
        );
        let stitched: Vec<String> = chunks
            .iter()
            .flat_map(|(_, _, path)| read_rows(path))
            .collect();
        assert_eq!(stitched, original);

        // parent left the watch directory once fully split
        assert!(!parent.path.exists());
        assert!(processed.path().join(&parent.name).exists());
    }

    #[test]
    fn exact_multiple_produces_no_trailing_chunk() {
        let watch = TempDir::new().unwrap();
        let processed = TempDir::new().unwrap();
        let errors = TempDir::new().unwrap();
        let parent = write_rows(watch.path(), "1700_even.csv", 100);

        run_splitter(
            test_config(watch.path(), processed.path(), errors.path(), 50),
            vec![parent.clone()],
        );

        let chunks = chunks_of(watch.path(), &parent);
        assert_eq!(
            chunks.iter().map(|(s, e, _)| (*s, *e)).collect::<Vec<_>>(),
            [(0, 50), (50, 100)]
        );
    }

    #[test]
    fn unreadable_parent_lands_in_errors_dir() {
        let watch = TempDir::new().unwrap();
        let processed = TempDir::new().unwrap();
        let errors = TempDir::new().unwrap();
        // a parent that vanished between enqueue and split
        let parent = FileRef::new(watch.path(), "1700_gone.csv");

        run_splitter(
            test_config(watch.path(), processed.path(), errors.path(), 50),
            vec![parent.clone()],
        );

        assert!(chunks_of(watch.path(), &parent).is_empty());
        // nothing to move either: the open failed, the move is logged only
        assert!(!errors.path().join(&parent.name).exists());
    }
}
