//! Drains the regular queue into the price repository, either as parsed
//! row batches (`import_by_lines = true`) or as whole-file bulk imports.

use std::{fs, sync::Arc, thread};

use crossbeam_channel::{Sender, bounded};
use log::{debug, error, info};
use threadpool::ThreadPool;

use crate::{
    config,
    files::{FileQueue, FileRef, StopToken, move_file},
    models::{self, Price},
    repository::Prices,
    util,
};

pub struct Processor {
    config: Arc<config::FileProcessor>,
    files:  Arc<FileQueue>,
    repo:   Arc<dyn Prices>,
    stop:   StopToken,
}

impl Processor {
    pub fn new(
        config: Arc<config::FileProcessor>,
        files: Arc<FileQueue>,
        repo: Arc<dyn Prices>,
        stop: StopToken,
    ) -> Processor {
        Processor {
            config,
            files,
            repo,
            stop,
        }
    }

    pub fn run(self) {
        if self.config.import_by_lines {
            self.run_lines();
        } else {
            self.run_files();
        }
    }

    /// Row-batch mode: a reader thread fans files out to parse jobs, parse
    /// jobs push `Vec<Price>` batches onto a bounded channel, and a worker
    /// pool feeds the batches to `create_many`.
    ///
    /// Shutdown waits for in-flight work but relies on the supervisor
    /// closing the file queue to unblock the reader; only after the read
    /// side has quiesced is the batch channel closed and the writers
    /// drained.
    fn run_lines(self) {
        info!("start processing files by lines");
        let workers = util::njobs(self.config.workers_count);
        let (batch_tx, batch_rx) =
            bounded::<Vec<Price>>(self.config.data_batch_queue_size.max(1));

        let read_pool = ThreadPool::with_name("processor-read".into(), workers);
        let reader = {
            let data = self.files.data();
            let pool = read_pool.clone();
            let config = self.config.clone();
            let batch_tx = batch_tx.clone();
            thread::spawn(move || {
                info!("start reading files");
                for file in data.iter() {
                    let config = config.clone();
                    let batch_tx = batch_tx.clone();
                    pool.execute(move || read_file_by_lines(&config, &file, &batch_tx));
                }
                info!("stop reading files");
            })
        };

        let mut writers = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx = batch_rx.clone();
            let repo = self.repo.clone();
            let spawned = thread::Builder::new()
                .name(format!("processor-write-{i}"))
                .spawn(move || {
                    info!("start processing worker");
                    for batch in rx.iter() {
                        if let Err(err) = repo.create_many(&batch) {
                            error!(
                                "worker unable to process batch of {} records: ({err})",
                                batch.len()
                            );
                        }
                    }
                    info!("stop processing worker");
                });
            match spawned {
                Ok(handle) => writers.push(handle),
                Err(err) => error!("can't start processing worker: ({err})"),
            }
        }
        drop(batch_rx);

        self.stop.wait();
        info!("stop processing files");

        if reader.join().is_err() {
            error!("file reader panicked");
        }
        read_pool.join();
        drop(batch_tx);
        for writer in writers {
            if writer.join().is_err() {
                error!("processing worker panicked");
            }
        }
    }

    /// Bulk-import mode: workers range the file queue directly and hand
    /// each file path to the repository for a server-side load.
    fn run_files(self) {
        info!("start processing files");
        let workers = util::njobs(self.config.workers_count);
        let mut savers = Vec::with_capacity(workers);
        for i in 0..workers {
            let data = self.files.data();
            let repo = self.repo.clone();
            let config = self.config.clone();
            let spawned = thread::Builder::new()
                .name(format!("processor-import-{i}"))
                .spawn(move || {
                    info!("start save files worker");
                    for file in data.iter() {
                        info!("save file={file} to storage");
                        match repo.import_file(&file.path) {
                            Ok(()) => move_file(&file, &config.files_processed_dir),
                            Err(err) => {
                                error!("worker unable to process file={file}: ({err})");
                                move_file(&file, &config.files_errors_dir);
                            },
                        }
                    }
                    info!("stop save files worker");
                });
            match spawned {
                Ok(handle) => savers.push(handle),
                Err(err) => error!("can't start save files worker: ({err})"),
            }
        }

        self.stop.wait();
        info!("stop processing files");
        for saver in savers {
            if saver.join().is_err() {
                error!("save files worker panicked");
            }
        }
    }
}

/// Parse one file row by row, batching valid records. Bad rows are dropped;
/// a read error aborts the file into the errors directory. The trailing
/// partial batch is flushed at EOF so no parsed row is ever lost.
fn read_file_by_lines(
    config: &config::FileProcessor,
    file: &FileRef,
    batch_tx: &Sender<Vec<Price>>,
) {
    info!("start reading file={file}");
    let handle = match fs::File::open(&file.path) {
        Ok(handle) => handle,
        Err(err) => {
            error!("can't open file={file}: ({err})");
            move_file(file, &config.files_errors_dir);
            return;
        },
    };

    let batch_size = config.data_batch_size.max(1);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(handle);
    let mut record = csv::ByteRecord::new();
    let mut prices: Vec<Price> = Vec::with_capacity(batch_size);
    loop {
        match rdr.read_byte_record(&mut record) {
            Ok(true) => {
                if let Some(price) = to_price(file, &record) {
                    prices.push(price);
                    if prices.len() == batch_size {
                        debug!("send file={file} data batch to processing");
                        let batch =
                            std::mem::replace(&mut prices, Vec::with_capacity(batch_size));
                        if batch_tx.send(batch).is_err() {
                            error!("can't push batch of file={file}, batch channel is closed");
                            return;
                        }
                    }
                }
            },
            Ok(false) => {
                if !prices.is_empty()
                    && batch_tx.send(std::mem::take(&mut prices)).is_err()
                {
                    error!("can't push batch of file={file}, batch channel is closed");
                    return;
                }
                debug!("done reading file={file}");
                move_file(file, &config.files_processed_dir);
                return;
            },
            Err(err) => {
                error!("can't read file={file} data: ({err})");
                move_file(file, &config.files_errors_dir);
                return;
            },
        }
    }
}

/// Decode one CSV row into a price record; `None` drops the row.
fn to_price(file: &FileRef, record: &csv::ByteRecord) -> Option<Price> {
    if record.len() != 3 {
        error!(
            "bad file={file} format, expected 3 columns, got {}",
            record.len()
        );
        return None;
    }

    let [id, price_data, expiration_date] = [0, 1, 2].map(|i| {
        std::str::from_utf8(&record[i]).unwrap_or_default()
    });
    if id.is_empty() {
        error!("bad file={file} data, empty or non-utf8 id");
        return None;
    }
    let price = match models::parse_price(price_data) {
        Ok(price) => price,
        Err(err) => {
            error!("bad file={file} data: ({err})");
            return None;
        },
    };
    let expiration_date = match models::parse_expiration_date(expiration_date) {
        Ok(date) => date,
        Err(err) => {
            error!("bad file={file} data: ({err})");
            return None;
        },
    };
    Some(Price {
        id: id.to_owned(),
        price,
        expiration_date,
    })
}
