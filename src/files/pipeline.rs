//! Wires the pipeline together and supervises its shutdown.

use std::{fs, sync::Arc, thread};

use log::{error, info};

use crate::{
    CliResult, config,
    files::{FileCache, FileQueue, StopToken, processor::Processor, scanner::Scanner, splitter::Splitter},
    repository::Prices,
};

/// Construct queues and stages, run until the stop token fires, then shut
/// down in dependency order: join the scanner first (no new claims), close
/// the oversized queue and join the splitter (no new chunks), close the
/// regular queue and join the processor. Each stage drains its in-flight
/// work before exiting; nothing ever sends on a queue after it is closed.
pub fn run(config: &config::FileProcessor, repo: Arc<dyn Prices>, stop: StopToken) -> CliResult<()> {
    let config = Arc::new(config.clone());
    for dir in [
        &config.files_dir,
        &config.files_processed_dir,
        &config.files_errors_dir,
    ] {
        fs::create_dir_all(dir)?;
    }

    info!(
        "start watching directory={} for price files",
        config.files_dir.display()
    );

    let files = Arc::new(FileQueue::new(config.files_queue_size.max(1)));
    let split_files = Arc::new(FileQueue::new(config.files_split_queue_size.max(1)));

    let scanner = Scanner::new(
        config.clone(),
        files.clone(),
        split_files.clone(),
        FileCache::new(),
        stop.clone(),
    );
    let splitter = Splitter::new(config.clone(), split_files.clone(), stop.clone());
    let processor = Processor::new(config.clone(), files.clone(), repo, stop.clone());

    let scanner_thread = thread::Builder::new()
        .name(String::from("scanner"))
        .spawn(move || scanner.run())?;
    let splitter_thread = thread::Builder::new()
        .name(String::from("splitter"))
        .spawn(move || splitter.run())?;
    let processor_thread = thread::Builder::new()
        .name(String::from("processor"))
        .spawn(move || processor.run())?;

    stop.wait();
    info!("stopping pipeline");

    if scanner_thread.join().is_err() {
        error!("scanner panicked");
    }
    if let Err(err) = split_files.close() {
        error!("can't close split files queue: ({err})");
    }
    if splitter_thread.join().is_err() {
        error!("splitter panicked");
    }
    if let Err(err) = files.close() {
        error!("can't close files queue: ({err})");
    }
    if processor_thread.join().is_err() {
        error!("processor panicked");
    }

    info!("pipeline stopped");
    Ok(())
}
