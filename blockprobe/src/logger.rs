use std::env;

use log::{LevelFilter, Metadata, Record};

pub static LOGGER: Logger = Logger;

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}: {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the logger; `BLOCKPROBE_DEBUG` selects the verbosity
/// (`all`/`debug` for everything, any other value for info).
pub fn init_logger() {
    if log::set_logger(&LOGGER).is_ok() {
        let level = match env::var("BLOCKPROBE_DEBUG").ok().as_deref() {
            Some("all") | Some("debug") => LevelFilter::Debug,
            Some(_) => LevelFilter::Info,
            None => LevelFilter::Warn,
        };
        log::set_max_level(level);
    }
}
