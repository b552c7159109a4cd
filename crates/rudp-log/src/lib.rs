use chrono::Local;
use log::{set_boxed_logger, set_max_level, Level, Log, SetLoggerError};
use std::io::{stdout, BufWriter, Write};
use std::sync::mpsc;
use std::thread;

/// A command sent from logging call sites to the background writer thread.
enum LogCommand {
    Record(String),
    Flush,
}

/// A `log::Log` implementation that formats records off the calling thread
/// and writes them from a single dedicated writer thread, so sender and
/// receiver tasks never block on stdout.
pub struct RudpLogger {
    max_level: Level,
    sender: mpsc::SyncSender<LogCommand>,
}

impl RudpLogger {
    fn new(max_level: Level, buffer_size: usize) -> Self {
        let (sender, receiver) = mpsc::sync_channel(buffer_size);

        thread::Builder::new()
            .name("rudp-log-writer".into())
            .spawn(move || {
                let mut writer = BufWriter::new(stdout());
                while let Ok(command) = receiver.recv() {
                    match command {
                        LogCommand::Record(message) => {
                            if let Err(e) = writer.write_all(message.as_bytes()) {
                                eprintln!("[rudp-log] failed to write log record: {e}");
                            }
                        }
                        LogCommand::Flush => {
                            if let Err(e) = writer.flush() {
                                eprintln!("[rudp-log] failed to flush log: {e}");
                            }
                        }
                    }
                }
                let _ = writer.flush();
            })
            .expect("failed to spawn log writer thread");

        RudpLogger { max_level, sender }
    }

    /// Installs a `RudpLogger` as the global logger at the given level,
    /// buffering up to 1024 pending records before the writer thread catches up.
    pub fn init(max_level: Level) -> Result<(), SetLoggerError> {
        let logger = RudpLogger::new(max_level, 1024);
        set_boxed_logger(Box::new(logger))?;
        set_max_level(max_level.to_level_filter());
        Ok(())
    }
}

impl Log for RudpLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = Local::now();
        let message = format!(
            "{} {:<5} [{}] {}\n",
            now.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
        if let Err(e) = self.sender.try_send(LogCommand::Record(message)) {
            eprintln!("[rudp-log] dropped log message: {e}");
        }
    }

    fn flush(&self) {
        let _ = self.sender.send(LogCommand::Flush);
    }
}
