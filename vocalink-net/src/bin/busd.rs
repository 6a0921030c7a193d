//! Standalone bus broker daemon.

use std::fs::File;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use vocalink_net::BusServer;

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("vocalink")
        .join("busd.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path)
        .unwrap_or_else(|_| File::create("/tmp/vocalink-busd.log").expect("Cannot create log file"));

    WriteLogger::init(log_level, Config::default(), log_file)
        .expect("Failed to initialize logger");
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let addr = args
        .iter()
        .position(|a| a == "--listen")
        .and_then(|i| args.get(i + 1).cloned())
        .unwrap_or_else(|| "127.0.0.1:7381".to_string());

    let server = BusServer::bind(&addr)?;
    eprintln!("vocalink-busd listening on {}", server.local_addr()?);

    // Runs until the process is terminated.
    server.run(Arc::new(AtomicBool::new(false)));
    Ok(())
}
