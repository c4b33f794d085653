// crates/vigil-app/src/main.rs
//
// vigil — watch an RTSP stream: display it, run object detection over it,
// record rolling MP4 segments, re-broadcast it over RTMP, and raise
// rate-limited warnings when watched classes appear.
//
// Usage: vigil <source_url> <rebroadcast_url>
//
// Exit codes: 0 clean shutdown (signal, window close, or source EOF),
// 1 fatal pipeline error, 2 usage error.

mod alert;
mod detector;
mod font;
mod fps;
mod overlay;
mod renderer;
mod supervisor;

use std::process::ExitCode;

fn main() -> ExitCode {
    init_logging();

    let mut args = std::env::args().skip(1);
    let (source_url, rebroadcast_url) = match (args.next(), args.next()) {
        (Some(source), Some(sink)) => (source, sink),
        _ => {
            eprintln!("usage: vigil <source_url> <rebroadcast_url>");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = ffmpeg_the_third::init() {
        eprintln!("vigil: FFmpeg init failed: {e}");
        return ExitCode::from(1);
    }

    match supervisor::run(&source_url, &rebroadcast_url) {
        Ok(supervisor::Shutdown::Requested) => {
            log::info!("pipeline stopped on request");
            ExitCode::SUCCESS
        }
        Ok(supervisor::Shutdown::SourceEnded) => {
            log::info!("pipeline stopped: source ended");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("vigil: {e}");
            ExitCode::from(1)
        }
    }
}

/// Log level comes from LOG_LEVEL (trace|debug|info|warn|error), default
/// info. "fatal" is accepted as an alias for error.
fn init_logging() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let level = if level.eq_ignore_ascii_case("fatal") {
        "error".to_string()
    } else {
        level
    };
    env_logger::Builder::new()
        .parse_filters(&level)
        .init();
}
