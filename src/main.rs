// SPDX-License-Identifier: MIT
//
// n-wm: a tiny terminal window manager on top of the n-comp compositor.
//
// Startup order:
//   1. Parse arguments, open the optional log file
//   2. Enter raw mode and the alternate screen
//   3. Spawn the stdin reader, install the SIGWINCH flag
//   4. Run the session until quit or EOF
//   5. Stop the reader and restore the terminal, then report any error

mod config;
mod session;

use std::fs::File;
use std::io;
use std::path::Path;
use std::process;
use std::sync::Mutex;

use n_comp::{AnsiSink, Compositor, NullEvents, Size};
use n_term::reader::StdinReader;
use n_term::terminal::{self, Terminal};
use tracing_subscriber::EnvFilter;

use crate::config::{ArgsError, SessionConfig, USAGE};
use crate::session::Session;

fn main() {
    let config = match SessionConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(ArgsError::Help) => {
            println!("{USAGE}");
            return;
        }
        Err(e) => {
            eprintln!("n-wm: {e}\n\n{USAGE}");
            process::exit(2);
        }
    };

    if let Some(path) = &config.log {
        if let Err(e) = init_logging(path) {
            eprintln!("n-wm: cannot open log {}: {e}", path.display());
            process::exit(2);
        }
    }

    if !terminal::is_tty() {
        eprintln!("n-wm: stdin is not a terminal");
        process::exit(1);
    }

    if let Err(e) = run(&config) {
        tracing::error!(error = %e, "session failed");
        eprintln!("n-wm: {e}");
        process::exit(1);
    }
}

/// Route tracing output to `path`. The filter comes from `N_WM_LOG`,
/// defaulting to `info`.
fn init_logging(path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let filter = EnvFilter::try_from_env("N_WM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run(config: &SessionConfig) -> n_comp::Result<()> {
    let mut term = Terminal::new()?;
    term.enter()?;
    terminal::install_resize_handler();

    let (mut reader, input) = match StdinReader::spawn() {
        Ok(spawned) => spawned,
        Err(e) => {
            term.leave()?;
            return Err(e.into());
        }
    };

    let size = Size::from(term.size());
    let comp = Compositor::new(
        AnsiSink::terminal(io::stdout(), size),
        NullEvents,
        config.compositor(),
    );
    tracing::info!(%size, strict = config.strict, "starting");

    let result = Session::open(comp, size).and_then(|mut session| {
        let outcome = session.run(&input, config.tick, || {
            terminal::take_resize().then(|| Size::from(term.refresh_size()))
        });
        session.close();
        outcome
    });

    reader.stop();
    term.leave()?;
    result
}
