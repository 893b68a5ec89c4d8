//! Standing server command.

use std::process::ExitCode;

use super::{Cli, EXIT_ERROR, EXIT_SUCCESS};
use crate::server::{BuildServer, ServerOptions};

/// Run the serve command. Blocks until a client sends `shutdown`.
pub fn run_serve(cli: &Cli, port: u16, no_events: bool) -> ExitCode {
    let manager = match super::build::setup_manager(cli, !no_events) {
        Ok(manager) => manager,
        Err(message) => {
            eprintln!("Error: {}", message);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let options = ServerOptions {
        port,
        ..Default::default()
    };
    let server = match BuildServer::start(manager, &options) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Server error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    println!("Serving content builds on {}", server.local_addr());
    println!("Send 'shutdown' to stop");

    match server.run_to_completion() {
        Ok(()) => {
            println!("Server stopped, cache flushed");
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
