// SPDX-License-Identifier: GPL-3.0-only

use camera_server::errors::{LockError, SupervisorError};
use camera_server::supervisor;
use clap::Parser;

mod cli;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = cli::Cli::parse();
    let config = cli.load_config()?;
    let backend = cli.backend(&config);

    match supervisor::run(config, backend) {
        Ok(()) => Ok(()),
        // Orphaned: resources are released, leave quietly
        Err(SupervisorError::ParentLost { .. }) => std::process::exit(0),
        Err(SupervisorError::Lock(err @ LockError::LockContention { .. })) => {
            eprintln!("camera-server: {}", err);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
