use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use installer_api::{model::Model, roots::EngineRoots};

use gadget_installer::orchestrator;

#[derive(Parser)]
#[command(name = "gadget-installer", about = "On-device gadget installer engine")]
struct Cli {
    /// Directory containing meta/gadget.yaml and content assets.
    #[arg(long, default_value = "/run/mnt/gadget")]
    gadget_root: PathBuf,

    /// Root under which scratch mount points are created.
    #[arg(long, default_value = "/run/gadget-installer")]
    runtime_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Partition, format, and populate a disk from a gadget description.
    Install {
        /// Device node of the disk's system-seed partition, e.g. /dev/sda1.
        /// The disk itself is resolved from this partition.
        partition: PathBuf,
        #[arg(long)]
        encryption: Option<String>,
        #[arg(long)]
        has_modes: bool,
    },
    /// Reset a previously installed disk back to a factory state.
    FactoryReset {
        /// Device node of a partition on the disk to reset, e.g. /dev/sda1.
        partition: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let roots = EngineRoots::new(cli.gadget_root, cli.runtime_dir);

    let result = match cli.command {
        Command::Install {
            partition,
            encryption,
            has_modes,
        } => {
            let model = Model::has_modes(has_modes);
            orchestrator::install(&partition, &roots, &model, encryption.as_deref(), &mut ())
        }
        Command::FactoryReset { partition } => {
            // Recovering system-save's existing key from wherever it was
            // sealed (TPM, recovery service, ...) is outside this engine;
            // this CLI only ever drives an unencrypted factory-reset. A
            // caller that needs to preserve an encrypted save partition
            // must supply `existing_keys` through the library API directly.
            let existing_keys = installer_api::encryption::EncryptionSetupData::default();
            orchestrator::factory_reset(&partition, &roots, &existing_keys, &mut ())
        }
    };

    match result {
        Ok(side_data) => {
            match serde_json::to_string_pretty(&side_data) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("Failed to serialize result: {e}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}
