use std::process::ExitCode;

use clap::Parser;
use db_backup_lib::app;
use db_backup_lib::cli::ZipDirsCli;

fn main() -> ExitCode {
    let cli = ZipDirsCli::parse();
    app::install_interrupt_handler();

    match app::zip_dirs(cli) {
        Ok(code) => code,
        Err(e) => app::report_fatal(env!("CARGO_BIN_NAME"), &e),
    }
}
