use std::process::ExitCode;

use clap::Parser;
use db_backup_lib::app;
use db_backup_lib::cli::MysqlBackupCli;

fn main() -> ExitCode {
    let cli = MysqlBackupCli::parse();
    app::install_interrupt_handler();

    match app::mysql_backup(cli) {
        Ok(code) => code,
        Err(e) => app::report_fatal(env!("CARGO_BIN_NAME"), &e),
    }
}
