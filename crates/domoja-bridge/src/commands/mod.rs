//! Command handlers, one module per subcommand.

pub mod accessories;
pub mod check;
pub mod devices;
pub mod run;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

pub async fn dispatch(command: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match command {
        Command::Check => check::handle(global),
        Command::Accessories => accessories::handle(global),
        Command::Devices(args) => devices::handle(&args, global).await,
        Command::Run => run::handle(global).await,
    }
}
