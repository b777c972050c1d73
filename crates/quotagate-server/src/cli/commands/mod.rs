pub mod admin;
pub mod serve;

use super::args::{Cli, Command};
use super::load_config;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = load_config(&cli)?;
    match cli.cmd {
        Command::Serve(args) => serve::run(config, args).await,
        Command::Migrate => admin::migrate(&config),
        Command::Issue(args) => admin::issue(&config, args),
        Command::Revoke(args) => admin::revoke(&config, &args.id),
        Command::List => admin::list(&config),
        Command::Usage(args) => admin::usage(&config, &args.id),
    }
}
