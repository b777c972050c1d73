use clap::Parser;
use quotagate_server::cli::{dispatch, Cli};
use quotagate_server::logging::init_tracing;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:#}");
            2
        }
    };
    std::process::exit(code);
}
