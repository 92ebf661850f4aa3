use clap::Parser;
use reviewlens_lib::cli::{execute, Cli};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    #[cfg(feature = "desktop")]
    if matches!(cli.command, reviewlens_lib::cli::Command::Dashboard) {
        let data_dir = reviewlens_lib::commands::settings::resolve_data_dir(cli.data_dir);
        reviewlens_lib::run(data_dir);
        return;
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: could not start the async runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(execute(cli)) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
