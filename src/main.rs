use clap::Parser;
use color_eyre::eyre;
use jinjacraft::cli::{self, Cli};
use jinjacraft::logging;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::setup_logging(
        Some(logging::level_from_verbosity(cli.verbose)),
        Some(cli.log_format()),
    )?;

    if let Err(err) = cli::run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
    Ok(())
}
