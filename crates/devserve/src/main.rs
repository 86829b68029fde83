//! devserve - development server for single-page bundles.
//!
//! Parses arguments, initializes logging and colors, then runs the server.

use clap::Parser;
use devserve::{cli, commands, error, logger, ui};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    commands::execute(args)
        .await
        .map_err(error::server_error_to_miette)
}
