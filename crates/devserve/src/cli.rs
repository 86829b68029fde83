//! Command-line interface definition.

use crate::config::{ConfigOverrides, StaticOverrides};
use clap::Parser;
use std::path::PathBuf;

/// devserve - development server for single-page bundles
#[derive(Parser, Debug)]
#[command(
    name = "devserve",
    version,
    about = "Development server for single-page bundles",
    long_about = "Serves a build output directory with request gating, range requests,\n\
                  proxying and live reload over WebSocket. Settings are read from\n\
                  devserve.config.json, DEVSERVE_* environment variables and the flags below."
)]
pub struct Cli {
    /// Directory to serve
    ///
    /// Mirrored into memory and re-mirrored on every change. Overrides
    /// `static.directory` from the config file.
    #[arg(value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Config file (defaults to ./devserve.config.json when present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Port to listen on; the next free port is used when it is taken
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Host to bind: IP, hostname, local-ip, local-ipv4 or local-ipv6
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Serve over HTTPS with a cached self-signed certificate
    #[arg(long)]
    pub https: bool,

    /// Offer HTTP/2 (requires --https)
    #[arg(long, requires = "https")]
    pub http2: bool,

    /// Disable gzip compression
    #[arg(long)]
    pub no_compress: bool,

    /// Disable hot update notifications
    #[arg(long)]
    pub no_hot: bool,

    /// Disable page reload notifications
    #[arg(long)]
    pub no_live_reload: bool,

    /// Serve the directory once without watching it
    #[arg(long)]
    pub no_watch: bool,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

impl Cli {
    /// Flags as config overrides. Flags left at their default do not
    /// override the config file or environment.
    pub fn to_overrides(&self) -> ConfigOverrides {
        let static_files = (self.directory.is_some() || self.no_watch).then(|| StaticOverrides {
            directory: self.directory.clone(),
            watch: self.no_watch.then_some(false),
        });

        ConfigOverrides {
            port: self.port,
            host: self.host.clone(),
            https: self.https.then_some(true),
            http2: self.http2.then_some(true),
            compress: self.no_compress.then_some(false),
            hot: self.no_hot.then_some(false),
            live_reload: self.no_live_reload.then_some(false),
            static_files,
        }
    }
}
