//! # Command Line
//!
//! ```bash
//! autounseal --config /etc/autounseal/config.yaml
//! ```

use clap::Parser;
use std::path::PathBuf;

/// Keeps HashiCorp Vault server pods unsealed
#[derive(Debug, Parser)]
#[command(name = "autounseal", version, about)]
pub struct Cli {
    /// YAML configuration file; a missing file falls back to defaults and environment
    #[arg(long, short = 'c', value_name = "PATH", default_value = "config.yaml")]
    pub config: PathBuf,
}
