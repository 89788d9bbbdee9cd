//! Command-line flags for the `perpscope` server.
//!
//! | Option | Env | Default | Description |
//! |--------|-----|---------|-------------|
//! | `--bind` | `BIND` | `0.0.0.0` | Listen address |
//! | `--port` | `PORT` | `3000` | Listen port |
//! | `--static-dir` | `STATIC_DIR` | `public` | Dashboard assets served at `/` |
//!
//! Source keys, refresh interval and history window come from the
//! environment; see `perpscope_core::AppConfig`.

use std::path::PathBuf;

use clap::Parser;

/// Perpetual futures open interest, funding and long/short dashboard API.
#[derive(Debug, Parser)]
#[command(name = "perpscope", version, about)]
pub struct Cli {
    #[arg(long, env = "BIND", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    pub static_dir: PathBuf,
}

impl Cli {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from(["perpscope", "--bind", "127.0.0.1", "--port", "8080"])
            .expect("valid flags");
        assert_eq!(cli.listen_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(Cli::try_parse_from(["perpscope", "--port", "http"]).is_err());
    }
}
