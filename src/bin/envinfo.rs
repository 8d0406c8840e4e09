//! Print build capabilities and, optionally, the parameters of an environment.
//!
//! Usage: `envinfo [--json] [PATH]`. Set `RUST_LOG=burrowdb=debug` for
//! lifecycle logs.

use anyhow::Context;
use burrowdb::{
    EnvParameters, EnvState, ErrorHandler, LicenseInfo, VersionInfo, set_error_handler,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct Report {
    version: VersionInfo,
    license: LicenseInfo,
    is_pro: bool,
    is_debug: bool,
    is_pro_evaluation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<EnvState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<EnvParameters>,
}

impl Report {
    fn print_text(&self) {
        println!("version:           {}", self.version);
        println!("product:           {}", self.license.product);
        if !self.license.licensee.is_empty() {
            println!("licensee:          {}", self.license.licensee);
        }
        println!("is_pro:            {}", self.is_pro);
        println!("is_debug:          {}", self.is_debug);
        println!("is_pro_evaluation: {}", self.is_pro_evaluation);
        if let Some(params) = &self.parameters {
            println!("page_size:         {}", params.page_size);
            println!("cache_size:        {}", params.cache_size);
            println!("max_databases:     {}", params.max_databases);
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut json = false;
    let mut path = None;
    for arg in std::env::args_os().skip(1) {
        if arg == "--json" {
            json = true;
        } else {
            path = Some(arg);
        }
    }

    let mut report = Report {
        version: burrowdb::get_version(),
        license: burrowdb::get_license(),
        is_pro: burrowdb::is_pro(),
        is_debug: burrowdb::is_debug(),
        is_pro_evaluation: burrowdb::is_pro_evaluation(),
        state: None,
        parameters: None,
    };

    if let Some(path) = path {
        set_error_handler(Some(ErrorHandler::new(|d| eprintln!("burrowdb error {d}"))));
        let mut env = burrowdb::open(&path)
            .with_context(|| format!("opening {}", path.to_string_lossy()))?;
        report.state = Some(env.state());
        report.parameters = Some(env.parameters()?);
        env.close()?;
        set_error_handler(None);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print_text();
    }
    Ok(())
}
