use crate::{errors::Error, Result};

/// Initialize tracing for the bot.
///
/// Defaults to `info` for the workspace crates and `warn` for dependencies;
/// `RUST_LOG` overrides everything.
pub fn init(service_name: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,cbh=info,cbh_core=info,cbh_telegram=info,cbh_openai=info,cbh_fmp=info,cbh_supabase=info,{service_name}=info"
        ))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install tracing subscriber: {e}")))?;

    Ok(())
}
