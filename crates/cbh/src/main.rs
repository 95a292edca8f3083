use std::sync::Arc;

use tracing::{error, info, warn};

use cbh_core::{
    analysis::AnalysisOrchestrator,
    config::Config,
    ports::{PreferenceStore, QuotaStore, QuoteSource, VisionAnalyzer},
    quota::{MemoryQuotaStore, QuotaLedger},
    router::CommandRouter,
    session::{FilePreferenceStore, SessionStore},
};
use cbh_fmp::FmpClient;
use cbh_openai::OpenAiVision;
use cbh_supabase::{SupabaseClient, SupabasePreferenceStore, SupabaseQuotaStore};

#[tokio::main]
async fn main() -> Result<(), cbh_core::Error> {
    cbh_core::logging::init("cbh")?;

    let cfg = match Config::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e);
        }
    };

    let vision: Option<Arc<dyn VisionAnalyzer>> = match OpenAiVision::from_config(&cfg)? {
        Some(v) => Some(Arc::new(v)),
        None => {
            warn!("OPENAI_API_KEY not set; chart analysis disabled");
            None
        }
    };

    let quotes: Option<Arc<dyn QuoteSource>> = match FmpClient::from_config(&cfg)? {
        Some(q) => Some(Arc::new(q)),
        None => {
            warn!("FMP_API_KEY not set; quotes disabled");
            None
        }
    };

    let supabase = cfg.supabase.as_ref().map(SupabaseClient::new).transpose()?;

    let quota_store: Option<Arc<dyn QuotaStore>> = match &supabase {
        Some(client) => Some(Arc::new(SupabaseQuotaStore::new(client.clone()))),
        None if cfg.quota_in_memory => {
            info!("using in-process quota ledger");
            Some(Arc::new(MemoryQuotaStore::new()))
        }
        None => {
            warn!("SUPABASE_URL/SUPABASE_KEY not set; daily quota is not enforced");
            None
        }
    };

    let preferences: Arc<dyn PreferenceStore> = match &supabase {
        Some(client) => Arc::new(SupabasePreferenceStore::new(client.clone())),
        None => {
            info!(path = %cfg.session_file.display(), "persisting language preferences to file");
            Arc::new(FilePreferenceStore::new(&cfg.session_file))
        }
    };

    let analysis = Arc::new(AnalysisOrchestrator::new(
        QuotaLedger::new(quota_store, cfg.daily_analysis_limit),
        vision,
        &cfg.temp_dir,
    ));
    let quota_enforced = analysis.ledger().is_enforced();
    let router = Arc::new(CommandRouter::new(
        Arc::new(SessionStore::new(Some(preferences))),
        quotes,
        analysis,
        cfg.quote_symbols.clone(),
    ));

    info!(
        limit = cfg.daily_analysis_limit,
        quota_enforced,
        symbols = ?cfg.quote_symbols,
        temp_dir = %cfg.temp_dir.display(),
        "starting bot"
    );

    cbh_telegram::router::run_polling(cfg, router)
        .await
        .map_err(|e| cbh_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
