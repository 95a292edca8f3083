use std::{
    collections::HashMap,
    path::PathBuf,
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::{
    domain::{Language, UserId},
    errors::QuotaStoreError,
    ports::PreferenceStore,
};

/// Labels shown on the language keyboard, in display order.
pub const LANGUAGE_CHOICES: [(&str, Language); 3] = [
    ("English Only", Language::English),
    ("中文", Language::Chinese),
    ("English + 中文 (Both)", Language::Both),
];

/// Map a keyboard label or language code to a preference.
///
/// Returns `None` for anything outside the recognized set.
pub fn parse_language_choice(choice: &str) -> Option<Language> {
    let choice = choice.trim();
    if let Some((_, lang)) = LANGUAGE_CHOICES.iter().find(|(label, _)| *label == choice) {
        return Some(*lang);
    }
    Language::from_code(choice)
}

/// Per-user preference state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub language: Language,
}

/// Owner of all [`Session`]s.
///
/// The in-memory map is authoritative for the lifetime of the process; the
/// optional backend is written through and consulted on a cache miss.
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
    backend: Option<Arc<dyn PreferenceStore>>,
}

impl SessionStore {
    pub fn new(backend: Option<Arc<dyn PreferenceStore>>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            backend,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Resolve the user's language, recording the default on first contact.
    pub async fn get_language(&self, user_id: UserId) -> Language {
        if let Some(s) = self.sessions.lock().await.get(&user_id) {
            return s.language;
        }

        let (language, persist) = match self.load_from_backend(user_id).await {
            Some(lang) => (lang, false),
            None => (Language::default(), true),
        };

        // Another task may have set a preference while we were loading.
        let language = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .entry(user_id)
                .or_insert(Session { user_id, language })
                .language
        };

        if persist {
            self.save_to_backend(user_id, language).await;
        }
        language
    }

    /// Store a language choice; unrecognized input silently becomes `Both`.
    pub async fn set_language(&self, user_id: UserId, choice: &str) -> Language {
        let language = parse_language_choice(choice).unwrap_or(Language::Both);
        self.sessions
            .lock()
            .await
            .insert(user_id, Session { user_id, language });
        self.save_to_backend(user_id, language).await;
        language
    }

    #[cfg(test)]
    pub async fn session(&self, user_id: UserId) -> Option<Session> {
        self.sessions.lock().await.get(&user_id).copied()
    }

    async fn load_from_backend(&self, user_id: UserId) -> Option<Language> {
        let backend = self.backend.as_ref()?;
        match backend.load(user_id).await {
            Ok(v) => v,
            Err(e) => {
                warn!(user = %user_id, error = %e, "failed to load language preference");
                None
            }
        }
    }

    async fn save_to_backend(&self, user_id: UserId, language: Language) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if let Err(e) = backend.save(user_id, language).await {
            warn!(user = %user_id, error = %e, "failed to persist language preference");
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferenceFile {
    #[serde(default)]
    languages: HashMap<String, Language>,
}

/// JSON-file preference backend.
///
/// Writes go to a sibling temp file first and are then renamed over the
/// target so a crash never leaves a truncated file behind.
pub struct FilePreferenceStore {
    path: PathBuf,
    cache: Mutex<Option<PreferenceFile>>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    async fn read_file(&self) -> Result<PreferenceFile, QuotaStoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(txt) => serde_json::from_str(&txt)
                .map_err(|e| QuotaStoreError::Backend(format!("corrupt session file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PreferenceFile::default()),
            Err(e) => Err(QuotaStoreError::Unavailable(e.to_string())),
        }
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn load(&self, user_id: UserId) -> Result<Option<Language>, QuotaStoreError> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        Ok(cache
            .as_ref()
            .and_then(|f| f.languages.get(&user_id.to_string()).copied()))
    }

    async fn save(&self, user_id: UserId, language: Language) -> Result<(), QuotaStoreError> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.read_file().await?);
        }
        let Some(file) = cache.as_mut() else {
            return Ok(());
        };
        file.languages.insert(user_id.to_string(), language);

        let body = serde_json::to_string_pretty(&*file)
            .map_err(|e| QuotaStoreError::Backend(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| QuotaStoreError::Unavailable(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| QuotaStoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}
