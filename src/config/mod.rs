use tracing_subscriber::filter::LevelFilter;

pub(crate) const DEFAULT_SUPABASE_URL: &str = "http://localhost:54321";
pub(crate) const DEFAULT_PAGE_SIZE: usize = 10;

/// Runtime configuration injected by the hosting page as `window.ENV`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EnvConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    /// Schema provisioning endpoint; `None` means provisioned out of band.
    pub init_db_url: Option<String>,
    pub page_size: usize,
    pub log_level: LevelFilter,
}

impl EnvConfig {
    pub fn new() -> Self {
        Self::from_lookup(read_window_env)
    }

    /// Builds the config from a key lookup.
    ///
    /// Each key is tried in UPPER_CASE first, then lower_case, matching both
    /// styles of `window.ENV` in the wild.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .or_else(|| lookup(&key.to_ascii_lowercase()))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let supabase_url = get("SUPABASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SUPABASE_URL.to_string());

        let page_size = get("PAGE_SIZE")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let log_level = get("LOG_LEVEL")
            .and_then(|v| v.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::INFO);

        Self {
            supabase_url,
            supabase_anon_key: get("SUPABASE_ANON_KEY").unwrap_or_default(),
            init_db_url: get("INIT_DB_URL"),
            page_size,
            log_level,
        }
    }

    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }

    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.supabase_url)
    }

    pub fn realtime_url(&self) -> String {
        let ws_base = if let Some(rest) = self.supabase_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.supabase_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.supabase_url.clone()
        };
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base,
            urlencoding::encode(&self.supabase_anon_key)
        )
    }
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn read_window_env(key: &str) -> Option<String> {
    let env = web_sys::window()?.get("ENV")?;
    if env.is_undefined() || !env.is_object() {
        return None;
    }
    let value = js_sys::Reflect::get(&env, &key.into()).ok()?;
    // Numbers are accepted for PAGE_SIZE.
    value
        .as_string()
        .or_else(|| value.as_f64().map(|n| format!("{}", n as i64)))
}
