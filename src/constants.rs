use std::time::Duration;

/// Path prefix of every management API endpoint
pub const MANAGEMENT_PREFIX: &str = "/v0/management";

/// Response header carrying the management server's build version
pub const VERSION_HEADER: &str = "X-CPA-VERSION";

/// Management API base pre-filled on the login form
pub const DEFAULT_API_BASE: &str = "http://localhost:8317";

/// Cookie holding the dashboard session token
pub const SESSION_COOKIE: &str = "dashboard_session";

/// Redirect-flow status poll cadence
pub const REDIRECT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Redirect-flow attempt cap (2s x 60 = 2 minutes)
pub const REDIRECT_MAX_ATTEMPTS: u32 = 60;

/// Device-flow poll interval when the backend does not send one
pub const DEVICE_DEFAULT_INTERVAL_SECS: u64 = 5;

/// Device-code lifetime when the backend does not send one
pub const DEVICE_DEFAULT_EXPIRES_SECS: u64 = 900;

/// How often expired sessions are purged from the store
pub const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(600);

pub const PROJECT_REPO_URL: &str = "https://github.com/giofahreza/AIProxyAPI";
pub const PROJECT_DOCS_URL: &str = "https://help.router-for.me/";

/// Display order of provider groups on the dashboard
pub static PROVIDER_ORDER: &[&str] = &[
    "gemini",
    "claude",
    "codex",
    "vertex",
    "copilot",
    "qwen",
    "aistudio",
    "antigravity",
    "iflow",
    "other",
];

/// Routing strategies accepted by `/routing/strategy`
pub static ROUTING_STRATEGIES: &[(&str, &str)] =
    &[("round-robin", "Round Robin"), ("fill-first", "Fill First")];
