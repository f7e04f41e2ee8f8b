// Fixed values and environment-backed defaults for the counseling service.

use std::env;

/// Sampling temperature sent with every generation request.
pub const TEMPERATURE: f64 = 0.85;

/// Shown in place of a result whenever the collaborator call fails.
pub const APOLOGY_MESSAGE: &str = "죄송합니다. 오류가 발생했습니다.";

/// Prefilled birth place for every new profile.
pub const DEFAULT_BIRTH_PLACE: &str = "대한민국 서울";

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "counsel_session";

// Use lazy_static so the env lookups happen once, on first use.
lazy_static::lazy_static! {
    pub static ref GEMINI_MODEL: String = env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string());
    pub static ref GEMINI_BASE_URL: String = env::var("GEMINI_BASE_URL").unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string());
}
