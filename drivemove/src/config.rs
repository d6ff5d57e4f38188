use crate::directory::DEFAULT_PAGE_SIZE;
use crate::mover::DEFAULT_LIST_CONCURRENCY;

const DEFAULT_API_BASE: &str = "https://www.googleapis.com";
const DEFAULT_OAUTH_BASE: &str = "https://oauth2.googleapis.com";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoverConfig {
    pub api_base_url: String,
    pub oauth_base_url: String,
    pub page_size: u32,
    pub list_concurrency: usize,
    pub log_filter: String,
}

impl MoverConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_base_url = lookup("DRIVEMOVE_API_BASE")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let oauth_base_url = lookup("DRIVEMOVE_OAUTH_BASE")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OAUTH_BASE.to_string());
        let page_size = read_u64(&lookup, "DRIVEMOVE_PAGE_SIZE", u64::from(DEFAULT_PAGE_SIZE))
            .clamp(1, u64::from(DEFAULT_PAGE_SIZE)) as u32;
        let list_concurrency = read_u64(
            &lookup,
            "DRIVEMOVE_LIST_CONCURRENCY",
            DEFAULT_LIST_CONCURRENCY as u64,
        )
        .clamp(1, 64) as usize;
        let log_filter = lookup("DRIVEMOVE_LOG")
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            api_base_url,
            oauth_base_url,
            page_size,
            list_concurrency,
            log_filter,
        }
    }
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    lookup(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
