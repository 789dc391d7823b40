//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "warelay".to_string()
}

pub fn default_data_dir() -> String {
    "~/.warelay".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_device_name() -> String {
    "warelay".to_string()
}

pub fn default_webhook_url() -> String {
    "http://localhost:8000/webhook".to_string()
}

pub fn default_timeout_secs() -> u64 {
    30
}

pub fn default_fallback_message() -> String {
    "Sorry, something went wrong while handling your message. Please try again later."
        .to_string()
}

pub fn default_base_delay_secs() -> u64 {
    5
}

pub fn default_max_attempts() -> u32 {
    5
}

pub fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_api_port() -> u16 {
    3001
}
