use crate::default_struct;
use std::time::Duration;

default_struct! {
#[derive(Debug, Clone)]
pub struct Settings {
    pub update_minutes: u64 = 1,
    pub keep_alive_port: u16 = 10000,
    pub data_path: String = "data/status.db".to_string(),
}
}

impl Settings {
    /// Reads `UPDATE_MINUTES`, `PORT` and `STATUS_DB_PATH`, falling back to
    /// the defaults on anything missing or unparseable.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(minutes) = env_parse("UPDATE_MINUTES") {
            settings.update_minutes = minutes;
        }
        if let Some(port) = env_parse("PORT") {
            settings.keep_alive_port = port;
        }
        if let Ok(path) = std::env::var("STATUS_DB_PATH") {
            settings.data_path = path;
        }
        settings
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_minutes.max(1) * 60)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.update_minutes, 1);
        assert_eq!(settings.keep_alive_port, 10000);
        assert_eq!(settings.data_path, "data/status.db");
    }

    #[test]
    fn interval_never_drops_below_a_minute() {
        let mut settings = Settings::default();
        settings.update_minutes = 0;
        assert_eq!(settings.update_interval(), Duration::from_secs(60));
        settings.update_minutes = 5;
        assert_eq!(settings.update_interval(), Duration::from_secs(300));
    }
}
