use crate::automation::scheduler::DailySchedule;
use crate::errors::AppError;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SWEEP_AT: &str = "00:00";

/// Process configuration read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub sweep_at: DailySchedule,
    pub scheduler_enabled: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::configuration("DATABASE_URL not set"))?;

        let port = match std::env::var("APP_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::configuration("APP_PORT must be a valid port number"))?,
            Err(_) => DEFAULT_PORT,
        };

        let sweep_at = std::env::var("SWEEP_AT").unwrap_or_else(|_| DEFAULT_SWEEP_AT.to_string());
        let sweep_at = DailySchedule::parse(&sweep_at)?;

        let scheduler_enabled = match std::env::var("SCHEDULER_ENABLED") {
            Ok(value) => parse_flag(&value)
                .ok_or_else(|| AppError::configuration("SCHEDULER_ENABLED must be true or false"))?,
            Err(_) => true,
        };

        Ok(Self {
            database_url,
            port,
            sweep_at,
            scheduler_enabled,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_flag;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" off "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
