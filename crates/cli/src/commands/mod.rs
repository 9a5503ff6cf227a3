pub mod doctor;
pub mod onboard;
pub mod run;
pub mod serve;
pub mod status;

use opsclaw_config::AppConfig;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}
