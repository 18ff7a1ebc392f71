use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// One consulate the scheduling site knows how to book at.
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub email: String,
    pub password: String,
    pub schedule_id: String,
    pub facility_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    pub notification_email: String,
    pub sendgrid_api_key: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_locations")]
    pub locations: Vec<Location>,
}

impl Settings {
    /// Layered load: optional `visawatch.toml` in the working directory,
    /// overridden by `VISAWATCH_*` environment variables.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name("visawatch").required(false))
            .add_source(Environment::with_prefix("VISAWATCH"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Root of the scheduling site for the configured region/locale segment.
    pub fn base_url(&self) -> String {
        format!("https://ais.usvisa-info.com/en-{}/niv", self.region)
    }
}

fn default_region() -> String {
    "ca".into()
}

fn default_poll_interval() -> u64 {
    60 * 5
}

fn default_max_attempts() -> u32 {
    10
}

fn default_locations() -> Vec<Location> {
    [
        (89, "Calgary"),
        (90, "Halifax"),
        (91, "Montreal"),
        (92, "Ottawa"),
        (93, "Quebec City"),
        (94, "Toronto"),
        (95, "Vancouver"),
    ]
    .into_iter()
    .map(|(id, name)| Location {
        id,
        name: name.into(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            email: "user@example.com".into(),
            password: "hunter2".into(),
            schedule_id: "12345678".into(),
            facility_id: "94".into(),
            region: default_region(),
            notification_email: "user@example.com".into(),
            sendgrid_api_key: "SG.key".into(),
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            locations: default_locations(),
        }
    }

    #[test]
    fn base_url_embeds_region() {
        let mut s = settings();
        assert_eq!(s.base_url(), "https://ais.usvisa-info.com/en-ca/niv");
        s.region = "gb".into();
        assert_eq!(s.base_url(), "https://ais.usvisa-info.com/en-gb/niv");
    }

    #[test]
    fn default_location_list_is_fixed_and_ordered() {
        let locations = default_locations();
        assert_eq!(locations.len(), 7);
        assert_eq!(locations[0].id, 89);
        assert_eq!(locations[0].name, "Calgary");
        assert_eq!(locations[6].id, 95);
        assert_eq!(locations[6].name, "Vancouver");
    }

    #[test]
    fn poll_interval_defaults_to_five_minutes() {
        assert_eq!(settings().poll_interval_secs, 300);
    }
}
