use reqwest::Client;
use serde_json::json;

use crate::error::{Error, Result};
use crate::poll::CandidateSlot;
use crate::settings::Settings;

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const SUBJECT: &str = "USA VISA appointment: earlier date found!";

/// One-shot notification email, sent to and from the configured address.
/// Best effort: the caller logs a failure and proceeds to booking anyway.
pub async fn notify(client: &Client, settings: &Settings, slot: &CandidateSlot) -> Result<()> {
    let response = client
        .post(SENDGRID_URL)
        .bearer_auth(&settings.sendgrid_api_key)
        .json(&message(settings, slot))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::InvalidResponse(format!(
            "mail API returned status {}",
            response.status()
        )));
    }
    Ok(())
}

fn message(settings: &Settings, slot: &CandidateSlot) -> serde_json::Value {
    json!({
        "personalizations": [{ "to": [{ "email": settings.notification_email }] }],
        "from": { "email": settings.notification_email },
        "subject": SUBJECT,
        "content": [{
            "type": "text/plain",
            "value": format!(
                "Best available date across all locations found! \
                 Location: {}, date and time: {} ({})",
                slot.location, slot.date, slot.time
            ),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Location;

    fn slot() -> CandidateSlot {
        CandidateSlot {
            location: "Toronto".into(),
            date: "2025-05-10".into(),
            time: "09:00".into(),
        }
    }

    fn settings() -> Settings {
        Settings {
            email: "user@example.com".into(),
            password: "hunter2".into(),
            schedule_id: "12345678".into(),
            facility_id: "94".into(),
            region: "ca".into(),
            notification_email: "alerts@example.com".into(),
            sendgrid_api_key: "SG.key".into(),
            poll_interval_secs: 300,
            max_attempts: 10,
            locations: vec![Location {
                id: 94,
                name: "Toronto".into(),
            }],
        }
    }

    #[test]
    fn sender_and_recipient_are_the_notification_address() {
        let msg = message(&settings(), &slot());
        assert_eq!(
            msg["personalizations"][0]["to"][0]["email"],
            "alerts@example.com"
        );
        assert_eq!(msg["from"]["email"], "alerts@example.com");
    }

    #[test]
    fn body_names_location_date_and_time() {
        let msg = message(&settings(), &slot());
        let body = msg["content"][0]["value"].as_str().unwrap();
        assert!(body.contains("Toronto"));
        assert!(body.contains("2025-05-10"));
        assert!(body.contains("09:00"));
    }
}
