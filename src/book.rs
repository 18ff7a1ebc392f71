use reqwest::{Client, StatusCode};

use crate::error::{Error, Result};
use crate::poll::CandidateSlot;
use crate::session::{extract_csrf_token, extract_session_cookie, SessionHeaders};
use crate::settings::Settings;

/// Move the held appointment onto the discovered slot.
///
/// The appointment page is refetched with the live session cookie attached
/// as a real header map, and the anti-forgery token the form POST must carry
/// is harvested from it fresh.
pub async fn book(
    client: &Client,
    settings: &Settings,
    headers: &SessionHeaders,
    slot: &CandidateSlot,
) -> Result<()> {
    let base = settings.base_url();
    let url = format!("{base}/schedule/{}/appointment", settings.schedule_id);

    let response = client
        .get(&url)
        .headers(headers.to_header_map(&base))
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(Error::Booking(format!(
            "appointment page returned status {}",
            response.status()
        )));
    }
    let cookie =
        extract_session_cookie(response.headers()).unwrap_or_else(|| headers.cookie.clone());
    let page = response.text().await?;
    let csrf_token = extract_csrf_token(&page)?;
    let fresh = SessionHeaders { cookie, csrf_token };

    let response = client
        .post(&url)
        .headers(fresh.to_header_map(&base))
        .form(&booking_form(&fresh.csrf_token, &settings.facility_id, slot))
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await?;
    classify_booking_response(status, &body, &slot.date)
}

/// Consulate slot filled in, ASC slot left blank, matching the site's form.
fn booking_form<'a>(
    csrf_token: &'a str,
    facility_id: &'a str,
    slot: &'a CandidateSlot,
) -> Vec<(&'static str, &'a str)> {
    vec![
        ("utf8", "\u{2713}"),
        ("authenticity_token", csrf_token),
        ("confirmed_limit_message", "1"),
        ("use_consulate_appointment_capacity", "true"),
        (
            "appointments[consulate_appointment][facility_id]",
            facility_id,
        ),
        ("appointments[consulate_appointment][date]", slot.date.as_str()),
        ("appointments[consulate_appointment][time]", slot.time.as_str()),
        ("appointments[asc_appointment][facility_id]", ""),
        ("appointments[asc_appointment][date]", ""),
        ("appointments[asc_appointment][time]", ""),
    ]
}

/// The site answers a rejected submission with a 200 re-render of the form,
/// so a success status alone proves nothing. Require the booked date to
/// appear in the final page before reporting success.
pub fn classify_booking_response(status: StatusCode, body: &str, date: &str) -> Result<()> {
    if !status.is_success() {
        return Err(Error::Booking(format!(
            "submission returned status {status}"
        )));
    }
    if body.contains(date) {
        Ok(())
    } else {
        Err(Error::Booking(format!(
            "confirmation page does not mention {date}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> CandidateSlot {
        CandidateSlot {
            location: "Toronto".into(),
            date: "2025-05-10".into(),
            time: "09:00".into(),
        }
    }

    #[test]
    fn form_carries_token_slot_and_blank_asc_fields() {
        let slot = slot();
        let form = booking_form("tok3n", "94", &slot);
        assert!(form.contains(&("authenticity_token", "tok3n")));
        assert!(form.contains(&("appointments[consulate_appointment][facility_id]", "94")));
        assert!(form.contains(&("appointments[consulate_appointment][date]", "2025-05-10")));
        assert!(form.contains(&("appointments[consulate_appointment][time]", "09:00")));
        assert!(form.contains(&("appointments[asc_appointment][date]", "")));
    }

    #[test]
    fn confirmation_mentioning_date_is_success() {
        let body = "<html><body>Appointment confirmed for 2025-05-10 at 09:00</body></html>";
        assert!(classify_booking_response(StatusCode::OK, body, "2025-05-10").is_ok());
    }

    #[test]
    fn form_rerender_without_date_is_a_failed_booking() {
        let body = "<html><body><form action=\"/appointment\">...</form></body></html>";
        let err = classify_booking_response(StatusCode::OK, body, "2025-05-10").unwrap_err();
        assert!(matches!(err, Error::Booking(_)));
    }

    #[test]
    fn non_success_status_is_a_failed_booking() {
        let err = classify_booking_response(StatusCode::INTERNAL_SERVER_ERROR, "", "2025-05-10")
            .unwrap_err();
        assert!(matches!(err, Error::Booking(_)));
    }
}
