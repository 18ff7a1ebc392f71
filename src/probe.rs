use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::warn;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::session::SessionHeaders;
use crate::settings::Settings;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Intra-cycle burst cap against the scheduling site. The inter-cycle sleep
/// handles the long-term rate.
const PROBES_PER_MINUTE: u32 = 30;

/// Earliest-availability lookups for one location. A trait so the poll loop
/// can be driven by scripted probers in tests.
pub trait Prober {
    async fn available_date(&self, headers: &SessionHeaders, location_id: u32) -> Option<String>;
    async fn available_time(
        &self,
        headers: &SessionHeaders,
        date: &str,
        location_id: u32,
    ) -> Option<String>;
}

#[derive(Debug, Deserialize)]
pub struct DaySlot {
    pub date: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TimeSlots {
    #[serde(default)]
    pub business_times: Vec<String>,
    #[serde(default)]
    pub available_times: Vec<String>,
}

impl TimeSlots {
    /// Business hours take precedence over the general availability list.
    pub fn earliest(&self) -> Option<&str> {
        self.business_times
            .first()
            .or_else(|| self.available_times.first())
            .map(String::as_str)
    }
}

pub struct HttpProber<'a> {
    client: &'a Client,
    settings: &'a Settings,
    limiter: DirectLimiter,
}

impl<'a> HttpProber<'a> {
    pub fn new(client: &'a Client, settings: &'a Settings) -> Self {
        let per_minute = NonZeroU32::new(PROBES_PER_MINUTE).unwrap();
        HttpProber {
            client,
            settings,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    async fn fetch_json(&self, headers: &SessionHeaders, url: &str) -> Result<Value> {
        self.limiter.until_ready().await;
        let response = self
            .client
            .get(url)
            .headers(headers.to_header_map(&self.settings.base_url()))
            .header(ACCEPT, "application/json")
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Open days at a location, earliest first, as the site returns them.
    pub async fn fetch_days(
        &self,
        headers: &SessionHeaders,
        location_id: u32,
    ) -> Result<Vec<DaySlot>> {
        let url = format!(
            "{}/schedule/{}/appointment/days/{}.json?appointments[expedite]=false",
            self.settings.base_url(),
            self.settings.schedule_id,
            location_id
        );
        decode_days(self.fetch_json(headers, &url).await?)
    }

    /// Open times at a location on one specific day.
    pub async fn fetch_times(
        &self,
        headers: &SessionHeaders,
        date: &str,
        location_id: u32,
    ) -> Result<TimeSlots> {
        let url = format!(
            "{}/schedule/{}/appointment/times/{}.json?date={}&appointments[expedite]=false",
            self.settings.base_url(),
            self.settings.schedule_id,
            location_id,
            date
        );
        decode_times(self.fetch_json(headers, &url).await?)
    }
}

// Any failure collapses to None here so one bad location never aborts a
// sweep. The distinct outcomes (error field, empty list, transport failure)
// stay observable on fetch_days/fetch_times.
impl Prober for HttpProber<'_> {
    async fn available_date(&self, headers: &SessionHeaders, location_id: u32) -> Option<String> {
        match self.fetch_days(headers, location_id).await {
            Ok(days) => days.into_iter().next().map(|d| d.date),
            Err(e) => {
                warn!("date probe failed for location {location_id}: {e}");
                None
            }
        }
    }

    async fn available_time(
        &self,
        headers: &SessionHeaders,
        date: &str,
        location_id: u32,
    ) -> Option<String> {
        match self.fetch_times(headers, date, location_id).await {
            Ok(times) => times.earliest().map(str::to_owned),
            Err(e) => {
                warn!("time probe failed for location {location_id}: {e}");
                None
            }
        }
    }
}

/// The site reports some failures in-band as an `error` field on an
/// otherwise well-formed JSON body. Surface those before shape decoding.
fn reject_error_field(value: Value) -> Result<Value> {
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(Error::RemoteApi(error.to_owned()));
    }
    Ok(value)
}

pub fn decode_days(value: Value) -> Result<Vec<DaySlot>> {
    let value = reject_error_field(value)?;
    serde_json::from_value(value).map_err(|e| Error::InvalidResponse(format!("days payload: {e}")))
}

pub fn decode_times(value: Value) -> Result<TimeSlots> {
    let value = reject_error_field(value)?;
    serde_json::from_value(value).map_err(|e| Error::InvalidResponse(format!("times payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn days_decode_keeps_site_order() {
        let days = decode_days(json!([
            { "date": "2025-05-10", "business_day": true },
            { "date": "2025-05-11", "business_day": true },
        ]))
        .unwrap();
        assert_eq!(days[0].date, "2025-05-10");
        assert_eq!(days.len(), 2);
    }

    #[test]
    fn empty_day_list_is_not_an_error() {
        assert!(decode_days(json!([])).unwrap().is_empty());
    }

    #[test]
    fn error_field_is_a_remote_api_error() {
        let err = decode_days(json!({ "error": "session expired" })).unwrap_err();
        match err {
            Error::RemoteApi(msg) => assert_eq!(msg, "session expired"),
            other => panic!("expected RemoteApi, got {other}"),
        }
    }

    #[test]
    fn undecodable_day_payload_is_invalid_response() {
        let err = decode_days(json!({ "unexpected": 1 })).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[test]
    fn business_times_preferred_over_available() {
        let times = decode_times(json!({
            "business_times": ["09:00", "10:30"],
            "available_times": ["08:00"],
        }))
        .unwrap();
        assert_eq!(times.earliest(), Some("09:00"));
    }

    #[test]
    fn available_times_used_when_business_empty() {
        let times = decode_times(json!({
            "business_times": [],
            "available_times": ["08:00"],
        }))
        .unwrap();
        assert_eq!(times.earliest(), Some("08:00"));
    }

    #[test]
    fn no_time_lists_means_no_time() {
        assert_eq!(decode_times(json!({})).unwrap().earliest(), None);
    }

    #[test]
    fn time_error_field_is_a_remote_api_error() {
        let err = decode_times(json!({ "error": "session expired" })).unwrap_err();
        assert!(matches!(err, Error::RemoteApi(_)));
    }

    #[test]
    fn identical_payloads_decode_identically() {
        let payload = json!([{ "date": "2025-05-10" }]);
        let a = decode_days(payload.clone()).unwrap();
        let b = decode_days(payload).unwrap();
        assert_eq!(a[0].date, b[0].date);
    }
}
