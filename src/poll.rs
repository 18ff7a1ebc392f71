use std::time::Duration;

use log::info;
use reqwest::Client;
use tokio::time::sleep;

use crate::error::Result;
use crate::probe::{HttpProber, Prober};
use crate::session::{Authenticator, HttpAuthenticator, SessionHeaders};
use crate::settings::{Location, Settings};

/// One (location, date, time) tuple discovered during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSlot {
    pub location: String,
    pub date: String,
    pub time: String,
}

/// One pass over every location, in declared order, each probed exactly
/// once. Returns the earliest slot strictly before `target_date`, or None
/// when nothing beats the held appointment. Dates compare lexically, which
/// is chronological for the site's ISO date strings.
pub async fn sweep<P: Prober>(
    prober: &P,
    headers: &SessionHeaders,
    locations: &[Location],
    target_date: &str,
) -> Option<CandidateSlot> {
    let mut best: Option<CandidateSlot> = None;

    for location in locations {
        let Some(date) = prober.available_date(headers, location.id).await else {
            info!("{}: no available dates", location.name);
            continue;
        };

        if date.as_str() >= target_date {
            info!(
                "{}: nearest date {date} is no earlier than already booked",
                location.name
            );
            continue;
        }

        // A booking needs a concrete time, so a dateless-time slot is skipped.
        let Some(time) = prober.available_time(headers, &date, location.id).await else {
            info!("{}: {date} has no bookable time", location.name);
            continue;
        };

        info!("{}: closest date and time {date} ({time})", location.name);

        if best.as_ref().map_or(true, |b| date < b.date) {
            best = Some(CandidateSlot {
                location: location.name.clone(),
                date,
                time,
            });
        }
    }

    best
}

/// Poll until a slot strictly earlier than `target_date` turns up.
pub async fn run(
    client: &Client,
    settings: &Settings,
    target_date: &str,
) -> Result<(SessionHeaders, CandidateSlot)> {
    let auth = HttpAuthenticator::new(client, settings);
    // One prober for the whole search, so the request burst cap spans
    // consecutive cycles instead of resetting with each sweep.
    let prober = HttpProber::new(client, settings);
    run_with(&auth, &prober, settings, target_date).await
}

/// The poll loop proper. The full sign-in handshake is rerun every cycle so
/// each sweep starts from fresh session state. The first sweep that finds
/// anything ends the search.
pub async fn run_with<A: Authenticator, P: Prober>(
    auth: &A,
    prober: &P,
    settings: &Settings,
    target_date: &str,
) -> Result<(SessionHeaders, CandidateSlot)> {
    loop {
        let headers = auth.authenticate().await?;
        info!("authentication ok");

        if let Some(best) = sweep(prober, &headers, &settings.locations, target_date).await {
            return Ok((headers, best));
        }

        info!(
            "no qualifying slot; waiting {} seconds",
            settings.poll_interval_secs
        );
        sleep(Duration::from_secs(settings.poll_interval_secs)).await;
    }
}
