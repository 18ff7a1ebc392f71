mod book;
mod error;
mod notify;
mod poll;
mod probe;
mod session;
mod settings;

use std::future::Future;
use std::process::ExitCode;
use std::time::Duration;

use log::{error, info, warn};
use regex::Regex;
use reqwest::Client;

use crate::error::{Error, Result};
use crate::settings::Settings;

const INITIAL_BACKOFF: Duration = Duration::from_secs(30);
const MAX_BACKOFF: Duration = Duration::from_secs(60 * 15);

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let Some(target_date) = std::env::args().nth(1) else {
        eprintln!("usage: visawatch <current-appointment-date>");
        return ExitCode::from(1);
    };
    if !is_iso_date(&target_date) {
        eprintln!("invalid current appointment date: {target_date} (expected YYYY-MM-DD)");
        return ExitCode::from(1);
    }

    info!("current appointment date: {target_date}");

    match run(&target_date).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(1)
        }
    }
}

fn is_iso_date(input: &str) -> bool {
    Regex::new(r"^\d{4}-\d{2}-\d{2}$")
        .map(|re| re.is_match(input))
        .unwrap_or(false)
}

async fn run(target_date: &str) -> Result<()> {
    let settings = Settings::load()?;
    let client = Client::builder().gzip(true).build()?;
    retry(settings.max_attempts, || {
        attempt_booking(&client, &settings, target_date)
    })
    .await
}

/// Bounded retry around the whole poll-notify-book pipeline. Retryable
/// failures back off exponentially; configuration problems terminate on the
/// spot.
async fn retry<F, Fut>(max_attempts: u32, mut attempt: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut backoff = INITIAL_BACKOFF;
    for n in 1..=max_attempts {
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() => {
                warn!("attempt {n} failed: {e}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::RetriesExhausted(max_attempts))
}

async fn attempt_booking(client: &Client, settings: &Settings, target_date: &str) -> Result<()> {
    let (headers, slot) = poll::run(client, settings, target_date).await?;
    info!(
        "best available slot: {} {} ({})",
        slot.location, slot.date, slot.time
    );

    // Booking proceeds whether or not the notification lands.
    if let Err(e) = notify::notify(client, settings, &slot).await {
        warn!("error sending email: {e}");
    }

    info!("attempting to book new appointment");
    book::book(client, settings, &headers, &slot).await?;
    info!(
        "new appointment booked: {} {} ({})",
        slot.location, slot.date, slot.time
    );
    Ok(())
}
