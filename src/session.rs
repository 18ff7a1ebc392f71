use reqwest::header::{
    HeaderMap, HeaderValue, CACHE_CONTROL, CONNECTION, COOKIE, REFERER, SET_COOKIE, USER_AGENT,
};
use reqwest::Client;
use scraper::{Html, Selector};

use crate::error::{Error, Result};
use crate::settings::Settings;

const BROWSER_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
const SESSION_COOKIE: &str = "_yatri_session";

/// Cookie and anti-forgery token bundle for authenticated requests. Built
/// once per sign-in handshake and replaced wholesale, never mutated.
#[derive(Debug, Clone)]
pub struct SessionHeaders {
    pub cookie: String,
    pub csrf_token: String,
}

impl SessionHeaders {
    /// Full header set for a request: session cookie, CSRF token and the
    /// fixed browser identity the site expects.
    pub fn to_header_map(&self, base_url: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        // Cookie and token come off the wire; skip any value the header
        // grammar rejects instead of panicking mid-cycle.
        if let Ok(v) = HeaderValue::from_str(&self.cookie) {
            headers.insert(COOKIE, v);
        }
        if let Ok(v) = HeaderValue::from_str(&self.csrf_token) {
            headers.insert("X-CSRF-Token", v);
        }
        if let Ok(v) = HeaderValue::from_str(base_url) {
            headers.insert(REFERER, v);
        }
        headers.insert(
            "Referrer-Policy",
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers
    }
}

/// Seam over the sign-in handshake so the poll loop can run against scripted
/// sessions in tests.
pub trait Authenticator {
    async fn authenticate(&self) -> Result<SessionHeaders>;
}

pub struct HttpAuthenticator<'a> {
    client: &'a Client,
    settings: &'a Settings,
}

impl<'a> HttpAuthenticator<'a> {
    pub fn new(client: &'a Client, settings: &'a Settings) -> Self {
        HttpAuthenticator { client, settings }
    }
}

impl Authenticator for HttpAuthenticator<'_> {
    async fn authenticate(&self) -> Result<SessionHeaders> {
        authenticate(self.client, self.settings).await
    }
}

/// Two-step sign-in handshake: harvest an anonymous cookie and CSRF token
/// from the sign-in page, then POST credentials with them attached. The POST
/// rotates the session cookie; the token from the page stays valid.
pub async fn authenticate(client: &Client, settings: &Settings) -> Result<SessionHeaders> {
    let base = settings.base_url();
    let sign_in_url = format!("{base}/users/sign_in");

    let response = client
        .get(&sign_in_url)
        .header(USER_AGENT, BROWSER_UA)
        .send()
        .await?;
    let cookie = extract_session_cookie(response.headers())
        .ok_or_else(|| Error::InvalidResponse("sign-in page set no session cookie".into()))?;
    let html = response.text().await?;
    let csrf_token = extract_csrf_token(&html)?;
    let anonymous = SessionHeaders { cookie, csrf_token };

    let response = client
        .post(&sign_in_url)
        .headers(anonymous.to_header_map(&base))
        .form(&[
            ("utf8", "\u{2713}"),
            ("user[email]", settings.email.as_str()),
            ("user[password]", settings.password.as_str()),
            ("policy_confirmed", "1"),
            ("commit", "Sign In"),
        ])
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(Error::Authentication(format!(
            "sign-in returned status {}",
            response.status()
        )));
    }

    let cookie = extract_session_cookie(response.headers()).unwrap_or(anonymous.cookie);
    Ok(SessionHeaders {
        cookie,
        csrf_token: anonymous.csrf_token,
    })
}

/// Pick the `_yatri_session` pair out of however many `Set-Cookie` lines the
/// response carries.
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|part| part.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(name, value)| format!("{name}={value}"))
}

pub fn extract_csrf_token(html: &str) -> Result<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[name="csrf-token"]"#)
        .map_err(|e| Error::InvalidResponse(format!("csrf selector: {e}")))?;
    doc.select(&selector)
        .next()
        .and_then(|el| el.attr("content"))
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidResponse("CSRF token not found in HTML".into()))
}
