use std::sync::LazyLock;
use std::time::{Duration, Instant};

use anyhow::Result;
use regex::Regex;
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::CanonicalRecord;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

/// Contact channel recorded when a profile offers a message form but no
/// address.
pub const MESSAGE_FORM_MARKER: &str = "Message Form";

static TEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(tel:([^)\s]+)\)").unwrap());
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(?\b\d{3}\)?[-.\s]?\d{3}[-.\s]\d{4}\b").unwrap());
static MAILTO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(mailto:([^)?\s]+)").unwrap());
static SIGN_IN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:sign in|log in|login|member login)\b").unwrap());
static PASSWORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bpassword\b").unwrap());
static MESSAGE_FORM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:send (?:a )?message|contact property|send email)\b").unwrap()
});

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("still rate limited after {0} retries")]
    RateLimited(u32),
    #[error("profile redirected to a sign-in page")]
    AuthWall,
    #[error("no content in profile response")]
    EmptyPage,
}

/// What a profile page revealed. Either part may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactInfo {
    pub phone: String,
    /// Direct email address, [`MESSAGE_FORM_MARKER`], or empty.
    pub contact_channel: String,
}

pub trait ContactLookup {
    async fn lookup(&mut self, locator: &str) -> Result<ContactInfo, EnrichError>;
}

/// An open spider.cloud session. One per enrichment batch; dropping it closes
/// the session, whichever way the batch ends.
pub struct SpiderSession {
    spider: Spider,
    opened: Instant,
    lookups: usize,
}

impl SpiderSession {
    pub fn open() -> Result<Self> {
        let api_key = std::env::var("SPIDER_API_KEY")
            .map_err(|_| anyhow::anyhow!("SPIDER_API_KEY environment variable must be set"))?;
        let spider = Spider::new(Some(api_key))
            .map_err(|e| anyhow::anyhow!("Failed to create Spider client: {}", e))?;
        info!("Enrichment session opened");
        Ok(Self {
            spider,
            opened: Instant::now(),
            lookups: 0,
        })
    }

    async fn fetch_markdown(&self, url: &str) -> Result<String, EnrichError> {
        for attempt in 0..=MAX_RETRIES {
            let page = self.fetch_once(url).await?;

            let retry = matches!(page.status, Some(429) | Some(500..=599));
            if !retry {
                if matches!(page.status, Some(401) | Some(403)) {
                    return Err(EnrichError::AuthWall);
                }
                return page.content.ok_or(EnrichError::EmptyPage);
            }
            if attempt == MAX_RETRIES {
                break;
            }

            let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
            warn!(
                "Rate limited on {} (attempt {}/{}), backing off {:.1}s",
                url,
                attempt + 1,
                MAX_RETRIES,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
        }
        Err(EnrichError::RateLimited(MAX_RETRIES))
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPage, EnrichError> {
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Markdown)),
            ..Default::default()
        };

        let start = Instant::now();
        let response = self
            .spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| EnrichError::Transport(e.to_string()))?;
        debug!("Fetched {} in {}ms", url, start.elapsed().as_millis());
        Ok(FetchedPage::from_response(response))
    }
}

impl ContactLookup for SpiderSession {
    async fn lookup(&mut self, locator: &str) -> Result<ContactInfo, EnrichError> {
        self.lookups += 1;
        let markdown = self.fetch_markdown(locator).await?;
        parse_profile(&markdown)
    }
}

impl Drop for SpiderSession {
    fn drop(&mut self) {
        info!(
            "Enrichment session closed after {} lookups ({:.1}s)",
            self.lookups,
            self.opened.elapsed().as_secs_f64()
        );
    }
}

#[derive(Debug)]
struct FetchedPage {
    status: Option<u16>,
    content: Option<String>,
}

impl FetchedPage {
    /// First element of the JSON array spider.cloud answers with. The array
    /// may arrive as a JSON-encoded string.
    fn from_response(response: serde_json::Value) -> Self {
        let parsed: serde_json::Value = match response.as_str() {
            Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
            None => response,
        };
        let first = parsed.as_array().and_then(|arr| arr.first());

        Self {
            status: first
                .and_then(|obj| obj.get("status"))
                .and_then(|s| s.as_u64())
                .and_then(|s| u16::try_from(s).ok()),
            content: first
                .and_then(|obj| obj.get("content"))
                .and_then(|c| c.as_str())
                .map(strip_images),
        }
    }
}

/// Pull phone and contact channel out of a profile page's markdown.
pub fn parse_profile(markdown: &str) -> Result<ContactInfo, EnrichError> {
    if markdown.trim().is_empty() {
        return Err(EnrichError::EmptyPage);
    }

    let phone = TEL_RE
        .captures(markdown)
        .map(|c| c[1].to_string())
        .or_else(|| PHONE_RE.find(markdown).map(|m| m.as_str().trim().to_string()))
        .unwrap_or_default();

    if phone.is_empty() && SIGN_IN_RE.is_match(markdown) && PASSWORD_RE.is_match(markdown) {
        return Err(EnrichError::AuthWall);
    }

    let contact_channel = match MAILTO_RE.captures(markdown) {
        Some(c) => c[1].to_string(),
        None if MESSAGE_FORM_RE.is_match(markdown) => MESSAGE_FORM_MARKER.to_string(),
        None => String::new(),
    };

    Ok(ContactInfo {
        phone,
        contact_channel,
    })
}

/// Remove markdown image syntax: ![alt](url) and [![alt](url)](link)
fn strip_images(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
    static BLANKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());
    let cleaned = IMAGE_RE.replace_all(md, "");
    BLANKS_RE.replace_all(&cleaned, "\n\n").to_string()
}

#[derive(Debug, Default)]
pub struct EnrichReport {
    pub attempted: usize,
    pub enriched: usize,
    /// One line per failed lookup, for the operator.
    pub notices: Vec<String>,
}

impl EnrichReport {
    pub fn print(&self) {
        println!(
            "Enriched {} of {} profiles ({} failed).",
            self.enriched,
            self.attempted,
            self.notices.len()
        );
        for notice in &self.notices {
            println!("  ! {}", notice);
        }
    }
}

/// Fill phone/email for records that have a profile locator but no phone.
/// A failed lookup leaves the record as it was and moves on.
pub async fn enrich_records<L: ContactLookup>(
    records: &mut [CanonicalRecord],
    lookup: &mut L,
) -> EnrichReport {
    let pending: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| !r.profile_url.is_empty() && r.phone.is_empty())
        .map(|(i, _)| i)
        .collect();

    let mut report = EnrichReport {
        attempted: pending.len(),
        ..EnrichReport::default()
    };
    let pb = crate::progress_bar(pending.len());

    for i in pending {
        let record = &mut records[i];
        match lookup.lookup(&record.profile_url).await {
            Ok(info) => {
                if !info.phone.is_empty() {
                    report.enriched += 1;
                }
                record.phone = info.phone;
                if record.email.is_empty() {
                    record.email = info.contact_channel;
                }
            }
            Err(e) => {
                warn!("Enrichment failed for {} ({}): {}", record.property, record.profile_url, e);
                report.notices.push(format!("{}: {}", record.property, e));
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    report
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::record::Association;

    struct FakeLookup {
        pages: HashMap<String, Result<ContactInfo, ()>>,
        calls: Vec<String>,
    }

    impl ContactLookup for FakeLookup {
        async fn lookup(&mut self, locator: &str) -> Result<ContactInfo, EnrichError> {
            self.calls.push(locator.to_string());
            match self.pages.get(locator) {
                Some(Ok(info)) => Ok(info.clone()),
                Some(Err(())) => Err(EnrichError::AuthWall),
                None => Err(EnrichError::Transport("timed out".into())),
            }
        }
    }

    fn record(name: &str, url: &str) -> CanonicalRecord {
        CanonicalRecord {
            company: name.into(),
            property: name.into(),
            street: String::new(),
            city: String::new(),
            state: String::new(),
            zip: String::new(),
            phone: String::new(),
            email: String::new(),
            units: 0,
            profile_url: url.into(),
            association: Association::new("AAGO"),
            member_type: "Owner".into(),
        }
    }

    #[test]
    fn profile_with_tel_and_mailto() {
        let md = "# Acme Villas\n[Call](tel:+14075550100)\n[Email us](mailto:leasing@acme.example?subject=hi)\n";
        let info = parse_profile(md).unwrap();
        assert_eq!(info.phone, "+14075550100");
        assert_eq!(info.contact_channel, "leasing@acme.example");
    }

    #[test]
    fn profile_with_plain_phone_and_form() {
        let md = "Acme Villas\nPhone: (407) 555-0100\n[Send Message](https://www.aago.org/form)\n";
        let info = parse_profile(md).unwrap();
        assert_eq!(info.phone, "(407) 555-0100");
        assert_eq!(info.contact_channel, MESSAGE_FORM_MARKER);
    }

    #[test]
    fn profile_without_contact_data() {
        let info = parse_profile("Acme Villas\n100 Main St\n").unwrap();
        assert_eq!(info, ContactInfo::default());
    }

    #[test]
    fn sign_in_wall_is_an_error() {
        let md = "Member Login\nUsername\nPassword\n[Forgot your password?](/reset)\n";
        assert!(matches!(parse_profile(md), Err(EnrichError::AuthWall)));
        assert!(matches!(parse_profile("  \n"), Err(EnrichError::EmptyPage)));
    }

    #[test]
    fn response_status_and_content() {
        let page = FetchedPage::from_response(serde_json::json!([
            {"status": 200, "content": "Acme\n![logo](https://x/l.png)\n"}
        ]));
        assert_eq!(page.status, Some(200));
        assert_eq!(page.content.as_deref(), Some("Acme\n\n"));

        let encoded = serde_json::Value::String(r#"[{"status": 429}]"#.into());
        let page = FetchedPage::from_response(encoded);
        assert_eq!(page.status, Some(429));
        assert!(page.content.is_none());
    }

    #[test]
    fn out_of_range_status_is_dropped() {
        let page = FetchedPage::from_response(serde_json::json!([
            {"status": 65736, "content": "x"}
        ]));
        assert_eq!(page.status, None);
        assert_eq!(page.content.as_deref(), Some("x"));
    }

    #[test]
    fn images_are_stripped() {
        let md = "Top\n![logo](https://x/logo.png)\n\n\n\nBottom";
        assert_eq!(strip_images(md), "Top\n\nBottom");
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_batch() {
        let mut records = vec![
            record("Wall", "https://p/wall"),
            record("Gone", "https://p/gone"),
            record("Acme", "https://p/acme"),
            record("No Url", ""),
        ];
        let mut lookup = FakeLookup {
            pages: HashMap::from([
                ("https://p/wall".to_string(), Err(())),
                (
                    "https://p/acme".to_string(),
                    Ok(ContactInfo {
                        phone: "407-555-0100".into(),
                        contact_channel: MESSAGE_FORM_MARKER.into(),
                    }),
                ),
            ]),
            calls: Vec::new(),
        };

        let report = enrich_records(&mut records, &mut lookup).await;

        assert_eq!(lookup.calls.len(), 3);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.enriched, 1);
        assert_eq!(report.notices.len(), 2);
        assert!(records[0].phone.is_empty() && records[0].email.is_empty());
        assert!(records[1].phone.is_empty());
        assert_eq!(records[2].phone, "407-555-0100");
        assert_eq!(records[2].email, MESSAGE_FORM_MARKER);
    }

    #[tokio::test]
    async fn records_with_phone_are_skipped() {
        let mut records = vec![record("Acme", "https://p/acme")];
        records[0].phone = "407-555-0199".into();
        let mut lookup = FakeLookup {
            pages: HashMap::new(),
            calls: Vec::new(),
        };
        let report = enrich_records(&mut records, &mut lookup).await;
        assert_eq!(report.attempted, 0);
        assert!(lookup.calls.is_empty());
        assert_eq!(records[0].phone, "407-555-0199");
    }
}
