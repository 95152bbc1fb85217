use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::TokioAsyncResolver;

/// Tier-1 syntax check. Deliberately permissive (local@domain.tld); the
/// strict shape check lives at the API boundary.
pub fn syntax_ok(email: &str) -> bool {
    let re = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    re.is_match(email)
}

/// Why a recipient was definitively rejected by deep validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Format,
    NoMx,
    Typo { suggestion: String },
    Disposable,
    Mailbox,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::Format => "regex",
            RejectReason::NoMx => "mx",
            RejectReason::Typo { .. } => "typo",
            RejectReason::Disposable => "disposable",
            RejectReason::Mailbox => "mailbox-probe",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            RejectReason::Format => "Invalid email format".to_string(),
            RejectReason::NoMx => "Domain does not accept email".to_string(),
            RejectReason::Typo { suggestion } => format!("Did you mean {}?", suggestion),
            RejectReason::Disposable => {
                "Disposable email addresses are not allowed".to_string()
            }
            RejectReason::Mailbox => "Email address does not exist".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum Verdict {
    Pass,
    Reject(RejectReason),
}

/// MX lookup failure, tagged so callers can tell a definitive "no mail
/// servers" apart from resolver trouble. Only the former blocks sending.
#[derive(Debug, Error)]
pub enum LookupFailure {
    #[error("no MX records")]
    NoRecords,
    #[error("lookup failed: {0}")]
    Infrastructure(String),
}

#[async_trait]
pub trait MxLookup: Send + Sync {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, LookupFailure>;
}

pub struct DnsMxLookup {
    resolver: TokioAsyncResolver,
}

impl DnsMxLookup {
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            // Fallback to google DNS if system config fails
            let config = trust_dns_resolver::config::ResolverConfig::google();
            let opts = trust_dns_resolver::config::ResolverOpts::default();
            TokioAsyncResolver::tokio(config, opts)
        });
        Self { resolver }
    }
}

impl Default for DnsMxLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MxLookup for DnsMxLookup {
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, LookupFailure> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let mut records: Vec<(u16, String)> = lookup
                    .iter()
                    .map(|mx| {
                        let host = mx.exchange().to_string().trim_end_matches('.').to_string();
                        (mx.preference(), host)
                    })
                    .collect();
                if records.is_empty() {
                    return Err(LookupFailure::NoRecords);
                }
                records.sort_by_key(|(preference, _)| *preference);
                Ok(records.into_iter().map(|(_, host)| host).collect())
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Err(LookupFailure::NoRecords),
                _ => Err(LookupFailure::Infrastructure(e.to_string())),
            },
        }
    }
}

const DOMAIN_TYPOS: &[(&str, &str)] = &[
    ("gmai.com", "gmail.com"),
    ("gmial.com", "gmail.com"),
    ("gmal.com", "gmail.com"),
    ("gmail.cm", "gmail.com"),
    ("gmail.con", "gmail.com"),
    ("outlook.cm", "outlook.com"),
    ("outlook.con", "outlook.com"),
    ("hotmai.com", "outlook.com"),
    ("hotmail.cm", "outlook.com"),
    ("yaho.com", "yahoo.com"),
    ("yahooo.com", "yahoo.com"),
];

const DISPOSABLE_DOMAINS: &[&str] = &[
    "mailinator.com",
    "10minutemail.com",
    "guerrillamail.com",
    "tempmail.com",
    "temp-mail.org",
    "yopmail.com",
    "throwawaymail.com",
    "trashmail.com",
    "getnada.com",
    "maildrop.cc",
    "sharklasers.com",
    "dispostable.com",
];

/// Deep recipient validation. Checks run in order: format, MX, typo table,
/// disposable list, optional mailbox probe. Infrastructure failures never
/// block a send; only definitive negatives do.
pub struct RecipientValidator {
    mx: Arc<dyn MxLookup>,
    probe_mailbox: bool,
}

impl RecipientValidator {
    pub fn new(mx: Arc<dyn MxLookup>, probe_mailbox: bool) -> Self {
        Self { mx, probe_mailbox }
    }

    pub async fn validate_deep(&self, email: &str) -> Verdict {
        if !syntax_ok(email) {
            return Verdict::Reject(RejectReason::Format);
        }
        let domain = match email.split('@').nth(1) {
            Some(d) => d.to_lowercase(),
            None => return Verdict::Reject(RejectReason::Format),
        };

        let mx_hosts = match self.mx.lookup_mx(&domain).await {
            Ok(hosts) => hosts,
            Err(LookupFailure::NoRecords) => return Verdict::Reject(RejectReason::NoMx),
            Err(LookupFailure::Infrastructure(e)) => {
                tracing::warn!(domain = %domain, error = %e, "MX lookup failed, skipping check");
                Vec::new()
            }
        };

        if let Some((_, correct)) = DOMAIN_TYPOS.iter().find(|(typo, _)| *typo == domain) {
            return Verdict::Reject(RejectReason::Typo {
                suggestion: correct.to_string(),
            });
        }

        if DISPOSABLE_DOMAINS.contains(&domain.as_str()) {
            return Verdict::Reject(RejectReason::Disposable);
        }

        if self.probe_mailbox {
            if let Some(host) = mx_hosts.first() {
                match probe_mailbox(host, email).await {
                    ProbeOutcome::Rejected => return Verdict::Reject(RejectReason::Mailbox),
                    ProbeOutcome::Accepted => {}
                    ProbeOutcome::Inconclusive(e) => {
                        tracing::warn!(host = %host, error = %e, "mailbox probe inconclusive, skipping check");
                    }
                }
            }
        }

        Verdict::Pass
    }
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Accepted,
    Rejected,
    Inconclusive(String),
}

/// Ask the recipient's MX whether the mailbox exists, without delivering
/// anything. Only a 5xx reply to RCPT is treated as definitive; everything
/// else (unreachable host, greylisting, odd replies) is inconclusive.
pub async fn probe_mailbox(mx_host: &str, email: &str) -> ProbeOutcome {
    match tokio::time::timeout(Duration::from_secs(8), probe_session(mx_host, 25, email)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => ProbeOutcome::Inconclusive(e.to_string()),
        Err(_) => ProbeOutcome::Inconclusive("probe timed out".to_string()),
    }
}

async fn probe_session(mx_host: &str, port: u16, email: &str) -> std::io::Result<ProbeOutcome> {
    let stream = TcpStream::connect((mx_host, port)).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let greeting = read_reply(&mut reader).await?;
    if !greeting.starts_with('2') {
        return Ok(ProbeOutcome::Inconclusive(format!(
            "greeting refused: {}",
            greeting.trim()
        )));
    }

    write_half.write_all(b"EHLO mailpost.local\r\n").await?;
    let ehlo = read_reply(&mut reader).await?;
    if !ehlo.starts_with('2') {
        return Ok(ProbeOutcome::Inconclusive(format!("EHLO refused: {}", ehlo.trim())));
    }

    write_half
        .write_all(b"MAIL FROM:<probe@mailpost.local>\r\n")
        .await?;
    let mail_from = read_reply(&mut reader).await?;
    if !mail_from.starts_with('2') {
        return Ok(ProbeOutcome::Inconclusive(format!(
            "MAIL FROM refused: {}",
            mail_from.trim()
        )));
    }

    write_half
        .write_all(format!("RCPT TO:<{}>\r\n", email).as_bytes())
        .await?;
    let rcpt = read_reply(&mut reader).await?;
    let _ = write_half.write_all(b"QUIT\r\n").await;

    Ok(match rcpt.chars().next() {
        Some('2') => ProbeOutcome::Accepted,
        Some('5') => ProbeOutcome::Rejected,
        _ => ProbeOutcome::Inconclusive(format!("ambiguous RCPT reply: {}", rcpt.trim())),
    })
}

/// Read one SMTP reply, following "250-" continuation lines to the final
/// "250 " line.
async fn read_reply<R>(reader: &mut BufReader<R>) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed",
            ));
        }
        if line.len() < 4 || line.as_bytes().get(3) != Some(&b'-') {
            return Ok(line);
        }
    }
}
