//! Source acquisition: turns a URL, an inline base64 payload or an already
//! staged upload into a [`StagedFile`].

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;

use super::staging::{StagedFile, StagingArea};
use super::RelayError;
use crate::common::config::SniffSettings;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
// Enough for every signature `infer` knows about
const MAGIC_HEAD_LEN: u64 = 8 * 1024;

/// Standard alphabet; trailing `=` padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Where the bytes of an upload come from.
#[derive(Debug)]
pub enum SourceKind {
    RemoteUrl(String),
    /// Raw base64, optionally wrapped as `data:<mime>;base64,<payload>`
    InlinePayload(String),
    /// Multipart upload already streamed into the staging area
    PreStagedUpload(StagedFile),
}

impl SourceKind {
    /// Value reported as `details.source`.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::RemoteUrl(_) => "url",
            SourceKind::InlinePayload(_) => "base64",
            SourceKind::PreStagedUpload(_) => "upload",
        }
    }
}

#[derive(Clone)]
pub struct SourceAcquirer {
    staging: StagingArea,
    http: reqwest::Client,
    sniff: SniffSettings,
}

impl SourceAcquirer {
    pub fn new(staging: StagingArea, http: reqwest::Client, sniff: SniffSettings) -> Self {
        Self {
            staging,
            http,
            sniff,
        }
    }

    /// Produce exactly one staging file, or none plus a classified error.
    pub async fn acquire(
        &self,
        source: SourceKind,
        file_name: &str,
    ) -> Result<StagedFile, RelayError> {
        match source {
            SourceKind::RemoteUrl(url) => self.fetch_url(&url, file_name).await,
            SourceKind::InlinePayload(payload) => self.decode_inline(&payload, file_name).await,
            SourceKind::PreStagedUpload(staged) => adopt_upload(staged, file_name).await,
        }
    }

    async fn fetch_url(&self, raw: &str, file_name: &str) -> Result<StagedFile, RelayError> {
        let url = parse_source_url(raw)?;
        let mut staged = self.staging.allocate(file_name).await?;

        tracing::debug!(%url, "Fetching source URL");
        let response = self.http.get(url).send().await.map_err(classify_fetch_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::InvalidInput(format!(
                "source URL responded with HTTP {status}"
            )));
        }

        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(essence);

        let size = staged
            .fill_from(response.bytes_stream(), classify_fetch_error)
            .await?;

        if self.sniff_html(&staged).await? {
            return Err(RelayError::NotADirectDownload(
                "URL returned a web page instead of a file; use a direct download link".into(),
            ));
        }

        let content_type = match declared {
            Some(declared) => declared,
            None => infer_content_type(&staged.head(MAGIC_HEAD_LEN).await?, file_name),
        };
        staged.set_content_type(content_type);

        tracing::debug!(size, "Fetched source URL into staging");
        Ok(staged)
    }

    async fn decode_inline(&self, payload: &str, file_name: &str) -> Result<StagedFile, RelayError> {
        let inline = decode_inline_payload(payload)?;

        if self.sniff.enabled
            && inline.bytes.len() as u64 <= self.sniff.max_bytes
            && looks_like_html(&inline.bytes)
        {
            return Err(RelayError::InvalidPayload(
                "decoded payload looks like an HTML page, not a file".into(),
            ));
        }

        let content_type = inline
            .declared_type
            .unwrap_or_else(|| infer_content_type(&inline.bytes, file_name));

        let mut staged = self.staging.allocate(file_name).await?;
        staged.write_all(&inline.bytes).await?;
        staged.set_content_type(content_type);
        Ok(staged)
    }

    async fn sniff_html(&self, staged: &StagedFile) -> Result<bool, RelayError> {
        if !self.sniff.enabled || staged.size() > self.sniff.max_bytes {
            return Ok(false);
        }
        let head = staged.head(self.sniff.max_bytes).await?;
        Ok(looks_like_html(&head))
    }
}

async fn adopt_upload(mut staged: StagedFile, file_name: &str) -> Result<StagedFile, RelayError> {
    staged.refresh_size().await?;
    if staged.content_type().is_none() {
        let head = staged.head(MAGIC_HEAD_LEN).await?;
        staged.set_content_type(infer_content_type(&head, file_name));
    }
    Ok(staged)
}

fn parse_source_url(raw: &str) -> Result<Url, RelayError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| RelayError::InvalidInput(format!("urlFile is not a valid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        "http" | "https" => Err(RelayError::InvalidInput("urlFile has no host".into())),
        other => Err(RelayError::InvalidInput(format!(
            "urlFile scheme {other:?} is not supported; use http or https"
        ))),
    }
}

fn classify_fetch_error(err: reqwest::Error) -> RelayError {
    if err.is_connect() || err.is_timeout() {
        RelayError::Unreachable(format!("could not reach source URL: {err}"))
    } else if err.is_builder() {
        RelayError::InvalidInput(format!("invalid source URL: {err}"))
    } else {
        RelayError::Transfer(format!("failed to download source URL: {err}"))
    }
}

/// `text/html; charset=utf-8` -> `text/html`
fn essence(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next()?.trim();
    (!essence.is_empty()).then(|| essence.to_ascii_lowercase())
}

#[derive(Debug)]
pub(crate) struct InlinePayload {
    pub declared_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub(crate) fn decode_inline_payload(payload: &str) -> Result<InlinePayload, RelayError> {
    let (declared_type, body) = split_data_url(payload.trim())?;

    let cleaned: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = LENIENT_BASE64
        .decode(cleaned.as_bytes())
        .map_err(|e| RelayError::InvalidPayload(format!("base64File is not valid base64: {e}")))?;

    if bytes.is_empty() {
        return Err(RelayError::InvalidPayload(
            "base64File decodes to an empty payload".into(),
        ));
    }

    Ok(InlinePayload {
        declared_type,
        bytes,
    })
}

// data:[<mime>][;param=value]*;base64,<payload>
fn split_data_url(payload: &str) -> Result<(Option<String>, &str), RelayError> {
    let is_data_url = payload
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"));
    if !is_data_url {
        return Ok((None, payload));
    }

    let comma = payload
        .find(',')
        .ok_or_else(|| RelayError::InvalidPayload("data URL has no payload".into()))?;
    let header = &payload[5..comma];

    let mut params = header.split(';');
    let mime = params.next().and_then(essence);
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(RelayError::InvalidPayload(
            "only base64-encoded data URLs are supported".into(),
        ));
    }

    Ok((mime, &payload[comma + 1..]))
}

/// Small HTML documents are taken as a sign the caller sent a web page by mistake.
pub(crate) fn looks_like_html(head: &[u8]) -> bool {
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    text.contains("<html") || text.contains("<!doctype html")
}

fn infer_content_type(head: &[u8], file_name: &str) -> String {
    infer::get(head)
        .map(|kind| kind.mime_type().to_string())
        .or_else(|| mime_guess::from_path(file_name).first_raw().map(str::to_string))
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}
