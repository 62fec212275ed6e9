//! Remote bundle store client (WebDAV).
//!
//! The core needs exactly four operations against the store: list the
//! pending zip bundles (filtering out anything already carrying the
//! processed-suffix marker), download one, upload one, delete one. The
//! PROPFIND response parsing is a pure function so it can be tested
//! without a server.

use std::path::Path;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::{debug, info, instrument, warn};
use url::Url;

use tenderfold_shared::{Result, TenderfoldError};

/// Body sent with the PROPFIND listing request.
const PROPFIND_BODY: &str = r#"<?xml version='1.0' encoding='utf-8'?>
<d:propfind xmlns:d='DAV:'>
  <d:allprop/>
</d:propfind>"#;

/// Everything but unreserved characters and `/` is percent-encoded when a
/// remote name is turned into a URL path segment.
const NAME_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// A WebDAV directory holding incoming/outgoing bundles.
pub struct WebDavClient {
    base_url: Url,
    auth: Option<(String, String)>,
    http: reqwest::Client,
}

impl WebDavClient {
    /// Build a client for a WebDAV directory URL (a trailing slash is
    /// added if missing, so relative joins stay inside the directory).
    pub fn new(base_url: &str, username: Option<&str>, password: Option<&str>) -> Result<Self> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| TenderfoldError::config(format!("invalid WebDAV URL: {e}")))?;

        let auth = match (username, password) {
            (None, None) => None,
            (user, pass) => Some((
                user.unwrap_or_default().to_string(),
                pass.unwrap_or_default().to_string(),
            )),
        };

        let http = reqwest::Client::builder()
            .user_agent(concat!("tenderfold/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TenderfoldError::Network(format!("client build: {e}")))?;

        Ok(Self {
            base_url,
            auth,
            http,
        })
    }

    fn entry_url(&self, remote_name: &str) -> Result<Url> {
        // `Url::join` would read `#`/`?` in a file name as fragment/query,
        // so the name is percent-encoded first.
        let encoded = utf8_percent_encode(remote_name, NAME_SEGMENT).to_string();
        self.base_url
            .join(&encoded)
            .map_err(|e| TenderfoldError::Network(format!("bad remote name {remote_name}: {e}")))
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((user, pass)) => req.basic_auth(user, Some(pass)),
            None => req,
        }
    }

    /// List pending zip bundles in the directory, skipping names that
    /// already carry `processed_suffix` in their stem.
    #[instrument(skip_all, fields(url = %self.base_url))]
    pub async fn list_archives(&self, processed_suffix: &str) -> Result<Vec<String>> {
        let method = reqwest::Method::from_bytes(b"PROPFIND")
            .map_err(|e| TenderfoldError::Network(e.to_string()))?;
        let req = self
            .http
            .request(method, self.base_url.clone())
            .header("Depth", "1")
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY);

        let resp = self
            .with_auth(req)
            .send()
            .await
            .map_err(|e| TenderfoldError::Network(format!("PROPFIND: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TenderfoldError::Network(format!("PROPFIND: HTTP {status}")));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| TenderfoldError::Network(format!("PROPFIND body: {e}")))?;

        let archives = parse_archive_listing(&body, processed_suffix)?;
        info!(count = archives.len(), "pending bundles listed");
        Ok(archives)
    }

    /// Download a bundle to `local_path`, streaming to disk.
    #[instrument(skip_all, fields(remote = remote_name))]
    pub async fn download(&self, remote_name: &str, local_path: &Path) -> Result<()> {
        let url = self.entry_url(remote_name)?;
        let resp = self
            .with_auth(self.http.get(url))
            .send()
            .await
            .map_err(|e| TenderfoldError::Network(format!("{remote_name}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TenderfoldError::Network(format!(
                "{remote_name}: HTTP {status}"
            )));
        }

        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TenderfoldError::io(parent, e))?;
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| TenderfoldError::Network(format!("{remote_name}: {e}")))?;
        std::fs::write(local_path, &bytes).map_err(|e| TenderfoldError::io(local_path, e))?;

        debug!(bytes = bytes.len(), "bundle downloaded");
        Ok(())
    }

    /// Upload a local file under `remote_name`.
    #[instrument(skip_all, fields(remote = remote_name))]
    pub async fn upload(&self, local_path: &Path, remote_name: &str) -> Result<()> {
        let url = self.entry_url(remote_name)?;
        let bytes = std::fs::read(local_path).map_err(|e| TenderfoldError::io(local_path, e))?;

        let resp = self
            .with_auth(self.http.put(url).body(bytes))
            .send()
            .await
            .map_err(|e| TenderfoldError::Network(format!("{remote_name}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TenderfoldError::Network(format!(
                "{remote_name}: HTTP {status}"
            )));
        }
        info!("bundle uploaded");
        Ok(())
    }

    /// Delete a remote file.
    #[instrument(skip_all, fields(remote = remote_name))]
    pub async fn delete(&self, remote_name: &str) -> Result<()> {
        let url = self.entry_url(remote_name)?;
        let resp = self
            .with_auth(self.http.delete(url))
            .send()
            .await
            .map_err(|e| TenderfoldError::Network(format!("{remote_name}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TenderfoldError::Network(format!(
                "{remote_name}: HTTP {status}"
            )));
        }
        info!("remote bundle deleted");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PROPFIND parsing
// ---------------------------------------------------------------------------

/// Extract pending zip bundle names from a PROPFIND multistatus body.
///
/// Collects every `href` leaf name, percent-decodes it, keeps `.zip` files
/// whose stem does not contain the processed-suffix marker.
pub fn parse_archive_listing(xml: &str, processed_suffix: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut archives = Vec::new();
    let mut in_href = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"href" => in_href = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"href" => in_href = false,
            Ok(Event::Text(t)) if in_href => {
                let href = t
                    .unescape()
                    .map_err(|e| TenderfoldError::Network(format!("bad href: {e}")))?;
                if let Some(name) = href_leaf_name(&href) {
                    if is_pending_archive(&name, processed_suffix) {
                        archives.push(name);
                    } else {
                        debug!(name = %name, "skipped (not a pending zip)");
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "PROPFIND response parse error");
                return Err(TenderfoldError::Network(format!(
                    "parsing PROPFIND response: {e}"
                )));
            }
        }
    }
    Ok(archives)
}

/// The percent-decoded final path segment of an href, or `None` for
/// collection hrefs (trailing slash).
fn href_leaf_name(href: &str) -> Option<String> {
    if href.ends_with('/') {
        return None;
    }
    let leaf = href.rsplit('/').next()?;
    if leaf.is_empty() {
        return None;
    }
    Some(percent_decode_str(leaf).decode_utf8_lossy().into_owned())
}

/// A `.zip` whose stem lacks the processed-suffix marker.
fn is_pending_archive(name: &str, processed_suffix: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if !lower.ends_with(".zip") {
        return false;
    }
    let stem = &name[..name.len() - 4];
    !stem.contains(processed_suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/bundles/</D:href>
  </D:response>
  <D:response>
    <D:href>/dav/bundles/batch-07.zip</D:href>
  </D:response>
  <D:response>
    <D:href>/dav/bundles/batch-06_%E5%B7%B2%E5%A4%84%E7%90%86.zip</D:href>
  </D:response>
  <D:response>
    <D:href>/dav/bundles/%E6%8A%95%E6%A0%87%E9%A1%B9%E7%9B%AE.zip</D:href>
  </D:response>
  <D:response>
    <D:href>/dav/bundles/notes.txt</D:href>
  </D:response>
</D:multistatus>"#;

    #[test]
    fn listing_keeps_pending_zips_only() {
        let archives = parse_archive_listing(LISTING, "_已处理").unwrap();
        assert_eq!(archives, vec!["batch-07.zip", "投标项目.zip"]);
    }

    #[test]
    fn href_decoding_and_collections() {
        assert_eq!(href_leaf_name("/dav/bundles/"), None);
        assert_eq!(
            href_leaf_name("/dav/bundles/a%20b.zip"),
            Some("a b.zip".to_string())
        );
    }

    #[test]
    fn entry_url_encodes_reserved_characters() {
        let client = WebDavClient::new("http://dav.example/bundles", None, None).unwrap();
        let url = client.entry_url("批次 #7?.zip").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), None);
        assert!(url.path().ends_with("%237%3F.zip"), "path: {}", url.path());
    }

    #[test]
    fn processed_marker_filters_regardless_of_case() {
        assert!(is_pending_archive("batch.ZIP", "_已处理"));
        assert!(!is_pending_archive("batch_已处理.zip", "_已处理"));
        assert!(!is_pending_archive("readme.txt", "_已处理"));
    }

    #[tokio::test]
    async fn list_archives_against_mock_server() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("PROPFIND"))
            .respond_with(ResponseTemplate::new(207).set_body_string(LISTING))
            .mount(&server)
            .await;

        let client = WebDavClient::new(&server.uri(), None, None).unwrap();
        let archives = client.list_archives("_已处理").await.unwrap();
        assert_eq!(archives, vec!["batch-07.zip", "投标项目.zip"]);
    }

    #[tokio::test]
    async fn download_writes_body_to_disk() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/batch-07.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"zipbytes".to_vec()))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let local = tmp.path().join("batch-07.zip");
        let client = WebDavClient::new(&server.uri(), None, None).unwrap();
        client.download("batch-07.zip", &local).await.unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"zipbytes");
    }

    #[tokio::test]
    async fn http_error_surfaces_as_network_error() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let client = WebDavClient::new(&server.uri(), None, None).unwrap();
        let err = client
            .download("gone.zip", &tmp.path().join("gone.zip"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenderfoldError::Network(_)));
    }
}
