//! HTML transcoding to the Xiino subset.
//!
//! # Responsibilities
//! - Single top-down traversal enforcing the static tag/attribute ruleset
//! - Strip unknown elements (children promoted), delete unrenderable ones
//! - Resolve and scheme-check every URL attribute against the base URL
//! - Inline transcoded images with EBDWIDTH/EBDHEIGHT, falling back to
//!   ALT text per image on any failure
//! - Flatten outer tables so only the innermost renders as a table
//! - Enforce the page-weight budget during serialization

pub mod arena;
pub mod ruleset;
pub mod serialize;

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::StreamExt;
use url::Url;

use crate::budget::Budget;
use crate::cookies::SessionKey;
use crate::error::{ProxyError, Result};
use crate::fetch::Fetcher;
use crate::image::{ImageProcessor, TranscodedImage};
use crate::palette::ColorMode;
use crate::workers::WorkerPool;

use arena::{Arena, NodeKind, DOCUMENT};
use ruleset::Validator;
use serialize::Serialized;

/// Documents above this size parse on the worker pool.
const LARGE_PARSE_THRESHOLD: usize = 128 * 1024;

/// MIME types accepted inside `data:` image URLs.
const DATA_URL_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/svg+xml",
    "image/webp",
    "image/bmp",
    "image/tiff",
];

pub struct HtmlTranscoder {
    fetcher: Arc<Fetcher>,
    processor: ImageProcessor,
    workers: WorkerPool,
    max_data_url_size: usize,
    image_parallelism: usize,
}

impl HtmlTranscoder {
    pub fn new(
        fetcher: Arc<Fetcher>,
        processor: ImageProcessor,
        workers: WorkerPool,
        max_data_url_size: usize,
        image_parallelism: usize,
    ) -> Self {
        Self {
            fetcher,
            processor,
            workers,
            max_data_url_size,
            image_parallelism: image_parallelism.max(1),
        }
    }

    /// Rewrite a fetched document for the device, inlining its images.
    pub async fn transcode(
        &self,
        html: String,
        base_url: Url,
        mode: ColorMode,
        budget: &Budget,
        session: SessionKey,
    ) -> Result<Serialized> {
        let mut arena = if html.len() > LARGE_PARSE_THRESHOLD {
            self.workers.run(move || Arena::parse(&html)).await
        } else {
            Arena::parse(&html)
        };

        let jobs = {
            let mut rewriter = Rewriter {
                arena: &mut arena,
                base: base_url,
                jobs: Vec::new(),
            };
            rewriter.process_children(DOCUMENT, false);
            rewriter.jobs
        };

        // Images of one page transcode concurrently, bounded by the
        // worker pool; each failure stays local to its element.
        let results: Vec<(ImageJob, Result<TranscodedImage>)> =
            futures_util::stream::iter(jobs.into_iter().map(|job| async move {
                let outcome = self.process_image(&job, mode, budget, session).await;
                (job, outcome)
            }))
            .buffer_unordered(self.image_parallelism)
            .collect()
            .await;

        for (job, outcome) in results {
            match outcome {
                Ok(transcoded) => {
                    let w = transcoded.image.width.to_string();
                    let h = transcoded.image.height.to_string();
                    arena.set_attr(job.node, "src", &transcoded.src);
                    arena.set_attr(job.node, "width", &w);
                    arena.set_attr(job.node, "height", &h);
                    arena.set_attr(job.node, "ebdwidth", &w);
                    arena.set_attr(job.node, "ebdheight", &h);
                }
                Err(error) => {
                    tracing::debug!(%error, "Image dropped, substituting ALT text");
                    arena.replace_with_text(job.node, job.alt.as_deref());
                }
            }
        }

        Ok(serialize::serialize(&arena, budget.page_cap()))
    }

    async fn process_image(
        &self,
        job: &ImageJob,
        mode: ColorMode,
        budget: &Budget,
        session: SessionKey,
    ) -> Result<TranscodedImage> {
        let (bytes, content_type) = match &job.source {
            ImageSource::Remote(url) => {
                let response = self.fetcher.fetch_image(url.clone(), session).await?;
                if !(200..300).contains(&response.status) {
                    return Err(ProxyError::UpstreamStatus(response.status));
                }
                (response.body, response.content_type)
            }
            ImageSource::Inline(data) => decode_data_url(data, self.max_data_url_size)?,
        };
        self.processor
            .transcode(bytes, content_type.as_deref(), mode, budget)
            .await
    }
}

/// Strip markup and return bare text, for the plaintext fallback page.
pub fn strip_to_plaintext(html: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.trim().to_string()
}

struct ImageJob {
    node: usize,
    alt: Option<String>,
    source: ImageSource,
}

enum ImageSource {
    Remote(Url),
    Inline(String),
}

struct Rewriter<'a> {
    arena: &'a mut Arena,
    base: Url,
    jobs: Vec<ImageJob>,
}

impl Rewriter<'_> {
    /// Process the children of `parent` with a worklist: deletions and
    /// splices re-examine the same index, keeps advance.
    fn process_children(&mut self, parent: usize, in_head: bool) {
        let mut i = 0;
        while i < self.arena.children(parent).len() {
            let child = self.arena.children(parent)[i];
            let tag = match &self.arena.node(child).kind {
                NodeKind::Text(_) => {
                    i += 1;
                    continue;
                }
                NodeKind::Document => {
                    i += 1;
                    continue;
                }
                NodeKind::Element { tag, .. } => tag.clone(),
            };

            if ruleset::deleted_subtree(&tag) {
                self.arena.delete_child(parent, i);
                continue;
            }

            if tag == "meta" {
                if let Some(link) = self.refresh_target(child) {
                    let text = self.arena.new_text("Continue");
                    let anchor = self
                        .arena
                        .new_element("a", vec![("href".to_string(), link)]);
                    self.arena.append_child(anchor, text);
                    self.arena.replace_child(parent, i, vec![anchor]);
                    i += 1;
                    continue;
                }
                if in_head {
                    self.arena.delete_child(parent, i);
                    continue;
                }
            }

            if in_head && !matches!(tag.as_str(), "title" | "base") {
                self.arena.delete_child(parent, i);
                continue;
            }

            if !ruleset::tag_allowed(&tag) {
                self.arena.splice_children(parent, i);
                continue;
            }

            if tag == "base" {
                if let Some(href) = self.arena.attr(child, "href") {
                    if let Ok(resolved) = self.base.join(href) {
                        self.base = resolved;
                    }
                }
                self.filter_attrs(child, &tag);
                i += 1;
                continue;
            }

            if tag == "table" && self.arena.has_descendant(child, "table") {
                self.flatten_table(parent, i, child);
                continue;
            }

            if tag == "img" {
                self.queue_image(child);
                i += 1;
                continue;
            }

            self.filter_attrs(child, &tag);
            let entering_head = in_head || tag == "head";
            self.process_children(child, entering_head);
            i += 1;
        }
    }

    /// `<meta http-equiv=refresh>` target URL, resolved, if present.
    fn refresh_target(&self, node: usize) -> Option<String> {
        let equiv = self.arena.attr(node, "http-equiv")?;
        if !equiv.eq_ignore_ascii_case("refresh") {
            return None;
        }
        let content = self.arena.attr(node, "content")?;
        let lowered = content.to_ascii_lowercase();
        let at = lowered.find("url=")?;
        let raw = content[at + 4..].trim().trim_matches(['\'', '"']);
        self.rewrite_url("href", raw)
    }

    fn queue_image(&mut self, node: usize) {
        let src = self.arena.attr(node, "src").map(String::from);
        let alt = self
            .arena
            .attr(node, "alt")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from);

        let Some(src) = src else {
            self.arena.replace_with_text(node, alt.as_deref());
            return;
        };

        // Already-inlined payloads pass through untouched, which keeps
        // re-transcoding a transcoded page a no-op.
        if src.starts_with("ebd:") {
            match crate::ebd::payload_dimensions(&src) {
                Some((w, h)) => {
                    self.filter_attrs(node, "img");
                    if self.arena.attr(node, "ebdwidth").is_none() {
                        self.arena.set_attr(node, "ebdwidth", &w.to_string());
                    }
                    if self.arena.attr(node, "ebdheight").is_none() {
                        self.arena.set_attr(node, "ebdheight", &h.to_string());
                    }
                }
                None => self.arena.replace_with_text(node, alt.as_deref()),
            }
            return;
        }

        let source = if src.starts_with("data:") {
            Some(ImageSource::Inline(src))
        } else {
            match self.base.join(&src) {
                Ok(resolved) if matches!(resolved.scheme(), "http" | "https") => {
                    Some(ImageSource::Remote(resolved))
                }
                _ => None,
            }
        };

        match source {
            Some(source) => {
                self.filter_attrs(node, "img");
                self.jobs.push(ImageJob { node, alt, source });
            }
            // Unsupported scheme: drop the image, keep its ALT text.
            None => self.arena.replace_with_text(node, alt.as_deref()),
        }
    }

    /// Rewrite an outer table into BR-delimited cell contents in document
    /// order. Inner tables ride along inside their cell content and are
    /// re-examined by the worklist, so only the innermost stays tabular.
    fn flatten_table(&mut self, parent: usize, index: usize, table: usize) {
        let mut replacement = Vec::new();
        self.collect_cells(table, &mut replacement);
        self.arena.replace_child(parent, index, replacement);
    }

    fn collect_cells(&mut self, node: usize, out: &mut Vec<usize>) {
        for child in self.arena.children(node).to_vec() {
            match self.arena.tag(child) {
                Some("td") | Some("th") | Some("caption") => {
                    out.extend(self.arena.children(child).to_vec());
                    out.push(self.arena.new_element("br", Vec::new()));
                }
                Some(_) => self.collect_cells(child, out),
                None => {}
            }
        }
    }

    /// Keep only allow-listed attributes whose values validate; resolve
    /// URL attributes against the base.
    fn filter_attrs(&mut self, node: usize, tag: &str) {
        let rules = ruleset::attr_rules(tag);
        let NodeKind::Element { attrs, .. } = &self.arena.node(node).kind else {
            return;
        };
        let current = attrs.clone();

        let mut kept = Vec::with_capacity(current.len());
        for (name, value) in current {
            let Some(rule) = rules.iter().find(|r| r.name == name) else {
                continue;
            };
            match rule.validator {
                Validator::Url => {
                    if let Some(rewritten) = self.rewrite_url(&name, &value) {
                        kept.push((name, rewritten));
                    }
                }
                other => {
                    if ruleset::value_allowed(other, &value) {
                        kept.push((name, value));
                    }
                }
            }
        }
        self.arena.set_attrs(node, kept);
    }

    fn rewrite_url(&self, attr_name: &str, value: &str) -> Option<String> {
        // Inlined image payloads survive verbatim.
        if attr_name == "src" && value.starts_with("ebd:") {
            return Some(value.to_string());
        }
        let mut resolved = self.base.join(value).ok()?;
        if !self.allowed_target(&resolved) {
            return None;
        }
        // The device speaks plain http through the proxy; navigation
        // targets are downgraded and the proxy re-upgrades on fetch.
        if resolved.scheme() == "https" && matches!(attr_name, "href" | "action") {
            let _ = resolved.set_scheme("http");
        }
        Some(resolved.to_string())
    }

    fn allowed_target(&self, url: &Url) -> bool {
        match url.scheme() {
            "http" | "https" | "mailto" => true,
            _ => url.host_str().is_some_and(|h| h.ends_with(".xiino")),
        }
    }
}

/// Decode a `data:image/...` URL into bytes plus its MIME type.
fn decode_data_url(data: &str, max_size: usize) -> Result<(Vec<u8>, Option<String>)> {
    let rest = data
        .strip_prefix("data:")
        .ok_or(ProxyError::ParseFailure)?;
    let (header, payload) = rest.split_once(',').ok_or(ProxyError::ParseFailure)?;

    let mime = header.split(';').next().unwrap_or("").to_ascii_lowercase();
    if !DATA_URL_MIME_TYPES.contains(&mime.as_str()) {
        return Err(ProxyError::UnsupportedScheme(format!("data:{mime}")));
    }

    let bytes = if header.to_ascii_lowercase().contains("base64") {
        BASE64
            .decode(payload.trim())
            .map_err(|_| ProxyError::ParseFailure)?
    } else {
        payload.as_bytes().to_vec()
    };
    if bytes.len() > max_size {
        return Err(ProxyError::TooLarge);
    }
    Ok((bytes, Some(mime)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_fallback_strips_markup() {
        assert_eq!(
            strip_to_plaintext("<p>Hello <b>World</b></p>"),
            "Hello World"
        );
    }

    #[test]
    fn data_url_decoding_respects_mime_allow_list() {
        let png = decode_data_url("data:image/png;base64,AAAA", 1024).unwrap();
        assert_eq!(png.1.as_deref(), Some("image/png"));

        let err = decode_data_url("data:text/html;base64,AAAA", 1024).unwrap_err();
        assert!(matches!(err, ProxyError::UnsupportedScheme(_)));

        let err = decode_data_url("data:image/png;base64,AAAAAAAA", 2).unwrap_err();
        assert!(matches!(err, ProxyError::TooLarge));
    }
}
