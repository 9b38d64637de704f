//! HTML transcoder behavior against the Xiino ruleset.

use std::sync::Arc;
use std::time::{Duration, Instant};

use url::Url;

use xiino_proxy::budget::Budget;
use xiino_proxy::cookies::CookieBridge;
use xiino_proxy::fetch::Fetcher;
use xiino_proxy::html::arena::{Arena, NodeKind, DOCUMENT};
use xiino_proxy::html::{ruleset, HtmlTranscoder};
use xiino_proxy::image::ImageProcessor;
use xiino_proxy::palette::ColorMode;
use xiino_proxy::workers::WorkerPool;
use xiino_proxy::ProxyConfig;

mod common;

fn transcoder() -> HtmlTranscoder {
    let config = ProxyConfig::default();
    let cookies = Arc::new(CookieBridge::new());
    let fetcher = Arc::new(
        Fetcher::new(&config.http, &config.security, &config.image, cookies).unwrap(),
    );
    let workers = WorkerPool::new(2);
    let processor = ImageProcessor::new(config.image.clone(), workers.clone());
    HtmlTranscoder::new(fetcher, processor, workers, config.image.max_data_url_size, 4)
}

fn budget() -> Budget {
    Budget::new(512 * 1024, 100, Instant::now() + Duration::from_secs(30))
}

async fn run(html: &str) -> String {
    run_with_budget(html, &budget()).await
}

async fn run_with_budget(html: &str, budget: &Budget) -> String {
    transcoder()
        .transcode(
            html.to_string(),
            Url::parse("http://example.com/dir/page.html").unwrap(),
            ColorMode::Color8,
            budget,
            0,
        )
        .await
        .unwrap()
        .html
}

/// Every element and attribute of the output must be in the ruleset.
fn assert_xiino_legal(html: &str) {
    let arena = Arena::parse(html);
    let mut stack = vec![DOCUMENT];
    while let Some(id) = stack.pop() {
        if let NodeKind::Element { tag, attrs } = &arena.node(id).kind {
            assert!(ruleset::tag_allowed(tag), "illegal tag <{tag}> in output");
            let rules = ruleset::attr_rules(tag);
            for (name, _) in attrs {
                assert!(
                    rules.iter().any(|r| r.name == name),
                    "illegal attribute {name} on <{tag}>"
                );
            }
        }
        stack.extend(arena.children(id));
    }
}

fn squash(html: &str) -> String {
    html.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[tokio::test]
async fn output_stays_inside_the_allow_list() {
    let input = r#"<html><head>
        <meta charset="utf-8"><link rel="stylesheet" href="x.css">
        <title>T</title><script>alert(1)</script>
      </head><body>
        <span data-x="1">span text</span>
        <article><section><p align="justify" style="color:red">para</p></section></article>
        <div align="center" onmouseover="x()">div</div>
        <video src="a.mp4">fallback</video>
        <input type="dropdown" name="q"><input type="text" size="huge" maxlength="10">
        <custom-element>custom</custom-element>
      </body></html>"#;

    let output = run(input).await;
    assert_xiino_legal(&output);

    // Stripped wrappers keep their text, deleted subtrees lose it.
    assert!(output.contains("span text"));
    assert!(output.contains("para"));
    assert!(output.contains("custom"));
    assert!(!output.contains("alert(1)"));
    assert!(!output.contains("fallback"));

    // Invalid enum and numeric values drop just the attribute.
    assert!(output.contains("<P>"));
    assert!(output.contains("<DIV ALIGN=\"center\">"));
    assert!(!output.contains("dropdown"));
    assert!(output.contains("MAXLENGTH=\"10\""));
}

#[tokio::test]
async fn transcoding_is_idempotent_on_legal_documents() {
    let input = format!(
        r#"<html><head><title>Idem</title></head><body>
          <h1 align="left">Head &amp; lines</h1>
          <p>text with <b>bold</b> and a <a href="http://example.com/x">link</a></p>
          <img src="{}" alt="dot">
          <table border="1"><tr><td align="left">cell</td></tr></table>
        </body></html>"#,
        common::png_data_url(8, 8),
    );

    let once = run(&input).await;
    let twice = run(&once).await;
    assert_eq!(squash(&once), squash(&twice));
}

#[tokio::test]
async fn urls_resolve_against_base_and_bad_schemes_drop() {
    let input = r#"<body>
        <a href="../other/page">relative</a>
        <a href="javascript:alert(1)">scripted</a>
        <a href="gopher://old.example/">ancient</a>
        <a href="mailto:palm@example.com">mail</a>
        <a href="https://secure.example.com/x">secure</a>
      </body>"#;

    let output = run(input).await;
    assert!(output.contains(r#"<A HREF="http://example.com/other/page">relative</A>"#));
    assert!(output.contains("<A>scripted</A>"));
    assert!(output.contains("<A>ancient</A>"));
    assert!(output.contains(r#"<A HREF="mailto:palm@example.com">mail</A>"#));
    // https navigation is downgraded; the proxy re-upgrades on fetch.
    assert!(output.contains(r#"<A HREF="http://secure.example.com/x">secure</A>"#));
}

#[tokio::test]
async fn base_tag_reanchors_resolution() {
    let input = r#"<html><head><base href="http://cdn.example.org/assets/"></head>
        <body><a href="logo/x.html">x</a></body></html>"#;
    let output = run(input).await;
    assert!(output.contains(r#"HREF="http://cdn.example.org/assets/logo/x.html""#));
}

#[tokio::test]
async fn meta_refresh_becomes_a_continue_link() {
    let input = r#"<html><head>
        <meta http-equiv="refresh" content="3; url=/moved-here">
      </head><body>old</body></html>"#;
    let output = run(input).await;
    assert!(output.contains(r#"<A HREF="http://example.com/moved-here">Continue</A>"#));
    assert!(!output.contains("META"));
}

#[tokio::test]
async fn only_the_innermost_table_stays_tabular() {
    let input = r#"<body><table border="1">
        <tr><td>outer one</td></tr>
        <tr><td>
          <table><tr><td>inner cell</td></tr></table>
        </td></tr>
      </table></body>"#;

    let output = run(input).await;
    assert_eq!(output.matches("<TABLE").count(), 1, "{output}");
    assert!(output.contains("outer one<BR>"));
    assert!(output.contains("<TD>inner cell</TD>"));
}

#[tokio::test]
async fn data_url_image_is_inlined_with_ebd_dimensions() {
    let input = format!(
        r#"<body><img src="{}" alt="swatch" width="640"></body>"#,
        common::png_data_url(100, 60),
    );
    let output = run(&input).await;
    // 100x60 halves to 50x30.
    assert!(output.contains(r#"SRC="ebd:"#), "{output}");
    assert!(output.contains(r#"EBDWIDTH="50""#));
    assert!(output.contains(r#"EBDHEIGHT="30""#));
    assert_xiino_legal(&output);
}

#[tokio::test]
async fn failed_image_falls_back_to_alt_text() {
    // Port 9 is unassigned on loopback; the fetch fails fast.
    let input = r#"<body>
        <img src="http://127.0.0.1:9/gone.png" alt="a missing photo">
        <img src="http://127.0.0.1:9/also-gone.png">
        <p>survives</p>
      </body>"#;

    let output = run(input).await;
    assert!(!output.contains("<IMG"));
    assert!(output.contains("a missing photo"));
    assert!(output.contains("<P>survives</P>"));
}

#[tokio::test]
async fn unsupported_image_scheme_drops_silently() {
    let input = r#"<body><img src="ftp://example.com/x.png" alt="ftp art"></body>"#;
    let output = run(input).await;
    assert!(!output.contains("<IMG"));
    assert!(output.contains("ftp art"));
}

#[tokio::test]
async fn page_budget_truncates_with_notice() {
    let mut input = String::from("<html><body>");
    for i in 0..500 {
        input.push_str(&format!("<p>filler paragraph {i} with some length</p>"));
    }
    input.push_str("</body></html>");

    let tight = Budget::new(2048, 100, Instant::now() + Duration::from_secs(30));
    let output = run_with_budget(&input, &tight).await;
    assert!(output.len() <= 2048);
    assert!(output.contains("[Page truncated]"));
    assert!(output.ends_with("</BODY></HTML>"));
}

#[tokio::test]
async fn image_budget_skips_images_over_the_remaining_weight() {
    // Budget with room for markup but not for any encoded image.
    let tiny = Budget::new(600, 100, Instant::now() + Duration::from_secs(30));
    let input = format!(
        r#"<body><img src="{}" alt="too heavy"><p>after</p></body>"#,
        common::png_data_url(64, 64),
    );
    let output = run_with_budget(&input, &tiny).await;
    assert!(!output.contains("ebd:"));
    assert!(output.contains("too heavy"));
}
